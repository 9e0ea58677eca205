pub mod geocoding;
pub mod map_token;
pub mod positions;
pub mod routing;
pub mod simulator;
