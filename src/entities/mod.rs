pub mod driver_location;
pub mod job;
pub mod user;
