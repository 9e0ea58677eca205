pub mod admin;
pub mod auth;
pub mod customer;
pub mod driver;
pub mod public;
pub mod routing;
