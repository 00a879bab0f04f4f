pub mod config;
pub mod fetch;
pub mod health;
pub mod route;
pub mod token;
