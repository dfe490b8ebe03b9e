pub mod broadcast;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod poll;
pub mod reading;
pub mod server;
pub mod store;
pub mod trend;
pub mod validator;
