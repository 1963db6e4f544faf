pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod stage;
pub mod summary;
