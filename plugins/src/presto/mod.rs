//! HTTP client for Presto-compatible coordinators.

mod client;
mod error;
pub mod protocol;

pub use client::{PrestoClient, PrestoQuery};
