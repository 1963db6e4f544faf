pub mod factory;
pub mod presto;
