//! pbench command line: argument parsing, config resolution and run wiring.

pub mod app;
pub mod commands;
pub mod signal;
