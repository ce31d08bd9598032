//! blockpool driver library: configuration, scenarios and exit codes.

pub mod app;
pub mod config;
pub mod errors;
