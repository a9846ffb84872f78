pub mod config;
pub mod error;
pub mod levels;
pub mod telemetry;
