//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod script;
pub mod telemetry;
