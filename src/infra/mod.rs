pub mod articles;
pub mod error;
pub mod http;
pub mod telemetry;
