//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - pretty or JSON console output on stderr
//! - optional rolling JSON log files
//! - a `tracing` adapter for the [`Logger`](crate::domain::ports::Logger) port

pub mod logger;
pub mod tracing_logger;

pub use logger::LoggerImpl;
pub use tracing_logger::TracingLogger;
