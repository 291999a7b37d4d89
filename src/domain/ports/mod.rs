pub mod health_source;
pub mod logger;
pub mod null_logger;

pub use health_source::{HealthSource, StaticHealthSource};
pub use logger::{fields, Level, Logger};
pub use null_logger::NullLogger;
