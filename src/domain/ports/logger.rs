use serde_json::Value;
use std::collections::HashMap;

/// Log level enumeration for structured logging
///
/// Levels are ordered from most verbose (Trace) to most severe (Error).
///
/// # Examples
///
/// ```
/// use vigil::domain::ports::Level;
///
/// assert!(Level::Error > Level::Info);
/// assert!(Level::Trace < Level::Debug);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Returns the string representation of the log level
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Port trait for structured logging
///
/// Every routing component receives one of these in its constructor instead
/// of reaching for a process-wide logger. The infrastructure layer provides
/// a `tracing`-backed adapter; tests can capture entries for assertions.
///
/// Only [`Logger::log`] is required. The level helpers forward to it with no
/// fields.
///
/// # Examples
///
/// ```
/// use vigil::domain::ports::{Logger, Level};
/// use std::collections::HashMap;
/// use serde_json::json;
///
/// fn on_rejection(logger: &dyn Logger, agent: &str) {
///     let mut fields = HashMap::new();
///     fields.insert("agent".to_string(), json!(agent));
///     logger.log(Level::Warn, "agent rejected by priority router", fields);
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log a message with a specific level and structured fields
    fn log(&self, level: Level, message: &str, fields: HashMap<String, Value>);

    fn trace(&self, message: &str) {
        self.log(Level::Trace, message, HashMap::new());
    }

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message, HashMap::new());
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message, HashMap::new());
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message, HashMap::new());
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message, HashMap::new());
    }
}

/// Build a field map from `(key, value)` pairs.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> HashMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
