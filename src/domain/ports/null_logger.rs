//! Null logger implementation.
//!
//! Used when a component needs a `Logger` but nobody is listening.

use serde_json::Value;
use std::collections::HashMap;

use super::{Level, Logger};

/// A logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl NullLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for NullLogger {
    fn log(&self, _level: Level, _message: &str, _fields: HashMap<String, Value>) {}
}
