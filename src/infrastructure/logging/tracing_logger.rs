use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::domain::ports::{Level, Logger};

/// [`Logger`] port backed by the global `tracing` subscriber.
///
/// Structured fields are forwarded as a single JSON object in the `fields`
/// attribute, keyed in sorted order.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    component: &'static str,
}

impl TracingLogger {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }
}

fn render(fields: HashMap<String, Value>) -> String {
    let mut sorted: Vec<(String, Value)> = fields.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    Value::Object(sorted.into_iter().collect::<Map<String, Value>>()).to_string()
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, fields: HashMap<String, Value>) {
        let component = self.component;
        if fields.is_empty() {
            match level {
                Level::Trace => tracing::trace!(component, "{message}"),
                Level::Debug => tracing::debug!(component, "{message}"),
                Level::Info => tracing::info!(component, "{message}"),
                Level::Warn => tracing::warn!(component, "{message}"),
                Level::Error => tracing::error!(component, "{message}"),
            }
            return;
        }

        let fields = render(fields);
        match level {
            Level::Trace => tracing::trace!(component, fields = %fields, "{message}"),
            Level::Debug => tracing::debug!(component, fields = %fields, "{message}"),
            Level::Info => tracing::info!(component, fields = %fields, "{message}"),
            Level::Warn => tracing::warn!(component, fields = %fields, "{message}"),
            Level::Error => tracing::error!(component, fields = %fields, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::fields;
    use serde_json::json;

    #[test]
    fn test_render_sorts_keys() {
        let rendered = render(fields([("b", json!(2)), ("a", json!("x"))]));
        assert_eq!(rendered, r#"{"a":"x","b":2}"#);
    }

    #[test]
    fn test_logging_without_subscriber_is_harmless() {
        let logger = TracingLogger::new("test");
        logger.info("no subscriber installed");
        logger.log(Level::Warn, "with fields", fields([("agent", json!("quality"))]));
    }
}
