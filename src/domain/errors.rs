//! Domain errors for the Vigil routing engine.

use thiserror::Error;

/// Domain-level errors that can occur in the Vigil system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid rule condition '{condition}': {reason}")]
    InvalidRuleCondition { condition: String, reason: String },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
