//! Errors raised by the routing pipeline stages.

use thiserror::Error;

use crate::domain::errors::DomainError;

/// A pipeline stage could not produce a result.
///
/// The supervisor converts every one of these into a fallback decision.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Skill rule '{rule}' has priority {priority}, expected 1-10")]
    InvalidRulePriority { rule: String, priority: u8 },

    #[error("Skill rule '{0}' activates no agents")]
    EmptyRuleActivation(String),

    #[error("No healthy agents available")]
    NoHealthyAgents,

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
