use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DomainError;

/// Well-known agent names used by routing defaults.
pub mod names {
    pub const SECURITY: &str = "security";
    pub const QUALITY: &str = "quality";
    pub const ARCHITECTURE: &str = "architecture";
    pub const DOCUMENTATION: &str = "documentation";
    pub const PERFORMANCE: &str = "performance";
}

/// Agent health status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            "unknown" => Ok(Self::Unknown),
            _ => Err(DomainError::ValidationFailed(format!(
                "Invalid agent status: {s}"
            ))),
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    #[default]
    Closed,
    /// Circuit is open, requests are blocked.
    Open,
    /// Circuit is testing if the component has recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an agent announced about itself during the auth handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Agent build/version string
    #[serde(default)]
    pub version: String,

    /// Analysis skills the agent offers (e.g. "sast", "lint")
    #[serde(default)]
    pub skills: Vec<String>,

    /// Whether the agent accepts more than one task at a time
    #[serde(default = "default_true")]
    pub concurrent_tasks: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            version: String::new(),
            skills: Vec::new(),
            concurrent_tasks: true,
        }
    }
}

/// Live health record for one agent.
///
/// Only the agent registry mutates these; everyone else works on copies
/// taken through a [`HealthSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Stable agent identity (e.g. "security")
    pub name: String,

    /// Current health status
    pub status: AgentStatus,

    /// Last heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,

    /// Exponential moving average of task latency in milliseconds
    #[serde(default)]
    pub average_latency_ms: f64,

    /// Tasks dispatched and not yet resolved
    #[serde(default)]
    pub active_tasks: u32,

    /// Tasks that completed successfully
    #[serde(default)]
    pub completed_tasks: u64,

    /// Tasks that failed or timed out
    #[serde(default)]
    pub failed_tasks: u64,

    /// Circuit breaker state at the time the record was copied
    #[serde(default)]
    pub circuit_breaker_state: CircuitState,
}

impl AgentHealth {
    /// Create a fresh healthy record with a heartbeat stamped now
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: AgentStatus::Healthy,
            last_heartbeat: Utc::now(),
            average_latency_ms: 0.0,
            active_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            circuit_breaker_state: CircuitState::Closed,
        }
    }

    /// Builder-style status override, mostly for fixtures
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style breaker state override
    pub fn with_circuit_state(mut self, state: CircuitState) -> Self {
        self.circuit_breaker_state = state;
        self
    }

    /// Builder-style latency override
    pub fn with_latency(mut self, average_latency_ms: f64) -> Self {
        self.average_latency_ms = average_latency_ms;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AgentStatus::Healthy
    }

    /// Fold a new latency sample into the moving average.
    ///
    /// The first sample seeds the average directly.
    pub fn record_latency(&mut self, sample_ms: f64, smoothing: f64) {
        if self.completed_tasks + self.failed_tasks == 0 && self.average_latency_ms == 0.0 {
            self.average_latency_ms = sample_ms;
        } else {
            self.average_latency_ms =
                smoothing.mul_add(sample_ms, (1.0 - smoothing) * self.average_latency_ms);
        }
    }
}

/// Point-in-time copy of the registry's health table.
///
/// Agents are kept in first-registration order so every consumer sees the
/// same ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// When the copy was taken
    pub taken_at: DateTime<Utc>,

    /// Health records in registration order
    pub agents: Vec<AgentHealth>,
}

impl HealthSnapshot {
    pub fn new(agents: Vec<AgentHealth>) -> Self {
        Self {
            taken_at: Utc::now(),
            agents,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&AgentHealth> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Names of agents whose status is healthy, in snapshot order
    pub fn healthy_names(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|a| a.is_healthy())
            .map(|a| a.name.clone())
            .collect()
    }
}
