//! Vigil - agent supervision and routing engine
//!
//! Vigil sits between a source of code-change events and a fleet of
//! specialized analysis agents (security, quality, architecture,
//! documentation, performance). For each change it decides which agents
//! should review it, dispatches the work over a local socket, and keeps
//! live health and circuit-breaker state for every agent.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, ports and domain errors
//! - **Service Layer** (`services`): the routing pipeline and circuit breakers
//! - **Application Layer** (`application`): agent registry, liveness, dispatch
//! - **Infrastructure Layer** (`infrastructure`): socket transport, config, logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use vigil::{ChangeDescription, Config, Supervisor};
//!
//! let decision = supervisor.supervise(&change).await;
//! println!("route to {:?}", decision.agents());
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{AgentRegistry, LivenessMonitor, ReviewDispatcher, ReviewReport};
pub use domain::models::{
    AgentHealth, AgentStatus, ChangeDescription, CircuitState, Config, HealthSnapshot,
    RoutingPlan, SkillRule, SupervisorDecision, Task, TaskResult, TaskStatus,
};
pub use domain::ports::{HealthSource, Logger};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CircuitBreakerService, Supervisor};
