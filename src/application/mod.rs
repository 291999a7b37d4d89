//! Application layer: the agent registry and the loops built around it.

pub mod agent_registry;
pub mod liveness_monitor;
pub mod review_dispatcher;

pub use agent_registry::{AgentRegistry, LivenessTransition, RegistrySummary};
pub use liveness_monitor::LivenessMonitor;
pub use review_dispatcher::{ReviewDispatcher, ReviewReport};
