pub mod agent;
pub mod change;
pub mod config;
pub mod routing;
pub mod skill_rule;
pub mod task;

pub use agent::{AgentCapabilities, AgentHealth, AgentStatus, CircuitState, HealthSnapshot};
pub use change::{ChangeAttributes, ChangeDescription};
pub use config::{
    ArchitectureThresholds, CircuitBreakerConfig, Config, HealthValidationConfig, LoggingConfig,
    RegistryConfig, SkillRoutingConfig, SupervisorConfig, TransportConfig,
};
pub use routing::{
    HealthValidation, PriorityOptimization, RejectedAgent, RoutingPlan, RoutingValidation,
    SupervisorDecision, ValidationResults,
};
pub use skill_rule::{Comparison, FlagField, NumericField, RuleCondition, SkillRule};
pub use task::{Task, TaskContext, TaskResult, TaskStatus};
