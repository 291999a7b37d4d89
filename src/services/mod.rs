pub mod change_analyzer;
pub mod circuit_breaker;
pub mod cost_estimator;
pub mod errors;
pub mod health_validator;
pub mod priority_router;
pub mod routing_validator;
pub mod skill_router;
pub mod supervisor;

pub use change_analyzer::ChangeAnalyzer;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerService, CircuitScope, CircuitStats, CircuitTrippedEvent,
};
pub use cost_estimator::{CostEstimator, Estimate};
pub use errors::{RoutingError, RoutingResult};
pub use health_validator::HealthValidator;
pub use priority_router::PriorityRouter;
pub use routing_validator::RoutingValidator;
pub use skill_router::SkillRouter;
pub use supervisor::{confidence_score, ConfidenceInputs, Supervisor, SupervisorError};
