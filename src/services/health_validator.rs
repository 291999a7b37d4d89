//! First pipeline stage: decide which agents are usable at all.

use serde_json::json;
use std::sync::Arc;

use crate::domain::models::{CircuitState, HealthSnapshot, HealthValidation, HealthValidationConfig};
use crate::domain::ports::{fields, Level, Logger};

/// Filters a health snapshot down to eligible agents.
///
/// Never fails: every problem it finds becomes a warning or a critical
/// issue on the returned [`HealthValidation`].
pub struct HealthValidator {
    config: HealthValidationConfig,
    logger: Arc<dyn Logger>,
}

impl HealthValidator {
    pub fn new(config: HealthValidationConfig, logger: Arc<dyn Logger>) -> Self {
        Self { config, logger }
    }

    pub fn filter_healthy(&self, snapshot: &HealthSnapshot) -> HealthValidation {
        let healthy_agents = snapshot.healthy_names();
        let total_agents = snapshot.len();
        let mut warnings = Vec::new();
        let mut critical_issues = Vec::new();

        if healthy_agents.len() < total_agents {
            warnings.push(format!(
                "{}/{} agents healthy",
                healthy_agents.len(),
                total_agents
            ));
        }

        if healthy_agents.len() < self.config.minimum_healthy_agents {
            critical_issues.push(format!(
                "only {} healthy agents, minimum is {}",
                healthy_agents.len(),
                self.config.minimum_healthy_agents
            ));
        }

        for required in &self.config.required_agents {
            if !healthy_agents.iter().any(|a| a == required) {
                let status = snapshot
                    .get(required)
                    .map_or("not registered", |a| a.status.as_str());
                critical_issues.push(format!(
                    "required agent '{required}' is unavailable ({status})"
                ));
            }
        }

        for agent in &snapshot.agents {
            if agent.is_healthy() && agent.average_latency_ms > self.config.max_response_time as f64 {
                warnings.push(format!(
                    "agent '{}' average latency {:.0}ms exceeds {}ms",
                    agent.name, agent.average_latency_ms, self.config.max_response_time
                ));
            }
            if agent.failed_tasks >= self.config.circuit_breaker_threshold {
                warnings.push(format!(
                    "agent '{}' has {} failed tasks",
                    agent.name, agent.failed_tasks
                ));
            }
            if agent.circuit_breaker_state == CircuitState::Open {
                warnings.push(format!("agent '{}' circuit breaker is open", agent.name));
            }
        }

        if !critical_issues.is_empty() {
            self.logger.log(
                Level::Warn,
                "health validation found critical issues",
                fields([
                    ("healthy", json!(healthy_agents.len())),
                    ("total", json!(total_agents)),
                    ("issues", json!(critical_issues)),
                ]),
            );
        }

        HealthValidation {
            healthy_agents,
            total_agents,
            warnings,
            critical_issues,
        }
    }
}
