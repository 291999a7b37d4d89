//! Last-mile pruning of a routing plan against live health.
//!
//! The plan was computed from a snapshot that may already be stale; this
//! stage drops agents whose breaker is open, whose status is no longer
//! healthy, or that vanished from the snapshot, then orders the survivors
//! for dispatch.

use serde_json::json;
use std::sync::Arc;

use crate::domain::models::{
    AgentHealth, ChangeDescription, CircuitState, HealthSnapshot, PriorityOptimization,
    RejectedAgent, RoutingPlan,
};
use crate::domain::ports::{fields, Level, Logger};
use crate::services::cost_estimator::CostEstimator;

pub struct PriorityRouter {
    estimator: CostEstimator,
    logger: Arc<dyn Logger>,
}

impl PriorityRouter {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            estimator: CostEstimator::new(),
            logger,
        }
    }

    fn rejection_reason(health: Option<&AgentHealth>) -> Option<String> {
        match health {
            None => Some("not present in health snapshot".to_string()),
            Some(h) if h.circuit_breaker_state == CircuitState::Open => {
                Some("circuit breaker open".to_string())
            }
            Some(h) if !h.is_healthy() => Some(format!("status is {}", h.status)),
            Some(_) => None,
        }
    }

    pub fn optimize_routing(
        &self,
        plan: &RoutingPlan,
        snapshot: &HealthSnapshot,
        change: &ChangeDescription,
    ) -> PriorityOptimization {
        let mut survivors: Vec<(usize, &AgentHealth)> = Vec::new();
        let mut rejected_agents = Vec::new();

        for (index, agent) in plan.agents.iter().enumerate() {
            let health = snapshot.get(agent);
            match (Self::rejection_reason(health), health) {
                (Some(reason), _) => rejected_agents.push(RejectedAgent {
                    agent: agent.clone(),
                    reason,
                }),
                (None, Some(h)) => survivors.push((index, h)),
                (None, None) => {}
            }
        }

        // Closed before half-open, then fastest first, then plan order.
        survivors.sort_by(|(ia, a), (ib, b)| {
            let half_open = |h: &AgentHealth| h.circuit_breaker_state == CircuitState::HalfOpen;
            half_open(a)
                .cmp(&half_open(b))
                .then(a.average_latency_ms.total_cmp(&b.average_latency_ms))
                .then(ia.cmp(ib))
        });

        let prioritized_agents: Vec<String> =
            survivors.iter().map(|(_, h)| h.name.clone()).collect();

        let fallback_reasons: Vec<String> = rejected_agents
            .iter()
            .map(|r| format!("agent '{}' removed: {}", r.agent, r.reason))
            .collect();

        if !rejected_agents.is_empty() {
            self.logger.log(
                Level::Warn,
                "agents rejected by priority router",
                fields([
                    ("rejected", json!(rejected_agents.iter().map(|r| &r.agent).collect::<Vec<_>>())),
                    ("remaining", json!(prioritized_agents)),
                ]),
            );
        }

        let estimate = self
            .estimator
            .estimate(&prioritized_agents, change.lines_changed);

        let mut reasoning = plan.reasoning.clone();
        reasoning.extend(fallback_reasons.iter().cloned());

        let optimized = RoutingPlan {
            agents: prioritized_agents.clone(),
            reasoning,
            priority: plan.priority,
            estimated_duration_secs: estimate.duration_secs,
            estimated_cost: estimate.cost,
            warnings: plan.warnings.clone(),
        };

        PriorityOptimization {
            plan: optimized,
            prioritized_agents,
            rejected_agents,
            fallback_reasons,
        }
    }
}
