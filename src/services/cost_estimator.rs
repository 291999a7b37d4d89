//! Duration and cost estimates for a set of agents.

use serde::Serialize;

use crate::domain::models::agent::names;

/// Per-agent-type estimate constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentCost {
    pub duration_secs: u64,
    pub cost: f64,
}

const DEFAULT_COST: AgentCost = AgentCost {
    duration_secs: 30,
    cost: 0.10,
};

/// Added once whenever at least one agent runs.
const COORDINATION_OVERHEAD: AgentCost = AgentCost {
    duration_secs: 10,
    cost: 0.02,
};

const MAX_COMPLEXITY_MULTIPLIER: f64 = 2.0;

fn agent_cost(agent: &str) -> AgentCost {
    match agent {
        names::SECURITY => AgentCost {
            duration_secs: 45,
            cost: 0.15,
        },
        names::QUALITY => AgentCost {
            duration_secs: 30,
            cost: 0.10,
        },
        names::ARCHITECTURE => AgentCost {
            duration_secs: 60,
            cost: 0.20,
        },
        names::DOCUMENTATION => AgentCost {
            duration_secs: 20,
            cost: 0.05,
        },
        names::PERFORMANCE => AgentCost {
            duration_secs: 40,
            cost: 0.12,
        },
        _ => DEFAULT_COST,
    }
}

/// Estimated totals for running a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub duration_secs: u64,
    pub cost: f64,
}

/// The one estimator shared by routing, prioritization and fallback.
///
/// Duration is the sum of per-agent constants plus coordination overhead.
/// Agent cost scales with change size (1x plus 1x per thousand lines,
/// capped at 2x) before the overhead is added.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimator;

impl CostEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn complexity_multiplier(lines_changed: u64) -> f64 {
        (1.0 + lines_changed as f64 / 1000.0).min(MAX_COMPLEXITY_MULTIPLIER)
    }

    pub fn estimate(&self, agents: &[String], lines_changed: u64) -> Estimate {
        if agents.is_empty() {
            return Estimate {
                duration_secs: 0,
                cost: 0.0,
            };
        }

        let (duration, cost) = agents
            .iter()
            .map(|a| agent_cost(a))
            .fold((0u64, 0.0f64), |(d, c), ac| (d + ac.duration_secs, c + ac.cost));

        Estimate {
            duration_secs: duration + COORDINATION_OVERHEAD.duration_secs,
            cost: round_cost(
                cost.mul_add(
                    Self::complexity_multiplier(lines_changed),
                    COORDINATION_OVERHEAD.cost,
                ),
            ),
        }
    }
}

fn round_cost(cost: f64) -> f64 {
    (cost * 10_000.0).round() / 10_000.0
}
