use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agents chosen for one request, with priority and estimates.
///
/// Plans are values: every pipeline stage builds a new plan from the one it
/// was handed instead of editing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// Ordered agent names
    pub agents: Vec<String>,

    /// Human-readable trace of why each agent was chosen
    pub reasoning: Vec<String>,

    /// Request priority (1-10)
    pub priority: u8,

    /// Estimated wall-clock duration in seconds
    pub estimated_duration_secs: u64,

    /// Estimated cost in abstract units
    pub estimated_cost: f64,

    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Priority every plan starts from.
pub const BASE_PRIORITY: u8 = 5;

impl RoutingPlan {
    pub fn empty() -> Self {
        Self {
            agents: Vec::new(),
            reasoning: Vec::new(),
            priority: BASE_PRIORITY,
            estimated_duration_secs: 0,
            estimated_cost: 0.0,
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }

    /// Reasoning joined into one line
    pub fn reasoning_text(&self) -> String {
        self.reasoning.join("; ")
    }
}

/// Result of the health-check stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HealthValidation {
    /// Eligible agents in snapshot order
    pub healthy_agents: Vec<String>,

    /// Number of agents known to the snapshot
    pub total_agents: usize,

    pub warnings: Vec<String>,

    /// Problems that make routing unreliable but never abort it
    pub critical_issues: Vec<String>,
}

/// Result of the routing-validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingValidation {
    pub valid: bool,

    /// The plan exactly as it was handed in
    pub plan: RoutingPlan,

    pub warnings: Vec<String>,
    pub errors: Vec<String>,

    /// Corrected plans proposed when the primary plan has errors
    #[serde(default)]
    pub alternative_plans: Vec<RoutingPlan>,

    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// An agent pruned by the priority router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedAgent {
    pub agent: String,
    pub reason: String,
}

/// Result of the prioritization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityOptimization {
    /// Pruned plan with recomputed estimates
    pub plan: RoutingPlan,

    /// Surviving agents in dispatch order
    pub prioritized_agents: Vec<String>,

    pub rejected_agents: Vec<RejectedAgent>,

    /// One human-readable line per rejection
    pub fallback_reasons: Vec<String>,
}

/// Sub-results collected while building a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthValidation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingValidation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityOptimization>,
}

/// Terminal artifact of one supervision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorDecision {
    pub routing_plan: RoutingPlan,
    pub validation_results: ValidationResults,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub estimated_duration_secs: u64,
    pub estimated_cost: f64,

    /// Confidence score in [0, 100]
    pub confidence: u8,

    /// Whether the fallback path produced this decision
    pub fallback: bool,

    pub decided_at: DateTime<Utc>,
}

impl SupervisorDecision {
    pub fn agents(&self) -> &[String] {
        &self.routing_plan.agents
    }
}
