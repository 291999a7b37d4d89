//! The supervision pipeline.
//!
//! `health-check -> skill-route -> validate -> prioritize -> score`, strictly
//! in that order. Any stage error, including having no healthy agent at
//! all, turns into a fallback decision instead of propagating.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::routing::BASE_PRIORITY;
use crate::domain::models::{
    ChangeDescription, Config, HealthSnapshot, HealthValidation, HealthValidationConfig,
    PriorityOptimization, RoutingPlan, RoutingValidation, SkillRule, SupervisorConfig,
    SupervisorDecision, ValidationResults,
};
use crate::domain::ports::{fields, HealthSource, Level, Logger};
use crate::services::cost_estimator::CostEstimator;
use crate::services::errors::{RoutingError, RoutingResult};
use crate::services::health_validator::HealthValidator;
use crate::services::priority_router::PriorityRouter;
use crate::services::routing_validator::RoutingValidator;
use crate::services::skill_router::SkillRouter;

/// Confidence assigned to every fallback decision.
pub const FALLBACK_CONFIDENCE: u8 = 30;

/// Warning carried by every fallback decision.
pub const FALLBACK_WARNING: &str = "fallback routing in use";

/// Healthy-agent count below which confidence is reduced.
const COMFORTABLE_HEALTHY_AGENTS: usize = 3;

/// Errors constructing a supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Invalid routing configuration: {0}")]
    Configuration(#[from] RoutingError),
}

/// Inputs to the confidence score of a successful pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfidenceInputs {
    pub routing_errors: usize,
    pub routing_warnings: usize,
    pub rejected_agents: usize,
    pub alternative_plans: usize,
    pub healthy_agents: usize,
}

/// Deterministic confidence in [0, 100].
pub fn confidence_score(inputs: ConfidenceInputs) -> u8 {
    let penalty = |count: usize, weight: i64| {
        i64::try_from(count)
            .unwrap_or(i64::MAX)
            .saturating_mul(weight)
    };

    let mut score: i64 = 100;
    score = score.saturating_sub(penalty(inputs.routing_errors, 20));
    score = score.saturating_sub(penalty(inputs.routing_warnings, 10));
    score = score.saturating_sub(penalty(inputs.rejected_agents, 15));
    score = score.saturating_sub(penalty(inputs.alternative_plans, 10));
    if inputs.healthy_agents < COMFORTABLE_HEALTHY_AGENTS {
        score = score.saturating_sub(penalty(
            COMFORTABLE_HEALTHY_AGENTS - inputs.healthy_agents,
            10,
        ));
    }
    score.clamp(0, 100) as u8
}

pub struct Supervisor {
    health_config: HealthValidationConfig,
    config: SupervisorConfig,
    skill_rules: Vec<SkillRule>,
    health_validator: HealthValidator,
    skill_router: SkillRouter,
    routing_validator: RoutingValidator,
    priority_router: PriorityRouter,
    estimator: CostEstimator,
    health_source: Arc<dyn HealthSource>,
    logger: Arc<dyn Logger>,
}

impl Supervisor {
    /// Build every stage from configuration; bad path patterns fail here.
    pub fn new(
        config: &Config,
        health_source: Arc<dyn HealthSource>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, SupervisorError> {
        let skill_router = SkillRouter::new(config.skill_routing.clone(), logger.clone())?;
        let routing_validator = RoutingValidator::new(skill_router.analyzer().clone(), logger.clone());

        Ok(Self {
            health_config: config.health_validation.clone(),
            config: config.supervisor.clone(),
            skill_rules: config.skill_rules.clone(),
            health_validator: HealthValidator::new(config.health_validation.clone(), logger.clone()),
            skill_router,
            routing_validator,
            priority_router: PriorityRouter::new(logger.clone()),
            estimator: CostEstimator::new(),
            health_source,
            logger,
        })
    }

    /// Decide routing for `change` against the live health source.
    pub async fn supervise(&self, change: &ChangeDescription) -> SupervisorDecision {
        let snapshot = self.health_source.health_snapshot().await;
        self.decide(change, &snapshot)
    }

    /// Decide routing for `change` against a given snapshot.
    pub fn decide(&self, change: &ChangeDescription, snapshot: &HealthSnapshot) -> SupervisorDecision {
        let health = self.health_validator.filter_healthy(snapshot);

        let decision = match self.run_pipeline(change, snapshot, &health) {
            Ok(decision) => decision,
            Err(err) => self.fallback(change, health, &err),
        };

        self.logger.log(
            if decision.fallback { Level::Warn } else { Level::Info },
            "routing decision made",
            fields([
                ("agents", json!(decision.agents())),
                ("confidence", json!(decision.confidence)),
                ("fallback", json!(decision.fallback)),
                ("priority", json!(decision.routing_plan.priority)),
            ]),
        );
        decision
    }

    fn run_pipeline(
        &self,
        change: &ChangeDescription,
        snapshot: &HealthSnapshot,
        health: &HealthValidation,
    ) -> RoutingResult<SupervisorDecision> {
        if health.healthy_agents.is_empty() {
            return Err(RoutingError::NoHealthyAgents);
        }

        let proposed =
            self.skill_router
                .calculate_routing(change, &health.healthy_agents, &self.skill_rules)?;

        let routing = self.routing_validator.validate(
            &proposed,
            change,
            &health.healthy_agents,
            &self.skill_rules,
        );
        let chosen = if routing.valid {
            &proposed
        } else {
            routing.alternative_plans.last().unwrap_or(&proposed)
        };

        let priority = self.priority_router.optimize_routing(chosen, snapshot, change);

        Ok(self.assemble(change, health, &proposed, routing, priority))
    }

    fn assemble(
        &self,
        change: &ChangeDescription,
        health: &HealthValidation,
        proposed: &RoutingPlan,
        routing: RoutingValidation,
        priority: PriorityOptimization,
    ) -> SupervisorDecision {
        let mut warnings = Vec::new();
        warnings.extend(health.critical_issues.iter().cloned());
        warnings.extend(health.warnings.iter().cloned());
        warnings.extend(proposed.warnings.iter().cloned());
        warnings.extend(routing.warnings.iter().cloned());

        let mut recommendations = Vec::new();

        if !priority.rejected_agents.is_empty() {
            let names: Vec<&str> = priority
                .rejected_agents
                .iter()
                .map(|r| r.agent.as_str())
                .collect();
            recommendations.push(format!("monitor rejected agents: {}", names.join(", ")));
        }

        for rejected in &priority.rejected_agents {
            if self.health_config.required_agents.contains(&rejected.agent) {
                warnings.push(format!(
                    "required agent {} rejected by priority router",
                    rejected.agent
                ));
                recommendations.push(format!(
                    "restore required agent {} ({})",
                    rejected.agent, rejected.reason
                ));
            }
        }

        if change.lines_changed > self.config.split_change_loc {
            recommendations.push("consider splitting large changes".to_string());
        }
        recommendations.extend(routing.recommendations.iter().cloned());

        let confidence = confidence_score(ConfidenceInputs {
            routing_errors: routing.errors.len(),
            routing_warnings: routing.warnings.len(),
            rejected_agents: priority.rejected_agents.len(),
            alternative_plans: routing.alternative_plans.len(),
            healthy_agents: health.healthy_agents.len(),
        });

        let plan = priority.plan.clone();
        SupervisorDecision {
            estimated_duration_secs: plan.estimated_duration_secs,
            estimated_cost: plan.estimated_cost,
            routing_plan: plan,
            errors: routing.errors.clone(),
            validation_results: ValidationResults {
                health: Some(health.clone()),
                routing: Some(routing),
                priority: Some(priority),
            },
            recommendations,
            warnings,
            confidence,
            fallback: false,
            decided_at: Utc::now(),
        }
    }

    /// Conservative decision used whenever the pipeline cannot finish.
    fn fallback(
        &self,
        change: &ChangeDescription,
        health: HealthValidation,
        err: &RoutingError,
    ) -> SupervisorDecision {
        let mut agents: Vec<String> = self
            .config
            .fallback_agents
            .iter()
            .filter(|a| health.healthy_agents.contains(a))
            .cloned()
            .collect();
        if agents.is_empty() {
            agents.extend(health.healthy_agents.first().cloned());
        }

        self.logger.log(
            Level::Warn,
            "supervisor pipeline failed, using fallback routing",
            fields([("error", json!(err.to_string())), ("agents", json!(agents))]),
        );

        let estimate = self.estimator.estimate(&agents, change.lines_changed);
        let mut warnings = vec![FALLBACK_WARNING.to_string()];
        warnings.extend(health.critical_issues.iter().cloned());
        warnings.extend(health.warnings.iter().cloned());

        let mut recommendations = Vec::new();
        if agents.is_empty() {
            recommendations.push("restore at least one healthy agent".to_string());
        }

        let plan = RoutingPlan {
            reasoning: vec![format!("fallback routing: {err}")],
            priority: BASE_PRIORITY,
            estimated_duration_secs: estimate.duration_secs,
            estimated_cost: estimate.cost,
            warnings: vec![FALLBACK_WARNING.to_string()],
            agents,
        };

        SupervisorDecision {
            estimated_duration_secs: plan.estimated_duration_secs,
            estimated_cost: plan.estimated_cost,
            routing_plan: plan,
            validation_results: ValidationResults {
                health: Some(health),
                routing: None,
                priority: None,
            },
            recommendations,
            warnings,
            errors: vec![err.to_string()],
            confidence: FALLBACK_CONFIDENCE,
            fallback: true,
            decided_at: Utc::now(),
        }
    }
}
