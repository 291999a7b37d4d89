//! Skill-based routing: propose the agents a change should be reviewed by.
//!
//! Candidates come from three sources, applied in order: the configured
//! default agents, built-in path-pattern analysis, and the configured skill
//! rules (highest rule priority first). Only available agents are ever
//! proposed and each agent appears once, at its first insertion.

use serde_json::json;
use std::sync::Arc;

use crate::domain::models::agent::names;
use crate::domain::models::routing::BASE_PRIORITY;
use crate::domain::models::{
    ChangeAttributes, ChangeDescription, RoutingPlan, SkillRoutingConfig, SkillRule,
};
use crate::domain::ports::{fields, Level, Logger};
use crate::services::change_analyzer::ChangeAnalyzer;
use crate::services::cost_estimator::CostEstimator;
use crate::services::errors::{RoutingError, RoutingResult};

/// Lowest and highest priority a plan or rule may carry.
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Reject rules that can never be applied sensibly.
pub fn validate_rules(rules: &[SkillRule]) -> RoutingResult<()> {
    for rule in rules {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&rule.priority) {
            return Err(RoutingError::InvalidRulePriority {
                rule: rule.name.clone(),
                priority: rule.priority,
            });
        }
        if rule.activate.is_empty() {
            return Err(RoutingError::EmptyRuleActivation(rule.name.clone()));
        }
    }
    Ok(())
}

/// Satisfied rules in application order: descending priority, stable.
pub fn satisfied_rules<'a>(rules: &'a [SkillRule], attrs: &ChangeAttributes) -> Vec<&'a SkillRule> {
    let mut fired: Vec<&SkillRule> = rules.iter().filter(|r| r.condition.evaluate(attrs)).collect();
    fired.sort_by(|a, b| b.priority.cmp(&a.priority));
    fired
}

/// Ordered, de-duplicated candidate list with its reasoning trace.
struct Candidates<'a> {
    available: &'a [String],
    agents: Vec<String>,
    reasoning: Vec<String>,
}

impl<'a> Candidates<'a> {
    fn new(available: &'a [String]) -> Self {
        Self {
            available,
            agents: Vec::new(),
            reasoning: Vec::new(),
        }
    }

    fn is_available(&self, agent: &str) -> bool {
        self.available.iter().any(|a| a == agent)
    }

    /// Add `agents` that are available; record `why` if any of them was new.
    fn offer(&mut self, agents: &[&str], why: String) {
        let mut added = Vec::new();
        for agent in agents {
            if self.is_available(agent) && !self.agents.iter().any(|a| a == agent) {
                self.agents.push((*agent).to_string());
                added.push(*agent);
            }
        }
        if !added.is_empty() {
            self.reasoning.push(format!("{why} -> {}", added.join(", ")));
        }
    }

    fn contains(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }
}

pub struct SkillRouter {
    config: SkillRoutingConfig,
    analyzer: ChangeAnalyzer,
    estimator: CostEstimator,
    logger: Arc<dyn Logger>,
}

impl SkillRouter {
    pub fn new(config: SkillRoutingConfig, logger: Arc<dyn Logger>) -> RoutingResult<Self> {
        let analyzer = ChangeAnalyzer::new(&config)?;
        Ok(Self {
            config,
            analyzer,
            estimator: CostEstimator::new(),
            logger,
        })
    }

    pub fn analyzer(&self) -> &ChangeAnalyzer {
        &self.analyzer
    }

    /// Propose a routing plan for `change` restricted to `available_agents`.
    pub fn calculate_routing(
        &self,
        change: &ChangeDescription,
        available_agents: &[String],
        skill_rules: &[SkillRule],
    ) -> RoutingResult<RoutingPlan> {
        validate_rules(skill_rules)?;

        let attrs = self.analyzer.analyze(change);
        let thresholds = &self.config.architecture_change_thresholds;
        let mut candidates = Candidates::new(available_agents);

        let defaults: Vec<&str> = self.config.default_agents.iter().map(String::as_str).collect();
        candidates.offer(&defaults, "default agents".to_string());

        if attrs.security_touched {
            candidates.offer(
                &[names::SECURITY],
                format!("security-sensitive files: {}", attrs.security_files.join(", ")),
            );
        }
        if attrs.api_touched {
            candidates.offer(
                &[names::DOCUMENTATION],
                format!("API surface changed: {}", attrs.api_files.join(", ")),
            );
        }
        let large_loc = attrs.lines_changed > thresholds.loc_changed;
        let large_files = attrs.files_changed > thresholds.files_count;
        if large_loc || large_files {
            candidates.offer(
                &[names::ARCHITECTURE],
                format!(
                    "large change: {} lines across {} files",
                    attrs.lines_changed, attrs.files_changed
                ),
            );
        }
        if attrs.docs_touched {
            candidates.offer(
                &[names::DOCUMENTATION],
                format!("documentation changed: {}", attrs.docs_files.join(", ")),
            );
        }
        if attrs.config_touched {
            candidates.offer(
                &[names::QUALITY],
                format!("configuration changed: {}", attrs.config_files.join(", ")),
            );
        }

        for rule in satisfied_rules(skill_rules, &attrs) {
            let activate: Vec<&str> = rule.activate.iter().map(String::as_str).collect();
            candidates.offer(
                &activate,
                format!("rule '{}' ({}) matched", rule.name, rule.condition),
            );
        }

        let Candidates {
            mut agents,
            reasoning,
            ..
        } = candidates;
        agents.retain(|a| available_agents.contains(a));

        let priority = if agents.is_empty() {
            BASE_PRIORITY
        } else {
            let mut priority = i32::from(BASE_PRIORITY);
            if large_loc {
                priority += 2;
            }
            if large_files {
                priority += 1;
            }
            if agents.iter().any(|a| a == names::SECURITY) {
                priority += 1;
            }
            if agents.iter().any(|a| a == names::ARCHITECTURE) {
                priority += 1;
            }
            if attrs.lines_changed < self.config.small_change_loc {
                priority -= 1;
            }
            priority.clamp(i32::from(MIN_PRIORITY), i32::from(MAX_PRIORITY)) as u8
        };

        let mut warnings = Vec::new();
        if agents.is_empty() {
            warnings.push("no available agent matched the change".to_string());
        }

        let estimate = self.estimator.estimate(&agents, change.lines_changed);

        self.logger.log(
            Level::Debug,
            "skill routing computed",
            fields([
                ("agents", json!(agents)),
                ("priority", json!(priority)),
                ("available", json!(available_agents.len())),
            ]),
        );

        Ok(RoutingPlan {
            agents,
            reasoning,
            priority,
            estimated_duration_secs: estimate.duration_secs,
            estimated_cost: estimate.cost,
            warnings,
        })
    }
}
