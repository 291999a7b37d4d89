//! Second opinion on a proposed routing plan.
//!
//! The validator never edits the plan it is given. Problems it can correct
//! are reported as errors alongside corrected alternative plans; each
//! alternative applies its own fix on top of the previous one, so the last
//! alternative is the fully corrected plan.

use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::domain::models::agent::names;
use crate::domain::models::{ChangeDescription, RoutingPlan, RoutingValidation, SkillRule};
use crate::domain::ports::{fields, Level, Logger};
use crate::services::change_analyzer::ChangeAnalyzer;
use crate::services::skill_router::{satisfied_rules, MAX_PRIORITY, MIN_PRIORITY};

pub struct RoutingValidator {
    analyzer: ChangeAnalyzer,
    logger: Arc<dyn Logger>,
}

impl RoutingValidator {
    pub fn new(analyzer: ChangeAnalyzer, logger: Arc<dyn Logger>) -> Self {
        Self { analyzer, logger }
    }

    pub fn validate(
        &self,
        plan: &RoutingPlan,
        change: &ChangeDescription,
        available_agents: &[String],
        skill_rules: &[SkillRule],
    ) -> RoutingValidation {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut alternative_plans = Vec::new();
        let mut recommendations = Vec::new();
        let mut corrected = plan.clone();

        let mut seen = HashSet::new();
        let duplicates: Vec<&String> = plan
            .agents
            .iter()
            .filter(|a| !seen.insert(a.as_str()))
            .collect();
        if !duplicates.is_empty() {
            for agent in &duplicates {
                errors.push(format!("duplicate agent '{agent}' in plan"));
            }
            let mut seen = HashSet::new();
            corrected.agents.retain(|a| seen.insert(a.clone()));
            corrected
                .reasoning
                .push("removed duplicate agents".to_string());
            alternative_plans.push(corrected.clone());
        }

        let unavailable: Vec<String> = corrected
            .agents
            .iter()
            .filter(|a| !available_agents.contains(a))
            .cloned()
            .collect();
        if !unavailable.is_empty() {
            for agent in &unavailable {
                errors.push(format!("agent '{agent}' is not available"));
            }
            corrected.agents.retain(|a| available_agents.contains(a));
            corrected
                .reasoning
                .push(format!("removed unavailable agents: {}", unavailable.join(", ")));
            alternative_plans.push(corrected.clone());
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&plan.priority) {
            errors.push(format!(
                "priority {} outside {MIN_PRIORITY}-{MAX_PRIORITY}",
                plan.priority
            ));
            corrected.priority = plan.priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
            corrected
                .reasoning
                .push(format!("priority clamped to {}", corrected.priority));
            alternative_plans.push(corrected.clone());
        }

        if plan.is_empty() {
            warnings.push("routing plan is empty".to_string());
        }

        let attrs = self.analyzer.analyze(change);
        let fired = satisfied_rules(skill_rules, &attrs);

        for rule in &fired {
            for agent in &rule.activate {
                if available_agents.contains(agent) && !plan.contains(agent) {
                    warnings.push(format!(
                        "rule '{}' activates '{agent}' but it is not in the plan",
                        rule.name
                    ));
                }
            }
        }

        let mut activations: BTreeMap<(u8, &str), Vec<&str>> = BTreeMap::new();
        for rule in &fired {
            for agent in &rule.activate {
                activations
                    .entry((rule.priority, agent.as_str()))
                    .or_default()
                    .push(rule.name.as_str());
            }
        }
        for ((priority, agent), rules) in activations.iter().rev() {
            if rules.len() > 1 {
                warnings.push(format!(
                    "rules {} all activate '{agent}' at priority {priority}",
                    rules.join(", ")
                ));
            }
        }

        if attrs.security_touched
            && available_agents.iter().any(|a| a == names::SECURITY)
            && !plan.contains(names::SECURITY)
        {
            warnings.push("security-sensitive change routed without the security agent".to_string());
            recommendations.push(format!(
                "add the security agent to review: {}",
                attrs.security_files.join(", ")
            ));
        }

        let valid = errors.is_empty();
        if !valid {
            self.logger.log(
                Level::Warn,
                "routing plan failed validation",
                fields([
                    ("errors", json!(errors)),
                    ("alternatives", json!(alternative_plans.len())),
                ]),
            );
        }

        RoutingValidation {
            valid,
            plan: plan.clone(),
            warnings,
            errors,
            alternative_plans,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RuleCondition, SkillRoutingConfig};
    use crate::domain::ports::NullLogger;

    fn validator() -> RoutingValidator {
        let analyzer = ChangeAnalyzer::new(&SkillRoutingConfig::default()).unwrap();
        RoutingValidator::new(analyzer, Arc::new(NullLogger))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn plan(agents: &[&str], priority: u8) -> RoutingPlan {
        RoutingPlan {
            agents: strings(agents),
            priority,
            ..RoutingPlan::empty()
        }
    }

    fn plain_change() -> ChangeDescription {
        ChangeDescription::new("/repo", strings(&["src/lib.rs"]), 40)
    }

    #[test]
    fn test_clean_plan_is_valid() {
        let result = validator().validate(
            &plan(&["quality"], 5),
            &plain_change(),
            &strings(&["quality", "security"]),
            &[],
        );
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert!(result.alternative_plans.is_empty());
    }

    #[test]
    fn test_duplicates_and_unavailable_produce_alternatives() {
        let input = plan(&["quality", "quality", "ghost"], 5);
        let result = validator().validate(&input, &plain_change(), &strings(&["quality"]), &[]);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.alternative_plans.len(), 2);
        assert_eq!(result.alternative_plans[0].agents, vec!["quality", "ghost"]);
        assert_eq!(result.alternative_plans[1].agents, vec!["quality"]);
        assert_eq!(result.plan, input, "incoming plan is untouched");
    }

    #[test]
    fn test_priority_out_of_range_is_clamped() {
        let result = validator().validate(&plan(&["quality"], 14), &plain_change(), &strings(&["quality"]), &[]);
        assert!(!result.valid);
        assert_eq!(result.alternative_plans.len(), 1);
        assert_eq!(result.alternative_plans[0].priority, 10);
    }

    #[test]
    fn test_empty_plan_is_a_warning() {
        let result = validator().validate(&plan(&[], 5), &plain_change(), &strings(&["quality"]), &[]);
        assert!(result.valid);
        assert_eq!(result.warnings, vec!["routing plan is empty"]);
    }

    #[test]
    fn test_missing_rule_agent_and_collision() {
        let rules = vec![
            SkillRule::new("a", RuleCondition::Always, &["performance"], 6),
            SkillRule::new("b", RuleCondition::Always, &["performance"], 6),
        ];
        let result = validator().validate(
            &plan(&["quality"], 5),
            &plain_change(),
            &strings(&["quality", "performance"]),
            &rules,
        );
        assert!(result.valid);
        assert!(result
            .warnings
            .contains(&"rule 'a' activates 'performance' but it is not in the plan".to_string()));
        assert!(result
            .warnings
            .contains(&"rules a, b all activate 'performance' at priority 6".to_string()));
    }

    #[test]
    fn test_security_change_without_security_agent() {
        let change = ChangeDescription::new("/repo", strings(&["src/auth/login.rs"]), 40);
        let result = validator().validate(
            &plan(&["quality"], 5),
            &change,
            &strings(&["quality", "security"]),
            &[],
        );
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.recommendations,
            vec!["add the security agent to review: src/auth/login.rs"]
        );
    }

    #[test]
    fn test_security_warning_needs_available_agent() {
        let change = ChangeDescription::new("/repo", strings(&["src/auth/login.rs"]), 40);
        let result = validator().validate(&plan(&["quality"], 5), &change, &strings(&["quality"]), &[]);
        assert!(result.warnings.is_empty());
    }
}
