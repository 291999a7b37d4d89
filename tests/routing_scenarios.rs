//! End-to-end supervision cycles over fixed health pictures.

mod common;

use common::{change, fleet};
use std::sync::Arc;
use vigil::application::AgentRegistry;
use vigil::domain::models::{
    AgentCapabilities, AgentHealth, AgentStatus, CircuitBreakerConfig, CircuitState, Config,
    HealthSnapshot, RegistryConfig, RuleCondition, SkillRule,
};
use vigil::domain::ports::{HealthSource, Logger, NullLogger, StaticHealthSource};
use vigil::infrastructure::ipc::ConnectionHandle;
use vigil::services::supervisor::{FALLBACK_CONFIDENCE, FALLBACK_WARNING};
use vigil::services::{CircuitBreakerService, CircuitScope, Supervisor};

fn supervisor(config: &Config, snapshot: HealthSnapshot) -> Supervisor {
    Supervisor::new(
        config,
        Arc::new(StaticHealthSource::new(snapshot)),
        Arc::new(NullLogger),
    )
    .unwrap()
}

#[tokio::test]
async fn test_required_agent_down_is_reported_but_routing_continues() {
    let mut config = Config::default();
    config.health_validation.minimum_healthy_agents = 2;
    config.health_validation.required_agents = vec!["quality".into(), "security".into()];
    let snapshot = HealthSnapshot::new(vec![
        AgentHealth::new("quality"),
        AgentHealth::new("security").with_status(AgentStatus::Unhealthy),
        AgentHealth::new("documentation"),
    ]);

    let decision = supervisor(&config, snapshot)
        .supervise(&change(&["src/lib.rs"], 40))
        .await;

    let health = decision.validation_results.health.as_ref().unwrap();
    assert_eq!(health.healthy_agents, vec!["quality", "documentation"]);
    assert_eq!(health.critical_issues.len(), 1);
    assert!(health.critical_issues[0].contains("security"));
    assert!(decision.warnings.iter().any(|w| w.contains("security")));
    assert!(!decision.fallback);
    assert_eq!(decision.agents(), &["quality"]);
}

#[tokio::test]
async fn test_large_dependency_change_escalates() {
    let mut files = vec!["package.json"];
    let modules: Vec<String> = (0..20).map(|i| format!("src/feature_{i}.ts")).collect();
    files.extend(modules.iter().map(String::as_str));
    let snapshot = fleet(&["quality", "security", "architecture", "documentation"]);

    let decision = supervisor(&Config::default(), snapshot)
        .supervise(&change(&files, 1200))
        .await;

    assert!(!decision.fallback);
    for agent in ["quality", "security", "architecture"] {
        assert!(decision.agents().iter().any(|a| a == agent), "{agent} missing");
    }
    assert!(decision.routing_plan.priority >= 8);
    assert!(decision.estimated_duration_secs > 0);
    assert!(decision
        .recommendations
        .iter()
        .any(|r| r.contains("splitting")));
}

#[tokio::test]
async fn test_open_breaker_removes_agent_with_reason() {
    let logger: Arc<dyn Logger> = Arc::new(NullLogger);
    let breakers = Arc::new(CircuitBreakerService::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        },
        logger.clone(),
    ));
    let registry = Arc::new(AgentRegistry::new(
        RegistryConfig::default(),
        breakers.clone(),
        logger.clone(),
    ));
    let mut receivers = Vec::new();
    for (id, name) in ["quality", "security", "documentation"].iter().enumerate() {
        let (conn, rx) = ConnectionHandle::new(id as u64 + 1, 8);
        registry
            .register(conn, name, AgentCapabilities::default())
            .await;
        receivers.push(rx);
    }
    breakers
        .record_failure(&CircuitScope::agent("quality"), "analysis crashed")
        .await;

    let source: Arc<dyn HealthSource> = registry.clone();
    let snapshot = source.health_snapshot().await;
    assert_eq!(
        snapshot.get("quality").unwrap().circuit_breaker_state,
        CircuitState::Open
    );

    let supervisor = Supervisor::new(&Config::default(), source, logger).unwrap();
    let decision = supervisor.supervise(&change(&["docs/usage.md"], 30)).await;

    assert!(!decision.agents().iter().any(|a| a == "quality"));
    let priority = decision.validation_results.priority.as_ref().unwrap();
    assert!(priority.rejected_agents.iter().any(|r| r.agent == "quality"));
    assert!(priority
        .fallback_reasons
        .iter()
        .any(|r| r.contains("quality")));
    assert!(decision.confidence < 100);
}

#[tokio::test]
async fn test_no_healthy_agents_yields_fallback_decision() {
    let snapshot = HealthSnapshot::new(vec![
        AgentHealth::new("quality").with_status(AgentStatus::Degraded),
        AgentHealth::new("security").with_status(AgentStatus::Unknown),
    ]);

    let decision = supervisor(&Config::default(), snapshot)
        .supervise(&change(&["src/main.rs"], 5))
        .await;

    assert!(decision.fallback);
    assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
    assert!(decision.agents().is_empty());
    assert!(!decision.errors.is_empty());
    assert!(decision.warnings.iter().any(|w| w == FALLBACK_WARNING));
}

#[tokio::test]
async fn test_configured_rules_extend_defaults() {
    let mut config = Config::default();
    config.skill_rules.push(SkillRule::new(
        "tests-only",
        RuleCondition::parse("tests_touched && !api_touched").unwrap(),
        &["performance"],
        4,
    ));
    let snapshot = fleet(&["quality", "performance"]);

    let decision = supervisor(&config, snapshot)
        .supervise(&change(&["tests/parser_test.rs"], 60))
        .await;

    assert_eq!(decision.agents(), &["quality", "performance"]);
    assert!(decision
        .routing_plan
        .reasoning
        .iter()
        .any(|r| r.contains("tests-only")));
}

#[tokio::test]
async fn test_decision_is_deterministic_for_same_input() {
    let snapshot = fleet(&["quality", "security", "documentation", "architecture"]);
    let supervisor = supervisor(&Config::default(), snapshot);
    let change = change(&["src/api/routes.rs", "README.md"], 300);

    let first = supervisor.supervise(&change).await;
    let second = supervisor.supervise(&change).await;

    assert_eq!(first.routing_plan.agents, second.routing_plan.agents);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.warnings, second.warnings);
}

#[tokio::test]
async fn test_tripped_agent_returns_to_plans_after_cool_down() {
    let logger: Arc<dyn Logger> = Arc::new(NullLogger);
    let breakers = Arc::new(CircuitBreakerService::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            timeout_ms: 50,
            ..Default::default()
        },
        logger.clone(),
    ));
    let registry = Arc::new(AgentRegistry::new(
        RegistryConfig::default(),
        breakers.clone(),
        logger.clone(),
    ));
    let mut receivers = Vec::new();
    for (id, name) in ["quality", "documentation"].iter().enumerate() {
        let (conn, rx) = ConnectionHandle::new(id as u64 + 1, 8);
        registry
            .register(conn, name, AgentCapabilities::default())
            .await;
        receivers.push(rx);
    }
    breakers
        .record_failure(&CircuitScope::agent("quality"), "analysis crashed")
        .await;

    let source: Arc<dyn HealthSource> = registry.clone();
    let supervisor = Supervisor::new(&Config::default(), source, logger).unwrap();
    let change = change(&["src/lib.rs"], 40);

    let tripped = supervisor.supervise(&change).await;
    assert!(!tripped.agents().iter().any(|a| a == "quality"));

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let snapshot = registry.snapshot().await;
    assert_eq!(
        snapshot.get("quality").unwrap().circuit_breaker_state,
        CircuitState::HalfOpen
    );
    let recovered = supervisor.supervise(&change).await;
    assert!(recovered.agents().iter().any(|a| a == "quality"));
    let priority = recovered.validation_results.priority.as_ref().unwrap();
    assert!(!priority.rejected_agents.iter().any(|r| r.agent == "quality"));
}
