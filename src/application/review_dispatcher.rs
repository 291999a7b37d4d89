//! Supervise a change and fan the resulting tasks out to agents.

use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::agent_registry::AgentRegistry;
use crate::domain::models::{ChangeDescription, SupervisorDecision, Task, TaskResult};
use crate::domain::ports::{fields, Level, Logger};
use crate::services::Supervisor;

/// Decision plus one result per routed agent, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub decision: SupervisorDecision,
    pub results: Vec<TaskResult>,
}

impl ReviewReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(TaskResult::is_success)
    }
}

pub struct ReviewDispatcher {
    supervisor: Supervisor,
    registry: Arc<AgentRegistry>,
    output_dir: PathBuf,
    task_timeout_ms: u64,
    logger: Arc<dyn Logger>,
}

impl ReviewDispatcher {
    pub fn new(
        supervisor: Supervisor,
        registry: Arc<AgentRegistry>,
        output_dir: impl Into<PathBuf>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let task_timeout_ms = registry.config().default_task_timeout_ms;
        Self {
            supervisor,
            registry,
            output_dir: output_dir.into(),
            task_timeout_ms,
            logger,
        }
    }

    pub fn with_task_timeout_ms(mut self, task_timeout_ms: u64) -> Self {
        self.task_timeout_ms = task_timeout_ms;
        self
    }

    /// One task per routed agent, scoped to every changed file.
    pub fn build_tasks(&self, change: &ChangeDescription, decision: &SupervisorDecision) -> Vec<Task> {
        decision
            .agents()
            .iter()
            .map(|agent| {
                let output = self.output_dir.join(format!("{agent}.json"));
                Task::new(
                    agent.as_str(),
                    change.files.clone(),
                    change.task_context(),
                    output.display().to_string(),
                )
                .with_timeout_ms(self.task_timeout_ms)
            })
            .collect()
    }

    pub async fn review(&self, change: &ChangeDescription) -> ReviewReport {
        let decision = self.supervisor.supervise(change).await;
        let tasks = self.build_tasks(change, &decision);

        self.logger.log(
            Level::Info,
            "dispatching review tasks",
            fields([
                ("agents", json!(decision.agents())),
                ("confidence", json!(decision.confidence)),
                ("fallback", json!(decision.fallback)),
            ]),
        );

        let results = self.registry.dispatch_all(&tasks).await;
        let report = ReviewReport { decision, results };

        self.logger.log(
            if report.all_succeeded() { Level::Info } else { Level::Warn },
            "review finished",
            fields([
                ("tasks", json!(report.results.len())),
                ("succeeded", json!(report.succeeded())),
            ]),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentCapabilities, Config, TaskStatus};
    use crate::domain::ports::{HealthSource, NullLogger};
    use crate::infrastructure::ipc::ConnectionHandle;
    use crate::services::CircuitBreakerService;

    fn dispatcher() -> (ReviewDispatcher, Arc<AgentRegistry>) {
        let config = Config::default();
        let logger: Arc<dyn Logger> = Arc::new(NullLogger);
        let breakers = Arc::new(CircuitBreakerService::new(
            config.circuit_breaker.clone(),
            logger.clone(),
        ));
        let registry = Arc::new(AgentRegistry::new(
            config.registry.clone(),
            breakers,
            logger.clone(),
        ));
        let source: Arc<dyn HealthSource> = registry.clone();
        let supervisor = Supervisor::new(&config, source, logger.clone()).unwrap();
        let dispatcher = ReviewDispatcher::new(supervisor, registry.clone(), "/tmp/vigil", logger)
            .with_task_timeout_ms(50);
        (dispatcher, registry)
    }

    #[tokio::test]
    async fn test_tasks_follow_plan_order() {
        let (dispatcher, registry) = dispatcher();
        for (id, name) in ["security", "quality", "documentation"].iter().enumerate() {
            let (conn, _rx) = ConnectionHandle::new(id as u64, 4);
            registry.register(conn, name, AgentCapabilities::default()).await;
        }
        let change = ChangeDescription::new("/repo", vec!["src/main.rs".into()], 20);

        let decision = dispatcher.supervisor.supervise(&change).await;
        let tasks = dispatcher.build_tasks(&change, &decision);

        assert_eq!(tasks.len(), decision.agents().len());
        for (task, agent) in tasks.iter().zip(decision.agents()) {
            assert_eq!(&task.agent, agent);
            assert_eq!(task.scope, change.files);
            assert_eq!(task.timeout_ms, 50);
            assert!(task.output.ends_with(&format!("{agent}.json")));
        }
    }

    #[tokio::test]
    async fn test_silent_agents_time_out_in_report() {
        let (dispatcher, registry) = dispatcher();
        let mut receivers = Vec::new();
        for (id, name) in ["security", "quality", "documentation"].iter().enumerate() {
            let (conn, rx) = ConnectionHandle::new(id as u64, 4);
            registry.register(conn, name, AgentCapabilities::default()).await;
            receivers.push(rx);
        }
        let change = ChangeDescription::new("/repo", vec!["src/lib.rs".into()], 40);

        let report = dispatcher.review(&change).await;

        assert!(!report.results.is_empty());
        assert!(report
            .results
            .iter()
            .all(|r| r.status == TaskStatus::Timeout));
        assert_eq!(report.succeeded(), 0);
    }
}
