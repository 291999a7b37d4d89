use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default per-task timeout when the caller does not pick one.
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;

/// Repository context handed to an agent alongside its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskContext {
    pub repo_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
}

impl TaskContext {
    pub fn new(repo_root: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Default::default()
        }
    }
}

/// A unit of analysis work for exactly one agent.
///
/// Immutable once created; the registry owns it until a result resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique per dispatch
    pub task_id: String,

    /// Target agent name
    pub agent: String,

    /// Ordered list of file paths to analyze
    pub scope: Vec<String>,

    /// Repository context
    pub context: TaskContext,

    /// Where the agent should write its output
    pub output: String,

    /// Agent-specific configuration, opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Time the dispatcher waits for a response; never sent on the wire
    #[serde(skip, default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TASK_TIMEOUT_MS
}

impl Task {
    /// Create a task with a fresh id and the default timeout
    pub fn new(
        agent: impl Into<String>,
        scope: Vec<String>,
        context: TaskContext,
        output: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            scope,
            context,
            output: output.into(),
            config: None,
            timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Terminal state of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome of one task, produced exactly once per dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent: String,
    pub status: TaskStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn completed(task: &Task, duration_ms: u64, payload: Option<serde_json::Value>) -> Self {
        Self {
            task_id: task.task_id.clone(),
            agent: task.agent.clone(),
            status: TaskStatus::Completed,
            duration_ms,
            payload,
            error: None,
        }
    }

    pub fn failed(task: &Task, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            task_id: task.task_id.clone(),
            agent: task.agent.clone(),
            status: TaskStatus::Failed,
            duration_ms,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn timed_out(task: &Task, duration_ms: u64) -> Self {
        Self {
            task_id: task.task_id.clone(),
            agent: task.agent.clone(),
            status: TaskStatus::Timeout,
            duration_ms,
            payload: None,
            error: Some(format!("task timed out after {}ms", task.timeout_ms)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new(
            "security",
            vec!["src/auth.rs".to_string()],
            TaskContext::new("/repo"),
            "/tmp/out/security.json",
        )
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(sample_task().task_id, sample_task().task_id);
    }

    #[test]
    fn test_timeout_not_serialized() {
        let task = sample_task().with_timeout_ms(2000);
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("timeout_ms").is_none());
        assert_eq!(value["context"]["repo_root"], "/repo");
        assert!(value["context"].get("diff").is_none());
    }

    #[test]
    fn test_result_constructors() {
        let task = sample_task().with_timeout_ms(2000);

        let ok = TaskResult::completed(&task, 12, None);
        assert!(ok.is_success());

        let timeout = TaskResult::timed_out(&task, 2001);
        assert_eq!(timeout.status, TaskStatus::Timeout);
        assert!(timeout.error.unwrap().contains("2000ms"));
    }
}
