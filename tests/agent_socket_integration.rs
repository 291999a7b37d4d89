//! Agents talking to the registry over a real Unix socket.

mod common;

use common::{eventually, TestAgent, TestServer};
use std::sync::Arc;
use std::time::Duration;
use vigil::domain::models::{
    AgentStatus, CircuitBreakerConfig, CircuitState, Task, TaskContext, TaskStatus,
};
use vigil::infrastructure::ipc::{IpcMessage, MessageType};

fn review_task(agent: &str, timeout_ms: u64) -> Task {
    Task::new(
        agent,
        vec!["src/auth/session.rs".to_string()],
        TaskContext::new("/repo"),
        format!("/tmp/vigil/{agent}.json"),
    )
    .with_timeout_ms(timeout_ms)
}

#[tokio::test]
async fn test_auth_registers_agent() {
    let server = TestServer::start().await;
    let _agent = TestAgent::authenticated(&server.socket, "security").await;

    let snapshot = server.registry.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.agents[0].name, "security");
    assert_eq!(snapshot.agents[0].status, AgentStatus::Healthy);

    server.stop().await;
}

#[tokio::test]
async fn test_task_round_trip() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::authenticated(&server.socket, "quality").await;

    let registry = server.registry.clone();
    let task = review_task("quality", 5000);
    let dispatched = tokio::spawn({
        let task = task.clone();
        async move { registry.send_task(&task).await }
    });

    let frame = agent.recv_kind(MessageType::Task).await.unwrap();
    assert_eq!(frame.task_id.as_deref(), Some(task.task_id.as_str()));
    let data = frame.data.clone().unwrap();
    assert_eq!(data["scope"][0], "src/auth/session.rs");
    assert_eq!(data["context"]["repo_root"], "/repo");
    assert!(data.get("timeout_ms").is_none());

    agent
        .send(&TestAgent::task_response(&task.task_id, "completed"))
        .await;
    let result = dispatched.await.unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.payload.unwrap()["findings"], 0);
    let health = server.registry.get_health("quality").await.unwrap();
    assert_eq!(health.completed_tasks, 1);
    assert_eq!(health.active_tasks, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_silent_agent_times_out_after_deadline() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::authenticated(&server.socket, "architecture").await;
    let before = server
        .registry
        .get_health("architecture")
        .await
        .unwrap()
        .failed_tasks;

    let registry = server.registry.clone();
    let dispatched = tokio::spawn(async move {
        registry
            .send_task(&review_task("architecture", 2000))
            .await
    });
    // The agent reads the task and stays silent
    assert!(agent.recv_kind(MessageType::Task).await.is_some());
    let result = dispatched.await.unwrap();

    assert_eq!(result.status, TaskStatus::Timeout);
    assert!(result.duration_ms >= 2000, "resolved after {}ms", result.duration_ms);
    let after = server
        .registry
        .get_health("architecture")
        .await
        .unwrap()
        .failed_tasks;
    assert_eq!(after, before + 1);

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_and_late_responses_are_ignored() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::authenticated(&server.socket, "documentation").await;

    let registry = server.registry.clone();
    let task = review_task("documentation", 5000);
    let dispatched = tokio::spawn({
        let task = task.clone();
        async move { registry.send_task(&task).await }
    });

    agent.recv_kind(MessageType::Task).await.unwrap();
    agent
        .send(&TestAgent::task_response(&task.task_id, "completed"))
        .await;
    agent
        .send(&TestAgent::task_response(&task.task_id, "failed"))
        .await;
    let result = dispatched.await.unwrap();
    assert_eq!(result.status, TaskStatus::Completed);

    // Let the duplicate drain through the read loop
    agent.send(&IpcMessage::new(MessageType::Heartbeat)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let health = server.registry.get_health("documentation").await.unwrap();
    assert_eq!(health.completed_tasks, 1);
    assert_eq!(health.failed_tasks, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_task_response_before_auth_closes_connection() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::connect(&server.socket).await;

    agent
        .send(&TestAgent::task_response("forged-task", "completed"))
        .await;

    assert!(agent.recv().await.is_none());
    assert_eq!(server.registry.summary().await.total, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_unauthenticated_traffic_is_dropped_until_auth() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::connect(&server.socket).await;

    agent.send(&IpcMessage::new(MessageType::Heartbeat)).await;
    agent.send(&IpcMessage::ping(false)).await;
    assert_eq!(server.registry.summary().await.total, 0);

    let auth = IpcMessage::new(MessageType::Auth).with_agent("performance");
    agent.send(&auth).await;
    let ack = agent.recv().await.unwrap();
    assert!(ack.is_successful_auth_response());

    server.stop().await;
}

#[tokio::test]
async fn test_repeated_malformed_frames_close_connection() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::authenticated(&server.socket, "quality").await;

    for _ in 0..common::MAX_PARSE_FAILURES {
        agent.send_raw(b"{not json\n").await;
    }

    assert!(agent.recv_kind(MessageType::Task).await.is_none());
    let registry = server.registry.clone();
    assert!(
        eventually(|| {
            let registry = registry.clone();
            async move {
                registry.get_health("quality").await.map(|h| h.status)
                    == Some(AgentStatus::Unhealthy)
            }
        })
        .await
    );

    server.stop().await;
}

#[tokio::test]
async fn test_single_bad_frame_is_tolerated() {
    let server = TestServer::start().await;
    let mut agent = TestAgent::authenticated(&server.socket, "quality").await;

    agent.send_raw(b"garbage\n").await;
    agent.send(&IpcMessage::ping(false)).await;

    let reply = agent.recv_kind(MessageType::Ping).await.unwrap();
    assert_eq!(reply.data.unwrap()["reply"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_marks_agent_unhealthy() {
    let server = TestServer::start().await;
    let agent = TestAgent::authenticated(&server.socket, "security").await;
    drop(agent);

    let registry = server.registry.clone();
    assert!(
        eventually(|| {
            let registry = registry.clone();
            async move { registry.summary().await.unhealthy == 1 }
        })
        .await
    );
    assert_eq!(server.registry.summary().await.connected, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_reconnect_reactivates_existing_record() {
    let server = TestServer::start().await;
    drop(TestAgent::authenticated(&server.socket, "security").await);

    let registry = server.registry.clone();
    assert!(
        eventually(|| {
            let registry = registry.clone();
            async move { registry.summary().await.connected == 0 }
        })
        .await
    );

    let _again = TestAgent::authenticated(&server.socket, "security").await;
    let snapshot = server.registry.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.agents[0].is_healthy());

    server.stop().await;
}

#[tokio::test]
async fn test_failures_trip_the_agent_breaker() {
    let server = TestServer::start_with(CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    })
    .await;
    let mut agent = TestAgent::authenticated(&server.socket, "performance").await;
    let registry = Arc::clone(&server.registry);

    for _ in 0..2 {
        let task = review_task("performance", 5000);
        let dispatched = tokio::spawn({
            let registry = registry.clone();
            let task = task.clone();
            async move { registry.send_task(&task).await }
        });
        agent.recv_kind(MessageType::Task).await.unwrap();
        agent
            .send(&TestAgent::task_response(&task.task_id, "failed"))
            .await;
        assert_eq!(dispatched.await.unwrap().status, TaskStatus::Failed);
    }

    let snapshot = registry.snapshot().await;
    assert_eq!(snapshot.agents[0].circuit_breaker_state, CircuitState::Open);

    // Further work is refused without touching the wire or the counters
    let rejected = registry.send_task(&review_task("performance", 5000)).await;
    assert_eq!(rejected.status, TaskStatus::Failed);
    assert_eq!(
        registry.get_health("performance").await.unwrap().failed_tasks,
        2
    );

    server.stop().await;
}
