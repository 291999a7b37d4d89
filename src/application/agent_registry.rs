//! Owner of agent connections and the live health table.
//!
//! The registry is the only writer of [`AgentHealth`]. It reacts to
//! transport traffic (auth, heartbeats, pings, task responses), dispatches
//! tasks with a single deadline covering both queueing and the wait for the
//! response, and folds every outcome into counters and the agent's circuit
//! breaker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock, Semaphore};
use tokio::time::Instant;

use crate::domain::models::{
    AgentCapabilities, AgentHealth, AgentStatus, HealthSnapshot, RegistryConfig, Task, TaskResult,
};
use crate::domain::ports::{fields, HealthSource, Level, Logger};
use crate::infrastructure::ipc::{
    AuthPayload, ConnectionHandle, ConnectionHandler, ConnectionId, IpcMessage, MessageType,
    PingPayload, ResponseStatus, TaskResponsePayload,
};
use crate::services::{CircuitBreakerService, CircuitScope};

struct AgentEntry {
    health: AgentHealth,
    capabilities: AgentCapabilities,
    connection: Option<ConnectionHandle>,
    /// One permit when the agent takes a single task at a time
    dispatch_slot: Option<Arc<Semaphore>>,
    /// Demoted by the liveness sweep rather than by a disconnect
    stale: bool,
}

#[derive(Default)]
struct AgentTable {
    order: Vec<String>,
    entries: HashMap<String, AgentEntry>,
    by_connection: HashMap<ConnectionId, String>,
}

enum TaskOutcome {
    Response(TaskResponsePayload),
    Disconnected,
}

struct PendingTask {
    agent: String,
    reply: oneshot::Sender<TaskOutcome>,
}

enum Settled {
    Responded(TaskResponsePayload),
    Failed(String),
    TimedOut,
}

/// Fleet counts at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub connected: usize,
    pub in_flight: usize,
}

/// A status change made by the liveness sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessTransition {
    pub agent: String,
    pub from: AgentStatus,
    pub to: AgentStatus,
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

const fn severity(status: AgentStatus) -> u8 {
    match status {
        AgentStatus::Healthy => 0,
        AgentStatus::Unknown => 1,
        AgentStatus::Degraded => 2,
        AgentStatus::Unhealthy => 3,
    }
}

pub struct AgentRegistry {
    config: RegistryConfig,
    table: RwLock<AgentTable>,
    pending: Mutex<HashMap<String, PendingTask>>,
    breakers: Arc<CircuitBreakerService>,
    logger: Arc<dyn Logger>,
}

impl AgentRegistry {
    pub fn new(
        config: RegistryConfig,
        breakers: Arc<CircuitBreakerService>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            config,
            table: RwLock::new(AgentTable::default()),
            pending: Mutex::new(HashMap::new()),
            breakers,
            logger,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerService> {
        &self.breakers
    }

    /// Bind `identity` to `connection`, creating or reactivating its record.
    pub async fn register(
        &self,
        connection: ConnectionHandle,
        identity: &str,
        capabilities: AgentCapabilities,
    ) {
        let mut table = self.table.write().await;
        let AgentTable {
            order,
            entries,
            by_connection,
        } = &mut *table;

        // A connection speaks for one identity at a time
        if let Some(previous) = by_connection.get(&connection.id()).cloned() {
            if previous != identity {
                if let Some(entry) = entries.get_mut(&previous) {
                    entry.connection = None;
                    entry.health.status = AgentStatus::Unhealthy;
                }
            }
        }

        let reactivated = match entries.get_mut(identity) {
            Some(entry) => {
                if let Some(old) = entry.connection.replace(connection.clone()) {
                    if old.id() != connection.id() {
                        by_connection.remove(&old.id());
                        old.close();
                    }
                }
                entry.health.status = AgentStatus::Healthy;
                entry.health.last_heartbeat = Utc::now();
                entry.stale = false;
                entry.dispatch_slot = match (entry.dispatch_slot.take(), capabilities.concurrent_tasks) {
                    (_, true) => None,
                    (Some(slot), false) => Some(slot),
                    (None, false) => Some(Arc::new(Semaphore::new(1))),
                };
                entry.capabilities = capabilities;
                true
            }
            None => {
                order.push(identity.to_string());
                entries.insert(
                    identity.to_string(),
                    AgentEntry {
                        health: AgentHealth::new(identity),
                        dispatch_slot: (!capabilities.concurrent_tasks)
                            .then(|| Arc::new(Semaphore::new(1))),
                        capabilities,
                        connection: Some(connection.clone()),
                        stale: false,
                    },
                );
                false
            }
        };
        by_connection.insert(connection.id(), identity.to_string());

        self.logger.log(
            Level::Info,
            if reactivated { "agent reactivated" } else { "agent registered" },
            fields([
                ("agent", json!(identity)),
                ("connection", json!(connection.id())),
            ]),
        );
    }

    /// Record a heartbeat; agents demoted for silence become healthy again.
    pub async fn on_heartbeat(&self, agent: &str) -> bool {
        let mut table = self.table.write().await;
        let Some(entry) = table.entries.get_mut(agent) else {
            return false;
        };
        entry.health.last_heartbeat = Utc::now();
        if entry.stale {
            entry.stale = false;
            entry.health.status = AgentStatus::Healthy;
            self.logger.log(
                Level::Info,
                "agent recovered after missed heartbeats",
                fields([("agent", json!(agent))]),
            );
        }
        true
    }

    /// Demote connected agents that have been silent too long.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<LivenessTransition> {
        let mut transitions = Vec::new();
        let mut table = self.table.write().await;
        let AgentTable { order, entries, .. } = &mut *table;

        for name in order.iter() {
            let Some(entry) = entries.get_mut(name) else {
                continue;
            };
            if entry.connection.is_none() {
                continue;
            }

            let silent_ms =
                u64::try_from((now - entry.health.last_heartbeat).num_milliseconds()).unwrap_or(0);
            let target = if silent_ms > self.config.unhealthy_after_ms {
                AgentStatus::Unhealthy
            } else if silent_ms > self.config.heartbeat_grace_ms {
                AgentStatus::Degraded
            } else {
                continue;
            };

            let current = entry.health.status;
            if severity(target) > severity(current) {
                entry.health.status = target;
                entry.stale = true;
                transitions.push(LivenessTransition {
                    agent: name.clone(),
                    from: current,
                    to: target,
                });
            }
        }
        drop(table);

        for t in &transitions {
            self.logger.log(
                Level::Warn,
                "agent missed heartbeats",
                fields([
                    ("agent", json!(t.agent)),
                    ("from", json!(t.from.as_str())),
                    ("to", json!(t.to.as_str())),
                ]),
            );
        }
        transitions
    }

    /// Dispatch one task and wait for its result.
    ///
    /// Always returns exactly one result: the agent's response, a timeout,
    /// or a synthetic failure when the task could not be sent.
    pub async fn send_task(&self, task: &Task) -> TaskResult {
        let started = Instant::now();
        // Timeouts past the clock's range wait for a year instead
        let deadline = started
            .checked_add(task.timeout())
            .unwrap_or_else(|| started + std::time::Duration::from_secs(365 * 24 * 60 * 60));

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&task.task_id) {
                return TaskResult::failed(
                    task,
                    0,
                    format!("task {} is already in flight", task.task_id),
                );
            }
            pending.insert(
                task.task_id.clone(),
                PendingTask {
                    agent: task.agent.clone(),
                    reply: reply_tx,
                },
            );
        }

        let result = self.dispatch(task, started, deadline, reply_rx).await;
        self.pending.lock().await.remove(&task.task_id);
        result
    }

    async fn dispatch(
        &self,
        task: &Task,
        started: Instant,
        deadline: Instant,
        reply_rx: oneshot::Receiver<TaskOutcome>,
    ) -> TaskResult {
        let (connection, slot) = {
            let table = self.table.read().await;
            match table.entries.get(&task.agent) {
                None => {
                    return TaskResult::failed(
                        task,
                        0,
                        format!("agent '{}' is not registered", task.agent),
                    )
                }
                Some(AgentEntry {
                    connection: None, ..
                }) => {
                    return TaskResult::failed(
                        task,
                        0,
                        format!("agent '{}' is not connected", task.agent),
                    )
                }
                Some(AgentEntry {
                    connection: Some(conn),
                    dispatch_slot,
                    ..
                }) => (conn.clone(), dispatch_slot.clone()),
            }
        };

        if !self.breakers.allow_request(&CircuitScope::agent(&task.agent)).await {
            self.logger.log(
                Level::Warn,
                "task rejected by open circuit breaker",
                fields([("agent", json!(task.agent)), ("task_id", json!(task.task_id))]),
            );
            return TaskResult::failed(
                task,
                millis(started.elapsed()),
                format!("circuit breaker open for agent '{}'", task.agent),
            );
        }

        let _permit = match slot {
            Some(slot) => match tokio::time::timeout_at(deadline, slot.acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) => {
                    return self
                        .settle(task, started, Settled::Failed("dispatch queue closed".into()), false)
                        .await
                }
                Err(_) => return self.settle(task, started, Settled::TimedOut, false).await,
            },
            None => None,
        };

        self.adjust_active(&task.agent, true).await;

        let outcome = match IpcMessage::task(task) {
            Err(e) => Settled::Failed(format!("failed to encode task: {e}")),
            Ok(message) => match connection.send(message).await {
                Err(e) => Settled::Failed(format!("failed to send task: {e}")),
                Ok(()) => match tokio::time::timeout_at(deadline, reply_rx).await {
                    Ok(Ok(TaskOutcome::Response(payload))) => Settled::Responded(payload),
                    Ok(Ok(TaskOutcome::Disconnected) | Err(_)) => {
                        Settled::Failed(format!("agent '{}' disconnected", task.agent))
                    }
                    Err(_) => Settled::TimedOut,
                },
            },
        };

        self.settle(task, started, outcome, true).await
    }

    async fn adjust_active(&self, agent: &str, increment: bool) {
        let mut table = self.table.write().await;
        if let Some(entry) = table.entries.get_mut(agent) {
            let active = &mut entry.health.active_tasks;
            *active = if increment {
                active.saturating_add(1)
            } else {
                active.saturating_sub(1)
            };
        }
    }

    /// Turn a dispatch outcome into the task's one result.
    async fn settle(
        &self,
        task: &Task,
        started: Instant,
        outcome: Settled,
        was_active: bool,
    ) -> TaskResult {
        let duration_ms = millis(started.elapsed());
        let responded = matches!(outcome, Settled::Responded(_));

        let result = match outcome {
            Settled::Responded(response) => match response.status {
                ResponseStatus::Completed => {
                    TaskResult::completed(task, duration_ms, response.result)
                }
                ResponseStatus::Failed => TaskResult::failed(
                    task,
                    duration_ms,
                    response
                        .error
                        .unwrap_or_else(|| "agent reported failure".to_string()),
                ),
            },
            Settled::Failed(reason) => TaskResult::failed(task, duration_ms, reason),
            Settled::TimedOut => TaskResult::timed_out(task, duration_ms),
        };

        {
            let mut table = self.table.write().await;
            if let Some(entry) = table.entries.get_mut(&task.agent) {
                let health = &mut entry.health;
                if was_active {
                    health.active_tasks = health.active_tasks.saturating_sub(1);
                }
                if responded {
                    health.record_latency(duration_ms as f64, self.config.latency_smoothing);
                }
                if result.is_success() {
                    health.completed_tasks += 1;
                } else {
                    health.failed_tasks += 1;
                }
            }
        }

        let scope = CircuitScope::agent(&task.agent);
        if result.is_success() {
            self.breakers.record_success(&scope).await;
        } else {
            self.breakers
                .record_failure(&scope, result.error.clone().unwrap_or_default())
                .await;
        }

        self.logger.log(
            if result.is_success() { Level::Debug } else { Level::Warn },
            "task settled",
            fields([
                ("agent", json!(task.agent)),
                ("task_id", json!(task.task_id)),
                ("status", json!(result.status.to_string())),
                ("duration_ms", json!(duration_ms)),
            ]),
        );
        result
    }

    /// Dispatch a batch concurrently; results come back in input order.
    pub async fn dispatch_all(&self, tasks: &[Task]) -> Vec<TaskResult> {
        join_all(tasks.iter().map(|task| self.send_task(task))).await
    }

    /// Ping every connected agent; replies count as heartbeats.
    pub async fn broadcast_ping(&self) -> usize {
        let connections: Vec<ConnectionHandle> = {
            let table = self.table.read().await;
            table
                .entries
                .values()
                .filter_map(|e| e.connection.clone())
                .collect()
        };

        let mut sent = 0;
        for conn in connections {
            match conn.send(IpcMessage::ping(false)).await {
                Ok(()) => sent += 1,
                Err(e) => self.logger.log(
                    Level::Debug,
                    "ping not delivered",
                    fields([("connection", json!(conn.id())), ("error", json!(e.to_string()))]),
                ),
            }
        }
        sent
    }

    /// Consistent copy of every agent's health, in registration order.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut agents: Vec<AgentHealth> = {
            let table = self.table.read().await;
            table
                .order
                .iter()
                .filter_map(|name| table.entries.get(name))
                .map(|entry| entry.health.clone())
                .collect()
        };
        for health in &mut agents {
            health.circuit_breaker_state = self
                .breakers
                .state(&CircuitScope::agent(&health.name))
                .await;
        }
        HealthSnapshot::new(agents)
    }

    pub async fn get_health(&self, agent: &str) -> Option<AgentHealth> {
        let table = self.table.read().await;
        table.entries.get(agent).map(|e| e.health.clone())
    }

    pub async fn capabilities(&self, agent: &str) -> Option<AgentCapabilities> {
        let table = self.table.read().await;
        table.entries.get(agent).map(|e| e.capabilities.clone())
    }

    pub async fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary {
            in_flight: self.pending.lock().await.len(),
            ..Default::default()
        };
        let table = self.table.read().await;
        for entry in table.entries.values() {
            summary.total += 1;
            if entry.connection.is_some() {
                summary.connected += 1;
            }
            match entry.health.status {
                AgentStatus::Healthy => summary.healthy += 1,
                AgentStatus::Degraded => summary.degraded += 1,
                AgentStatus::Unhealthy => summary.unhealthy += 1,
                AgentStatus::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    async fn agent_for(&self, connection: ConnectionId) -> Option<String> {
        self.table.read().await.by_connection.get(&connection).cloned()
    }

    async fn handle_auth(&self, connection: &ConnectionHandle, message: &IpcMessage) {
        let auth: AuthPayload = match message.payload() {
            Ok(auth) => auth,
            Err(e) => {
                self.reject_auth(connection, None, e.to_string()).await;
                return;
            }
        };

        let identity = auth
            .agent_id
            .clone()
            .or_else(|| message.agent_id.clone())
            .filter(|id| !id.trim().is_empty());
        let Some(identity) = identity else {
            self.reject_auth(connection, None, "missing agent_id".to_string())
                .await;
            return;
        };

        let bound = self.agent_for(connection.id()).await;
        if let Some(bound) = bound.filter(|bound| *bound != identity) {
            self.reject_auth(
                connection,
                Some(&identity),
                format!("connection already authenticated as '{bound}'"),
            )
            .await;
            return;
        }

        let capabilities = AgentCapabilities {
            version: auth.version,
            skills: auth.capabilities,
            concurrent_tasks: auth.concurrent_tasks.unwrap_or(true),
        };
        self.register(connection.clone(), &identity, capabilities).await;

        if let Err(e) = connection
            .send(IpcMessage::auth_response(Some(&identity), true, None))
            .await
        {
            self.logger.log(
                Level::Warn,
                "failed to acknowledge agent auth",
                fields([("agent", json!(identity)), ("error", json!(e.to_string()))]),
            );
        }
    }

    async fn reject_auth(&self, connection: &ConnectionHandle, agent: Option<&str>, reason: String) {
        self.logger.log(
            Level::Warn,
            "agent auth rejected",
            fields([
                ("connection", json!(connection.id())),
                ("reason", json!(reason)),
            ]),
        );
        if connection
            .send(IpcMessage::auth_response(agent, false, Some(reason)))
            .await
            .is_err()
        {
            connection.close();
        }
    }

    async fn handle_task_response(&self, connection: &ConnectionHandle, message: &IpcMessage) {
        let response: TaskResponsePayload = match message.payload() {
            Ok(response) => response,
            Err(e) => {
                self.logger.log(
                    Level::Warn,
                    "dropping unreadable task_response",
                    fields([("error", json!(e.to_string()))]),
                );
                return;
            }
        };
        let Some(task_id) = message.task_id.clone().or_else(|| response.task_id.clone()) else {
            self.logger.warn("dropping task_response without task_id");
            return;
        };

        let agent = self.agent_for(connection.id()).await;
        let mut pending = self.pending.lock().await;
        let owner = pending.get(&task_id).map(|waiting| waiting.agent.clone());
        match owner {
            None => {
                self.logger.log(
                    Level::Debug,
                    "discarding late or duplicate task_response",
                    fields([("task_id", json!(task_id))]),
                );
            }
            Some(owner) if agent.as_deref() != Some(owner.as_str()) => {
                self.logger.log(
                    Level::Warn,
                    "task_response from an agent the task was not sent to",
                    fields([("task_id", json!(task_id)), ("agent", json!(agent))]),
                );
            }
            Some(_) => {
                if let Some(waiting) = pending.remove(&task_id) {
                    let _ = waiting.reply.send(TaskOutcome::Response(response));
                }
            }
        }
    }

    async fn handle_ping(&self, connection: &ConnectionHandle, message: &IpcMessage) {
        if let Some(agent) = self.agent_for(connection.id()).await {
            self.on_heartbeat(&agent).await;
        }
        let ping: PingPayload = message.payload().unwrap_or_default();
        if !ping.reply && connection.send(IpcMessage::ping(true)).await.is_err() {
            self.logger.debug("ping reply not delivered");
        }
    }

    async fn unregister_connection(&self, connection: &ConnectionHandle) {
        let name = {
            let mut table = self.table.write().await;
            let Some(name) = table.by_connection.remove(&connection.id()) else {
                return;
            };
            let Some(entry) = table.entries.get_mut(&name) else {
                return;
            };
            if entry.connection.as_ref().map(ConnectionHandle::id) != Some(connection.id()) {
                return;
            }
            entry.connection = None;
            entry.health.status = AgentStatus::Unhealthy;
            entry.stale = false;
            name
        };

        self.logger.log(
            Level::Warn,
            "agent disconnected",
            fields([("agent", json!(name)), ("connection", json!(connection.id()))]),
        );

        let mut pending = self.pending.lock().await;
        let orphaned: Vec<String> = pending
            .iter()
            .filter(|(_, p)| p.agent == name)
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in orphaned {
            if let Some(waiting) = pending.remove(&task_id) {
                let _ = waiting.reply.send(TaskOutcome::Disconnected);
            }
        }
    }
}

#[async_trait]
impl ConnectionHandler for AgentRegistry {
    async fn on_message(&self, connection: &ConnectionHandle, message: IpcMessage) {
        match message.kind {
            MessageType::Auth => self.handle_auth(connection, &message).await,
            MessageType::Heartbeat => {
                if let Some(agent) = self.agent_for(connection.id()).await {
                    self.on_heartbeat(&agent).await;
                }
            }
            MessageType::TaskResponse => self.handle_task_response(connection, &message).await,
            MessageType::Ping => self.handle_ping(connection, &message).await,
            MessageType::Task | MessageType::AuthResponse => {
                self.logger.log(
                    Level::Warn,
                    "ignoring message kind agents may not send",
                    fields([
                        ("connection", json!(connection.id())),
                        ("kind", json!(message.kind.as_str())),
                    ]),
                );
            }
        }
    }

    async fn on_disconnect(&self, connection: &ConnectionHandle) {
        self.unregister_connection(connection).await;
    }
}

#[async_trait]
impl HealthSource for AgentRegistry {
    async fn health_snapshot(&self) -> HealthSnapshot {
        self.snapshot().await
    }
}
