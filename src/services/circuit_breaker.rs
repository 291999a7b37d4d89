//! Circuit breaker pattern for failure detection and recovery.
//!
//! One independent three-state breaker per protected component (every agent
//! plus system components such as the IPC transport). Open circuits cool
//! down lazily: the transition to half-open happens on the next
//! `allow_request` after the timeout has elapsed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::domain::models::{CircuitBreakerConfig, CircuitState};
use crate::domain::ports::{fields, Level, Logger};

/// Scope of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitScope {
    /// Circuit for one agent, keyed by agent name.
    Agent(String),
    /// Circuit for an engine component (e.g. the IPC transport).
    Component(String),
}

impl CircuitScope {
    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent(name.into())
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self::Component(name.into())
    }
}

impl fmt::Display for CircuitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(name) => write!(f, "agent:{name}"),
            Self::Component(name) => write!(f, "component:{name}"),
        }
    }
}

/// A failure record for tracking purposes.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

impl FailureRecord {
    pub fn new(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            error: error.into(),
        }
    }
}

/// Individual circuit breaker state.
///
/// All transitions take the current time explicitly so behavior over the
/// sliding window and the cool-down can be driven deterministically.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub scope: CircuitScope,
    pub state: CircuitState,
    /// Failures inside the monitoring window
    pub failures: Vec<FailureRecord>,
    /// Trial calls handed out since entering half-open
    pub half_open_trials_used: u32,
    /// Trial calls that succeeded since entering half-open
    pub half_open_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub state_changed_at: DateTime<Utc>,
    /// Total times this circuit opened
    pub open_count: u32,
}

impl CircuitBreaker {
    pub fn new(scope: CircuitScope, now: DateTime<Utc>) -> Self {
        Self {
            scope,
            state: CircuitState::Closed,
            failures: Vec::new(),
            half_open_trials_used: 0,
            half_open_successes: 0,
            opened_at: None,
            state_changed_at: now,
            open_count: 0,
        }
    }

    /// Record a failure. Returns true when this failure opened the circuit.
    pub fn record_failure(
        &mut self,
        failure: FailureRecord,
        config: &CircuitBreakerConfig,
    ) -> bool {
        let now = failure.timestamp;
        self.failures.push(failure);
        self.prune(config, now);

        match self.state {
            CircuitState::Closed => {
                if self.failures.len() >= config.failure_threshold as usize {
                    self.open(now);
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                self.open(now);
                true
            }
            CircuitState::Open => false,
        }
    }

    /// Record a success. Returns true when this success closed the circuit.
    pub fn record_success(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        if self.state != CircuitState::HalfOpen {
            return false;
        }
        self.half_open_successes += 1;
        if self.half_open_successes >= trial_budget(config) {
            self.close(now);
            return true;
        }
        false
    }

    /// Check whether a call may proceed, consuming a half-open trial if so.
    pub fn allows(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        if self.state == CircuitState::Open {
            if !self.cooled_down(config, now) {
                return false;
            }
            self.half_open(now);
        }

        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if self.half_open_trials_used < trial_budget(config) {
                    self.half_open_trials_used += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    /// State as seen at `now`: an open circuit whose cool-down has elapsed
    /// reads as half-open even before the next request moves it there.
    pub fn effective_state(&self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> CircuitState {
        if self.state == CircuitState::Open && self.cooled_down(config, now) {
            CircuitState::HalfOpen
        } else {
            self.state
        }
    }

    /// Failures still inside the monitoring window at `now`.
    pub fn recent_failure_count(&self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> usize {
        match window_start(config, now) {
            Some(cutoff) => self.failures.iter().filter(|f| f.timestamp > cutoff).count(),
            None => self.failures.len(),
        }
    }

    /// Manually reset the circuit.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.close(now);
        self.open_count = 0;
    }

    /// A cool-down too long to represent never elapses.
    fn cooled_down(&self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        self.opened_at
            .and_then(|opened_at| opened_at.checked_add_signed(config.open_timeout()))
            .is_some_and(|reopen_at| now >= reopen_at)
    }

    fn prune(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
        if let Some(cutoff) = window_start(config, now) {
            self.failures.retain(|f| f.timestamp > cutoff);
        }
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.state_changed_at = now;
        self.half_open_trials_used = 0;
        self.half_open_successes = 0;
        self.open_count += 1;
    }

    fn close(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.state_changed_at = now;
        self.half_open_trials_used = 0;
        self.half_open_successes = 0;
        self.failures.clear();
    }

    fn half_open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::HalfOpen;
        self.state_changed_at = now;
        self.half_open_trials_used = 0;
        self.half_open_successes = 0;
    }
}

/// Start of the monitoring window; `None` when the window reaches past the
/// representable range, in which case every failure counts.
fn window_start(config: &CircuitBreakerConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(config.monitoring_period())
}

/// A half-open circuit always allows at least one trial.
fn trial_budget(config: &CircuitBreakerConfig) -> u32 {
    config.half_open_requests.max(1)
}

/// Event emitted when a circuit breaker trips.
#[derive(Debug, Clone)]
pub struct CircuitTrippedEvent {
    pub scope: CircuitScope,
    pub tripped_at: DateTime<Utc>,
    /// How many times this circuit has opened
    pub open_count: u32,
    /// Failures inside the window that caused the trip
    pub recent_failures: Vec<String>,
}

/// Statistics for a circuit breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub scope: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub open_count: u32,
    pub half_open_trials_used: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub state_changed_at: DateTime<Utc>,
}

/// Service for managing circuit breakers.
///
/// Breakers are created on first use. A breaker never errors; callers only
/// ever see booleans and states.
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: Arc<RwLock<HashMap<CircuitScope, CircuitBreaker>>>,
    event_sender: Option<mpsc::Sender<CircuitTrippedEvent>>,
    logger: Arc<dyn Logger>,
}

impl CircuitBreakerService {
    pub fn new(config: CircuitBreakerConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
            event_sender: None,
            logger,
        }
    }

    /// Set the event sender for circuit tripped events.
    pub fn with_event_sender(mut self, sender: mpsc::Sender<CircuitTrippedEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if a request is allowed for the given scope.
    pub async fn allow_request(&self, scope: &CircuitScope) -> bool {
        self.allow_request_at(scope, Utc::now()).await
    }

    pub async fn allow_request_at(&self, scope: &CircuitScope, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(scope.clone())
            .or_insert_with(|| CircuitBreaker::new(scope.clone(), now));

        let before = circuit.state;
        let allowed = circuit.allows(&self.config, now);
        if before == CircuitState::Open && circuit.state == CircuitState::HalfOpen {
            self.logger.log(
                Level::Info,
                "circuit half-open, allowing trial requests",
                fields([("scope", json!(scope.to_string()))]),
            );
        }
        allowed
    }

    /// Record a failure for the given scope.
    pub async fn record_failure(&self, scope: &CircuitScope, error: impl Into<String>) {
        self.record_failure_at(scope, error, Utc::now()).await;
    }

    pub async fn record_failure_at(
        &self,
        scope: &CircuitScope,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        if !self.config.enabled {
            return;
        }

        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(scope.clone())
            .or_insert_with(|| CircuitBreaker::new(scope.clone(), now));

        if !circuit.record_failure(FailureRecord::new(error, now), &self.config) {
            return;
        }

        self.logger.log(
            Level::Warn,
            "circuit opened",
            fields([
                ("scope", json!(scope.to_string())),
                ("open_count", json!(circuit.open_count)),
                ("failures", json!(circuit.failures.len())),
            ]),
        );

        if let Some(ref sender) = self.event_sender {
            let event = CircuitTrippedEvent {
                scope: scope.clone(),
                tripped_at: now,
                open_count: circuit.open_count,
                recent_failures: circuit.failures.iter().map(|f| f.error.clone()).collect(),
            };
            if sender.try_send(event).is_err() {
                self.logger.log(
                    Level::Debug,
                    "circuit trip event dropped",
                    fields([("scope", json!(scope.to_string()))]),
                );
            }
        }
    }

    /// Record a success for the given scope.
    pub async fn record_success(&self, scope: &CircuitScope) {
        self.record_success_at(scope, Utc::now()).await;
    }

    pub async fn record_success_at(&self, scope: &CircuitScope, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }

        let mut circuits = self.circuits.write().await;
        if let Some(circuit) = circuits.get_mut(scope) {
            if circuit.record_success(&self.config, now) {
                self.logger.log(
                    Level::Info,
                    "circuit closed after successful trials",
                    fields([("scope", json!(scope.to_string()))]),
                );
            }
        }
    }

    /// Current state of a circuit; unknown scopes are closed.
    ///
    /// An open circuit past its cool-down reports half-open, so callers that
    /// only read states still see the agent become eligible again.
    pub async fn state(&self, scope: &CircuitScope) -> CircuitState {
        self.state_at(scope, Utc::now()).await
    }

    pub async fn state_at(&self, scope: &CircuitScope, now: DateTime<Utc>) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::Closed;
        }
        let circuits = self.circuits.read().await;
        circuits
            .get(scope)
            .map_or(CircuitState::Closed, |c| c.effective_state(&self.config, now))
    }

    /// Get statistics for all circuits.
    pub async fn stats(&self) -> Vec<CircuitStats> {
        let now = Utc::now();
        let circuits = self.circuits.read().await;
        let mut stats: Vec<CircuitStats> = circuits
            .values()
            .map(|c| CircuitStats {
                scope: c.scope.to_string(),
                state: c.effective_state(&self.config, now),
                failure_count: c.recent_failure_count(&self.config, now),
                open_count: c.open_count,
                half_open_trials_used: c.half_open_trials_used,
                opened_at: c.opened_at,
                state_changed_at: c.state_changed_at,
            })
            .collect();
        stats.sort_by(|a, b| a.scope.cmp(&b.scope));
        stats
    }

    /// Scopes whose circuit is currently open.
    pub async fn open_circuits(&self) -> Vec<CircuitScope> {
        let now = Utc::now();
        let circuits = self.circuits.read().await;
        circuits
            .iter()
            .filter(|(_, c)| c.effective_state(&self.config, now) == CircuitState::Open)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Manually reset a circuit.
    pub async fn reset(&self, scope: &CircuitScope) {
        let mut circuits = self.circuits.write().await;
        if let Some(circuit) = circuits.get_mut(scope) {
            circuit.reset(Utc::now());
        }
    }

    /// Reset all circuits.
    pub async fn reset_all(&self) {
        let now = Utc::now();
        let mut circuits = self.circuits.write().await;
        for circuit in circuits.values_mut() {
            circuit.reset(now);
        }
    }
}
