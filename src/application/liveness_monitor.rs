use crate::application::agent_registry::AgentRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Periodic heartbeat sweep over the agent registry.
///
/// Each tick demotes agents that stopped heartbeating (healthy to degraded
/// after the grace period, then unhealthy) and optionally pings every
/// connected agent so quiet but alive agents can answer.
///
/// # Example
///
/// ```rust,no_run
/// use vigil::application::{AgentRegistry, LivenessMonitor};
/// use std::sync::Arc;
/// use tokio::sync::broadcast;
///
/// # async fn example(registry: Arc<AgentRegistry>) {
/// let (shutdown_tx, _) = broadcast::channel(1);
/// let handle = LivenessMonitor::new(registry).spawn(shutdown_tx.subscribe());
///
/// shutdown_tx.send(()).ok();
/// handle.await.ok();
/// # }
/// ```
pub struct LivenessMonitor {
    registry: Arc<AgentRegistry>,
    sweep_interval: Duration,
    ping_agents: bool,
}

impl LivenessMonitor {
    /// Sweep at the registry's configured interval, pinging agents each tick
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        let sweep_interval = Duration::from_millis(registry.config().sweep_interval_ms.max(1));
        Self {
            registry,
            sweep_interval,
            ping_agents: true,
        }
    }

    pub fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn with_pings(mut self, ping_agents: bool) -> Self {
        self.ping_agents = ping_agents;
        self
    }

    /// Run one sweep now; returns how many agents changed status.
    pub async fn tick(&self) -> usize {
        let transitions = self.registry.sweep(Utc::now()).await;
        if self.ping_agents {
            let pinged = self.registry.broadcast_ping().await;
            tracing::trace!(pinged, "liveness ping sent");
        }
        transitions.len()
    }

    /// Spawn the sweep loop; it stops when `shutdown_rx` fires.
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // First tick fires immediately
            interval.tick().await;

            tracing::info!(
                sweep_interval_ms = self.sweep_interval.as_millis() as u64,
                ping_agents = self.ping_agents,
                "Started agent liveness monitoring"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let changed = self.tick().await;
                        if changed > 0 {
                            let summary = self.registry.summary().await;
                            tracing::info!(
                                changed,
                                healthy = summary.healthy,
                                degraded = summary.degraded,
                                unhealthy = summary.unhealthy,
                                "Agent liveness changed"
                            );
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::info!("Received shutdown signal, stopping liveness monitoring");
                        break;
                    }
                }
            }
        })
    }
}
