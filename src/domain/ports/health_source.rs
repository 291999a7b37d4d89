use async_trait::async_trait;

use crate::domain::models::HealthSnapshot;

/// Anything that can produce a point-in-time view of agent health.
///
/// The agent registry is the production implementation; the supervisor only
/// depends on this trait so it can be driven from fixtures.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn health_snapshot(&self) -> HealthSnapshot;
}

/// A fixed snapshot, handed out on every call.
#[derive(Debug, Clone)]
pub struct StaticHealthSource {
    snapshot: HealthSnapshot,
}

impl StaticHealthSource {
    pub fn new(snapshot: HealthSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl HealthSource for StaticHealthSource {
    async fn health_snapshot(&self) -> HealthSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AgentHealth;

    #[test]
    fn test_static_source_returns_same_snapshot() {
        let snapshot = HealthSnapshot::new(vec![AgentHealth::new("quality")]);
        let source = StaticHealthSource::new(snapshot.clone());

        let first = tokio_test::block_on(source.health_snapshot());
        let second = tokio_test::block_on(source.health_snapshot());

        assert_eq!(first, snapshot);
        assert_eq!(first, second);
    }
}
