//! Transitions agents whose last heartbeat is older than the configured
//! threshold to `offline`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::ports::AgentRepository;

pub struct HeartbeatSweep {
    agent_repo: Arc<dyn AgentRepository>,
    interval: Duration,
    offline_threshold: chrono::Duration,
}

impl HeartbeatSweep {
    pub fn new(agent_repo: Arc<dyn AgentRepository>, interval_secs: u64, offline_threshold_secs: u64) -> Self {
        Self {
            agent_repo,
            interval: Duration::from_secs(interval_secs),
            offline_threshold: chrono::Duration::seconds(offline_threshold_secs as i64),
        }
    }

    pub async fn run_once(&self) -> crate::domain::errors::CoreResult<Vec<String>> {
        let cutoff = chrono::Utc::now() - self.offline_threshold;
        let offlined = self.agent_repo.mark_stale_offline(cutoff).await?;
        if !offlined.is_empty() {
            tracing::info!(agents = ?offlined, "heartbeat sweep marked agents offline");
        }
        Ok(offlined)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("heartbeat sweep stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "heartbeat sweep iteration failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteAgentRepository;
    use crate::domain::models::{Agent, AgentStatus};

    #[tokio::test]
    async fn sweep_offlines_agents_past_the_threshold() {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let agent_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool));
        agent_repo
            .upsert(&Agent::new("agent-a".to_string(), "worker".to_string(), None, vec![]))
            .await
            .unwrap();

        let sweep = HeartbeatSweep::new(agent_repo.clone(), 60, 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let offlined = sweep.run_once().await.unwrap();
        assert_eq!(offlined, vec!["agent-a".to_string()]);

        let agent = agent_repo.get_by_name("agent-a").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Offline);
    }
}
