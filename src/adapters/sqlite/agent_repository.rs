//! SQLite implementation of `AgentRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Agent, AgentStats, AgentStatus};
use crate::domain::ports::AgentRepository;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn upsert(&self, agent: &Agent) -> CoreResult<Agent> {
        let capabilities_json = agent.capabilities.as_ref().map(serde_json::to_string).transpose()?;
        let skills_json = serde_json::to_string(&agent.skills)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO agents (id, name, role, status, capabilities, skills, total_tasks,
                completed_tasks, failed_tasks, current_task_id, last_heartbeat)
               VALUES (?, ?, ?, 'online', ?, ?, 0, 0, 0, NULL, ?)
               ON CONFLICT(name) DO UPDATE SET
                   role = excluded.role,
                   capabilities = excluded.capabilities,
                   skills = excluded.skills,
                   status = 'online',
                   last_heartbeat = excluded.last_heartbeat"#,
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(&agent.role)
        .bind(&capabilities_json)
        .bind(&skills_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_name(&agent.name)
            .await?
            .ok_or_else(|| crate::domain::errors::CoreError::Internal("agent vanished immediately after upsert".to_string()))
    }

    async fn get_by_name(&self, name: &str) -> CoreResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, status: Option<AgentStatus>) -> CoreResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = match status {
            Some(status) => {
                sqlx::query_as("SELECT * FROM agents WHERE status = ? ORDER BY name ASC")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query_as("SELECT * FROM agents ORDER BY name ASC").fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_heartbeat(&self, name: &str, current_task_id: Option<Uuid>) -> CoreResult<()> {
        sqlx::query(
            r#"UPDATE agents SET
                   last_heartbeat = ?,
                   current_task_id = COALESCE(?, current_task_id),
                   status = CASE WHEN status = 'offline' THEN 'online' ELSE status END
               WHERE name = ?"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(current_task_id.map(|id| id.to_string()))
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<String>> {
        let stale: Vec<(String,)> = sqlx::query_as("SELECT name FROM agents WHERE last_heartbeat < ? AND status != 'offline'")
            .bind(cutoff.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;

        sqlx::query("UPDATE agents SET status = 'offline' WHERE last_heartbeat < ? AND status != 'offline'")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(stale.into_iter().map(|(name,)| name).collect())
    }

    async fn record_terminal_outcome(&self, name: &str, completed: bool) -> CoreResult<()> {
        let query = if completed {
            "UPDATE agents SET total_tasks = total_tasks + 1, completed_tasks = completed_tasks + 1, current_task_id = NULL, status = 'online' WHERE name = ?"
        } else {
            "UPDATE agents SET total_tasks = total_tasks + 1, failed_tasks = failed_tasks + 1, current_task_id = NULL, status = 'online' WHERE name = ?"
        };
        sqlx::query(query).bind(name).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_current_task(&self, name: &str, task_id: Option<Uuid>) -> CoreResult<()> {
        let status = if task_id.is_some() { "busy" } else { "online" };
        sqlx::query("UPDATE agents SET current_task_id = ?, status = ? WHERE name = ?")
            .bind(task_id.map(|id| id.to_string()))
            .bind(status)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bind_channel(&self, agent_name: &str, channel: &str) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO agent_channels (agent_name, channel, last_seen) VALUES (?, ?, ?)
               ON CONFLICT(agent_name, channel) DO UPDATE SET last_seen = excluded.last_seen"#,
        )
        .bind(agent_name)
        .bind(channel)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    role: String,
    status: String,
    capabilities: Option<String>,
    skills: Option<String>,
    total_tasks: i64,
    completed_tasks: i64,
    failed_tasks: i64,
    current_task_id: Option<String>,
    last_heartbeat: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let capabilities = row.capabilities.map(|c| serde_json::from_str(&c)).transpose()?;
        let skills: Vec<String> = super::parse_json_or_default(row.skills)?;

        Ok(Agent {
            id: super::parse_uuid(&row.id)?,
            name: row.name,
            role: row.role,
            status: AgentStatus::from_str(&row.status)
                .ok_or_else(|| Self::Error::Internal(format!("invalid agent status: {}", row.status)))?,
            capabilities,
            skills,
            stats: AgentStats {
                total_tasks: row.total_tasks as u64,
                completed_tasks: row.completed_tasks as u64,
                failed_tasks: row.failed_tasks as u64,
            },
            current_task_id: super::parse_optional_uuid(row.current_task_id)?,
            last_heartbeat: super::parse_datetime(&row.last_heartbeat)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqliteAgentRepository {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_name() {
        let repo = setup().await;
        let agent = Agent::new("agent-a".to_string(), "worker".to_string(), None, vec!["rust".to_string()]);
        repo.upsert(&agent).await.unwrap();
        repo.upsert(&agent).await.unwrap();

        assert_eq!(repo.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_outcome_updates_rollup_counters() {
        let repo = setup().await;
        let agent = Agent::new("agent-a".to_string(), "worker".to_string(), None, vec![]);
        repo.upsert(&agent).await.unwrap();

        repo.record_terminal_outcome("agent-a", true).await.unwrap();
        repo.record_terminal_outcome("agent-a", false).await.unwrap();

        let updated = repo.get_by_name("agent-a").await.unwrap().unwrap();
        assert_eq!(updated.stats.total_tasks, 2);
        assert_eq!(updated.stats.completed_tasks, 1);
        assert_eq!(updated.stats.failed_tasks, 1);
    }

    #[tokio::test]
    async fn mark_stale_offline_transitions_past_cutoff_only() {
        let repo = setup().await;
        let agent = Agent::new("agent-a".to_string(), "worker".to_string(), None, vec![]);
        repo.upsert(&agent).await.unwrap();

        let names = repo.mark_stale_offline(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(names, vec!["agent-a".to_string()]);

        let updated = repo.get_by_name("agent-a").await.unwrap().unwrap();
        assert_eq!(updated.status, AgentStatus::Offline);
    }
}
