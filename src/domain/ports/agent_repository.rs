//! Agent repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Agent, AgentStatus};

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Upsert by name: inserts if absent, otherwise updates role/capabilities/skills
    /// and marks the agent online.
    async fn upsert(&self, agent: &Agent) -> CoreResult<Agent>;

    async fn get_by_name(&self, name: &str) -> CoreResult<Option<Agent>>;
    async fn list(&self, status: Option<AgentStatus>) -> CoreResult<Vec<Agent>>;

    /// Updates `last_heartbeat` (and `current_task_id` when provided) and
    /// flips status to `online` if it was `offline`.
    async fn record_heartbeat(&self, name: &str, current_task_id: Option<Uuid>) -> CoreResult<()>;

    /// Transitions every agent whose `last_heartbeat` is older than `cutoff`
    /// and whose status isn't already `offline` to `offline`. Returns the
    /// agent names transitioned, for logging.
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<String>>;

    /// Applies a terminal-transition rollup update (`total_tasks`,
    /// `completed_tasks`/`failed_tasks`, `current_task_id` clear) inside the
    /// caller's transaction.
    async fn record_terminal_outcome(&self, name: &str, completed: bool) -> CoreResult<()>;

    /// Sets `current_task_id` and flips status to `busy`/`online` as appropriate.
    async fn set_current_task(&self, name: &str, task_id: Option<Uuid>) -> CoreResult<()>;

    async fn bind_channel(&self, agent_name: &str, channel: &str) -> CoreResult<()>;
}
