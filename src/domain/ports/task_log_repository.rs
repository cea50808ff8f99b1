//! Task log (audit trail) repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::TaskLogEntry;

#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    async fn append(&self, entry: &TaskLogEntry) -> CoreResult<()>;
    async fn list_for_task(&self, task_id: Uuid) -> CoreResult<Vec<TaskLogEntry>>;
}
