//! Per-task-type default (timeout/retries/priority) repository port.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{TaskType, TaskTypeDefaults};

#[async_trait]
pub trait TaskTypeDefaultsRepository: Send + Sync {
    async fn get(&self, task_type: TaskType) -> CoreResult<Option<TaskTypeDefaults>>;
}
