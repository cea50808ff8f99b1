//! Project repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::Project;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Option<Project>>;
    async fn get_by_name(&self, name: &str) -> CoreResult<Option<Project>>;
    async fn list(&self) -> CoreResult<Vec<Project>>;
}
