//! `Core` — the thin facade a transport collaborator drives.
//!
//! Every external-interface operation is one async method here. Each
//! mutating method sequences, in order: idempotency replay check, rate
//! limit, the application-layer service (Lifecycle Engine / Dispatcher /
//! Dependency Validator), and the agent-statistics rollup the service
//! already applies as part of its own transition. `Core` performs no
//! transport-level concern (parsing, authentication) itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::adapters::sqlite::{
    SqliteAgentRepository, SqliteIdempotencyRepository, SqliteProjectRepository, SqliteTaskLogRepository,
    SqliteTaskRepository, SqliteTaskTypeDefaultsRepository, Store,
};
use crate::application::control_loops::{HeartbeatSweep, IdempotencyGc, StuckSweep};
use crate::application::retry::with_backoff;
use crate::application::{DependencyValidator, Dispatcher, IdempotencyGuard, LifecycleEngine, RateLimiter};
use crate::config::Settings;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Agent, Priority, Project, Task, TaskStatus, TaskType};
use crate::domain::ports::{
    AgentRepository, IdempotencyRepository, ProjectRepository, TaskFilter, TaskLogRepository, TaskRepository,
    TaskTypeDefaultsRepository,
};

use tokio_util::sync::CancellationToken;

/// Everything needed to create, claim, and drive a task through its
/// lifecycle, plus read access for progress/listing queries.
pub struct Core {
    settings: Settings,
    store: Arc<tokio::sync::Mutex<Store>>,
    retry_max_elapsed: Duration,
    project_repo: Arc<dyn ProjectRepository>,
    task_repo: Arc<dyn TaskRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    task_log_repo: Arc<dyn TaskLogRepository>,
    idempotency_repo: Arc<dyn IdempotencyRepository>,
    task_type_defaults_repo: SqliteTaskTypeDefaultsRepository,
    dependency_validator: DependencyValidator,
    lifecycle: LifecycleEngine,
    dispatcher: Dispatcher,
    idempotency_guard: IdempotencyGuard,
    rate_limiter: RateLimiter,
    sweep_cancel: CancellationToken,
}

impl Core {
    /// Builds the Store, runs embedded migrations, seeds built-in task-type
    /// defaults, and wires every application service. Does not start the
    /// background sweeps — call `spawn_control_loops` for that once the
    /// caller's own runtime is ready to own the returned handles.
    pub async fn new(settings: Settings) -> CoreResult<Self> {
        let store = Store::connect(settings.database.clone())
            .await
            .map_err(|e| CoreError::Internal(format!("failed to connect to store: {e}")))?;
        let pool = store.pool().clone();
        crate::adapters::sqlite::migrations::run(&pool)
            .await
            .map_err(|e| CoreError::Internal(format!("migration failed: {e}")))?;

        let task_type_defaults_repo = SqliteTaskTypeDefaultsRepository::new(pool.clone());
        task_type_defaults_repo.seed_builtin().await?;

        Self::from_pool(settings, pool)
    }

    /// Builds every service directly from an already-migrated pool, without
    /// touching the filesystem. Used for in-memory construction in tests and
    /// by `new` after it has prepared the Store.
    pub fn from_pool(settings: Settings, pool: sqlx::SqlitePool) -> CoreResult<Self> {
        let project_repo: Arc<dyn ProjectRepository> = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agent_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let task_log_repo: Arc<dyn TaskLogRepository> = Arc::new(SqliteTaskLogRepository::new(pool.clone()));
        let idempotency_repo: Arc<dyn IdempotencyRepository> = Arc::new(SqliteIdempotencyRepository::new(pool.clone()));
        let task_type_defaults_repo = SqliteTaskTypeDefaultsRepository::new(pool.clone());

        let store = Store::from_existing(pool, format!("sqlite:{}", settings.database.path), settings.database.clone());
        let retry_max_elapsed = Duration::from_secs(settings.database.retry_max_elapsed_secs);

        let dependency_validator = DependencyValidator::new(task_repo.clone());
        let lifecycle = LifecycleEngine::new(task_repo.clone(), task_log_repo.clone(), agent_repo.clone());
        let dispatcher = Dispatcher::new(task_repo.clone(), task_log_repo.clone());
        let idempotency_guard = IdempotencyGuard::new(idempotency_repo.clone(), settings.idempotency.ttl_secs);
        let rate_limiter = RateLimiter::new(
            settings.rate_limit.window_secs,
            settings.rate_limit.max_requests,
            settings.rate_limit.max_store_size,
        );

        Ok(Self {
            settings,
            store: Arc::new(tokio::sync::Mutex::new(store)),
            retry_max_elapsed,
            project_repo,
            task_repo,
            agent_repo,
            task_log_repo,
            idempotency_repo,
            task_type_defaults_repo,
            dependency_validator,
            lifecycle,
            dispatcher,
            idempotency_guard,
            rate_limiter,
            sweep_cancel: CancellationToken::new(),
        })
    }

    /// Test/in-process convenience: an in-memory Store, migrated and seeded.
    pub async fn in_memory(settings: Settings) -> CoreResult<Self> {
        let store = Store::connect_in_memory()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to open in-memory store: {e}")))?;
        let pool = store.pool().clone();
        crate::adapters::sqlite::migrations::run(&pool)
            .await
            .map_err(|e| CoreError::Internal(format!("migration failed: {e}")))?;
        let task_type_defaults_repo = SqliteTaskTypeDefaultsRepository::new(pool.clone());
        task_type_defaults_repo.seed_builtin().await?;
        Self::from_pool(settings, pool)
    }

    /// Spawns the three background sweeps, returning a token that stops all
    /// of them cooperatively when cancelled (dropping the returned `Core`
    /// does not stop them on its own — callers that want that should cancel
    /// explicitly during shutdown).
    pub fn spawn_control_loops(&self) -> CancellationToken {
        let token = self.sweep_cancel.clone();

        let heartbeat = Arc::new(HeartbeatSweep::new(
            self.agent_repo.clone(),
            self.settings.control_loops.heartbeat_sweep_interval_secs,
            self.settings.control_loops.heartbeat_offline_threshold_secs,
        ));
        tokio::spawn(heartbeat.run(token.clone()));

        let stuck = Arc::new(StuckSweep::new(
            self.task_repo.clone(),
            self.task_log_repo.clone(),
            self.agent_repo.clone(),
            self.settings.control_loops.stuck_sweep_interval_secs,
            self.settings.dispatcher.default_task_timeout_minutes,
        ));
        tokio::spawn(stuck.run(token.clone()));

        let gc = Arc::new(IdempotencyGc::new(
            self.idempotency_repo.clone(),
            self.settings.control_loops.idempotency_gc_interval_secs,
            self.settings.idempotency.ttl_secs,
            self.settings.idempotency.gc_batch_size,
        ));
        tokio::spawn(gc.run(token.clone()));

        token
    }

    /// Stops every sweep spawned by `spawn_control_loops`.
    pub fn shutdown_control_loops(&self) {
        self.sweep_cancel.cancel();
    }

    fn rate_limit(&self, key: &str) -> CoreResult<()> {
        self.rate_limiter.check(key)
    }

    /// Retries `op` with bounded exponential backoff while it keeps failing
    /// with `CoreError::Transient`, tracking consecutive failures against the
    /// Store so a sustained outage triggers a pool reset rather than retrying
    /// forever against a connection that's never coming back.
    async fn resilient<T, F, Fut>(&self, mut op: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let store = self.store.clone();
        with_backoff(self.retry_max_elapsed, move || {
            let store = store.clone();
            let fut = op();
            async move {
                let result = fut.await;
                match &result {
                    Ok(_) => store.lock().await.record_success(),
                    Err(err) if err.is_transient() => {
                        let now = chrono::Utc::now().timestamp();
                        if let Err(reset_err) = store.lock().await.reset_if_unhealthy(now).await {
                            tracing::warn!(error = %reset_err, "store reset attempt failed");
                        }
                    }
                    Err(_) => {}
                }
                result
            }
        })
        .await
    }

    // ---- Projects -------------------------------------------------------

    pub async fn create_project(&self, name: String, description: String, external_channel: Option<String>) -> CoreResult<Project> {
        self.rate_limit("system")?;
        if self.resilient(|| self.project_repo.get_by_name(&name)).await?.is_some() {
            return Err(CoreError::StateConflict(format!("project {name} already exists")));
        }
        let project = Project::new(name, description, external_channel);
        self.resilient(|| self.project_repo.create(&project)).await?;
        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub async fn list_projects(&self) -> CoreResult<Vec<Project>> {
        self.resilient(|| self.project_repo.list()).await
    }

    pub async fn project_progress(&self, project_id: Uuid) -> CoreResult<std::collections::HashMap<TaskStatus, i64>> {
        self.resilient(|| self.task_repo.count_by_status(project_id)).await
    }

    // ---- Tasks ------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        project_id: Uuid,
        title: String,
        description: String,
        task_type: TaskType,
        priority: Option<Priority>,
        acceptance_criteria: String,
        dependencies: Vec<Uuid>,
        task_tags: Vec<String>,
        timeout_minutes: Option<u32>,
        max_retries: Option<u32>,
    ) -> CoreResult<Task> {
        self.rate_limit("system")?;

        if self.resilient(|| self.project_repo.get(project_id)).await?.is_none() {
            return Err(CoreError::NotFound(format!("project {project_id}")));
        }

        let defaults = self.resilient(|| self.task_type_defaults_repo.get(task_type)).await?;
        let priority = priority.unwrap_or_else(|| defaults.map_or_else(Priority::default, |d| d.priority));
        let max_retries = max_retries.or_else(|| defaults.map(|d| d.max_retries)).unwrap_or(0);
        let timeout_minutes = timeout_minutes.or_else(|| defaults.map(|d| d.timeout_minutes));

        let task_id = Uuid::new_v4();
        self.resilient(|| self.dependency_validator.validate(task_id, project_id, &dependencies)).await?;

        let mut task = Task::new(
            project_id,
            title,
            description,
            task_type,
            priority,
            acceptance_criteria,
            dependencies,
            task_tags,
            timeout_minutes,
            max_retries,
        );
        task.id = task_id;

        self.resilient(|| self.task_repo.create(&task)).await?;
        tracing::info!(task_id = %task.id, project_id = %project_id, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> CoreResult<Task> {
        self.resilient(|| self.task_repo.get(task_id))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> CoreResult<Vec<Task>> {
        self.resilient(|| self.task_repo.list(filter.clone())).await
    }

    pub async fn tasks_available(&self, limit: i64) -> CoreResult<Vec<Task>> {
        self.resilient(|| self.dispatcher.list_eligible(None, limit)).await
    }

    pub async fn tasks_available_for_agent(&self, agent: &str, limit: i64) -> CoreResult<Vec<Task>> {
        let agent_record = self
            .resilient(|| self.agent_repo.get_by_name(agent))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("agent {agent}")))?;
        self.resilient(|| self.dispatcher.list_eligible(Some(&agent_record.skills), limit)).await
    }

    pub async fn claim_task(&self, task_id: Uuid, agent: &str, idempotency_key: Option<&str>) -> CoreResult<Task> {
        self.rate_limit(agent)?;
        let max_concurrent = self.settings.dispatcher.max_concurrent_tasks_per_agent;

        match idempotency_key {
            Some(key) => {
                self.idempotency_guard
                    .guard(key, || self.resilient(|| self.dispatcher.claim(task_id, agent, max_concurrent)))
                    .await
            }
            None => self.resilient(|| self.dispatcher.claim(task_id, agent, max_concurrent)).await,
        }
    }

    pub async fn start_task(&self, task_id: Uuid, agent: &str) -> CoreResult<Task> {
        self.rate_limit(agent)?;
        self.resilient(|| self.lifecycle.start(task_id, agent)).await
    }

    pub async fn submit_task(&self, task_id: Uuid, agent: &str, result: serde_json::Value, idempotency_key: Option<&str>) -> CoreResult<Task> {
        self.rate_limit(agent)?;

        match idempotency_key {
            Some(key) => {
                self.idempotency_guard
                    .guard(key, || self.resilient(|| self.lifecycle.submit(task_id, agent, result.clone())))
                    .await
            }
            None => self.resilient(|| self.lifecycle.submit(task_id, agent, result.clone())).await,
        }
    }

    pub async fn review_task(&self, task_id: Uuid, reviewer: &str, approved: bool, feedback: Option<String>) -> CoreResult<Task> {
        self.rate_limit(reviewer)?;
        self.resilient(|| self.lifecycle.review(task_id, reviewer, approved, feedback.clone())).await
    }

    pub async fn release_task(&self, task_id: Uuid, agent: &str) -> CoreResult<Task> {
        self.rate_limit(agent)?;
        self.resilient(|| self.lifecycle.release(task_id, agent)).await
    }

    pub async fn retry_task(&self, task_id: Uuid) -> CoreResult<Task> {
        self.rate_limit("system")?;
        self.resilient(|| self.lifecycle.retry(task_id)).await
    }

    pub async fn cancel_task(&self, task_id: Uuid, actor: Option<&str>) -> CoreResult<Task> {
        self.rate_limit(actor.unwrap_or("system"))?;
        self.resilient(|| self.lifecycle.cancel(task_id, actor)).await
    }

    // ---- Agents -------------------------------------------------------------

    pub async fn register_agent(&self, name: String, role: String, capabilities: Option<serde_json::Value>, skills: Vec<String>) -> CoreResult<Agent> {
        self.rate_limit(&name)?;
        let agent = Agent::new(name, role, capabilities, skills);
        let registered = self.resilient(|| self.agent_repo.upsert(&agent)).await?;
        tracing::info!(agent = %registered.name, "agent registered");
        Ok(registered)
    }

    pub async fn heartbeat(&self, name: &str, current_task_id: Option<Uuid>) -> CoreResult<()> {
        self.rate_limit(name)?;
        self.resilient(|| self.agent_repo.record_heartbeat(name, current_task_id)).await
    }

    pub async fn bind_agent_channel(&self, agent_name: &str, channel: &str) -> CoreResult<()> {
        self.resilient(|| self.agent_repo.bind_channel(agent_name, channel)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    async fn core() -> Core {
        Core::in_memory(Settings::default()).await.unwrap()
    }

    #[tokio::test]
    async fn full_happy_path_from_project_to_completion() {
        let core = core().await;
        let project = core.create_project("fleet-alpha".to_string(), "d".to_string(), None).await.unwrap();
        let task = core
            .create_task(
                project.id,
                "t".to_string(),
                "d".to_string(),
                TaskType::Development,
                None,
                String::new(),
                vec![],
                vec![],
                None,
                None,
            )
            .await
            .unwrap();
        // task-type default for Development is 240 minutes / 3 retries per task_type_defaults.
        assert_eq!(task.timeout_minutes, Some(240));
        assert_eq!(task.max_retries, 3);

        core.register_agent("agent-a".to_string(), "worker".to_string(), None, vec![]).await.unwrap();

        let claimed = core.claim_task(task.id, "agent-a", None).await.unwrap();
        assert_eq!(claimed.status, TaskStatus::Assigned);

        core.start_task(task.id, "agent-a").await.unwrap();
        core.submit_task(task.id, "agent-a", serde_json::json!({"ok": true}), None).await.unwrap();
        let completed = core.review_task(task.id, "reviewer-a", true, None).await.unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);

        let progress = core.project_progress(project.id).await.unwrap();
        assert_eq!(progress.get(&TaskStatus::Completed), Some(&1));
    }

    #[tokio::test]
    async fn duplicate_project_name_is_a_conflict() {
        let core = core().await;
        core.create_project("dup".to_string(), "d".to_string(), None).await.unwrap();
        let result = core.create_project("dup".to_string(), "d2".to_string(), None).await;
        assert!(matches!(result, Err(CoreError::StateConflict(_))));
    }

    #[tokio::test]
    async fn claim_with_idempotency_key_does_not_double_claim() {
        let core = core().await;
        let project = core.create_project("fleet-beta".to_string(), "d".to_string(), None).await.unwrap();
        let task = core
            .create_task(
                project.id,
                "t".to_string(),
                "d".to_string(),
                TaskType::Development,
                None,
                String::new(),
                vec![],
                vec![],
                None,
                None,
            )
            .await
            .unwrap();
        core.register_agent("agent-a".to_string(), "worker".to_string(), None, vec![]).await.unwrap();

        let first = core.claim_task(task.id, "agent-a", Some("claim-1")).await.unwrap();
        let second = core.claim_task(task.id, "agent-a", Some("claim-1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn create_task_rejects_nonexistent_project() {
        let core = core().await;
        let result = core
            .create_task(
                Uuid::new_v4(),
                "t".to_string(),
                "d".to_string(),
                TaskType::Development,
                None,
                String::new(),
                vec![],
                vec![],
                None,
                None,
            )
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
