//! End-to-end dependency validation and project-progress rollup, exercised
//! through `create_task`/`project_progress` rather than `DependencyValidator`
//! directly.

#[path = "common/mod.rs"]
mod common;

use fleetwork_core::domain::models::{Priority, TaskStatus, TaskType};
use fleetwork_core::CoreError;

async fn make_task(
    core: &fleetwork_core::Core,
    project_id: uuid::Uuid,
    title: &str,
    deps: Vec<uuid::Uuid>,
) -> fleetwork_core::domain::models::Task {
    core.create_task(
        project_id,
        title.to_string(),
        "d".to_string(),
        TaskType::Development,
        Some(Priority::new(1)),
        String::new(),
        deps,
        vec![],
        None,
        Some(1),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn diamond_shaped_dependencies_are_accepted() {
    let core = common::test_core().await;
    let project = core.create_project("diamond-fleet".to_string(), "d".to_string(), None).await.unwrap();

    let c = make_task(&core, project.id, "c", vec![]).await;
    let a = make_task(&core, project.id, "a", vec![c.id]).await;
    let b = make_task(&core, project.id, "b", vec![c.id]).await;
    let d = make_task(&core, project.id, "d", vec![a.id, b.id]).await;

    assert_eq!(d.dependencies.len(), 2);
}

#[tokio::test]
async fn duplicate_dependencies_are_rejected_at_creation() {
    let core = common::test_core().await;
    let project = core.create_project("dup-dep-fleet".to_string(), "d".to_string(), None).await.unwrap();

    let a = make_task(&core, project.id, "a", vec![]).await;
    let b = make_task(&core, project.id, "b", vec![a.id]).await;
    assert_eq!(b.dependencies, vec![a.id]);

    let result = core
        .create_task(
            project.id,
            "dup".to_string(),
            "d".to_string(),
            TaskType::Development,
            Some(Priority::new(1)),
            String::new(),
            vec![a.id, a.id],
            vec![],
            None,
            Some(1),
        )
        .await;
    assert!(matches!(result, Err(CoreError::DependencyInvalid(_))));
}

#[tokio::test]
async fn project_progress_counts_tasks_by_status() {
    let core = common::test_core().await;
    let project = core.create_project("progress-fleet".to_string(), "d".to_string(), None).await.unwrap();

    let pending = make_task(&core, project.id, "pending", vec![]).await;
    let completed = make_task(&core, project.id, "completed", vec![]).await;
    let _ = pending;

    core.register_agent("agent-a".to_string(), "worker".to_string(), None, vec![]).await.unwrap();
    core.claim_task(completed.id, "agent-a", None).await.unwrap();
    core.start_task(completed.id, "agent-a").await.unwrap();
    core.submit_task(completed.id, "agent-a", serde_json::json!({}), None).await.unwrap();
    core.review_task(completed.id, "reviewer-a", true, None).await.unwrap();

    let progress = core.project_progress(project.id).await.unwrap();
    assert_eq!(progress.get(&TaskStatus::Pending), Some(&1));
    assert_eq!(progress.get(&TaskStatus::Completed), Some(&1));
}
