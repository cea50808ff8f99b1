//! Property-based coverage for dependency-graph validation: randomly
//! generated DAGs (including convergent/diamond shapes) must never be
//! rejected as cycles, and a deliberately closed cycle must always be
//! rejected, regardless of shape or size.

use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use fleetwork_core::application::DependencyValidator;
use fleetwork_core::domain::models::{Priority, Task, TaskType};
use fleetwork_core::domain::ports::TaskRepository;
use fleetwork_core::adapters::sqlite::{migrations, SqliteTaskRepository};
use fleetwork_core::CoreError;

fn make_task(project_id: Uuid, deps: Vec<Uuid>) -> Task {
    Task::new(
        project_id,
        "t".to_string(),
        "d".to_string(),
        TaskType::Development,
        Priority::default(),
        String::new(),
        deps,
        vec![],
        None,
        3,
    )
}

async fn repo() -> Arc<dyn TaskRepository> {
    let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
    migrations::run(&pool).await.unwrap();
    Arc::new(SqliteTaskRepository::new(pool))
}

/// Deterministic pseudo-random parent selection from a proptest-shrunk seed,
/// so the DAG shape itself participates in shrinking without pulling in a
/// second source of randomness.
fn parents_for(node: usize, seed: u64) -> Vec<usize> {
    if node == 0 {
        return vec![];
    }
    let mut state = seed.wrapping_add(node as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let fan_in = 1 + (state % 2) as usize; // 1 or 2 parents, enabling diamonds
    state = state.wrapping_mul(6364136223846793005).wrapping_add(1);

    let mut parents = Vec::with_capacity(fan_in);
    for _ in 0..fan_in.min(node) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let candidate = (state % node as u64) as usize;
        if !parents.contains(&candidate) {
            parents.push(candidate);
        }
    }
    parents
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any graph built by only ever pointing a node at strictly earlier
    /// nodes is acyclic by construction, diamonds included — validating a
    /// new task against such a graph must always succeed.
    #[test]
    fn acyclic_dag_of_any_shape_is_never_rejected_as_a_cycle(size in 1usize..16, seed in any::<u64>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = repo().await;
            let project_id = Uuid::new_v4();
            let mut ids = Vec::with_capacity(size);

            for i in 0..size {
                let parent_ids: Vec<Uuid> = parents_for(i, seed).into_iter().map(|p| ids[p]).collect();
                let task = make_task(project_id, parent_ids);
                repo.create(&task).await.unwrap();
                ids.push(task.id);
            }

            let validator = DependencyValidator::new(repo.clone());
            let new_id = Uuid::new_v4();
            // Depend on every existing node's "frontier" reachable from the
            // deterministic parent selection above — all of it is earlier
            // than `new_id`, so no cycle is possible.
            let result = validator.validate(new_id, project_id, &ids).await;
            prop_assert!(result.is_ok(), "acyclic graph rejected: {result:?}");
            Ok(())
        })?;
    }

    /// Closing any chain into a cycle, regardless of its length, must
    /// always be rejected.
    #[test]
    fn closing_a_chain_into_a_cycle_is_always_rejected(size in 2usize..12) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = repo().await;
            let project_id = Uuid::new_v4();
            let mut ids = Vec::with_capacity(size);

            for i in 0..size {
                let deps = if i == 0 { vec![] } else { vec![ids[i - 1]] };
                let task = make_task(project_id, deps);
                repo.create(&task).await.unwrap();
                ids.push(task.id);
            }

            let validator = DependencyValidator::new(repo);
            let first = ids[0];
            let last = *ids.last().unwrap();
            // first -> ... -> last already holds; validating first depending
            // on last would close the loop.
            let result = validator.validate(first, project_id, &[last]).await;
            prop_assert!(matches!(result, Err(CoreError::DependencyInvalid(_))), "cycle not rejected: {result:?}");
            Ok(())
        })?;
    }
}
