//! Dependency validation: self-reference, duplicates, existence, and cycles.
//!
//! The cycle check walks each proposed dependency's transitive dependency
//! graph carrying a path set scoped to that single DFS branch — never a
//! global visited set — so that a diamond shape (two branches converging on
//! a shared prerequisite) is never mistaken for a cycle. Each branch only
//! asks "does continuing from here eventually lead back to the task under
//! construction?".

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::TaskRepository;

/// Safety cap on nodes visited across the whole validation call, to bound
/// runaway traversal if stored data already contains a cycle unrelated to
/// the task under construction.
const MAX_VISITED: usize = 10_000;

pub struct DependencyValidator {
    task_repo: Arc<dyn TaskRepository>,
}

impl DependencyValidator {
    pub fn new(task_repo: Arc<dyn TaskRepository>) -> Self {
        Self { task_repo }
    }

    /// Validates a proposed dependency list for `task_id` (the task being
    /// created or mutated — its id must already be known, even if the row
    /// isn't persisted yet).
    pub async fn validate(&self, task_id: Uuid, project_id: Uuid, dependencies: &[Uuid]) -> CoreResult<()> {
        if dependencies.contains(&task_id) {
            return Err(CoreError::DependencyInvalid(
                "a task may not depend on itself".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(dependencies.len());
        for dep in dependencies {
            if !seen.insert(*dep) {
                return Err(CoreError::DependencyInvalid(format!("duplicate dependency {dep}")));
            }
        }

        for dep in dependencies {
            let dep_task = self.task_repo.get(*dep).await?;
            match dep_task {
                None => {
                    return Err(CoreError::DependencyInvalid(format!("dependency {dep} does not exist")));
                }
                Some(t) if t.project_id != project_id => {
                    return Err(CoreError::DependencyInvalid(format!(
                        "dependency {dep} belongs to a different project"
                    )));
                }
                Some(_) => {}
            }
        }

        let mut visited_total = 0usize;
        for &dep in dependencies {
            if self.leads_back_to(dep, task_id, &mut visited_total).await? {
                return Err(CoreError::DependencyInvalid(format!(
                    "dependency {dep} transitively depends on this task (cycle)"
                )));
            }
        }

        Ok(())
    }

    /// Does any path starting at `start` (following `start`'s own
    /// dependencies forward) eventually reach `target`?
    async fn leads_back_to(&self, start: Uuid, target: Uuid, visited_total: &mut usize) -> CoreResult<bool> {
        let mut stack: Vec<(Uuid, HashSet<Uuid>)> = vec![(start, HashSet::from([start]))];

        while let Some((node, path)) = stack.pop() {
            if node == target {
                return Ok(true);
            }

            *visited_total += 1;
            if *visited_total > MAX_VISITED {
                break;
            }

            let Some(task) = self.task_repo.get(node).await? else {
                continue;
            };

            for &upstream in &task.dependencies {
                if upstream == target {
                    return Ok(true);
                }
                if path.contains(&upstream) {
                    // Already on this branch's path without reaching the target —
                    // a pre-existing cycle unrelated to `target`. Don't loop forever.
                    continue;
                }
                let mut branch_path = path.clone();
                branch_path.insert(upstream);
                stack.push((upstream, branch_path));
            }
        }

        Ok(false)
    }
}
