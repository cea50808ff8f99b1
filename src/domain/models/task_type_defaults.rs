//! Per-task-type defaults for timeout, retries, and priority.

use serde::{Deserialize, Serialize};

use super::task::{Priority, TaskType};

/// Defaults applied when a task doesn't specify its own override.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeDefaults {
    pub task_type: TaskType,
    pub timeout_minutes: u32,
    pub max_retries: u32,
    pub priority: Priority,
}

impl TaskTypeDefaults {
    /// Built-in defaults, seeded into the `task_type_defaults` table by the
    /// initial migration and editable thereafter via the Store.
    pub fn builtin() -> Vec<Self> {
        use TaskType::{
            Analysis, Coordination, Copywrite, Deployment, Design, Development, Publish, Research,
            Review, Testing, Video,
        };
        vec![
            Self::new(Research, 120, 2, 5),
            Self::new(Copywrite, 90, 2, 5),
            Self::new(Video, 240, 1, 4),
            Self::new(Review, 60, 3, 6),
            Self::new(Publish, 30, 1, 7),
            Self::new(Analysis, 120, 2, 5),
            Self::new(Design, 180, 2, 5),
            Self::new(Development, 240, 3, 6),
            Self::new(Testing, 90, 3, 6),
            Self::new(Deployment, 60, 1, 8),
            Self::new(Coordination, 30, 2, 7),
        ]
    }

    fn new(task_type: TaskType, timeout_minutes: u32, max_retries: u32, priority: u8) -> Self {
        Self {
            task_type,
            timeout_minutes,
            max_retries,
            priority: Priority::new(priority),
        }
    }
}
