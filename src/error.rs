use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("Adding dependency {task_id} -> {depends_on} would create a cycle: {}", format_path(.cycle))]
    CyclicDependency {
        task_id: TaskId,
        depends_on: TaskId,
        cycle: Vec<TaskId>,
    },

    #[error("Cycle detected in task graph: {}", format_path(.0))]
    CycleDetected(Vec<TaskId>),

    #[error("Cannot {action} task {task_id} while it is {from}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        action: &'static str,
    },

    #[error("Context chain exceeds maximum depth of {max}")]
    ContextTooDeep { max: usize },

    #[error("Context {0} already appears in its own ancestry")]
    ContextCycle(String),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Graph already registered: {0}")]
    DuplicateGraph(String),

    #[error("Task {child_id} cannot become a subtask of {parent_id}: it already contains it")]
    ContainmentCycle { parent_id: TaskId, child_id: TaskId },
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
