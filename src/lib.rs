pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;

pub use crate::core::{
    AgentType, TaskContext, TaskGraph, TaskId, TaskNode, TaskResult, TaskStatus, TaskType,
    ValidationIssue,
};
pub use error::{Error, Result};
pub use orchestration::{GraphStore, SharedGraph, TaskPlanner, WorkflowTemplate};
