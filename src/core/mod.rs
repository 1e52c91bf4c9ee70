//! Core domain models for the task graph engine.
//!
//! This module contains the task node, the values exchanged with an
//! executor, and the dependency graph that owns the nodes.

pub mod graph;
pub mod result;
pub mod task;

pub use graph::{ErrorRecord, GraphProgress, TaskGraph, ValidationIssue};
pub use result::{TaskContext, TaskResult, DEFAULT_MAX_CONTEXT_DEPTH};
pub use task::{AgentType, TaskId, TaskNode, TaskStatus, TaskType, DEFAULT_MAX_RETRIES};
