//! Orchestration layer over the task graph.
//!
//! This module provides the planner that assembles graphs for known
//! workflows and keeps their registry, and the shared handle that
//! serializes access to a graph while it runs.

mod planner;
mod shared;

pub use planner::{
    GraphBucket, GraphStore, RegistryCounts, TaskPlanner, TaskSpec, WorkflowTemplate,
};
pub use shared::{GraphEvent, SharedGraph};
