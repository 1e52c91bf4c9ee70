//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building small graphs from edge lists
//! - A mock executor that drives a shared graph to completion
//! - Writing encoded graphs to temporary files

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use taskgraph::{
    AgentType, SharedGraph, TaskContext, TaskGraph, TaskId, TaskNode, TaskResult, TaskType,
};

pub fn id(s: &str) -> TaskId {
    TaskId::from(s)
}

pub fn node(name: &str) -> TaskNode {
    TaskNode::new(name, TaskType::Analysis, AgentType::Analyzer, &format!("{} task", name))
}

/// Build a graph with the given tasks and `(task, depends_on)` edges.
pub fn graph_from(tasks: &[&str], edges: &[(&str, &str)]) -> TaskGraph {
    let mut graph = TaskGraph::new("fixture", "fixture graph");
    for task in tasks {
        graph.add_task(node(task));
    }
    for (task, dep) in edges {
        graph
            .add_dependency(&id(task), &id(dep))
            .expect("fixture edges must be acyclic");
    }
    graph
}

/// Scripted outcome for one task: how many attempts fail before success.
/// `None` means the task always fails.
pub type Script = HashMap<TaskId, Option<u32>>;

/// Drive `shared` until no task is ready, following `script`. Tasks not in
/// the script succeed on the first attempt. Returns the order of attempts.
pub async fn run_to_completion(shared: &SharedGraph, script: &Script) -> Vec<TaskId> {
    let mut attempts: HashMap<TaskId, u32> = HashMap::new();
    let mut log = Vec::new();

    loop {
        let claimed = shared
            .claim_ready(usize::MAX, |node| {
                TaskContext::new().with_input("task_type", json!(node.task_type.as_str()))
            })
            .await
            .expect("claim");
        if claimed.is_empty() {
            break;
        }
        for task_id in claimed {
            let count = attempts.entry(task_id.clone()).or_insert(0);
            *count += 1;
            let succeed = match script.get(&task_id) {
                None => true,
                Some(None) => false,
                Some(Some(failures)) => *count > *failures,
            };
            let result = if succeed {
                TaskResult::success(json!({ "attempt": *count }))
            } else {
                TaskResult::failure(format!("attempt {} failed", count))
            };
            shared.report(&task_id, result).await.expect("report");
            log.push(task_id);
        }
    }
    log
}

/// A graph encoded to a file inside a temporary directory.
pub struct GraphFile {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl GraphFile {
    pub fn write(graph: &TaskGraph) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("graph.json");
        std::fs::write(&path, graph.to_json_pretty().expect("encode")).expect("write graph");
        Self { temp_dir, path }
    }
}
