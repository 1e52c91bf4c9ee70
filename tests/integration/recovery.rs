//! Retries, cancellation, reset and recovery from corrupt encodings.

use serde_json::Value;

use taskgraph::{Error, SharedGraph, TaskGraph, TaskStatus, ValidationIssue};

use crate::fixtures::{graph_from, id, run_to_completion, GraphFile, Script};

#[tokio::test]
async fn test_flaky_task_recovers_within_budget() {
    let shared = SharedGraph::new(graph_from(&["fetch", "parse"], &[("parse", "fetch")]));
    let mut script = Script::new();
    script.insert(id("fetch"), Some(2));

    let attempts = run_to_completion(&shared, &script).await;
    assert_eq!(attempts, vec![id("fetch"), id("fetch"), id("fetch"), id("parse")]);

    let graph = shared.snapshot().await;
    let fetch = graph.get_task(&id("fetch")).unwrap();
    assert_eq!(fetch.status, TaskStatus::Completed);
    assert_eq!(fetch.retries, 2);
    assert_eq!(fetch.error_history.len(), 2);
    assert!(!graph.has_failures());
    assert_eq!(graph.error_history().len(), 2);
}

#[tokio::test]
async fn test_exhausted_task_cannot_be_retried() {
    let shared = SharedGraph::new(graph_from(&["only"], &[]));
    let mut script = Script::new();
    script.insert(id("only"), None);
    run_to_completion(&shared, &script).await;

    let mut graph = shared.snapshot().await;
    assert_eq!(graph.get_task(&id("only")).unwrap().status, TaskStatus::Failed);
    assert!(matches!(
        graph.retry_task(&id("only")),
        Err(Error::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_reset_allows_a_clean_rerun() {
    let shared = SharedGraph::new(graph_from(&["a", "b", "c"], &[("b", "a"), ("c", "b")]));
    let mut script = Script::new();
    script.insert(id("b"), None);
    run_to_completion(&shared, &script).await;
    assert_eq!(shared.cancel_all().await, vec![id("c")]);

    shared.reset().await;
    let graph = shared.snapshot().await;
    assert_eq!(graph.progress().pending, 3);
    assert!(graph.execution_order().is_empty());
    assert!(graph.error_history().is_empty());
    assert!(graph.get_task(&id("b")).unwrap().error_history.is_empty());
    assert_eq!(graph.get_task(&id("b")).unwrap().retries, 0);
    assert!(graph.validate().is_empty());

    let attempts = run_to_completion(&shared, &Script::new()).await;
    assert_eq!(attempts, vec![id("a"), id("b"), id("c")]);
    assert!(shared.is_finished().await);
}

#[test]
fn test_cancelled_task_rejects_further_transitions() {
    let mut graph = graph_from(&["a"], &[]);
    graph.cancel_task(&id("a")).unwrap();

    assert!(matches!(
        graph.cancel_task(&id("a")),
        Err(Error::InvalidTransition { .. })
    ));
    assert!(graph.get_ready_tasks().is_empty());
    assert!(graph.is_finished());
    assert!(!graph.has_failures());
}

/// Rewrite an encoded graph so that `a` also depends on `c`, closing the
/// chain `c -> b -> a` into a cycle behind the graph's back.
fn corrupt_with_cycle(graph: &TaskGraph) -> TaskGraph {
    let mut value: Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
    value["tasks"]["a"]["dependencies"] = serde_json::json!(["c"]);
    value["tasks"]["c"]["dependents"] = serde_json::json!(["a"]);
    TaskGraph::from_json(&value.to_string()).unwrap()
}

#[test]
fn test_corrupt_cycle_is_reported_not_hidden() {
    let clean = graph_from(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
    let file = GraphFile::write(&corrupt_with_cycle(&clean));
    let graph = TaskGraph::from_json(&std::fs::read_to_string(&file.path).unwrap()).unwrap();

    match graph.get_task_order() {
        Err(Error::CycleDetected(path)) => {
            assert_eq!(path.first(), path.last());
            assert!(path.len() >= 4);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(graph.find_cycle().is_some());

    let issues = graph.validate();
    assert!(issues.contains(&ValidationIssue::Cycle {
        tasks: vec![id("a"), id("b"), id("c")]
    }));
    assert!(issues.contains(&ValidationIssue::RootDrift {
        task_id: id("a"),
        indexed: true
    }));
    assert!(graph.get_ready_tasks().is_empty());
}

#[test]
fn test_dangling_dependency_blocks_task() {
    let clean = graph_from(&["a", "b"], &[("b", "a")]);
    let mut value: Value = serde_json::from_str(&clean.to_json().unwrap()).unwrap();
    value["tasks"]
        .as_object_mut()
        .unwrap()
        .remove("a");
    let graph = TaskGraph::from_json(&value.to_string()).unwrap();

    assert_eq!(graph.get_blocked_tasks(), vec![id("b")]);
    assert!(graph.get_ready_tasks().is_empty());
    assert!(graph.validate().contains(&ValidationIssue::MissingDependency {
        task_id: id("b"),
        missing: id("a")
    }));
    // Dangling ids are skipped by the traversal.
    assert_eq!(graph.get_task_order().unwrap(), vec![id("b")]);
}

#[test]
fn test_truncated_file_is_a_decode_error() {
    let graph = graph_from(&["a"], &[]);
    let json = graph.to_json().unwrap();
    let truncated = &json[..json.len() / 2];
    assert!(matches!(TaskGraph::from_json(truncated), Err(Error::Json(_))));
}
