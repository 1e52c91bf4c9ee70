//! Documented behaviours of the graph and node types.

use serde_json::{json, Value};

use taskgraph::{Error, TaskContext, TaskGraph, TaskResult, TaskStatus};

use crate::fixtures::{graph_from, id, node, GraphFile};

#[test]
fn test_fan_out_ready_after_root_completes() {
    let mut graph = graph_from(&["A", "B", "C"], &[("B", "A"), ("C", "A")]);
    assert_eq!(graph.get_ready_tasks(), vec![id("A")]);

    graph.start_task(&id("A"), TaskContext::new()).unwrap();
    graph
        .complete_task(&id("A"), TaskResult::success(json!("analysis done")))
        .unwrap();

    assert_eq!(graph.get_ready_tasks(), vec![id("B"), id("C")]);
}

#[test]
fn test_reverse_edge_rejected_and_graph_stays_valid() {
    let mut graph = graph_from(&["A", "B"], &[]);
    graph.add_dependency(&id("A"), &id("B")).unwrap();

    let before = graph.to_json().unwrap();
    let err = graph.add_dependency(&id("B"), &id("A")).unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert_eq!(graph.to_json().unwrap(), before);
    assert!(graph.validate().is_empty());
}

#[test]
fn test_retry_budget_of_three() {
    let mut graph = TaskGraph::new("retry", "");
    graph.add_task(node("A"));

    let mut statuses = Vec::new();
    for attempt in 1..=3 {
        graph.start_task(&id("A"), TaskContext::new()).unwrap();
        statuses.push(
            graph
                .complete_task(&id("A"), TaskResult::failure(format!("attempt {}", attempt)))
                .unwrap(),
        );
    }

    assert_eq!(
        statuses,
        vec![TaskStatus::Pending, TaskStatus::Pending, TaskStatus::Failed]
    );
    let a = graph.get_task(&id("A")).unwrap();
    assert_eq!(a.error_history.len(), 3);
    assert_eq!(a.retries, 3);
    assert!(graph.failed_tasks().contains(&id("A")));
    assert_eq!(graph.error_history().len(), 3);
}

#[test]
fn test_remove_branch_leaves_root_as_leaf_once_alone() {
    let mut graph = graph_from(&["A", "B", "C"], &[("B", "A"), ("C", "A")]);
    let c_before = graph.get_task(&id("C")).unwrap().clone();

    graph.remove_task(&id("B")).unwrap();
    assert_eq!(graph.get_task(&id("C")).unwrap(), &c_before);
    assert!(!graph.contains_task(&id("B")));

    graph.remove_task(&id("C")).unwrap();
    assert!(graph.leaf_tasks().contains(&id("A")));
    assert!(graph.root_tasks().contains(&id("A")));
    assert!(graph.validate().is_empty());
}

#[test]
fn test_remove_task_with_both_sides_promotes_neighbours() {
    // D -> C -> B -> A
    let mut graph = graph_from(
        &["A", "B", "C", "D"],
        &[("B", "A"), ("C", "B"), ("D", "C")],
    );

    graph.remove_task(&id("B")).unwrap();

    assert!(graph.leaf_tasks().contains(&id("A")));
    assert!(graph.root_tasks().contains(&id("C")));
    assert!(!graph.root_tasks().contains(&id("D")));
    assert!(!graph.leaf_tasks().contains(&id("C")));
    assert!(graph.validate().is_empty());
}

#[test]
fn test_task_order_every_edge_respected() {
    let graph = graph_from(
        &["fetch", "parse", "index", "report", "notify"],
        &[
            ("parse", "fetch"),
            ("index", "parse"),
            ("report", "index"),
            ("report", "parse"),
            ("notify", "report"),
        ],
    );
    let order = graph.get_task_order().unwrap();
    assert_eq!(
        order,
        vec![id("fetch"), id("parse"), id("index"), id("report"), id("notify")]
    );
    assert_eq!(order, graph.get_task_order().unwrap());
}

#[test]
fn test_roundtrip_through_file() {
    let mut graph = graph_from(&["A", "B", "C"], &[("B", "A"), ("C", "B")]);
    graph.start_task(&id("A"), TaskContext::new()).unwrap();
    graph
        .complete_task(&id("A"), TaskResult::success(Value::Null).with_metadata("tokens", json!(12)))
        .unwrap();
    graph.start_task(&id("B"), TaskContext::new()).unwrap();
    graph
        .complete_task(&id("B"), TaskResult::failure("quota"))
        .unwrap();
    graph.cancel_task(&id("C")).unwrap();

    let file = GraphFile::write(&graph);
    let decoded = TaskGraph::from_json(&std::fs::read_to_string(&file.path).unwrap()).unwrap();

    assert_eq!(decoded, graph);
    assert_eq!(decoded.completed_tasks(), graph.completed_tasks());
    assert_eq!(decoded.cancelled_tasks(), graph.cancelled_tasks());
    assert_eq!(decoded.execution_order(), graph.execution_order());
    assert_eq!(decoded.error_history(), graph.error_history());
    assert_eq!(decoded.last_executed(), Some(&id("B")));
}
