//! Timing checks on large graphs. Thresholds are generous so debug builds
//! on slow machines still pass.

use std::time::{Duration, Instant};

use taskgraph::{SharedGraph, TaskGraph, TaskId};

use crate::fixtures::{id, node, run_to_completion, Script};

fn name(i: usize) -> String {
    format!("task-{:05}", i)
}

/// `width` independent chains of `depth` tasks, each chain also waiting on
/// the same position of the previous chain.
fn lattice(width: usize, depth: usize) -> TaskGraph {
    let mut graph = TaskGraph::new("lattice", "");
    for i in 0..width * depth {
        graph.add_task(node(&name(i)));
    }
    for chain in 0..width {
        for step in 1..depth {
            let task = chain * depth + step;
            graph.add_dependency(&id(&name(task)), &id(&name(task - 1))).unwrap();
            if chain > 0 {
                graph
                    .add_dependency(&id(&name(task)), &id(&name(task - depth)))
                    .unwrap();
            }
        }
    }
    graph
}

#[test]
fn test_order_and_validate_on_large_graph() {
    let graph = lattice(20, 50);
    assert_eq!(graph.len(), 1000);

    let start = Instant::now();
    let order = graph.get_task_order().unwrap();
    let issues = graph.validate();
    let elapsed = start.elapsed();

    assert_eq!(order.len(), 1000);
    assert!(issues.is_empty());
    assert!(
        elapsed < Duration::from_secs(5),
        "order and validate took {:?}",
        elapsed
    );

    let position = |t: &TaskId| order.iter().position(|o| o == t).unwrap();
    for node in graph.tasks().take(50) {
        for dep in node.dependencies() {
            assert!(position(dep) < position(&node.task_id));
        }
    }
}

#[test]
fn test_wide_fan_in_encodes_quickly() {
    let mut graph = TaskGraph::new("fan-in", "");
    graph.add_task(node("sink"));
    for i in 0..2000 {
        graph.add_task(node(&name(i)));
        graph.add_dependency(&id("sink"), &id(&name(i))).unwrap();
    }

    let start = Instant::now();
    let json = graph.to_json().unwrap();
    let decoded = TaskGraph::from_json(&json).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(decoded, graph);
    assert_eq!(decoded.get_task(&id("sink")).unwrap().dependencies().len(), 2000);
    assert!(elapsed < Duration::from_secs(5), "roundtrip took {:?}", elapsed);
}

#[tokio::test]
async fn test_drain_large_graph() {
    let shared = SharedGraph::new(lattice(10, 30));

    let start = Instant::now();
    let attempts = run_to_completion(&shared, &Script::new()).await;
    let elapsed = start.elapsed();

    assert_eq!(attempts.len(), 300);
    assert!(shared.is_finished().await);
    assert!(elapsed < Duration::from_secs(20), "drain took {:?}", elapsed);
}
