//! Several tokio workers draining one shared graph.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use taskgraph::orchestration::GraphEvent;
use taskgraph::{SharedGraph, TaskContext, TaskGraph, TaskId, TaskResult};

use crate::fixtures::{graph_from, id, node};

/// Three layers of four tasks; every task depends on the whole layer above.
fn layered() -> TaskGraph {
    let mut graph = TaskGraph::new("layered", "");
    for layer in 0..3 {
        for i in 0..4 {
            graph.add_task(node(&format!("l{}-{}", layer, i)));
        }
    }
    for layer in 1..3 {
        for i in 0..4 {
            for j in 0..4 {
                graph
                    .add_dependency(
                        &id(&format!("l{}-{}", layer, i)),
                        &id(&format!("l{}-{}", layer - 1, j)),
                    )
                    .unwrap();
            }
        }
    }
    graph
}

async fn worker(shared: SharedGraph, claimed: Arc<Mutex<Vec<TaskId>>>) {
    loop {
        if shared.is_finished().await {
            break;
        }
        let batch = shared
            .claim_ready(1, |_| TaskContext::new())
            .await
            .unwrap();
        if batch.is_empty() {
            tokio::task::yield_now().await;
            continue;
        }
        for task_id in batch {
            claimed.lock().await.push(task_id.clone());
            tokio::task::yield_now().await;
            shared
                .report(&task_id, TaskResult::success(json!(task_id.as_str())))
                .await
                .unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_never_claim_a_task_twice() {
    let shared = SharedGraph::new(layered());
    let claimed = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| tokio::spawn(worker(shared.clone(), claimed.clone())))
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let claimed = claimed.lock().await.clone();
    let unique: HashSet<&TaskId> = claimed.iter().collect();
    assert_eq!(claimed.len(), 12);
    assert_eq!(unique.len(), 12);

    let graph = shared.snapshot().await;
    assert!(graph.is_finished());
    assert_eq!(graph.completed_tasks().len(), 12);
    assert!(graph.validate().is_empty());

    // No task ran before a task of the layer above it.
    let layer_of = |t: &TaskId| t.as_str()[1..2].parse::<u32>().unwrap();
    let order = graph.execution_order();
    for pair in order.windows(2) {
        assert!(layer_of(&pair[0]) <= layer_of(&pair[1]));
    }
}

#[tokio::test]
async fn test_concurrent_claims_split_ready_set() {
    let shared = SharedGraph::new(graph_from(&["a", "b", "c", "d"], &[]));

    let first = shared.clone();
    let second = shared.clone();
    let (left, right) = tokio::join!(
        first.claim_ready(2, |_| TaskContext::new()),
        second.claim_ready(2, |_| TaskContext::new()),
    );
    let mut all: Vec<TaskId> = left.unwrap().into_iter().chain(right.unwrap()).collect();
    all.sort();

    assert_eq!(all, vec![id("a"), id("b"), id("c"), id("d")]);
    assert!(shared.ready_tasks().await.is_empty());
    assert_eq!(shared.progress().await.running, 4);
}

#[tokio::test]
async fn test_event_stream_ends_with_finish() {
    let (shared, mut events) = SharedGraph::with_events(graph_from(&["a", "b"], &[("b", "a")]), 32);

    let producer = {
        let shared = shared.clone();
        tokio::spawn(async move {
            loop {
                let batch = shared.claim_ready(8, |_| TaskContext::new()).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                for task_id in batch {
                    shared
                        .report(&task_id, TaskResult::success(json!(null)))
                        .await
                        .unwrap();
                }
            }
        })
    };
    producer.await.unwrap();
    drop(shared);

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert_eq!(seen.last(), Some(&GraphEvent::GraphFinished { failed: false }));
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, GraphEvent::TaskCompleted { .. }))
            .count(),
        2
    );
}
