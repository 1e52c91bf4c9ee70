//! Lock-guarded owner for a graph shared between a scheduling loop and workers.
//!
//! [`SharedGraph`] is the single point through which a running graph is
//! mutated. Every call takes the lock for its whole duration, so a query
//! always sees a consistent state and [`SharedGraph::claim_ready`] can
//! select and start tasks in one step. No call waits on external work.

use crate::core::{
    GraphProgress, TaskContext, TaskGraph, TaskId, TaskNode, TaskResult, TaskStatus,
    ValidationIssue,
};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Lifecycle notifications emitted by a [`SharedGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    TaskStarted { task_id: TaskId },
    TaskCompleted { task_id: TaskId },
    /// A failed attempt was put back in the queue.
    TaskRequeued { task_id: TaskId, retries: u32 },
    /// Retries exhausted.
    TaskFailed { task_id: TaskId, error: String },
    TaskCancelled { task_id: TaskId },
    /// Every task reached a terminal status.
    GraphFinished { failed: bool },
}

/// Cloneable handle to a lock-guarded [`TaskGraph`].
#[derive(Debug, Clone)]
pub struct SharedGraph {
    graph: Arc<RwLock<TaskGraph>>,
    events: Option<mpsc::Sender<GraphEvent>>,
}

impl SharedGraph {
    pub fn new(graph: TaskGraph) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            events: None,
        }
    }

    /// Create a handle that reports lifecycle events.
    ///
    /// Events are sent without waiting; when the channel is full they are
    /// dropped rather than stalling the graph.
    pub fn with_events(graph: TaskGraph, buffer: usize) -> (Self, mpsc::Receiver<GraphEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                graph: Arc::new(RwLock::new(graph)),
                events: Some(tx),
            },
            rx,
        )
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.events {
            if let Err(err) = tx.try_send(event) {
                debug!(error = %err, "graph event dropped");
            }
        }
    }

    // ========== Structure ==========

    pub async fn add_task(&self, node: TaskNode) {
        self.graph.write().await.add_task(node);
    }

    pub async fn remove_task(&self, task_id: &TaskId) -> Result<TaskNode> {
        self.graph.write().await.remove_task(task_id)
    }

    pub async fn add_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        self.graph.write().await.add_dependency(task_id, depends_on)
    }

    pub async fn remove_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<bool> {
        self.graph.write().await.remove_dependency(task_id, depends_on)
    }

    // ========== Transitions ==========

    /// Start up to `limit` ready tasks, building each context from its node.
    /// Returns the started ids in ascending order.
    ///
    /// Every selected task is checked before any is started, so on error no
    /// task has been marked running.
    pub async fn claim_ready<F>(&self, limit: usize, context_for: F) -> Result<Vec<TaskId>>
    where
        F: FnMut(&TaskNode) -> TaskContext,
    {
        let mut graph = self.graph.write().await;
        let ready: Vec<TaskId> = graph.get_ready_tasks().into_iter().take(limit).collect();
        let claims = prepare_claims(&graph, ready, context_for)?;

        let mut started = Vec::with_capacity(claims.len());
        for (task_id, context) in claims {
            graph.start_task(&task_id, context)?;
            self.emit(GraphEvent::TaskStarted {
                task_id: task_id.clone(),
            });
            started.push(task_id);
        }
        Ok(started)
    }

    pub async fn start_task(&self, task_id: &TaskId, context: TaskContext) -> Result<()> {
        self.graph.write().await.start_task(task_id, context)?;
        self.emit(GraphEvent::TaskStarted {
            task_id: task_id.clone(),
        });
        Ok(())
    }

    /// Report the outcome of one attempt and return the task's new status.
    pub async fn report(&self, task_id: &TaskId, result: TaskResult) -> Result<TaskStatus> {
        let error = result.error_message();
        let mut graph = self.graph.write().await;
        let status = graph.complete_task(task_id, result)?;

        let event = match status {
            TaskStatus::Completed => GraphEvent::TaskCompleted {
                task_id: task_id.clone(),
            },
            TaskStatus::Failed => GraphEvent::TaskFailed {
                task_id: task_id.clone(),
                error,
            },
            _ => GraphEvent::TaskRequeued {
                task_id: task_id.clone(),
                retries: graph.get_task(task_id).map(|n| n.retries).unwrap_or_default(),
            },
        };
        self.emit(event);
        self.emit_if_finished(&graph);
        Ok(status)
    }

    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.cancel_task(task_id)?;
        self.emit(GraphEvent::TaskCancelled {
            task_id: task_id.clone(),
        });
        self.emit_if_finished(&graph);
        Ok(())
    }

    /// Cancel every non-terminal task. In-flight work is not interrupted;
    /// the executor is expected to stop on its own.
    pub async fn cancel_all(&self) -> Vec<TaskId> {
        let mut graph = self.graph.write().await;
        let cancelled = graph.cancel_pending();
        for task_id in &cancelled {
            self.emit(GraphEvent::TaskCancelled {
                task_id: task_id.clone(),
            });
        }
        if !cancelled.is_empty() {
            self.emit_if_finished(&graph);
        }
        cancelled
    }

    pub async fn reset(&self) {
        self.graph.write().await.reset();
    }

    fn emit_if_finished(&self, graph: &TaskGraph) {
        if graph.is_finished() {
            self.emit(GraphEvent::GraphFinished {
                failed: graph.has_failures(),
            });
        }
    }

    // ========== Queries ==========

    pub async fn ready_tasks(&self) -> Vec<TaskId> {
        self.graph.read().await.get_ready_tasks()
    }

    pub async fn task_order(&self) -> Result<Vec<TaskId>> {
        self.graph.read().await.get_task_order()
    }

    pub async fn validate(&self) -> Vec<ValidationIssue> {
        self.graph.read().await.validate()
    }

    pub async fn progress(&self) -> GraphProgress {
        self.graph.read().await.progress()
    }

    pub async fn is_finished(&self) -> bool {
        self.graph.read().await.is_finished()
    }

    /// Run `f` against the graph under the read lock.
    pub async fn read<R>(&self, f: impl FnOnce(&TaskGraph) -> R) -> R {
        let graph = self.graph.read().await;
        f(&*graph)
    }

    /// Clone the current graph.
    pub async fn snapshot(&self) -> TaskGraph {
        self.graph.read().await.clone()
    }
}

/// Pair each id with its start context, failing if any task cannot start.
fn prepare_claims<F>(
    graph: &TaskGraph,
    ids: Vec<TaskId>,
    mut context_for: F,
) -> Result<Vec<(TaskId, TaskContext)>>
where
    F: FnMut(&TaskNode) -> TaskContext,
{
    ids.into_iter()
        .map(|task_id| {
            let node = graph
                .get_task(&task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
            if node.status != TaskStatus::Pending {
                return Err(Error::InvalidTransition {
                    task_id: task_id.clone(),
                    from: node.status,
                    action: "start",
                });
            }
            let context = context_for(node);
            Ok((task_id, context))
        })
        .collect()
}
