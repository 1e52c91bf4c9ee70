//! Task dependency graph.
//!
//! [`TaskGraph`] owns every [`TaskNode`] in a run, keyed by [`TaskId`]. It
//! keeps each node's `dependencies` and `dependents` mirrored, maintains the
//! root/leaf and per-status index sets, refuses edges that would close a
//! cycle, and records run-level history.
//!
//! Traversals walk ids in ascending order with an explicit stack, so the
//! same graph always yields the same order and deep graphs cannot exhaust
//! the call stack.

use crate::core::result::{TaskContext, TaskResult};
use crate::core::task::{TaskId, TaskNode, TaskStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// One failed attempt recorded at graph level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub task_id: TaskId,
    pub error: String,
}

/// A structural problem found by [`TaskGraph::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationIssue {
    /// Tasks forming a dependency cycle, in ascending id order.
    Cycle { tasks: Vec<TaskId> },
    /// A task lists itself as a dependency.
    SelfDependency { task_id: TaskId },
    /// A task depends on an id that is not in the graph.
    MissingDependency { task_id: TaskId, missing: TaskId },
    /// A task lists a dependent that is not in the graph.
    MissingDependent { task_id: TaskId, missing: TaskId },
    /// Only one side of a dependency edge is recorded.
    UnmirroredEdge { task_id: TaskId, depends_on: TaskId },
    /// Root index disagrees with the task's dependencies.
    RootDrift { task_id: TaskId, indexed: bool },
    /// Leaf index disagrees with the task's dependents.
    LeafDrift { task_id: TaskId, indexed: bool },
    /// A status set disagrees with the task's status.
    StatusDrift {
        task_id: TaskId,
        status: TaskStatus,
        set: &'static str,
    },
    /// An index set names a task that is not in the graph.
    UnknownTrackedTask { task_id: TaskId, set: &'static str },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::Cycle { tasks } => {
                let ids: Vec<&str> = tasks.iter().map(|t| t.as_str()).collect();
                write!(f, "cycle between tasks: {}", ids.join(", "))
            }
            ValidationIssue::SelfDependency { task_id } => {
                write!(f, "task {} depends on itself", task_id)
            }
            ValidationIssue::MissingDependency { task_id, missing } => {
                write!(f, "task {} depends on missing task {}", task_id, missing)
            }
            ValidationIssue::MissingDependent { task_id, missing } => {
                write!(f, "task {} lists missing dependent {}", task_id, missing)
            }
            ValidationIssue::UnmirroredEdge {
                task_id,
                depends_on,
            } => write!(
                f,
                "edge {} -> {} is recorded on one side only",
                task_id, depends_on
            ),
            ValidationIssue::RootDrift { task_id, indexed } => {
                if *indexed {
                    write!(f, "task {} is indexed as root but has dependencies", task_id)
                } else {
                    write!(f, "task {} has no dependencies but is not indexed as root", task_id)
                }
            }
            ValidationIssue::LeafDrift { task_id, indexed } => {
                if *indexed {
                    write!(f, "task {} is indexed as leaf but has dependents", task_id)
                } else {
                    write!(f, "task {} has no dependents but is not indexed as leaf", task_id)
                }
            }
            ValidationIssue::StatusDrift {
                task_id,
                status,
                set,
            } => write!(
                f,
                "task {} is {} but {} disagrees",
                task_id, status, set
            ),
            ValidationIssue::UnknownTrackedTask { task_id, set } => {
                write!(f, "{} contains unknown task {}", set, task_id)
            }
        }
    }
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphProgress {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Clone, Copy)]
enum Mark {
    OnStack,
    Done,
}

/// The task dependency graph.
///
/// The serialized form is the graph's wire format. Decoding trusts the
/// encoded index sets as-is; run [`TaskGraph::validate`] to audit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    tasks: BTreeMap<TaskId, TaskNode>,
    #[serde(default)]
    root_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    leaf_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    completed_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    failed_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    cancelled_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    running_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    execution_order: Vec<TaskId>,
    #[serde(default)]
    last_executed: Option<TaskId>,
    #[serde(default)]
    error_history: Vec<ErrorRecord>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            tasks: BTreeMap::new(),
            root_tasks: BTreeSet::new(),
            leaf_tasks: BTreeSet::new(),
            completed_tasks: BTreeSet::new(),
            failed_tasks: BTreeSet::new(),
            cancelled_tasks: BTreeSet::new(),
            running_tasks: BTreeSet::new(),
            execution_order: Vec::new(),
            last_executed: None,
            error_history: Vec::new(),
        }
    }

    // ========== Structural Mutation ==========

    /// Insert a task, replacing any task with the same id.
    ///
    /// Edges on `node` are taken as given; a caller replacing an existing
    /// task is responsible for keeping its neighbours' edges consistent.
    pub fn add_task(&mut self, node: TaskNode) {
        let id = node.task_id.clone();
        if self.tasks.insert(id.clone(), node).is_some() {
            warn!(graph = %self.name, task = %id, "replacing existing task");
        } else {
            debug!(graph = %self.name, task = %id, "task added");
        }
        self.refresh_edge_membership(&id);
        self.refresh_status_membership(&id);
    }

    /// Remove a task and repair every neighbour's edges.
    ///
    /// Containment children of the removed task lose their `parent_id`.
    ///
    /// # Errors
    /// Returns [`Error::TaskNotFound`] if the task is absent.
    pub fn remove_task(&mut self, task_id: &TaskId) -> Result<TaskNode> {
        let node = self
            .tasks
            .remove(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;

        for dep in &node.dependencies {
            if let Some(dep_node) = self.tasks.get_mut(dep) {
                dep_node.remove_dependent(task_id);
            }
            self.refresh_edge_membership(dep);
        }
        for dependent in &node.dependents {
            if let Some(dependent_node) = self.tasks.get_mut(dependent) {
                dependent_node.remove_dependency(task_id);
            }
            self.refresh_edge_membership(dependent);
        }

        if let Some(parent) = node.parent_id.as_ref().and_then(|p| self.tasks.get_mut(p)) {
            parent.remove_child(task_id);
        }
        for child in &node.children {
            if let Some(child_node) = self.tasks.get_mut(child) {
                if child_node.parent_id.as_ref() == Some(task_id) {
                    child_node.parent_id = None;
                }
            }
        }

        self.root_tasks.remove(task_id);
        self.leaf_tasks.remove(task_id);
        self.completed_tasks.remove(task_id);
        self.failed_tasks.remove(task_id);
        self.cancelled_tasks.remove(task_id);
        self.running_tasks.remove(task_id);

        debug!(graph = %self.name, task = %task_id, "task removed");
        Ok(node)
    }

    /// Make `task_id` wait on `depends_on`.
    ///
    /// The edge is inserted, then the whole graph is checked for cycles. A
    /// rejected edge leaves the graph exactly as it was.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if either task is absent.
    /// - [`Error::SelfDependency`] if both ids are the same.
    /// - [`Error::CyclicDependency`] if the edge would close a cycle.
    pub fn add_dependency(&mut self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        self.require(task_id)?;
        self.require(depends_on)?;
        if task_id == depends_on {
            return Err(Error::SelfDependency(task_id.clone()));
        }

        let snapshot = [
            self.root_tasks.contains(task_id),
            self.leaf_tasks.contains(task_id),
            self.root_tasks.contains(depends_on),
            self.leaf_tasks.contains(depends_on),
        ];

        let added_dependency = self.node_mut(task_id)?.add_dependency(depends_on.clone())?;
        let added_dependent = self.node_mut(depends_on)?.add_dependent(task_id.clone())?;
        self.refresh_edge_membership(task_id);
        self.refresh_edge_membership(depends_on);

        if let Err(cycle) = self.depth_first() {
            if added_dependency {
                self.node_mut(task_id)?.remove_dependency(depends_on);
            }
            if added_dependent {
                self.node_mut(depends_on)?.remove_dependent(task_id);
            }
            set_membership(&mut self.root_tasks, task_id, snapshot[0]);
            set_membership(&mut self.leaf_tasks, task_id, snapshot[1]);
            set_membership(&mut self.root_tasks, depends_on, snapshot[2]);
            set_membership(&mut self.leaf_tasks, depends_on, snapshot[3]);
            return Err(Error::CyclicDependency {
                task_id: task_id.clone(),
                depends_on: depends_on.clone(),
                cycle,
            });
        }

        debug!(graph = %self.name, task = %task_id, depends_on = %depends_on, "dependency added");
        Ok(())
    }

    /// Remove the edge `task_id -> depends_on`. Returns whether it existed.
    ///
    /// # Errors
    /// Returns [`Error::TaskNotFound`] if either task is absent.
    pub fn remove_dependency(&mut self, task_id: &TaskId, depends_on: &TaskId) -> Result<bool> {
        self.require(task_id)?;
        self.require(depends_on)?;

        let removed_dependency = self.node_mut(task_id)?.remove_dependency(depends_on);
        let removed_dependent = self.node_mut(depends_on)?.remove_dependent(task_id);
        self.refresh_edge_membership(task_id);
        self.refresh_edge_membership(depends_on);

        debug!(graph = %self.name, task = %task_id, depends_on = %depends_on, "dependency removed");
        Ok(removed_dependency || removed_dependent)
    }

    /// Record `child_id` as a containment child of `parent_id`.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if either task is absent.
    /// - [`Error::SelfDependency`] if both ids are the same.
    /// - [`Error::ContainmentCycle`] if `child_id` already contains `parent_id`.
    pub fn add_subtask(&mut self, parent_id: &TaskId, child_id: &TaskId) -> Result<()> {
        self.require(parent_id)?;
        self.require(child_id)?;
        if parent_id == child_id {
            return Err(Error::SelfDependency(parent_id.clone()));
        }
        if self.containers_of(parent_id).any(|ancestor| ancestor == child_id) {
            return Err(Error::ContainmentCycle {
                parent_id: parent_id.clone(),
                child_id: child_id.clone(),
            });
        }
        self.node_mut(parent_id)?.add_child(child_id.clone())?;

        let previous = self.node_mut(child_id)?.parent_id.replace(parent_id.clone());
        if let Some(previous) = previous.filter(|p| p != parent_id) {
            if let Some(old_parent) = self.tasks.get_mut(&previous) {
                old_parent.remove_child(child_id);
            }
        }
        Ok(())
    }

    /// Walk the `parent_id` chain above `task_id`, nearest first. Stops
    /// after `len()` steps so a corrupt decoded chain cannot loop forever.
    fn containers_of<'a>(&'a self, task_id: &TaskId) -> impl Iterator<Item = &'a TaskId> {
        std::iter::successors(
            self.tasks.get(task_id).and_then(|node| node.parent_id.as_ref()),
            |current| self.tasks.get(*current).and_then(|node| node.parent_id.as_ref()),
        )
        .take(self.tasks.len())
    }

    // ========== Run-Level Transitions ==========

    /// Start a task and mark it running.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if the task is absent.
    /// - [`Error::InvalidTransition`] if the task is not pending.
    pub fn start_task(&mut self, task_id: &TaskId, context: TaskContext) -> Result<()> {
        self.node_mut(task_id)?.start(context)?;
        self.refresh_status_membership(task_id);
        debug!(graph = %self.name, task = %task_id, "task started");
        Ok(())
    }

    /// Report the outcome of one attempt and return the task's new status.
    ///
    /// Every attempt is appended to the execution order. Failures are also
    /// appended to the graph error history.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if the task is absent.
    /// - [`Error::InvalidTransition`] if the task is already terminal.
    pub fn complete_task(&mut self, task_id: &TaskId, result: TaskResult) -> Result<TaskStatus> {
        let failure = (!result.success).then(|| result.error_message());
        let node = self.node_mut(task_id)?;
        node.complete(result)?;
        let status = node.status;
        let (retries, max_retries) = (node.retries, node.max_retries);

        self.refresh_status_membership(task_id);
        self.execution_order.push(task_id.clone());
        self.last_executed = Some(task_id.clone());

        if let Some(error) = failure {
            self.error_history.push(ErrorRecord {
                task_id: task_id.clone(),
                error,
            });
            if status == TaskStatus::Failed {
                warn!(graph = %self.name, task = %task_id, retries, "task failed, retries exhausted");
            } else {
                debug!(graph = %self.name, task = %task_id, retries, max_retries, "task failed, requeued");
            }
        } else {
            debug!(graph = %self.name, task = %task_id, "task completed");
        }
        Ok(status)
    }

    /// Cancel one task.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if the task is absent.
    /// - [`Error::InvalidTransition`] if the task is already terminal.
    pub fn cancel_task(&mut self, task_id: &TaskId) -> Result<()> {
        self.node_mut(task_id)?.cancel()?;
        self.refresh_status_membership(task_id);
        debug!(graph = %self.name, task = %task_id, "task cancelled");
        Ok(())
    }

    /// Cancel every task that has not reached a terminal status. Returns the
    /// cancelled ids in ascending order.
    pub fn cancel_pending(&mut self) -> Vec<TaskId> {
        let mut cancelled = Vec::new();
        for node in self.tasks.values_mut() {
            if node.cancel().is_ok() {
                cancelled.push(node.task_id.clone());
            }
        }
        for id in &cancelled {
            self.refresh_status_membership(id);
        }
        cancelled
    }

    /// Move a failed task with retries left back to pending.
    ///
    /// # Errors
    /// - [`Error::TaskNotFound`] if the task is absent.
    /// - [`Error::InvalidTransition`] if the task cannot be retried.
    pub fn retry_task(&mut self, task_id: &TaskId) -> Result<()> {
        self.node_mut(task_id)?.retry()?;
        self.refresh_status_membership(task_id);
        Ok(())
    }

    /// Reset every task to pending and clear run history. Edges are kept.
    pub fn reset(&mut self) {
        for node in self.tasks.values_mut() {
            node.reset();
        }
        self.completed_tasks.clear();
        self.failed_tasks.clear();
        self.cancelled_tasks.clear();
        self.running_tasks.clear();
        self.execution_order.clear();
        self.last_executed = None;
        self.error_history.clear();
        debug!(graph = %self.name, "graph reset");
    }

    // ========== Queries ==========

    pub fn get_task(&self, task_id: &TaskId) -> Option<&TaskNode> {
        self.tasks.get(task_id)
    }

    pub fn contains_task(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// All task ids in ascending order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().cloned().collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks that `task_id` waits on. Empty if the task is absent.
    pub fn dependencies_of(&self, task_id: &TaskId) -> Vec<&TaskNode> {
        self.neighbours(task_id, |node| &node.dependencies)
    }

    /// Tasks waiting on `task_id`. Empty if the task is absent.
    pub fn dependents_of(&self, task_id: &TaskId) -> Vec<&TaskNode> {
        self.neighbours(task_id, |node| &node.dependents)
    }

    fn neighbours<'a>(
        &'a self,
        task_id: &TaskId,
        edges: impl Fn(&'a TaskNode) -> &'a BTreeSet<TaskId>,
    ) -> Vec<&'a TaskNode> {
        self.tasks
            .get(task_id)
            .map(|node| edges(node).iter().filter_map(|id| self.tasks.get(id)).collect())
            .unwrap_or_default()
    }

    /// Pending tasks, not already running, whose dependencies have all
    /// completed.
    pub fn get_ready_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|node| {
                node.status == TaskStatus::Pending
                    && !self.running_tasks.contains(&node.task_id)
                    && self.dependencies_met(node)
            })
            .map(|node| node.task_id.clone())
            .collect()
    }

    /// Pending tasks still waiting on at least one unfinished dependency.
    pub fn get_blocked_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|node| node.status == TaskStatus::Pending && !self.dependencies_met(node))
            .map(|node| node.task_id.clone())
            .collect()
    }

    /// A dependency is met once it has completed. Ids outside the graph
    /// are never met.
    fn dependencies_met(&self, node: &TaskNode) -> bool {
        node.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|dep_node| dep_node.status == TaskStatus::Completed)
        })
    }

    /// Every task id once, each after all of its dependencies.
    ///
    /// # Errors
    /// Returns [`Error::CycleDetected`] if the graph contains a cycle, which
    /// can only happen when edges bypassed [`TaskGraph::add_dependency`].
    pub fn get_task_order(&self) -> Result<Vec<TaskId>> {
        self.depth_first().map_err(Error::CycleDetected)
    }

    /// Return one dependency cycle, if any, as a closed path of ids.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        self.depth_first().err()
    }

    /// True once every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(TaskNode::is_terminal)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_tasks.is_empty()
    }

    pub fn progress(&self) -> GraphProgress {
        let mut progress = GraphProgress {
            total: self.tasks.len(),
            ..GraphProgress::default()
        };
        for node in self.tasks.values() {
            match node.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Running => progress.running += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Cancelled => progress.cancelled += 1,
            }
        }
        progress
    }

    pub fn root_tasks(&self) -> &BTreeSet<TaskId> {
        &self.root_tasks
    }

    pub fn leaf_tasks(&self) -> &BTreeSet<TaskId> {
        &self.leaf_tasks
    }

    pub fn completed_tasks(&self) -> &BTreeSet<TaskId> {
        &self.completed_tasks
    }

    pub fn failed_tasks(&self) -> &BTreeSet<TaskId> {
        &self.failed_tasks
    }

    pub fn cancelled_tasks(&self) -> &BTreeSet<TaskId> {
        &self.cancelled_tasks
    }

    pub fn running_tasks(&self) -> &BTreeSet<TaskId> {
        &self.running_tasks
    }

    pub fn execution_order(&self) -> &[TaskId] {
        &self.execution_order
    }

    pub fn last_executed(&self) -> Option<&TaskId> {
        self.last_executed.as_ref()
    }

    pub fn error_history(&self) -> &[ErrorRecord] {
        &self.error_history
    }

    // ========== Validation ==========

    /// Audit the graph and describe every structural problem found.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (id, node) in &self.tasks {
            for dep in &node.dependencies {
                if dep == id {
                    issues.push(ValidationIssue::SelfDependency {
                        task_id: id.clone(),
                    });
                    continue;
                }
                match self.tasks.get(dep) {
                    None => issues.push(ValidationIssue::MissingDependency {
                        task_id: id.clone(),
                        missing: dep.clone(),
                    }),
                    Some(dep_node) if !dep_node.dependents.contains(id) => {
                        issues.push(ValidationIssue::UnmirroredEdge {
                            task_id: id.clone(),
                            depends_on: dep.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
            for dependent in &node.dependents {
                if dependent == id {
                    continue;
                }
                match self.tasks.get(dependent) {
                    None => issues.push(ValidationIssue::MissingDependent {
                        task_id: id.clone(),
                        missing: dependent.clone(),
                    }),
                    Some(dependent_node) if !dependent_node.dependencies.contains(id) => {
                        issues.push(ValidationIssue::UnmirroredEdge {
                            task_id: dependent.clone(),
                            depends_on: id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }

            let rooted = self.root_tasks.contains(id);
            if rooted != node.is_root() {
                issues.push(ValidationIssue::RootDrift {
                    task_id: id.clone(),
                    indexed: rooted,
                });
            }
            let leafed = self.leaf_tasks.contains(id);
            if leafed != node.is_leaf() {
                issues.push(ValidationIssue::LeafDrift {
                    task_id: id.clone(),
                    indexed: leafed,
                });
            }

            for (set_name, set, status) in self.status_sets() {
                if set.contains(id) != (node.status == status) {
                    issues.push(ValidationIssue::StatusDrift {
                        task_id: id.clone(),
                        status: node.status,
                        set: set_name,
                    });
                }
            }
        }

        let index_sets = [("root_tasks", &self.root_tasks), ("leaf_tasks", &self.leaf_tasks)];
        let status_sets = self.status_sets().map(|(name, set, _)| (name, set));
        for (set_name, set) in index_sets.into_iter().chain(status_sets) {
            for id in set.iter().filter(|id| !self.tasks.contains_key(*id)) {
                issues.push(ValidationIssue::UnknownTrackedTask {
                    task_id: id.clone(),
                    set: set_name,
                });
            }
        }

        issues.extend(self.cycles().into_iter().map(|tasks| ValidationIssue::Cycle { tasks }));
        issues
    }

    /// Strongly connected components of more than one task.
    fn cycles(&self) -> Vec<Vec<TaskId>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.tasks.keys() {
            graph.add_node(id.as_str());
        }
        for (id, node) in &self.tasks {
            for dep in node.dependencies.iter().filter(|d| *d != id) {
                if self.tasks.contains_key(dep) {
                    graph.add_edge(dep.as_str(), id.as_str(), ());
                }
            }
        }

        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut tasks: Vec<TaskId> = component.into_iter().map(TaskId::from).collect();
                tasks.sort();
                tasks
            })
            .collect();
        cycles.sort();
        cycles
    }

    fn status_sets(&self) -> [(&'static str, &BTreeSet<TaskId>, TaskStatus); 4] {
        [
            ("running_tasks", &self.running_tasks, TaskStatus::Running),
            ("completed_tasks", &self.completed_tasks, TaskStatus::Completed),
            ("failed_tasks", &self.failed_tasks, TaskStatus::Failed),
            ("cancelled_tasks", &self.cancelled_tasks, TaskStatus::Cancelled),
        ]
    }

    // ========== Serialization ==========

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    // ========== Internals ==========

    fn require(&self, task_id: &TaskId) -> Result<()> {
        if self.tasks.contains_key(task_id) {
            Ok(())
        } else {
            Err(Error::TaskNotFound(task_id.clone()))
        }
    }

    fn node_mut(&mut self, task_id: &TaskId) -> Result<&mut TaskNode> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))
    }

    fn refresh_edge_membership(&mut self, task_id: &TaskId) {
        let Some(node) = self.tasks.get(task_id) else {
            return;
        };
        let (root, leaf) = (node.is_root(), node.is_leaf());
        set_membership(&mut self.root_tasks, task_id, root);
        set_membership(&mut self.leaf_tasks, task_id, leaf);
    }

    fn refresh_status_membership(&mut self, task_id: &TaskId) {
        let Some(status) = self.tasks.get(task_id).map(|node| node.status) else {
            return;
        };
        set_membership(&mut self.running_tasks, task_id, status == TaskStatus::Running);
        set_membership(&mut self.completed_tasks, task_id, status == TaskStatus::Completed);
        set_membership(&mut self.failed_tasks, task_id, status == TaskStatus::Failed);
        set_membership(&mut self.cancelled_tasks, task_id, status == TaskStatus::Cancelled);
    }

    /// Post-order walk over dependencies, ascending by id.
    ///
    /// Returns the order on success, or the closed cycle path on failure.
    /// Dependencies on ids outside the graph are skipped.
    fn depth_first(&self) -> std::result::Result<Vec<TaskId>, Vec<TaskId>> {
        let mut marks: HashMap<&TaskId, Mark> = HashMap::with_capacity(self.tasks.len());
        let mut order = Vec::with_capacity(self.tasks.len());

        for (start, start_node) in &self.tasks {
            if marks.contains_key(start) {
                continue;
            }
            marks.insert(start, Mark::OnStack);
            let mut stack = vec![(start, start_node.dependencies.iter())];

            while let Some((id, deps)) = stack.last_mut() {
                match deps.next() {
                    Some(dep) => {
                        let Some(dep_node) = self.tasks.get(dep) else {
                            continue;
                        };
                        match marks.get(dep) {
                            Some(Mark::Done) => {}
                            Some(Mark::OnStack) => {
                                let from = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                                let mut cycle: Vec<TaskId> =
                                    stack[from..].iter().map(|(n, _)| (*n).clone()).collect();
                                cycle.push(dep.clone());
                                return Err(cycle);
                            }
                            None => {
                                marks.insert(dep, Mark::OnStack);
                                stack.push((dep, dep_node.dependencies.iter()));
                            }
                        }
                    }
                    None => {
                        let id = *id;
                        marks.insert(id, Mark::Done);
                        order.push(id.clone());
                        stack.pop();
                    }
                }
            }
        }
        Ok(order)
    }
}

fn set_membership(set: &mut BTreeSet<TaskId>, task_id: &TaskId, member: bool) {
    if member {
        if !set.contains(task_id) {
            set.insert(task_id.clone());
        }
    } else {
        set.remove(task_id);
    }
}
