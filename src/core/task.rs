//! Task node model for the dependency graph.
//!
//! A [`TaskNode`] holds one task's identity, configuration, dependency
//! edges, and lifecycle state. Edges are stored as sets of [`TaskId`]s,
//! never as references to other nodes; the owning graph keeps both
//! directions mirrored.

use crate::core::result::{TaskContext, TaskResult};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Default number of failed attempts a task may absorb before it becomes
/// terminally failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a task within a graph.
///
/// Ids are caller-supplied strings or generated UUIDs. Ordering is
/// lexicographic, which makes every traversal deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new unique task identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Analysis,
    MemoryRetrieval,
    MemoryCheck,
    MemoryUpdate,
    BeliefUpdate,
    DesireUpdate,
    EmotionAnalysis,
    Planning,
    Execution,
    Reflection,
    Research,
    Synthesis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Analysis => "analysis",
            TaskType::MemoryRetrieval => "memory_retrieval",
            TaskType::MemoryCheck => "memory_check",
            TaskType::MemoryUpdate => "memory_update",
            TaskType::BeliefUpdate => "belief_update",
            TaskType::DesireUpdate => "desire_update",
            TaskType::EmotionAnalysis => "emotion_analysis",
            TaskType::Planning => "planning",
            TaskType::Execution => "execution",
            TaskType::Reflection => "reflection",
            TaskType::Research => "research",
            TaskType::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of agent expected to carry out a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Orchestrator,
    Analyzer,
    Memory,
    Belief,
    Desire,
    Emotion,
    Planner,
    Executor,
    Reflector,
    Researcher,
    Synthesizer,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Analyzer => "analyzer",
            AgentType::Memory => "memory",
            AgentType::Belief => "belief",
            AgentType::Desire => "desire",
            AgentType::Emotion => "emotion",
            AgentType::Planner => "planner",
            AgentType::Executor => "executor",
            AgentType::Reflector => "reflector",
            AgentType::Researcher => "researcher",
            AgentType::Synthesizer => "synthesizer",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status in its lifecycle.
///
/// `Pending -> Running -> Completed | Pending (retry) | Failed`, and any
/// non-terminal status may move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or for the executor to pick it up.
    #[default]
    Pending,
    /// An attempt is in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Retries exhausted.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskStatus {
    /// `Completed`, `Failed` and `Cancelled` never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single task in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub agent_type: AgentType,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Tasks this one waits on.
    pub(crate) dependencies: BTreeSet<TaskId>,
    /// Tasks waiting on this one.
    pub(crate) dependents: BTreeSet<TaskId>,
    /// Containment parent, independent of dependency edges.
    pub parent_id: Option<TaskId>,
    pub(crate) children: BTreeSet<TaskId>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub required_memory: Vec<String>,
    /// Hint for the executor; not enforced here.
    pub timeout_seconds: Option<u64>,
    pub retries: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub error_history: Vec<String>,
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
}

impl TaskNode {
    /// Create a pending task with no edges.
    pub fn new(
        task_id: impl Into<TaskId>,
        task_type: TaskType,
        agent_type: AgentType,
        description: &str,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            agent_type,
            description: description.to_string(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            parent_id: None,
            children: BTreeSet::new(),
            inputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
            required_memory: Vec::new(),
            timeout_seconds: None,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_history: Vec::new(),
            result: None,
            context: None,
        }
    }

    /// Create a pending task with a generated id.
    pub fn generated(task_type: TaskType, agent_type: AgentType, description: &str) -> Self {
        Self::new(TaskId::generate(), task_type, agent_type, description)
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_required_memory(mut self, reference: impl Into<String>) -> Self {
        self.required_memory.push(reference.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn dependencies(&self) -> &BTreeSet<TaskId> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &BTreeSet<TaskId> {
        &self.dependents
    }

    pub fn children(&self) -> &BTreeSet<TaskId> {
        &self.children
    }

    // ========== Edge Mutation ==========

    /// Record that this task waits on `id`. Returns whether the edge was new.
    ///
    /// # Errors
    /// Returns [`Error::SelfDependency`] if `id` is this task's own id.
    pub fn add_dependency(&mut self, id: TaskId) -> Result<bool> {
        self.reject_self(&id)?;
        Ok(self.dependencies.insert(id))
    }

    pub fn remove_dependency(&mut self, id: &TaskId) -> bool {
        self.dependencies.remove(id)
    }

    /// Record that `id` waits on this task. Returns whether the edge was new.
    ///
    /// # Errors
    /// Returns [`Error::SelfDependency`] if `id` is this task's own id.
    pub fn add_dependent(&mut self, id: TaskId) -> Result<bool> {
        self.reject_self(&id)?;
        Ok(self.dependents.insert(id))
    }

    pub fn remove_dependent(&mut self, id: &TaskId) -> bool {
        self.dependents.remove(id)
    }

    /// Add a containment child.
    ///
    /// # Errors
    /// Returns [`Error::SelfDependency`] if `id` is this task's own id.
    pub fn add_child(&mut self, id: TaskId) -> Result<bool> {
        self.reject_self(&id)?;
        Ok(self.children.insert(id))
    }

    pub fn remove_child(&mut self, id: &TaskId) -> bool {
        self.children.remove(id)
    }

    fn reject_self(&self, id: &TaskId) -> Result<()> {
        if *id == self.task_id {
            return Err(Error::SelfDependency(id.clone()));
        }
        Ok(())
    }

    // ========== Predicates ==========

    /// Pending with no dependency edges left.
    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::Pending && self.dependencies.is_empty()
    }

    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retries < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Wall time of the current or last attempt, if it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    // ========== State Machine ==========

    /// Begin an attempt.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] unless the task is pending.
    pub fn start(&mut self, context: TaskContext) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid("start"));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.context = Some(context);
        Ok(())
    }

    /// Finish an attempt with `result`.
    ///
    /// A success completes the task. A failure is appended to the error
    /// history and counted; the task goes back to pending while retries
    /// remain and fails terminally otherwise. A result for a task that was
    /// never marked running is accepted.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] if the task is already terminal.
    pub fn complete(&mut self, result: TaskResult) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid("complete"));
        }

        if result.success {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(Utc::now());
            self.result = Some(result);
            return Ok(());
        }

        self.error_history.push(result.error_message());
        self.retries += 1;
        self.result = Some(result);
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());

        if self.can_retry() {
            self.requeue();
        }
        Ok(())
    }

    /// Move a failed task with retries left back to pending.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] if [`TaskNode::can_retry`] is false.
    pub fn retry(&mut self) -> Result<()> {
        if !self.can_retry() {
            return Err(self.invalid("retry"));
        }
        self.requeue();
        Ok(())
    }

    fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.context = None;
    }

    /// Cancel the task. Does not interrupt work the executor already started.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] if the task is already terminal.
    pub fn cancel(&mut self) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Return to pending with every execution record cleared. Edges and
    /// configuration are kept.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.result = None;
        self.context = None;
        self.retries = 0;
        self.error_history.clear();
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            task_id: self.task_id.clone(),
            from: self.status,
            action,
        }
    }
}
