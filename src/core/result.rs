//! Execution inputs and outcomes exchanged between the graph and an executor.
//!
//! A [`TaskContext`] is handed to a node when it starts; a [`TaskResult`]
//! comes back when one attempt finishes.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default cap on the length of a context's parent chain.
pub const DEFAULT_MAX_CONTEXT_DEPTH: usize = 32;

const DEFAULT_FAILURE_MESSAGE: &str = "Task failed without an error message";

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Opaque output produced by the executor.
    #[serde(default)]
    pub output: Value,
    /// Failure message. Present whenever `success` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Free-form metadata attached by the executor.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// When the result was produced.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result carrying `output`.
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failed result. An empty message is replaced with a generic one so
    /// failures always carry an error.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            DEFAULT_FAILURE_MESSAGE.to_string()
        } else {
            error
        };
        Self {
            success: false,
            output: Value::Null,
            error: Some(error),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The failure message to record for this result.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
    }
}

/// Execution input bundle passed to a node when it starts.
///
/// Contexts chain through `parent_context`. The chain is owned, so it can
/// never loop in memory, but [`TaskContext::with_parent`] still refuses a
/// parent whose ancestry already contains this context's id and caps the
/// chain length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Identity used for the ancestry check.
    pub context_id: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub memory_context: Vec<Value>,
    #[serde(default)]
    pub agent_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub parent_context: Option<Box<TaskContext>>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskContext {
    /// Create an empty context with a fresh id.
    pub fn new() -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
            inputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
            memory_context: Vec::new(),
            agent_state: BTreeMap::new(),
            parent_context: None,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_memory(mut self, memory: Value) -> Self {
        self.memory_context.push(memory);
        self
    }

    pub fn with_agent_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.agent_state.insert(key.into(), value);
        self
    }

    /// Attach `parent` as this context's parent.
    ///
    /// # Errors
    /// - [`Error::ContextCycle`] if this context's id already appears in
    ///   `parent` or its ancestors.
    /// - [`Error::ContextTooDeep`] if the resulting chain would have more
    ///   than `max_depth` ancestors.
    pub fn with_parent(mut self, parent: TaskContext, max_depth: usize) -> Result<Self> {
        if std::iter::once(&parent)
            .chain(parent.ancestors())
            .any(|ctx| ctx.context_id == self.context_id)
        {
            return Err(Error::ContextCycle(self.context_id));
        }
        if parent.depth() + 1 > max_depth {
            return Err(Error::ContextTooDeep { max: max_depth });
        }
        self.parent_context = Some(Box::new(parent));
        Ok(self)
    }

    /// Number of ancestors above this context.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Iterate over the parent chain, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &TaskContext> {
        std::iter::successors(self.parent_context.as_deref(), |ctx| {
            ctx.parent_context.as_deref()
        })
    }

    /// Look up an input here, then in each ancestor in turn.
    pub fn resolve_input(&self, key: &str) -> Option<&Value> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find_map(|ctx| ctx.inputs.get(key))
    }
}
