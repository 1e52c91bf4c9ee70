//! Graph assembly for known workflows and the registry of graph instances.
//!
//! [`TaskPlanner`] builds pre-shaped [`TaskGraph`]s for the built-in
//! [`WorkflowTemplate`]s, or from caller-provided [`TaskSpec`]s, and files
//! them in a [`GraphStore`]. The store is passed in by the caller, so
//! separate planners never share registries.
//!
//! Assembly never touches execution: every task of a fresh graph is pending.

use crate::config::EngineConfig;
use crate::core::{AgentType, TaskContext, TaskGraph, TaskId, TaskNode, TaskType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Built-in workflow shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTemplate {
    /// Parallel analysis, memory, belief, desire and emotion tasks feed a
    /// single planning task, followed by execution and reflection.
    Interaction,
    /// Analysis and a memory check feed research, then synthesis, then a
    /// memory update.
    Research,
}

impl WorkflowTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowTemplate::Interaction => "interaction",
            WorkflowTemplate::Research => "research",
        }
    }

    /// Input key under which the caller's text is stored on every task.
    pub fn input_key(&self) -> &'static str {
        match self {
            WorkflowTemplate::Interaction => "input",
            WorkflowTemplate::Research => "topic",
        }
    }

    fn tasks(&self) -> &'static [TemplateTask] {
        match self {
            WorkflowTemplate::Interaction => INTERACTION_TASKS,
            WorkflowTemplate::Research => RESEARCH_TASKS,
        }
    }
}

impl std::fmt::Display for WorkflowTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowTemplate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interaction" => Ok(WorkflowTemplate::Interaction),
            "research" => Ok(WorkflowTemplate::Research),
            other => Err(format!(
                "unknown workflow template '{}' (expected interaction or research)",
                other
            )),
        }
    }
}

struct TemplateTask {
    id: &'static str,
    task_type: TaskType,
    agent_type: AgentType,
    description: &'static str,
    depends_on: &'static [&'static str],
}

const INTERACTION_TASKS: &[TemplateTask] = &[
    TemplateTask {
        id: "analysis",
        task_type: TaskType::Analysis,
        agent_type: AgentType::Analyzer,
        description: "Analyze the user input",
        depends_on: &[],
    },
    TemplateTask {
        id: "memory_retrieval",
        task_type: TaskType::MemoryRetrieval,
        agent_type: AgentType::Memory,
        description: "Retrieve memories relevant to the input",
        depends_on: &[],
    },
    TemplateTask {
        id: "belief_update",
        task_type: TaskType::BeliefUpdate,
        agent_type: AgentType::Belief,
        description: "Update beliefs from the input",
        depends_on: &[],
    },
    TemplateTask {
        id: "desire_update",
        task_type: TaskType::DesireUpdate,
        agent_type: AgentType::Desire,
        description: "Update desires from the input",
        depends_on: &[],
    },
    TemplateTask {
        id: "emotion_analysis",
        task_type: TaskType::EmotionAnalysis,
        agent_type: AgentType::Emotion,
        description: "Assess the emotional content of the input",
        depends_on: &[],
    },
    TemplateTask {
        id: "planning",
        task_type: TaskType::Planning,
        agent_type: AgentType::Planner,
        description: "Plan a response from the gathered state",
        depends_on: &[
            "analysis",
            "memory_retrieval",
            "belief_update",
            "desire_update",
            "emotion_analysis",
        ],
    },
    TemplateTask {
        id: "execution",
        task_type: TaskType::Execution,
        agent_type: AgentType::Executor,
        description: "Carry out the plan",
        depends_on: &["planning"],
    },
    TemplateTask {
        id: "reflection",
        task_type: TaskType::Reflection,
        agent_type: AgentType::Reflector,
        description: "Reflect on the interaction outcome",
        depends_on: &["execution"],
    },
];

const RESEARCH_TASKS: &[TemplateTask] = &[
    TemplateTask {
        id: "analysis",
        task_type: TaskType::Analysis,
        agent_type: AgentType::Analyzer,
        description: "Analyze the research topic",
        depends_on: &[],
    },
    TemplateTask {
        id: "memory_check",
        task_type: TaskType::MemoryCheck,
        agent_type: AgentType::Memory,
        description: "Check what is already known about the topic",
        depends_on: &[],
    },
    TemplateTask {
        id: "research",
        task_type: TaskType::Research,
        agent_type: AgentType::Researcher,
        description: "Research the topic",
        depends_on: &["analysis", "memory_check"],
    },
    TemplateTask {
        id: "synthesis",
        task_type: TaskType::Synthesis,
        agent_type: AgentType::Synthesizer,
        description: "Synthesize the research findings",
        depends_on: &["research"],
    },
    TemplateTask {
        id: "memory_update",
        task_type: TaskType::MemoryUpdate,
        agent_type: AgentType::Memory,
        description: "Store the synthesized findings",
        depends_on: &["synthesis"],
    },
];

/// Caller description of one task for [`TaskPlanner::create_custom_graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub task_type: TaskType,
    pub agent_type: AgentType,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<TaskId>,
        task_type: TaskType,
        agent_type: AgentType,
        description: &str,
    ) -> Self {
        Self {
            id: id.into(),
            task_type,
            agent_type,
            description: description.to_string(),
            depends_on: Vec::new(),
            inputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
            max_retries: None,
            timeout_seconds: None,
        }
    }

    /// Wait on `dependency` before running.
    pub fn after(mut self, dependency: impl Into<TaskId>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Registry bucket a graph lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphBucket {
    Active,
    Completed,
    Failed,
}

/// Number of graphs in each bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Three-bucket registry of graphs keyed by graph name. A key lives in at
/// most one bucket.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    active: BTreeMap<String, TaskGraph>,
    completed: BTreeMap<String, TaskGraph>,
    failed: BTreeMap<String, TaskGraph>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, bucket: GraphBucket) -> &BTreeMap<String, TaskGraph> {
        match bucket {
            GraphBucket::Active => &self.active,
            GraphBucket::Completed => &self.completed,
            GraphBucket::Failed => &self.failed,
        }
    }

    fn bucket_mut(&mut self, bucket: GraphBucket) -> &mut BTreeMap<String, TaskGraph> {
        match bucket {
            GraphBucket::Active => &mut self.active,
            GraphBucket::Completed => &mut self.completed,
            GraphBucket::Failed => &mut self.failed,
        }
    }

    /// Which bucket holds `key`, searching active first.
    pub fn locate(&self, key: &str) -> Option<GraphBucket> {
        [GraphBucket::Active, GraphBucket::Completed, GraphBucket::Failed]
            .into_iter()
            .find(|b| self.bucket(*b).contains_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&TaskGraph> {
        self.locate(key).and_then(|b| self.bucket(b).get(key))
    }

    /// File `graph` as active under `key`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateGraph`] if `key` is already held by any
    /// bucket, archived ones included.
    pub fn insert_active(&mut self, key: String, graph: TaskGraph) -> Result<()> {
        if let Some(bucket) = self.locate(&key) {
            warn!(graph = %key, bucket = ?bucket, "graph key already registered");
            return Err(Error::DuplicateGraph(key));
        }
        self.active.insert(key, graph);
        Ok(())
    }

    /// Move an active graph to `to`. Returns false if `key` is not active.
    fn promote(&mut self, key: &str, to: GraphBucket) -> bool {
        match self.active.remove(key) {
            Some(graph) => {
                self.bucket_mut(to).insert(key.to_string(), graph);
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            active: self.active.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
        }
    }
}

/// Builds graphs for known workflows and tracks their lifecycle.
#[derive(Debug, Default)]
pub struct TaskPlanner {
    store: GraphStore,
    engine: EngineConfig,
}

impl TaskPlanner {
    pub fn new(store: GraphStore, engine: EngineConfig) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn into_store(self) -> GraphStore {
        self.store
    }

    // ========== Assembly ==========

    /// Assemble a template graph without registering it.
    pub fn build_template(&self, template: WorkflowTemplate, input: &str) -> Result<TaskGraph> {
        let name = format!("{}-{}", template, &Uuid::new_v4().simple().to_string()[..8]);
        let description = format!("{} workflow: {}", template, input);
        let key = template.input_key();

        let specs = template
            .tasks()
            .iter()
            .map(|t| {
                let mut spec = TaskSpec::new(t.id, t.task_type, t.agent_type, t.description)
                    .with_input(key, json!(input));
                spec.parameters
                    .insert("workflow".to_string(), json!(template.as_str()));
                spec.depends_on = t.depends_on.iter().map(|d| TaskId::from(*d)).collect();
                spec
            })
            .collect();

        self.assemble(&name, &description, specs)
    }

    /// Assemble `specs` into a graph without registering it.
    ///
    /// # Errors
    /// - [`Error::DuplicateTask`] if two specs share an id.
    /// - [`Error::TaskNotFound`] if a spec depends on an unknown id.
    /// - [`Error::SelfDependency`] / [`Error::CyclicDependency`] for bad edges.
    pub fn assemble(&self, name: &str, description: &str, specs: Vec<TaskSpec>) -> Result<TaskGraph> {
        let mut graph = TaskGraph::new(name, description);
        let mut edges = Vec::new();

        for spec in specs {
            if graph.contains_task(&spec.id) {
                return Err(Error::DuplicateTask(spec.id));
            }
            let mut node = TaskNode::new(spec.id.clone(), spec.task_type, spec.agent_type, &spec.description)
                .with_max_retries(spec.max_retries.unwrap_or(self.engine.default_max_retries));
            node.inputs = spec.inputs;
            node.parameters = spec.parameters;
            node.timeout_seconds = spec.timeout_seconds.or(self.engine.default_timeout_seconds);

            edges.extend(spec.depends_on.into_iter().map(|dep| (spec.id.clone(), dep)));
            graph.add_task(node);
        }

        for (task_id, depends_on) in &edges {
            graph.add_dependency(task_id, depends_on)?;
        }
        Ok(graph)
    }

    /// Build and register a template graph. Returns its registry key.
    pub fn create_from_template(&mut self, template: WorkflowTemplate, input: &str) -> Result<String> {
        let graph = self.build_template(template, input)?;
        self.register(graph)
    }

    pub fn create_interaction_graph(&mut self, input: &str) -> Result<String> {
        self.create_from_template(WorkflowTemplate::Interaction, input)
    }

    pub fn create_research_graph(&mut self, topic: &str) -> Result<String> {
        self.create_from_template(WorkflowTemplate::Research, topic)
    }

    /// Build and register a graph from caller specs under `name`.
    pub fn create_custom_graph(
        &mut self,
        name: &str,
        description: &str,
        specs: Vec<TaskSpec>,
    ) -> Result<String> {
        let graph = self.assemble(name, description, specs)?;
        self.register(graph)
    }

    /// File an existing graph as active under its name.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateGraph`] if the name is already registered
    /// in any bucket.
    pub fn register(&mut self, graph: TaskGraph) -> Result<String> {
        let key = graph.name.clone();
        let tasks = graph.len();
        self.store.insert_active(key.clone(), graph)?;
        info!(graph = %key, tasks, "graph registered");
        Ok(key)
    }

    // ========== Registry ==========

    /// Look a graph up in any bucket.
    pub fn get_graph(&self, key: &str) -> Option<&TaskGraph> {
        self.store.get(key)
    }

    /// Mutable access to an active graph. Archived graphs are read-only.
    pub fn active_graph_mut(&mut self, key: &str) -> Option<&mut TaskGraph> {
        self.store.active.get_mut(key)
    }

    pub fn locate(&self, key: &str) -> Option<GraphBucket> {
        self.store.locate(key)
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.store.active.keys().cloned().collect()
    }

    /// Move an active graph to the completed bucket. No-op unless active.
    pub fn complete_graph(&mut self, key: &str) -> bool {
        let moved = self.store.promote(key, GraphBucket::Completed);
        if moved {
            info!(graph = %key, "graph completed");
        }
        moved
    }

    /// Move an active graph to the failed bucket. No-op unless active.
    pub fn fail_graph(&mut self, key: &str) -> bool {
        let moved = self.store.promote(key, GraphBucket::Failed);
        if moved {
            info!(graph = %key, "graph failed");
        }
        moved
    }

    /// Archive every active graph whose tasks are all terminal: into failed
    /// if any task failed, completed otherwise.
    pub fn archive_finished(&mut self) -> Vec<(String, GraphBucket)> {
        let finished: Vec<(String, GraphBucket)> = self
            .store
            .active
            .iter()
            .filter(|(_, graph)| graph.is_finished())
            .map(|(key, graph)| {
                let bucket = if graph.has_failures() {
                    GraphBucket::Failed
                } else {
                    GraphBucket::Completed
                };
                (key.clone(), bucket)
            })
            .collect();

        for (key, bucket) in &finished {
            self.store.promote(key, *bucket);
            info!(graph = %key, bucket = ?bucket, "graph archived");
        }
        finished
    }

    /// Drop every archived graph and return how many were dropped.
    ///
    /// Only the completed and failed buckets are cleared; active graphs are
    /// kept. This is the only way archived graphs are ever released, so a
    /// long-running planner should call it periodically.
    pub fn cleanup(&mut self) -> usize {
        let dropped = self.store.completed.len() + self.store.failed.len();
        self.store.completed.clear();
        self.store.failed.clear();
        info!(dropped, "archived graphs dropped");
        dropped
    }

    pub fn counts(&self) -> RegistryCounts {
        self.store.counts()
    }

    /// Like [`TaskPlanner::get_graph`], for callers that treat a missing
    /// graph as an error.
    pub fn require_graph(&self, key: &str) -> Result<&TaskGraph> {
        self.get_graph(key)
            .ok_or_else(|| Error::GraphNotFound(key.to_string()))
    }

    // ========== Contexts ==========

    /// Build the start context for `node` from its inputs and parameters,
    /// chained under `parent` when given.
    ///
    /// # Errors
    /// Returns [`Error::ContextTooDeep`] if the chain would exceed the
    /// configured `max_context_depth`.
    pub fn context_for(&self, node: &TaskNode, parent: Option<TaskContext>) -> Result<TaskContext> {
        let mut context = TaskContext::new();
        context.inputs = node.inputs.clone();
        context.parameters = node.parameters.clone();
        match parent {
            Some(parent) => context.with_parent(parent, self.engine.max_context_depth),
            None => Ok(context),
        }
    }
}
