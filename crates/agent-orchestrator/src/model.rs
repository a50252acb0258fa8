//! Orchestration Data Model
//!
//! Every value here is created fresh for one request and dropped once the
//! [`AgentResponse`] is returned; only the serialized execution path outlives
//! the call, through the history sink.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;

/// Whether a capability is a model or a tool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Model,
    Tool,
}

/// A model or tool known to the capability registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub kind: CapabilityKind,

    /// Provider id (e.g. "openai", "deepseek"); "tool" for local tools
    pub provider_id: String,

    /// Model id or tool name
    pub identifier: String,

    #[serde(default)]
    pub capability_tags: BTreeSet<String>,
}

impl CapabilityDescriptor {
    pub fn model(
        provider_id: impl Into<String>,
        identifier: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            kind: CapabilityKind::Model,
            provider_id: provider_id.into(),
            identifier: identifier.into(),
            capability_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tool(
        identifier: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            provider_id: "tool".into(),
            identifier: identifier.into(),
            capability_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// `provider/identifier`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.provider_id, self.identifier)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.capability_tags.contains(tag)
    }
}

/// Kind of work a task represents; doubles as its capability tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Reasoning,
    Code,
    Data,
    Visual,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [TaskType::Reasoning, TaskType::Code, TaskType::Data, TaskType::Visual];

    pub fn as_tag(self) -> &'static str {
        match self {
            TaskType::Reasoning => "reasoning",
            TaskType::Code => "code",
            TaskType::Data => "data",
            TaskType::Visual => "visual",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Lowest and highest task priority
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// One sub-task of a decomposed request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,

    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// 1 (lowest) ..= 5 (highest)
    pub priority: u8,
}

impl Task {
    pub fn new(description: impl Into<String>, task_type: TaskType, priority: u8) -> Self {
        Self {
            description: description.into(),
            task_type,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
        }
    }
}

/// One unit of work in an [`ExecutionPlan`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStep {
    /// Position of the task in the analyzer's output
    pub index: usize,

    pub task: Task,

    /// Always resolved; falls back to the plan's primary model
    pub assigned_model: CapabilityDescriptor,

    pub assigned_tools: Vec<CapabilityDescriptor>,

    /// Indices of steps whose output this step consumes; all `< index`
    pub depends_on: BTreeSet<usize>,
}

/// Steps bound to capabilities plus their dependency graph
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub request_text: String,

    /// Ordered by priority descending; ties keep analyzer order
    pub steps: Vec<PlanStep>,

    pub dependency_graph: DependencyGraph,

    pub primary_model: CapabilityDescriptor,
}

impl ExecutionPlan {
    /// Look a step up by its index (not its position in `steps`)
    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.index == index)
    }
}

/// Output of one executed step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub output: String,
    pub task_type: TaskType,
    /// `provider/identifier` of the model that produced the output
    pub model: String,
}

/// Output (or failure) of one tool invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub step_index: usize,
    pub output: String,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(tool_name: impl Into<String>, step_index: usize, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            step_index,
            output: output.into(),
            failed: false,
            error: None,
        }
    }

    pub fn failure(tool_name: impl Into<String>, step_index: usize, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            step_index,
            output: String::new(),
            failed: true,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle of one request's execution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Planned,
    Executing,
    /// Every step ran and every tool succeeded
    Completed,
    /// Every step ran but at least one tool failed
    PartiallyCompleted,
    /// A step failed or the request was cancelled
    Aborted,
}

/// Everything the execution engine produced
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub state: ExecutionState,

    /// Ordered by `step_index`
    pub step_results: Vec<StepResult>,

    /// Grouped by step, in each step's tool assignment order
    pub tool_outputs: Vec<ToolOutput>,

    pub reasoning_trace: Vec<String>,
}

impl ExecutionResult {
    pub fn step_output(&self, step_index: usize) -> Option<&str> {
        self.step_results
            .iter()
            .find(|r| r.step_index == step_index)
            .map(|r| r.output.as_str())
    }

    pub fn failed_tools(&self) -> impl Iterator<Item = &ToolOutput> {
        self.tool_outputs.iter().filter(|t| t.failed)
    }
}

/// Inspectable trace of a request: the plan and what came of it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPath {
    #[serde(flatten)]
    pub plan: ExecutionPlan,

    #[serde(flatten)]
    pub result: ExecutionResult,
}

impl ExecutionPath {
    pub fn new(plan: ExecutionPlan, result: ExecutionResult) -> Self {
        Self { plan, result }
    }
}

/// Final answer handed back to the conversation layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub execution_path: ExecutionPath,
    pub model_used: String,
}
