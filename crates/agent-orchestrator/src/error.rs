//! Error Types for the Orchestration Engine
//!
//! Recoverable failures (analysis, tool, synthesis) stay visible as values
//! next to the fallback that replaced them. Fatal failures abort the request
//! and carry whatever execution path was completed before the abort.

use agent_core::AgentError;
use thiserror::Error;

use crate::model::{ExecutionPath, ExecutionResult};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Analyzer could not obtain a usable task list
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis model call failed: {0}")]
    Call(#[source] AgentError),

    #[error("analysis response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("analysis response has no JSON object")]
    NoJson,

    #[error("analysis response has an empty task list")]
    EmptyTasks,
}

/// Synthesizer could not obtain a final answer from a model
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis model call failed: {0}")]
    Call(#[source] AgentError),

    #[error("synthesis model returned an empty response")]
    EmptyResponse,
}

/// Dependency graph is not a valid DAG over the plan's steps
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle among steps {nodes:?}")]
    Cycle { nodes: Vec<usize> },

    #[error("step {node} depends on unknown step {dependency}")]
    UnknownNode { node: usize, dependency: usize },

    #[error("step {node} depends on later step {dependency}")]
    ForwardDependency { node: usize, dependency: usize },

    #[error("graph and plan disagree about step {node}")]
    MissingStep { node: usize },
}

/// A step's model call failed; execution stopped there
#[derive(Error, Debug)]
#[error("step {step_index} failed: {cause}")]
pub struct StepExecutionError {
    pub step_index: usize,

    #[source]
    pub cause: AgentError,

    /// Everything recorded before the failure
    pub partial: ExecutionResult,
}

/// Execution engine failure
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Step(#[from] Box<StepExecutionError>),

    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] GraphError),
}

/// Fatal request failure returned by `Orchestrator::process_request`
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// No models registered; nothing was called
    #[error("no capable model is registered")]
    NoCapableModel,

    #[error("step {step_index} failed: {cause}")]
    StepExecution {
        step_index: usize,
        #[source]
        cause: AgentError,
        execution_path: Box<ExecutionPath>,
    },

    #[error("request cancelled")]
    Cancelled {
        execution_path: Option<Box<ExecutionPath>>,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] GraphError),
}

impl OrchestratorError {
    /// Steps completed before the failure, if execution had started
    pub fn execution_path(&self) -> Option<&ExecutionPath> {
        match self {
            OrchestratorError::StepExecution { execution_path, .. } => Some(execution_path),
            OrchestratorError::Cancelled { execution_path } => execution_path.as_deref(),
            OrchestratorError::NoCapableModel | OrchestratorError::InvalidPlan(_) => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::NoCapableModel => "NO_CAPABLE_MODEL",
            OrchestratorError::StepExecution { .. } => "STEP_FAILED",
            OrchestratorError::Cancelled { .. } => "CANCELLED",
            OrchestratorError::InvalidPlan(_) => "INVALID_PLAN",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::NoCapableModel => {
                "No AI model is configured. Please contact the administrator.".into()
            }
            OrchestratorError::StepExecution { step_index, cause, .. } => format!(
                "The agent got partway through but step {} failed. {}",
                step_index,
                cause.user_message()
            ),
            OrchestratorError::Cancelled { .. } => "The request was cancelled before it finished.".into(),
            OrchestratorError::InvalidPlan(_) => "The agent produced an invalid plan.".into(),
        }
    }
}
