//! # agent-orchestrator
//!
//! The Agent Task Orchestration Engine. Turns one free-form request into a
//! plan of typed sub-tasks, runs each on a capability-matched model and
//! tools, and folds the partial results into a single answer with an
//! inspectable execution trace.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌─────────────┐
//! │ Request  │──▶│ Analyzer │──▶│ PlanBuilder │──▶│ Execution │──▶│ Synthesizer │──▶ AgentResponse
//! └──────────┘   └────┬─────┘   └──────┬──────┘   │  Engine   │   └──────┬──────┘
//!                     │                │          └─────┬─────┘          │
//!                     └────────────────┴──── CapabilityRegistry ─────────┘
//! ```
//!
//! Recoverable failures (analysis, tool, synthesis) are replaced by
//! fallbacks and kept as values; fatal ones surface as
//! [`OrchestratorError`] with the partial [`ExecutionPath`] attached.
//!
//! ## Example
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::new(router, registry, OrchestratorConfig::from_env()?);
//! let response = orchestrator
//!     .process_request(AgentRequest::new("Find the population of France"), CancellationToken::new())
//!     .await?;
//! println!("{}", response.response);
//! ```

pub mod analyzer;
pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod planner;
pub mod registry;
pub mod synthesizer;

pub use analyzer::{Analysis, AnalysisResult, RequestAnalyzer};
pub use budget::CallBudget;
pub use config::{OrchestratorConfig, RetryPolicy};
pub use engine::{AgentRequest, Orchestrator};
pub use error::{
    AnalysisError, ExecutionError, GraphError, OrchestratorError, Result, StepExecutionError,
    SynthesisError,
};
pub use executor::ExecutionEngine;
pub use graph::DependencyGraph;
pub use model::{
    AgentResponse, CapabilityDescriptor, CapabilityKind, ExecutionPath, ExecutionPlan,
    ExecutionResult, ExecutionState, PlanStep, StepResult, Task, TaskType, ToolOutput,
};
pub use planner::PlanBuilder;
pub use registry::{CapabilityRegistry, RankedPreference, SelectionStrategy};
pub use synthesizer::{ResultSynthesizer, Synthesis};

// Callers need the token type to drive `process_request`
pub use tokio_util::sync::CancellationToken;
