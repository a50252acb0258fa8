//! Execution Engine
//!
//! Walks the plan's dependency graph one layer at a time. Steps inside a
//! layer, and the tools of a single step, run concurrently up to
//! `max_concurrency`. Results are always recorded in step-index order.
//!
//! A failed model call aborts the run (later steps may need its output); a
//! failed tool is recorded and the run continues.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use agent_core::message::truncate_chars;
use agent_core::{AgentError, CallSettings, Message, ModelCaller, ResolvedContext, ToolRegistry};
use futures::stream::{self, StreamExt};

use crate::budget::CallBudget;
use crate::config::OrchestratorConfig;
use crate::error::{ExecutionError, GraphError, StepExecutionError};
use crate::model::{
    CapabilityDescriptor, ExecutionPlan, ExecutionResult, ExecutionState, PlanStep, StepResult,
    TaskType, ToolOutput,
};

/// System prompt shared by every step call
pub const STEP_PROMPT: &str = "You are executing one step of a larger plan that answers a user's request. \
Do only the task you are given; later steps and a final synthesis will build on your output. \
Be concise and precise.";

fn task_guidance(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Reasoning => "Reason step by step and state your conclusion clearly.",
        TaskType::Code => "Write exact code or computations. Put each arithmetic expression on its own line.",
        TaskType::Data => "Give concrete figures and name where they come from.",
        TaskType::Visual => "Describe the visual output precisely (chart type, axes, series).",
    }
}

/// What one step produced
struct StepOutcome {
    index: usize,
    outcome: Result<CompletedStep, AgentError>,
}

struct CompletedStep {
    result: StepResult,
    tools: Vec<ToolOutput>,
    trace: Vec<String>,
}

/// Step and tool outputs gathered so far, keyed by step index
#[derive(Default)]
struct Progress {
    steps: BTreeMap<usize, StepResult>,
    tools: BTreeMap<usize, Vec<ToolOutput>>,
    trace: Vec<String>,
}

impl Progress {
    fn into_result(self, state: ExecutionState) -> ExecutionResult {
        ExecutionResult {
            state,
            step_results: self.steps.into_values().collect(),
            tool_outputs: self.tools.into_values().flatten().collect(),
            reasoning_trace: self.trace,
        }
    }
}

/// Runs execution plans against a model caller and a tool set
pub struct ExecutionEngine {
    caller: Arc<dyn ModelCaller>,
    tools: ToolRegistry,
    max_concurrency: usize,
    max_dependency_chars: usize,
    max_context_chars: usize,
    temperature: f32,
    max_tokens: u32,
}

impl ExecutionEngine {
    pub fn new(caller: Arc<dyn ModelCaller>, tools: ToolRegistry, config: &OrchestratorConfig) -> Self {
        Self {
            caller,
            tools,
            max_concurrency: config.max_concurrency.max(1),
            max_dependency_chars: config.max_dependency_chars,
            max_context_chars: config.max_context_chars,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Execute every step of `plan`.
    ///
    /// On a step failure the error carries everything recorded before it.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        prior_context: &[ResolvedContext],
        budget: &CallBudget,
    ) -> Result<ExecutionResult, ExecutionError> {
        let layers = Self::schedule(plan)?;
        let mut progress = Progress::default();

        progress.trace.push(format!(
            "Executing {} step(s) in {} layer(s) with primary model {}",
            plan.steps.len(),
            layers.len(),
            plan.primary_model.qualified_name()
        ));
        tracing::info!(steps = plan.steps.len(), layers = layers.len(), "Executing plan");

        for layer in layers {
            if let Err(cause) = budget.check() {
                let step_index = layer.first().copied().unwrap_or_default();
                return Err(Self::abort(progress, step_index, cause));
            }

            let steps: Vec<&PlanStep> = layer.iter().filter_map(|idx| plan.step(*idx)).collect();
            let context = &progress;
            let pending: Vec<_> = steps
                .into_iter()
                .map(|step| async move {
                    StepOutcome {
                        index: step.index,
                        outcome: self.run_step(plan, step, context, prior_context, budget).await,
                    }
                })
                .collect();
            let mut outcomes: Vec<StepOutcome> = stream::iter(pending)
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
            outcomes.sort_by_key(|o| o.index);

            let mut failure = None;
            for StepOutcome { index, outcome } in outcomes {
                match outcome {
                    Ok(done) => {
                        progress.trace.extend(done.trace);
                        progress.steps.insert(index, done.result);
                        progress.tools.insert(index, done.tools);
                    }
                    Err(cause) if failure.is_none() => failure = Some((index, cause)),
                    Err(cause) => {
                        tracing::warn!(step = index, error = %cause, "Additional step failure in layer");
                    }
                }
            }

            if let Some((step_index, cause)) = failure {
                return Err(Self::abort(progress, step_index, cause));
            }
        }

        let state = if progress.tools.values().flatten().any(|t| t.failed) {
            ExecutionState::PartiallyCompleted
        } else {
            ExecutionState::Completed
        };
        progress.trace.push(format!(
            "Execution finished: {} step(s), {} tool call(s), state {:?}",
            progress.steps.len(),
            progress.tools.values().map(Vec::len).sum::<usize>(),
            state
        ));
        Ok(progress.into_result(state))
    }

    /// Topological layers, checked against the plan's steps
    fn schedule(plan: &ExecutionPlan) -> Result<Vec<Vec<usize>>, GraphError> {
        let graph = &plan.dependency_graph;
        graph.validate()?;

        let graph_nodes: BTreeSet<usize> = graph.nodes().collect();
        let step_nodes: BTreeSet<usize> = plan.steps.iter().map(|s| s.index).collect();
        if let Some(node) = graph_nodes.symmetric_difference(&step_nodes).next() {
            return Err(GraphError::MissingStep { node: *node });
        }

        graph.layers()
    }

    fn abort(mut progress: Progress, step_index: usize, cause: AgentError) -> ExecutionError {
        tracing::error!(step = step_index, error = %cause, "Step failed, aborting execution");
        progress
            .trace
            .push(format!("Step {} failed: {}. Execution aborted.", step_index, cause));
        ExecutionError::Step(Box::new(StepExecutionError {
            step_index,
            cause,
            partial: progress.into_result(ExecutionState::Aborted),
        }))
    }

    async fn run_step(
        &self,
        plan: &ExecutionPlan,
        step: &PlanStep,
        progress: &Progress,
        prior_context: &[ResolvedContext],
        budget: &CallBudget,
    ) -> Result<CompletedStep, AgentError> {
        let dependencies: Vec<usize> = plan.dependency_graph.dependencies(step.index).collect();
        let dependency_text = self.dependency_text(plan, &dependencies, progress);
        let messages = self.build_step_messages(&plan.request_text, step, &dependency_text, prior_context);

        let model = &step.assigned_model;
        let settings = CallSettings::for_model(&model.identifier)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(step = step.index, model = %model.qualified_name(), "Running step");
        let completion = budget
            .run(self.caller.call(&model.provider_id, &messages, &settings))
            .await?;

        if completion.content.trim().is_empty() {
            return Err(AgentError::Provider(format!(
                "{} returned an empty completion",
                model.qualified_name()
            )));
        }
        let output = completion.content;

        let pending: Vec<_> = step
            .assigned_tools
            .iter()
            .map(|tool| self.run_tool(tool, step.index, &output, budget))
            .collect();
        let tools: Vec<ToolOutput> = stream::iter(pending)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut trace = vec![format!(
            "Step {} [{}, priority {}] \"{}\" answered by {} ({} chars)",
            step.index,
            step.task.task_type,
            step.task.priority,
            step.task.description,
            model.qualified_name(),
            output.chars().count()
        )];
        for tool in &tools {
            trace.push(match &tool.error {
                Some(error) => format!("  tool {} failed: {}", tool.tool_name, error),
                None => format!("  tool {} succeeded ({} chars)", tool.tool_name, tool.output.chars().count()),
            });
        }

        Ok(CompletedStep {
            result: StepResult {
                step_index: step.index,
                output,
                task_type: step.task.task_type,
                model: model.qualified_name(),
            },
            tools,
            trace,
        })
    }

    async fn run_tool(
        &self,
        tool: &CapabilityDescriptor,
        step_index: usize,
        input: &str,
        budget: &CallBudget,
    ) -> ToolOutput {
        let name = &tool.identifier;
        match budget.run(self.tools.execute(name, input)).await {
            Ok(output) => ToolOutput::success(name, step_index, output),
            Err(e) => {
                tracing::warn!(tool = %name, step = step_index, error = %e, "Tool failed");
                ToolOutput::failure(name, step_index, e.to_string())
            }
        }
    }

    /// Outputs of the declared dependencies, bounded in size
    fn dependency_text(&self, plan: &ExecutionPlan, dependencies: &[usize], progress: &Progress) -> String {
        let mut sections = Vec::new();
        for dep in dependencies {
            if let Some(result) = progress.steps.get(dep) {
                let description = plan.step(*dep).map_or("", |s| s.task.description.as_str());
                sections.push(format!("### Step {}: {}\n{}", dep, description, result.output));
            }
            for tool in progress.tools.get(dep).into_iter().flatten().filter(|t| !t.failed) {
                sections.push(format!("### Tool {} (step {})\n{}", tool.tool_name, dep, tool.output));
            }
        }
        truncate_chars(&sections.join("\n\n"), self.max_dependency_chars)
    }

    /// Messages for one step call
    pub fn build_step_messages(
        &self,
        request: &str,
        step: &PlanStep,
        dependency_text: &str,
        prior_context: &[ResolvedContext],
    ) -> Vec<Message> {
        let system = format!(
            "{}\n\nTask type: {}. {}",
            STEP_PROMPT,
            step.task.task_type,
            task_guidance(step.task.task_type)
        );

        let mut user = format!(
            "Original request:\n{}\n\nYour task:\n{}",
            request, step.task.description
        );
        if !dependency_text.is_empty() {
            user.push_str("\n\nResults from earlier steps:\n");
            user.push_str(dependency_text);
        }
        if !prior_context.is_empty() {
            let joined = prior_context
                .iter()
                .map(|c| format!("[{}]\n{}", c.reference, c.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            user.push_str("\n\nConversation context:\n");
            user.push_str(&truncate_chars(&joined, self.max_context_chars));
        }

        vec![Message::system(system), Message::user(user)]
    }
}
