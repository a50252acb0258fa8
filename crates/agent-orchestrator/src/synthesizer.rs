//! Result Synthesizer
//!
//! Merges step outputs, tool outputs and the reasoning trace into one
//! coherent answer with a single model call. If that call fails the step
//! outputs are concatenated in step order instead, so synthesis never fails
//! the request.

use std::sync::Arc;

use agent_core::message::truncate_chars;
use agent_core::{CallSettings, Message, ModelCaller};

use crate::budget::CallBudget;
use crate::config::{OrchestratorConfig, RetryPolicy};
use crate::error::SynthesisError;
use crate::model::{CapabilityDescriptor, ExecutionPlan, ExecutionResult};

pub const SYNTHESIS_PROMPT: &str = "You are the final stage of a multi-model assistant. \
Several specialised steps have already worked on the user's request. \
Combine their results into one clear, direct answer to the original request. \
Use tool results as ground truth where they apply and do not mention the internal steps.";

/// Synthesis outcome; `recovered_from` is set when the fallback was used
#[derive(Debug)]
pub struct Synthesis {
    pub response: String,

    /// `provider/identifier` of the model that wrote `response`;
    /// `None` when the fallback concatenation was used
    pub model_used: Option<String>,

    pub recovered_from: Option<SynthesisError>,
}

impl Synthesis {
    pub fn used_fallback(&self) -> bool {
        self.recovered_from.is_some()
    }
}

/// Produces the final answer for an executed plan
pub struct ResultSynthesizer {
    caller: Arc<dyn ModelCaller>,
    temperature: f32,
    max_tokens: u32,
    max_section_chars: usize,
    retry: RetryPolicy,
}

impl ResultSynthesizer {
    pub fn new(caller: Arc<dyn ModelCaller>, config: &OrchestratorConfig) -> Self {
        Self {
            caller,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_section_chars: config.max_dependency_chars,
            retry: config.synthesis_retry.clone(),
        }
    }

    /// Step outputs joined by blank lines, in step order
    pub fn fallback(result: &ExecutionResult) -> String {
        result
            .step_results
            .iter()
            .map(|r| r.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn build_messages(&self, plan: &ExecutionPlan, result: &ExecutionResult) -> Vec<Message> {
        let mut user = format!("Original request:\n{}\n", plan.request_text);

        if !result.reasoning_trace.is_empty() {
            user.push_str("\nExecution trace:\n");
            for line in &result.reasoning_trace {
                user.push_str(line);
                user.push('\n');
            }
        }

        user.push_str("\nStep results:\n");
        for step_result in &result.step_results {
            let description = plan
                .step(step_result.step_index)
                .map_or("", |s| s.task.description.as_str());
            user.push_str(&format!(
                "\n## {} ({})\n{}\n",
                description,
                step_result.task_type,
                truncate_chars(&step_result.output, self.max_section_chars)
            ));
        }

        if !result.tool_outputs.is_empty() {
            user.push_str("\nTool results:\n");
            for tool in &result.tool_outputs {
                let body = match &tool.error {
                    Some(error) => format!("(failed: {})", error),
                    None => truncate_chars(&tool.output, self.max_section_chars),
                };
                user.push_str(&format!("\n## {}\n{}\n", tool.tool_name, body));
            }
        }

        vec![Message::system(SYNTHESIS_PROMPT), Message::user(user)]
    }

    /// Synthesize without fallback
    pub async fn try_synthesize(
        &self,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
        model: &CapabilityDescriptor,
        budget: &CallBudget,
    ) -> Result<String, SynthesisError> {
        let messages = self.build_messages(plan, result);
        let settings = CallSettings::for_model(&model.identifier)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(model = %model.qualified_name(), "Synthesizing response");
        let completion = budget
            .run_with_retry(&self.retry, "synthesis", || {
                self.caller.call(&model.provider_id, &messages, &settings)
            })
            .await
            .map_err(SynthesisError::Call)?;

        let response = completion.content.trim();
        if response.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }
        Ok(response.to_string())
    }

    /// Synthesize, falling back to concatenated step outputs on any failure
    pub async fn synthesize(
        &self,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
        model: &CapabilityDescriptor,
        budget: &CallBudget,
    ) -> Synthesis {
        match self.try_synthesize(plan, result, model, budget).await {
            Ok(response) => Synthesis {
                response,
                model_used: Some(model.qualified_name()),
                recovered_from: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis failed, concatenating step outputs");
                Synthesis {
                    response: Self::fallback(result),
                    model_used: None,
                    recovered_from: Some(e),
                }
            }
        }
    }
}
