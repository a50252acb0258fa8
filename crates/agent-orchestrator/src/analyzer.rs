//! Request Analyzer
//!
//! One model call decomposes the user request into typed, prioritized tasks
//! plus tool and model-type hints. Anything unusable in the reply collapses
//! into a single reasoning task covering the whole request.

use std::sync::Arc;

use agent_core::message::truncate_chars;
use agent_core::{CallSettings, Message, ModelCaller, ResolvedContext};
use serde::{Deserialize, Serialize};

use crate::budget::CallBudget;
use crate::config::{OrchestratorConfig, RetryPolicy};
use crate::error::AnalysisError;
use crate::model::{CapabilityDescriptor, Task, TaskType};

/// Instruction prompt for the analysis call
pub const ANALYSIS_PROMPT: &str = r#"You are a task planner for a multi-model assistant.

Decompose the user's request into the smallest set of sub-tasks needed to answer it.
Respond with ONLY a JSON object in exactly this shape:

{"tasks":[{"description":"...","type":"reasoning|code|data|visual","priority":1}],"suggestedTools":["tool_name"],"modelTypes":["general"]}

Rules:
- "type" is one of: reasoning, code, data, visual
- "priority" is an integer from 1 (lowest) to 5 (highest)
- list tasks in the order they should naturally be done
- only suggest tools from the list below
- "modelTypes" names the kinds of model needed (e.g. general, code, reasoning, data, visual)"#;

/// Default priority for the fallback task
const FALLBACK_PRIORITY: u8 = 3;

/// Structured decomposition of a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tasks: Vec<Task>,

    #[serde(rename = "suggestedTools")]
    pub suggested_tools: Vec<String>,

    #[serde(rename = "modelTypes")]
    pub model_types: Vec<String>,
}

/// Wire shape; priority is clamped after parsing
#[derive(Deserialize)]
struct RawAnalysis {
    tasks: Vec<RawTask>,
    #[serde(rename = "suggestedTools")]
    suggested_tools: Vec<String>,
    #[serde(rename = "modelTypes")]
    model_types: Vec<String>,
}

#[derive(Deserialize)]
struct RawTask {
    description: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    priority: i64,
}

impl AnalysisResult {
    /// The whole request as one reasoning task. Never fails.
    pub fn fallback(request: &str) -> Self {
        Self {
            tasks: vec![Task::new(request, TaskType::Reasoning, FALLBACK_PRIORITY)],
            suggested_tools: Vec::new(),
            model_types: vec!["general".into()],
        }
    }

    /// Parse a model reply (bare JSON, fenced block, or embedded object)
    pub fn parse(content: &str) -> Result<Self, AnalysisError> {
        let json = extract_json(content).ok_or(AnalysisError::NoJson)?;
        let raw: RawAnalysis = serde_json::from_str(json)?;

        if raw.tasks.is_empty() {
            return Err(AnalysisError::EmptyTasks);
        }

        let tasks = raw
            .tasks
            .into_iter()
            .map(|t| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let priority = t.priority.clamp(1, 5) as u8;
                Task::new(t.description, t.task_type, priority)
            })
            .collect();

        Ok(Self {
            tasks,
            suggested_tools: raw.suggested_tools,
            model_types: raw.model_types,
        })
    }
}

/// Locate the JSON object inside a model reply
fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if let Some(fence) = trimmed.find("```") {
        let after = &trimmed[fence + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Analysis outcome; `recovered_from` is set when the fallback was used
#[derive(Debug)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub recovered_from: Option<AnalysisError>,
}

impl Analysis {
    pub fn used_fallback(&self) -> bool {
        self.recovered_from.is_some()
    }
}

/// Decomposes requests with one model call
pub struct RequestAnalyzer {
    caller: Arc<dyn ModelCaller>,
    temperature: f32,
    max_tokens: u32,
    max_context_chars: usize,
    retry: RetryPolicy,
}

impl RequestAnalyzer {
    pub fn new(caller: Arc<dyn ModelCaller>, config: &OrchestratorConfig) -> Self {
        Self {
            caller,
            temperature: config.analysis_temperature,
            max_tokens: config.max_tokens,
            max_context_chars: config.max_context_chars,
            retry: config.analysis_retry.clone(),
        }
    }

    /// Build the analysis messages
    pub fn build_messages(
        &self,
        request: &str,
        prior_context: &[ResolvedContext],
        tools: &[CapabilityDescriptor],
    ) -> Vec<Message> {
        let mut system = String::from(ANALYSIS_PROMPT);
        system.push_str("\n\nAvailable tools:\n");
        if tools.is_empty() {
            system.push_str("(none)\n");
        }
        for tool in tools {
            let tags: Vec<&str> = tool.capability_tags.iter().map(String::as_str).collect();
            system.push_str(&format!("- {} [{}]\n", tool.identifier, tags.join(", ")));
        }

        let mut user = String::new();
        if !prior_context.is_empty() {
            let joined = prior_context
                .iter()
                .map(|c| format!("[{}]\n{}", c.reference, c.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            user.push_str("Conversation context:\n");
            user.push_str(&truncate_chars(&joined, self.max_context_chars));
            user.push_str("\n\n");
        }
        user.push_str("Request:\n");
        user.push_str(request);

        vec![Message::system(system), Message::user(user)]
    }

    /// Analyze without fallback; errors are returned as-is
    pub async fn try_analyze(
        &self,
        request: &str,
        prior_context: &[ResolvedContext],
        tools: &[CapabilityDescriptor],
        model: &CapabilityDescriptor,
        budget: &CallBudget,
    ) -> Result<AnalysisResult, AnalysisError> {
        let messages = self.build_messages(request, prior_context, tools);
        let settings = CallSettings::for_model(&model.identifier)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(model = %model.qualified_name(), "Analyzing request");
        let completion = budget
            .run_with_retry(&self.retry, "analysis", || {
                self.caller.call(&model.provider_id, &messages, &settings)
            })
            .await
            .map_err(AnalysisError::Call)?;

        AnalysisResult::parse(&completion.content)
    }

    /// Analyze, replacing any failure with the single-task fallback
    pub async fn analyze(
        &self,
        request: &str,
        prior_context: &[ResolvedContext],
        tools: &[CapabilityDescriptor],
        model: &CapabilityDescriptor,
        budget: &CallBudget,
    ) -> Analysis {
        match self.try_analyze(request, prior_context, tools, model, budget).await {
            Ok(result) => Analysis {
                result,
                recovered_from: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Analysis failed, using single-task fallback");
                Analysis {
                    result: AnalysisResult::fallback(request),
                    recovered_from: Some(e),
                }
            }
        }
    }
}
