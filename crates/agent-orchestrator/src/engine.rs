//! Orchestrator
//!
//! `request → analyze → plan → execute → synthesize → AgentResponse`.
//!
//! Each request captures one registry snapshot at start, so
//! [`Orchestrator::refresh_registry`] never affects a plan in flight.

use std::sync::Arc;

use agent_core::{
    ContextItem, ContextProvider, HistoryRecord, HistorySink, ModelCaller, ResolvedContext,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::analyzer::RequestAnalyzer;
use crate::budget::CallBudget;
use crate::config::OrchestratorConfig;
use crate::error::{ExecutionError, OrchestratorError, Result};
use crate::executor::ExecutionEngine;
use crate::model::{AgentResponse, CapabilityDescriptor, ExecutionPath, ExecutionPlan};
use crate::planner::PlanBuilder;
use crate::registry::CapabilityRegistry;
use crate::synthesizer::ResultSynthesizer;

/// User id recorded when the caller supplies none
pub const ANONYMOUS_USER: &str = "anonymous";

/// One incoming request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRequest {
    pub request: String,

    #[serde(default = "anonymous")]
    pub user_id: String,

    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub prior_context: Vec<ContextItem>,
}

fn anonymous() -> String {
    ANONYMOUS_USER.to_string()
}

impl AgentRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            user_id: anonymous(),
            conversation_id: None,
            prior_context: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_context(mut self, item: ContextItem) -> Self {
        self.prior_context.push(item);
        self
    }
}

/// The Agent Task Orchestration Engine
pub struct Orchestrator {
    caller: Arc<dyn ModelCaller>,
    registry: RwLock<Arc<CapabilityRegistry>>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    history: Option<Arc<dyn HistorySink>>,
    analyzer: RequestAnalyzer,
    synthesizer: ResultSynthesizer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(caller: Arc<dyn ModelCaller>, registry: CapabilityRegistry, config: OrchestratorConfig) -> Self {
        Self {
            analyzer: RequestAnalyzer::new(caller.clone(), &config),
            synthesizer: ResultSynthesizer::new(caller.clone(), &config),
            caller,
            registry: RwLock::new(Arc::new(registry)),
            context_provider: None,
            history: None,
            config,
        }
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current registry snapshot
    pub async fn registry(&self) -> Arc<CapabilityRegistry> {
        self.registry.read().await.clone()
    }

    /// Swap in a new registry; requests already running keep their snapshot
    pub async fn refresh_registry(&self, registry: CapabilityRegistry) {
        tracing::info!(
            models = registry.list_models().len(),
            tools = registry.list_tools().len(),
            "Capability registry refreshed"
        );
        *self.registry.write().await = Arc::new(registry);
    }

    /// Process one request end to end.
    ///
    /// Cancelling `token` stops every outstanding model and tool call.
    pub async fn process_request(
        &self,
        request: AgentRequest,
        token: CancellationToken,
    ) -> Result<AgentResponse> {
        let registry = self.registry().await;
        let budget = CallBudget::new(token, self.config.call_timeout())
            .with_request_timeout(self.config.request_timeout());

        let analysis_model = Self::analysis_model(&registry)?.clone();
        tracing::info!(
            user = %request.user_id,
            conversation = ?request.conversation_id,
            analysis_model = %analysis_model.qualified_name(),
            "Processing request"
        );

        let context = self.resolve_context(&request.prior_context, &budget).await;

        let analysis = self
            .analyzer
            .analyze(&request.request, &context, registry.list_tools(), &analysis_model, &budget)
            .await;
        if budget.is_cancelled() {
            return Err(OrchestratorError::Cancelled { execution_path: None });
        }

        let plan = PlanBuilder::build_plan(&request.request, &analysis.result, &registry)?;

        let engine = ExecutionEngine::new(self.caller.clone(), registry.tools().clone(), &self.config);
        let result = match engine.execute(&plan, &context, &budget).await {
            Ok(result) => result,
            Err(ExecutionError::Step(failure)) => {
                let failure = *failure;
                let execution_path = Box::new(ExecutionPath::new(plan, failure.partial));
                return Err(if failure.cause.is_cancelled() {
                    OrchestratorError::Cancelled {
                        execution_path: Some(execution_path),
                    }
                } else {
                    OrchestratorError::StepExecution {
                        step_index: failure.step_index,
                        cause: failure.cause,
                        execution_path,
                    }
                });
            }
            Err(ExecutionError::InvalidPlan(e)) => return Err(e.into()),
        };

        let synthesis_model = Self::synthesis_model(&registry, &plan).clone();
        let synthesis = self
            .synthesizer
            .synthesize(&plan, &result, &synthesis_model, &budget)
            .await;
        let execution_path = ExecutionPath::new(plan, result);
        if budget.is_cancelled() {
            return Err(OrchestratorError::Cancelled {
                execution_path: Some(Box::new(execution_path)),
            });
        }

        let model_used = synthesis
            .model_used
            .unwrap_or_else(|| execution_path.plan.primary_model.qualified_name());

        let response = AgentResponse {
            response: synthesis.response,
            execution_path,
            model_used,
        };

        self.save_history(&request, &response).await;

        tracing::info!(
            steps = response.execution_path.result.step_results.len(),
            state = ?response.execution_path.result.state,
            model = %response.model_used,
            "Request complete"
        );
        Ok(response)
    }

    /// Model for the analysis call; fails before any call when none exists
    fn analysis_model(registry: &CapabilityRegistry) -> Result<&CapabilityDescriptor> {
        registry
            .find_best_for_tag("analysis")
            .or_else(|| registry.find_best_for_tag("general"))
            .or_else(|| registry.first_model())
            .ok_or(OrchestratorError::NoCapableModel)
    }

    fn synthesis_model<'a>(registry: &'a CapabilityRegistry, plan: &'a ExecutionPlan) -> &'a CapabilityDescriptor {
        registry.find_best_for_tag("synthesis").unwrap_or(&plan.primary_model)
    }

    /// Inline content is used as-is; references go through the provider.
    /// Anything unresolved is skipped.
    async fn resolve_context(&self, items: &[ContextItem], budget: &CallBudget) -> Vec<ResolvedContext> {
        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let content = match (&item.content, &self.context_provider) {
                (Some(content), _) => Some(content.clone()),
                (None, Some(provider)) => match budget.run(provider.resolve(&item.reference)).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(reference = %item.reference, error = %e, "Context resolution failed");
                        None
                    }
                },
                (None, None) => None,
            };

            match content {
                Some(content) => resolved.push(ResolvedContext {
                    reference: item.reference.clone(),
                    content,
                }),
                None => tracing::warn!(reference = %item.reference, "Skipping unresolved context reference"),
            }
        }
        resolved
    }

    /// Persist the response; failures are logged, never returned
    async fn save_history(&self, request: &AgentRequest, response: &AgentResponse) {
        let Some(sink) = &self.history else {
            return;
        };

        let execution_path = serde_json::to_value(&response.execution_path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to serialize execution path");
            serde_json::Value::Null
        });
        let record = HistoryRecord::new(
            request.user_id.clone(),
            request.conversation_id.clone(),
            request.request.clone(),
            execution_path,
            response.response.clone(),
            response.model_used.clone(),
        );

        if let Err(e) = sink.save(record).await {
            tracing::warn!(error = %e, "Failed to save execution history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionState, TaskType};
    use agent_core::mock::{MockProvider, MockReply};
    use agent_core::tool::CalculatorTool;
    use agent_core::{AgentError, MemoryHistorySink, StaticContextProvider, Tool, ToolRegistry, ToolSchema};
    use async_trait::async_trait;

    const POPULATION_REQUEST: &str = "Find the population of France and compute its square root";
    const ANALYSIS_MARKER: &str = "Decompose the user's request";
    const SYNTHESIS_MARKER: &str = "final stage of a multi-model assistant";

    fn population_analysis(tools: &str) -> MockReply {
        MockReply::Text(format!(
            r#"```json
{{"tasks":[{{"description":"Find the population of France","type":"data","priority":4}},{{"description":"Compute its square root","type":"code","priority":5}}],"suggestedTools":[{}],"modelTypes":["general"]}}
```"#,
            tools
        ))
    }

    fn population_mock() -> MockProvider {
        MockProvider::echo("m")
            .with_rule(ANALYSIS_MARKER, population_analysis(r#""calculate""#))
            .with_rule(SYNTHESIS_MARKER, MockReply::Text("France has about 68 million people; the square root is about 8246.".into()))
            .with_rule("Your task:\nFind the population of France", MockReply::Text("68000000".into()))
            .with_rule("Your task:\nCompute its square root", MockReply::Text("sqrt(68000000)".into()))
    }

    fn registry_with(tools: ToolRegistry) -> CapabilityRegistry {
        CapabilityRegistry::with_preferences(
            vec![
                CapabilityDescriptor::model("openai", "gpt-4o", ["general"]),
                CapabilityDescriptor::model("deepseek", "deepseek-coder", ["code"]),
            ],
            tools,
            &OrchestratorConfig::default(),
        )
    }

    fn registry() -> CapabilityRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        registry_with(tools)
    }

    fn build(mock: &Arc<MockProvider>, registry: CapabilityRegistry) -> Orchestrator {
        Orchestrator::new(mock.clone(), registry, OrchestratorConfig::default())
    }

    struct BrokenSearch;

    #[async_trait]
    impl Tool for BrokenSearch {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "web_search".into(),
                description: "search the web".into(),
                capability_tags: vec!["data".into()],
                has_side_effects: false,
            }
        }

        async fn execute(&self, _input: &str) -> agent_core::Result<String> {
            Err(AgentError::ToolExecution("search quota exhausted".into()))
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl HistorySink for BrokenSink {
        async fn save(&self, _record: HistoryRecord) -> agent_core::Result<()> {
            Err(AgentError::History("database offline".into()))
        }
    }

    #[tokio::test]
    async fn test_population_end_to_end() {
        let mock = Arc::new(population_mock());
        let orchestrator = build(&mock, registry());

        let response = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.response, "France has about 68 million people; the square root is about 8246.");
        assert_eq!(response.model_used, "openai/gpt-4o");

        let path = &response.execution_path;
        // Presented by priority, executed along the analyzer-order chain
        assert_eq!(path.plan.steps[0].task.task_type, TaskType::Code);
        assert_eq!(path.plan.steps[1].task.task_type, TaskType::Data);
        let executed: Vec<usize> = path.result.step_results.iter().map(|r| r.step_index).collect();
        assert_eq!(executed, vec![0, 1]);
        assert_eq!(path.result.step_output(0), Some("68000000"));
        assert_eq!(path.result.state, ExecutionState::Completed);
        assert!(path
            .result
            .tool_outputs
            .iter()
            .any(|t| t.step_index == 1 && t.output.starts_with("sqrt(68000000) = 8246.2")));

        let calls = mock.calls().await;
        assert_eq!(calls.len(), 4);
        assert!(calls[1].prompt.contains("Your task:\nFind the population of France"));
        assert!(calls[2].prompt.contains("Your task:\nCompute its square root"));
        assert_eq!(calls[2].provider_id.as_deref(), Some("deepseek"));
    }

    #[tokio::test]
    async fn test_zero_models_fails_before_any_call() {
        let mock = Arc::new(population_mock());
        let empty = CapabilityRegistry::with_preferences(Vec::new(), ToolRegistry::new(), &OrchestratorConfig::default());
        let orchestrator = build(&mock, empty);

        let err = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::NoCapableModel));
        assert_eq!(err.code(), "NO_CAPABLE_MODEL");
        assert!(err.execution_path().is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_analysis_yields_single_reasoning_step() {
        let mock = Arc::new(MockProvider::echo("m").with_rule(ANALYSIS_MARKER, MockReply::Text("not json".into())));
        let orchestrator = build(&mock, registry());

        let response = orchestrator
            .process_request(AgentRequest::new("Why is the sky blue?"), CancellationToken::new())
            .await
            .unwrap();

        let steps = &response.execution_path.plan.steps;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].task.task_type, TaskType::Reasoning);
        assert_eq!(steps[0].task.priority, 3);
        assert_eq!(steps[0].task.description, "Why is the sky blue?");
    }

    #[tokio::test]
    async fn test_synthesis_failure_joins_step_outputs() {
        let mock = Arc::new(
            MockProvider::echo("m")
                .with_rule(ANALYSIS_MARKER, population_analysis(""))
                .with_rule(SYNTHESIS_MARKER, MockReply::Fail("overloaded".into()))
                .with_rule("Your task:\nFind the population of France", MockReply::Text("68000000".into()))
                .with_rule("Your task:\nCompute its square root", MockReply::Text("8246.21".into())),
        );
        let orchestrator = build(&mock, registry());

        let response = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.response, "68000000\n\n8246.21");
        assert_eq!(response.model_used, "openai/gpt-4o");
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_stop_the_plan() {
        let mut tools = ToolRegistry::new();
        tools.register(BrokenSearch);
        let mock = Arc::new(
            MockProvider::echo("m")
                .with_rule(ANALYSIS_MARKER, population_analysis(r#""web_search""#))
                .with_rule(SYNTHESIS_MARKER, MockReply::Text("done".into())),
        );
        let orchestrator = build(&mock, registry_with(tools));

        let response = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .unwrap();

        let result = &response.execution_path.result;
        assert_eq!(result.state, ExecutionState::PartiallyCompleted);
        assert_eq!(result.step_results.len(), 2);
        let failed: Vec<_> = result.failed_tools().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].tool_name, "web_search");
        assert_eq!(failed[0].step_index, 0);
    }

    #[tokio::test]
    async fn test_step_failure_returns_partial_path() {
        let failing = Arc::new(
            MockProvider::echo("m")
                .with_rule(ANALYSIS_MARKER, population_analysis(""))
                .with_rule("Your task:\nCompute its square root", MockReply::Fail("HTTP 500".into())),
        );
        let orchestrator = build(&failing, registry());

        let err = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "STEP_FAILED");
        let OrchestratorError::StepExecution { step_index, .. } = &err else {
            panic!("expected step failure, got {err:?}");
        };
        assert_eq!(*step_index, 1);
        let path = err.execution_path().unwrap();
        assert_eq!(path.result.state, ExecutionState::Aborted);
        assert_eq!(path.result.step_results.len(), 1);
        assert_eq!(path.plan.steps.len(), 2);
        // No synthesis call after the abort
        assert_eq!(failing.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let mock = Arc::new(population_mock());
        let orchestrator = build(&mock, registry());
        let token = CancellationToken::new();
        token.cancel();

        let err = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), token)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CANCELLED");
        assert_eq!(mock.call_count(), 0);
    }

    /// Cancels the request as soon as a prompt containing `needle` arrives,
    /// then never answers it
    struct CancelOnPrompt {
        inner: Arc<MockProvider>,
        needle: &'static str,
        token: CancellationToken,
    }

    #[async_trait]
    impl ModelCaller for CancelOnPrompt {
        async fn call(
            &self,
            provider_id: &str,
            messages: &[agent_core::Message],
            settings: &agent_core::CallSettings,
        ) -> agent_core::Result<agent_core::Completion> {
            if messages.iter().any(|m| m.content.contains(self.needle)) {
                self.token.cancel();
                std::future::pending::<()>().await;
            }
            self.inner.call(provider_id, messages, settings).await
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_plan_keeps_completed_steps() {
        let mock = Arc::new(population_mock());
        let token = CancellationToken::new();
        let caller = Arc::new(CancelOnPrompt {
            inner: mock.clone(),
            needle: "Your task:\nCompute its square root",
            token: token.clone(),
        });
        let orchestrator = Orchestrator::new(caller, registry(), OrchestratorConfig::default());

        let err = orchestrator
            .process_request(AgentRequest::new(POPULATION_REQUEST), token)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CANCELLED");
        let OrchestratorError::Cancelled { execution_path: Some(path) } = &err else {
            panic!("expected cancellation with a path, got {err:?}");
        };
        assert_eq!(path.result.state, ExecutionState::Aborted);
        assert_eq!(path.result.step_results.len(), 1);
        assert_eq!(path.result.step_output(0), Some("68000000"));
        assert_eq!(path.plan.steps.len(), 2);
        // Analysis and step 0 reached the model; synthesis never did
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_history_saved_and_failures_ignored() {
        let sink = Arc::new(MemoryHistorySink::new());
        let mock = Arc::new(population_mock());
        let orchestrator = build(&mock, registry()).with_history(sink.clone());

        orchestrator
            .process_request(
                AgentRequest::new(POPULATION_REQUEST).with_user("alice").with_conversation("conv-1"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let records = sink.list(Some("alice"), Some("conv-1"), 10).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model_used, "openai/gpt-4o");
        assert_eq!(records[0].execution_path["steps"].as_array().map(Vec::len), Some(2));

        let broken = build(&mock, registry()).with_history(Arc::new(BrokenSink));
        assert!(broken
            .process_request(AgentRequest::new(POPULATION_REQUEST), CancellationToken::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_context_resolution() {
        let provider = StaticContextProvider::new().with_entry("ctx_1a2b3c4d", "Uploaded: france_census.csv (68.0M rows)");
        let mock = Arc::new(population_mock());
        let orchestrator = build(&mock, registry()).with_context_provider(Arc::new(provider));

        let request = AgentRequest::new(POPULATION_REQUEST)
            .with_context(ContextItem::reference("ctx_1a2b3c4d"))
            .with_context(ContextItem::reference("ctx_unknown0"))
            .with_context(ContextItem::inline("ctx_inline01", "User prefers metric units"));
        orchestrator.process_request(request, CancellationToken::new()).await.unwrap();

        let analysis_prompt = &mock.calls().await[0].prompt;
        assert!(analysis_prompt.contains("[ctx_1a2b3c4d]\nUploaded: france_census.csv"));
        assert!(analysis_prompt.contains("[ctx_inline01]\nUser prefers metric units"));
        assert!(!analysis_prompt.contains("ctx_unknown0"));
    }

    #[tokio::test]
    async fn test_refresh_applies_to_next_request() {
        let mock = Arc::new(population_mock());
        let orchestrator = build(
            &mock,
            CapabilityRegistry::with_preferences(
                vec![CapabilityDescriptor::model("ollama", "llama3.2", ["general"])],
                ToolRegistry::new(),
                &OrchestratorConfig::default(),
            ),
        );

        orchestrator
            .process_request(AgentRequest::new("hello"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.calls().await[0].provider_id.as_deref(), Some("ollama"));

        orchestrator.refresh_registry(registry()).await;
        assert_eq!(orchestrator.registry().await.list_models().len(), 2);

        let before = mock.call_count();
        orchestrator
            .process_request(AgentRequest::new("hello"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.calls().await[before].provider_id.as_deref(), Some("openai"));
    }
}
