//! HTTP Handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use agent_core::{ContextItem, HistoryRecord};
use agent_orchestrator::{
    AgentRequest, AgentResponse, CancellationToken, CapabilityDescriptor, ExecutionPath,
    OrchestratorError,
};

use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub connected: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub providers: Vec<ProviderStatus>,
    pub models: usize,
    pub tools: usize,
}

#[derive(Serialize)]
pub struct CapabilitiesResponse {
    pub models: Vec<CapabilityDescriptor>,
    pub tools: Vec<CapabilityDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct AgentApiRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub context: Vec<ContextItem>,
}

#[derive(Debug, Serialize)]
pub struct AgentApiResponse {
    #[serde(flatten)]
    pub response: AgentResponse,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,

    /// Steps completed before a fatal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_path: Option<ExecutionPath>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            execution_path: None,
        }
    }
}

impl From<OrchestratorError> for ErrorResponse {
    fn from(e: OrchestratorError) -> Self {
        Self {
            error: e.user_message(),
            code: e.code().into(),
            execution_path: e.execution_path().cloned(),
        }
    }
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub models: usize,
    pub tools: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_for(error: &OrchestratorError) -> StatusCode {
    match error {
        OrchestratorError::NoCapableModel => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::StepExecution { .. } => StatusCode::BAD_GATEWAY,
        OrchestratorError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
        OrchestratorError::InvalidPlan(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = state
        .router
        .health()
        .await
        .into_iter()
        .map(|(id, connected)| ProviderStatus { id, connected })
        .collect();
    let registry = state.orchestrator.registry().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        providers,
        models: registry.list_models().len(),
        tools: registry.list_tools().len(),
    })
}

/// Registered models and tools
pub async fn list_capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    let registry = state.orchestrator.registry().await;
    Json(CapabilitiesResponse {
        models: registry.list_models().to_vec(),
        tools: registry.list_tools().to_vec(),
    })
}

/// Run one request through the orchestrator.
///
/// The request is cancelled if the client goes away before it finishes.
pub async fn agent_handler(
    State(state): State<AppState>,
    Json(payload): Json<AgentApiRequest>,
) -> Result<Json<AgentApiResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Message must not be empty", "EMPTY_MESSAGE")),
        ));
    }

    let conversation_id = payload
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut request = AgentRequest::new(payload.message).with_conversation(conversation_id.clone());
    if let Some(user_id) = payload.user_id {
        request = request.with_user(user_id);
    }
    request.prior_context = payload.context;

    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    let outcome = state.orchestrator.process_request(request, token).await;
    guard.disarm();

    match outcome {
        Ok(response) => Ok(Json(AgentApiResponse {
            response,
            conversation_id,
        })),
        Err(e) => {
            tracing::error!(code = e.code(), "Agent request failed: {}", e);
            Err((status_for(&e), Json(e.into())))
        }
    }
}

/// Rediscover provider models and swap the registry
pub async fn refresh_capabilities(State(state): State<AppState>) -> Json<RefreshResponse> {
    let registry = state.refresh().await;
    Json(RefreshResponse {
        models: registry.list_models().len(),
        tools: registry.list_tools().len(),
    })
}

/// Execution history, newest first
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<HistoryRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    Json(
        state
            .history
            .list(query.user_id.as_deref(), query.conversation_id.as_deref(), limit)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use agent_core::mock::{MockProvider, MockReply};
    use agent_core::tool::{CalculatorTool, DateTimeTool};
    use agent_core::{ProviderRouter, ToolRegistry};
    use agent_orchestrator::OrchestratorConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn state_with(provider: Option<MockProvider>) -> AppState {
        let mut providers = ProviderRouter::new();
        if let Some(provider) = provider {
            providers.register("ollama", Arc::new(provider));
        }
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        tools.register(DateTimeTool);
        AppState::build(providers, tools, OrchestratorConfig::default(), Vec::new()).await
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let state = state_with(Some(MockProvider::echo("mock"))).await;
        let (status, body) = send(state, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["providers"][0]["id"], "ollama");
        assert_eq!(body["providers"][0]["connected"], true);
        assert_eq!(body["models"], 1);
        assert_eq!(body["tools"], 2);
    }

    #[tokio::test]
    async fn test_capabilities() {
        let state = state_with(Some(MockProvider::echo("mock"))).await;
        let (status, body) = send(state, get("/api/capabilities")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"][0]["provider_id"], "ollama");
        assert_eq!(body["models"][0]["identifier"], "mock");
        let tools: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["identifier"].as_str())
            .collect();
        assert_eq!(tools, vec!["calculate", "datetime"]);
    }

    #[tokio::test]
    async fn test_agent_request_and_history() {
        let state = state_with(Some(MockProvider::echo("mock"))).await;
        let body = serde_json::json!({
            "message": "What is the capital of France?",
            "user_id": "alice",
            "conversation_id": "conv-7",
        });

        let (status, response) = send(state.clone(), post_json("/api/agent", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["conversation_id"], "conv-7");
        assert_eq!(response["model_used"], "ollama/mock");
        // Echoed analysis is not JSON, so the plan is the single-task fallback
        assert_eq!(response["execution_path"]["steps"].as_array().map(Vec::len), Some(1));
        assert_eq!(response["execution_path"]["state"], "completed");
        assert!(response["response"].as_str().unwrap().starts_with("[mock]"));

        let (status, history) = send(state, get("/api/history?user_id=alice&limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().map(Vec::len), Some(1));
        assert_eq!(history[0]["conversation_id"], "conv-7");
    }

    #[tokio::test]
    async fn test_no_models_is_service_unavailable() {
        let state = state_with(None).await;
        let (status, body) = send(state, post_json("/api/agent", &serde_json::json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "NO_CAPABLE_MODEL");
        assert!(body.get("execution_path").is_none());
    }

    #[tokio::test]
    async fn test_step_failure_returns_partial_path() {
        let provider = MockProvider::echo("mock").with_rule("Your task:", MockReply::Fail("model crashed".into()));
        let state = state_with(Some(provider)).await;
        let (status, body) = send(state, post_json("/api/agent", &serde_json::json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "STEP_FAILED");
        assert_eq!(body["execution_path"]["state"], "aborted");
        assert_eq!(body["execution_path"]["steps"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["execution_path"]["step_results"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let state = state_with(Some(MockProvider::echo("mock"))).await;
        let (status, body) = send(state, post_json("/api/agent", &serde_json::json!({"message": "  "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMPTY_MESSAGE");
    }

    #[tokio::test]
    async fn test_refresh() {
        let state = state_with(Some(MockProvider::echo("mock"))).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/capabilities/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"], 1);
        assert_eq!(body["tools"], 2);
    }
}
