//! Route Table

use axum::{routing::{get, post}, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    agent_handler, health_check, list_capabilities, list_history, refresh_capabilities,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/capabilities", get(list_capabilities))
        .route("/api/capabilities/refresh", post(refresh_capabilities))

        // Agent API
        .route("/api/agent", post(agent_handler))
        .route("/api/history", get(list_history))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
