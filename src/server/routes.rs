use axum::http::{HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use std::sync::atomic::Ordering;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::ws_handler;
use super::AppState;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub ws_path: String,
    /// Single allowed browser origin; any origin when unset.
    pub allow_origin: Option<HeaderValue>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ws_path: "/ws".to_string(),
            allow_origin: None,
        }
    }
}

pub fn create_router(state: AppState, config: &RouterConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    let cors = match &config.allow_origin {
        Some(origin) => cors.allow_origin(origin.clone()),
        None => cors.allow_origin(Any),
    };

    Router::new()
        .route(&config.ws_path, get(ws_handler))
        .route("/_api/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.active_sessions.load(Ordering::Relaxed),
    }))
}
