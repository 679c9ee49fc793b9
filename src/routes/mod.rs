use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{TokenManager, TokenStatus};
use crate::config::Config;
use crate::middleware::admin_auth_middleware;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub token_manager: Arc<TokenManager>,
    /// Required on /token routes when set
    pub admin_api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(token_manager: Arc<TokenManager>, config: &Config) -> Self {
        Self {
            token_manager,
            admin_api_key: config
                .admin_api_key
                .as_ref()
                .map(|key| Arc::from(key.expose().as_str())),
        }
    }
}

pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Token status and forced refresh, behind the admin key when configured
pub fn token_routes(state: AppState) -> Router {
    Router::new()
        .route("/token/status", get(token_status_handler))
        .route("/token/refresh", post(token_refresh_handler))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "GigaChat token service is running",
        "version": VERSION
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

async fn token_status_handler(State(state): State<AppState>) -> Json<TokenStatus> {
    Json(state.token_manager.status().await)
}

async fn token_refresh_handler(State(state): State<AppState>) -> Response {
    match state.token_manager.force_refresh().await {
        Ok(_) => {
            let status = state.token_manager.status().await;
            Json(json!({
                "success": true,
                "message": "Token refreshed",
                "expires_at": status.expires_at,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!("Token refresh via API failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Failed to refresh token",
                })),
            )
                .into_response()
        }
    }
}
