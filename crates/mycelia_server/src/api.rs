//! HTTP routes.

use crate::auth::{AuthError, Authenticator};
use crate::error::ApiError;
use crate::rpc;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use mycelia_capability::{Caller, CapabilityDescriptor, Gate};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    gate: Gate,
    auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create handler state
    pub fn new(gate: Gate, auth: impl Authenticator) -> Self {
        Self {
            gate,
            auth: Arc::new(auth),
        }
    }

    /// The gate
    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Authenticate the request's bearer token and bind its principal
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the token is missing or unknown
    pub async fn caller(&self, headers: &HeaderMap) -> Result<Caller, ApiError> {
        let token = bearer(headers).ok_or(AuthError::MissingToken)?;
        let principal = self.auth.authenticate(token).await.inspect_err(|_| {
            tracing::debug!("bearer token rejected");
        })?;
        Ok(self.gate.bind(principal))
    }
}

/// Bearer token from the `Authorization` header
#[must_use]
pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/resource", get(list))
        .route("/api/resource/{code}", post(invoke))
        .route("/mcp", post(rpc::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CapabilityDescriptor>>, ApiError> {
    state.caller(&headers).await?;
    Ok(Json(state.gate.registry().list().cloned().collect()))
}

async fn invoke(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let caller = state.caller(&headers).await?;
    let input = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    Ok(Json(caller.invoke(&code, input).await?))
}
