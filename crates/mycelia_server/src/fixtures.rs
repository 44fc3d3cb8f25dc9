//! Shared test setup: a router over the builtin registry with three principals.

use crate::api::{AppState, router};
use crate::auth::StaticCredentials;
use axum::Router;
use axum::body::Body;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use mycelia_capability::{Gate, builtin};
use mycelia_policy::{PolicySet, Principal};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// Allowed everything
pub(crate) const ADMIN_TOKEN: &str = "admin-token";
/// Allowed to read documents
pub(crate) const READER_TOKEN: &str = "reader-token";
/// Row-filtered documents, misconfigured queue modifier
pub(crate) const SCOPED_TOKEN: &str = "scoped-token";

fn principal(id: &str, policies: Value) -> Principal {
    let policies: PolicySet = serde_json::from_value(policies).unwrap();
    Principal::new(id, policies)
}

pub(crate) fn app() -> Router {
    let registry = builtin::registry().unwrap();
    let credentials = StaticCredentials::new()
        .with_token(
            ADMIN_TOKEN,
            principal("admin", json!([{ "resource": "**", "action": "*", "effect": "allow" }])),
        )
        .with_token(
            READER_TOKEN,
            principal(
                "reader",
                json!([{ "resource": "db/*", "action": "read", "effect": "allow" }]),
            ),
        )
        .with_token(
            SCOPED_TOKEN,
            principal(
                "scoped",
                json!([
                    {
                        "resource": "db/**",
                        "action": "*",
                        "effect": "modify",
                        "modifier": { "code": "filter", "arg": { "filter": { "role": "user" } } }
                    },
                    {
                        "resource": "kafka/**",
                        "action": "*",
                        "effect": "modify",
                        "modifier": { "code": "throttle", "arg": {} }
                    }
                ]),
            ),
        );
    router(AppState::new(Gate::new(Arc::new(registry)), credentials))
}

async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub(crate) async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    dispatch(app, builder.body(body).unwrap()).await
}

pub(crate) async fn send_raw(
    app: &Router,
    uri: &str,
    token: &str,
    body: &str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    dispatch(app, request).await
}
