//! JSON-RPC tool bridge.
//!
//! Serves the registry as a tool list: `tools/list` advertises every
//! capability and `tools/call` invokes one through the gate. Capability
//! failures come back as tool results flagged `isError`; every other gate
//! error is a JSON-RPC error.

use crate::api::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode};
use mycelia_capability::Caller;
use mycelia_core::GateError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Protocol revision reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC error codes
pub mod codes {
    /// Body is not a JSON-RPC request
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Unknown tool or invalid arguments
    pub const INVALID_PARAMS: i64 = -32602;
    /// Server-side configuration fault
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Caller is not allowed to perform the call
    pub const PERMISSION_DENIED: i64 = -32001;
}

/// A JSON-RPC request
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Must be "2.0"
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

/// A JSON-RPC response
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn new(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: "2.0",
            id,
            result,
            error,
        }
    }
}

/// A JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    /// Error code
    pub code: i64,
    /// Message
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<GateError> for RpcError {
    fn from(err: GateError) -> Self {
        let code = match &err {
            GateError::NotFound { .. } | GateError::Validation { .. } => codes::INVALID_PARAMS,
            GateError::PermissionDenied { .. } => codes::PERMISSION_DENIED,
            GateError::ModifierConfiguration { .. } | GateError::Capability(_) => {
                codes::INTERNAL_ERROR
            }
        };
        Self::new(code, ApiError::from(err).public_message())
    }
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// `POST /mcp`
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let caller = match state.caller(&headers).await {
        Ok(caller) => caller,
        Err(err) => return err.into_response(),
    };

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = RpcError::new(codes::INVALID_REQUEST, e.to_string());
            return Json(RpcResponse::new(Value::Null, Err(error))).into_response();
        }
    };
    if request.jsonrpc != "2.0" {
        let error = RpcError::new(codes::INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        return Json(RpcResponse::new(request.id.unwrap_or(Value::Null), Err(error)))
            .into_response();
    }

    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "notification received");
        return StatusCode::ACCEPTED.into_response();
    };

    let outcome = dispatch(&state, &caller, &request.method, request.params).await;
    Json(RpcResponse::new(id, outcome)).into_response()
}

async fn dispatch(
    state: &AppState,
    caller: &Caller,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mycelia", "version": env!("CARGO_PKG_VERSION") }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => {
            let tools: Vec<_> = state
                .gate()
                .registry()
                .list()
                .map(|d| {
                    json!({
                        "name": d.code,
                        "description": d.description,
                        "inputSchema": d.input_schema,
                    })
                })
                .collect();
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let params: CallParams = serde_json::from_value(params)
                .map_err(|e| RpcError::new(codes::INVALID_PARAMS, e.to_string()))?;
            let arguments = params.arguments.unwrap_or_else(|| json!({}));
            match caller.invoke(&params.name, arguments).await {
                Ok(output) => Ok(json!({
                    "content": [{ "type": "text", "text": output.to_string() }],
                    "structuredContent": output,
                })),
                Err(GateError::Capability(err)) => Ok(json!({
                    "content": [{ "type": "text", "text": err.message() }],
                    "isError": true,
                })),
                Err(err) => Err(err.into()),
            }
        }
        other => Err(RpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}
