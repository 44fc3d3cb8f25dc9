//! HTTP error responses.

use crate::auth::AuthError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use mycelia_core::GateError;
use serde_json::json;

/// Error returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The gate rejected or failed the call
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Request body is not JSON
    #[error("Malformed request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::MissingToken | AuthError::InvalidToken) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Gate(GateError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Gate(GateError::Validation { .. }) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Gate(GateError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            Self::Gate(GateError::ModifierConfiguration { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Gate(GateError::Capability(_)) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable kind reported in the body
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::MissingToken | AuthError::InvalidToken) => "unauthenticated",
            Self::Auth(_) => "internal",
            Self::Gate(err) => err.kind().as_str(),
            Self::BadRequest(_) => "validation",
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Modifier configuration faults are operator-facing and stay in the log.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Auth(AuthError::MissingToken | AuthError::InvalidToken) => self.to_string(),
            Self::Auth(_) => "Internal server error".to_string(),
            Self::Gate(GateError::ModifierConfiguration { code, .. }) => {
                format!("Capability misconfigured: {code}")
            }
            Self::Gate(GateError::Capability(err)) => err.message().to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.public_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycelia_core::CapabilityError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::from(AuthError::MissingToken), StatusCode::UNAUTHORIZED),
            (ApiError::from(AuthError::InvalidToken), StatusCode::UNAUTHORIZED),
            (
                ApiError::from(GateError::NotFound { code: "a.b".into() }),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::from(GateError::invalid("a.b", "bad")), StatusCode::BAD_REQUEST),
            (ApiError::BadRequest("eof".into()), StatusCode::BAD_REQUEST),
            (ApiError::from(GateError::denied("a.b")), StatusCode::FORBIDDEN),
            (
                ApiError::from(GateError::ModifierConfiguration {
                    code: "a.b".into(),
                    modifier: "m".into(),
                    reason: "unknown modifier".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(GateError::from(CapabilityError::new("down"))),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_configuration_error_hides_detail() {
        let error = ApiError::from(GateError::ModifierConfiguration {
            code: "a.b".into(),
            modifier: "secret_modifier".into(),
            reason: "missing field `filter`".into(),
        });
        assert_eq!(error.kind(), "modifier_configuration");
        let message = error.public_message();
        assert!(!message.contains("secret_modifier"));
        assert!(!message.contains("filter"));
    }

    #[test]
    fn test_denial_message() {
        let error = ApiError::from(GateError::denied("tech.mycelia.documents"));
        assert_eq!(error.kind(), "permission_denied");
        assert_eq!(
            error.public_message(),
            "Permission denied: tech.mycelia.documents"
        );
    }
}
