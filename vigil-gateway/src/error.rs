//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vigil_core::{CoreError, SessionId};
use vigil_engine::EngineError;

/// Errors that can occur during gateway request handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// An error propagated from the session layer.
    #[error("session error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration or score validation failed.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// The requested session ID is not registered.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The request body is malformed or contains invalid values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Engine(
                EngineError::AlreadyRunning | EngineError::NotRunning | EngineError::StartCancelled,
            ) => StatusCode::CONFLICT,
            Self::Engine(EngineError::Core(_)) => StatusCode::BAD_REQUEST,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn gateway_error_status_codes_map_correctly() {
        let not_found = GatewayError::SessionNotFound(SessionId::from(Uuid::nil()));
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let bad_req = GatewayError::InvalidRequest("missing field".to_owned());
        assert_eq!(bad_req.into_response().status(), StatusCode::BAD_REQUEST);

        let bad_score = GatewayError::Core(CoreError::InvalidScore { value: 1.5 });
        assert_eq!(bad_score.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lifecycle_conflicts_return_409() {
        for err in [EngineError::AlreadyRunning, EngineError::NotRunning] {
            let resp = GatewayError::Engine(err).into_response();
            assert_eq!(resp.status(), StatusCode::CONFLICT, "lifecycle errors must map to 409");
        }
    }

    #[test]
    fn gateway_error_display_includes_message() {
        let err = GatewayError::InvalidRequest("empty user id".to_owned());
        assert!(err.to_string().contains("empty user id"), "Display must include the message");
    }
}
