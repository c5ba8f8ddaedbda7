//! HTTP mapping of orchestrator errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

use crate::error::{ErrorKind, InfraError};

/// Status code for an error class.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Precondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Spawn | ErrorKind::Execution => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for InfraError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            debug!("Request rejected ({}): {self}", kind.as_str());
        }

        let mut body = json!({
            "error": self.to_string(),
            "kind": kind.as_str(),
        });
        if let Some(field) = self.field() {
            body["field"] = json!(field);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SessionError};

    #[test]
    fn test_status_codes() {
        let cases = [
            (ErrorKind::Validation, 422),
            (ErrorKind::NotFound, 404),
            (ErrorKind::Conflict, 409),
            (ErrorKind::Precondition, 412),
            (ErrorKind::Spawn, 502),
            (ErrorKind::Execution, 502),
            (ErrorKind::Internal, 500),
        ];
        for (kind, code) in cases {
            assert_eq!(status_for(kind).as_u16(), code);
        }
    }

    #[test]
    fn test_response_status() {
        let response = InfraError::from(ConfigError::validation("Region is required", "region"))
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = InfraError::from(SessionError::not_found("s1")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
