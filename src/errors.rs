//! Transport mapping for gateway errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tenantgate_core_types::{ErrorCategory, GateError};
use tracing::{error, warn};

/// JSON error body `{"error": {"code", "message", ...}}`.
///
/// Scope denials add `required_scope`, `service`, `key_type` and `reason`.
/// Isolation denials carry only the code and a generic message.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Map<String, Value>,
}

impl HttpError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<GateError> for HttpError {
    fn from(err: GateError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match err.category() {
            ErrorCategory::Resolution | ErrorCategory::Upstream => {
                error!(code = err.code(), error = %err, "request failed")
            }
            _ => warn!(code = err.code(), "request denied"),
        }

        let mut http = HttpError::new(status, err.code(), err.public_message());
        if let GateError::PermissionDenied(denial) = &err {
            http = http
                .with_detail("required_scope", denial.required_scope())
                .with_detail("service", denial.service())
                .with_detail("key_type", denial.key_type())
                .with_detail("reason", denial.reason());
        }
        http
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut error = Map::new();
        error.insert("code".into(), Value::from(self.code));
        error.insert("message".into(), Value::from(self.message));
        error.extend(self.details);
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}
