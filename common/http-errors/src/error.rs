use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::envelope::{ErrorEnvelope, FieldError};
use crate::metrics;

/// The gateway's fixed failure taxonomy (spec §7). Every kind carries a
/// stable `errorCode` clients may pattern-match on; `message` is the only
/// free-form part and must stay non-leaky (no upstream stack traces, no
/// secret material — see [`crate::redact`]).
#[derive(Debug)]
pub enum ApiError {
    BadRequest { error_code: &'static str, message: String },
    Unauthorized { error_code: &'static str, message: String },
    Forbidden { error_code: &'static str, message: String },
    NotFound { error_code: &'static str, message: String },
    Conflict { error_code: &'static str, message: String },
    ValidationError { message: String, validation_errors: Vec<FieldError> },
    TooManyRequests { message: String },
    PayloadTooLarge { message: String },
    GatewayTimeout { message: String },
    ServiceUnavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { error_code: code, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { error_code: "ERR_AUTHENTICATION_FAILED", message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { error_code: "ERR_INSUFFICIENT_PERMISSIONS", message: message.into() }
    }

    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self::NotFound {
            error_code: "ERR_RESOURCE_NOT_FOUND",
            message: format!("The {resource_type} with identifier {id} could not be found."),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { error_code: "ERR_RESOURCE_CONFLICT", message: message.into() }
    }

    pub fn rate_limited() -> Self {
        Self::TooManyRequests { message: "Rate limit exceeded".to_string() }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge { message: message.into() }
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::GatewayTimeout { message: message.into() }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn validation(validation_errors: Vec<FieldError>) -> Self {
        Self::ValidationError { message: "Validation failed".to_string(), validation_errors }
    }

    /// The `"error"` discriminant tag sent to the client.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "BadRequest",
            ApiError::Unauthorized { .. } => "Unauthorized",
            ApiError::Forbidden { .. } => "Forbidden",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::ValidationError { .. } => "ValidationError",
            ApiError::TooManyRequests { .. } => "TooManyRequests",
            ApiError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ApiError::GatewayTimeout { .. } => "GatewayTimeout",
            ApiError::ServiceUnavailable { .. } => "ServiceUnavailable",
            ApiError::Internal { .. } => "InternalServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { error_code, .. } => error_code,
            ApiError::Unauthorized { error_code, .. } => error_code,
            ApiError::Forbidden { error_code, .. } => error_code,
            ApiError::NotFound { error_code, .. } => error_code,
            ApiError::Conflict { error_code, .. } => error_code,
            ApiError::ValidationError { .. } => "ERR_VALIDATION_FAILED",
            ApiError::TooManyRequests { .. } => "ERR_RATE_LIMIT_EXCEEDED",
            ApiError::PayloadTooLarge { .. } => "ERR_FILE_TOO_LARGE",
            ApiError::GatewayTimeout { .. } => "ERR_GATEWAY_TIMEOUT",
            ApiError::ServiceUnavailable { .. } => "ERR_SERVICE_UNAVAILABLE",
            ApiError::Internal { .. } => "ERR_INTERNAL",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::ValidationError { message, .. }
            | ApiError::TooManyRequests { message }
            | ApiError::PayloadTooLarge { message }
            | ApiError::GatewayTimeout { message }
            | ApiError::ServiceUnavailable { message }
            | ApiError::Internal { message } => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let code = self.error_code();
        metrics::record_error_code(code);

        let validation_errors = match &self {
            ApiError::ValidationError { validation_errors, .. } => Some(
                validation_errors
                    .iter()
                    .map(|f| FieldError { field: f.field.clone(), message: f.message.clone() })
                    .collect(),
            ),
            _ => None,
        };

        let body = ErrorEnvelope {
            error: kind,
            message: self.message(),
            error_code: Some(code),
            validation_errors,
            timestamp: Utc::now().to_rfc3339(),
            path: None,
            request_id: None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(code) {
            response.headers_mut().insert("X-Error-Code", value);
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
