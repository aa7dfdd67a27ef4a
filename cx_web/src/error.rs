//! ABOUTME: Error translation into the uniform JSON failure envelope
//! ABOUTME: Maps core errors to status codes with correlation ids and severity-aware logging

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::Value;
use std::fmt;
use tracing::{error, warn};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::models::{ErrorBody, ErrorEnvelope};

/// API error carrying everything needed to render the failure envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    error_id: String,
    request_id: Option<String>,
    /// True for client-caused errors logged at warn or below
    expected: bool,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            error_id: Uuid::new_v4().to_string(),
            request_id: None,
            expected: status.is_client_error(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(fields: &[String]) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Conflict on {}", fields.join(", ")),
        )
        .with_details(serde_json::json!({ "fields": fields }))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Validation failure from the `validator` derive, with a per-field
    /// detail list
    pub fn validation(errors: ValidationErrors) -> Self {
        let fields: Vec<Value> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                let field = field.to_string();
                field_errors
                    .iter()
                    .map(move |e| {
                        serde_json::json!({
                            "field": field.clone(),
                            "code": e.code.clone(),
                            "message": e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| {
                                    format!("Invalid value for field '{}'", field)
                                }),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Self::bad_request("Request validation failed")
            .with_details(serde_json::json!({ "errors": fields }))
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the request correlation id so the envelope and logs line up
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error_id(&self) -> &str {
        &self.error_id
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        if self.expected {
            warn!(
                code = self.code,
                status = self.status.as_u16(),
                error_id = %self.error_id,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                message = %self.message,
                "Request failed"
            );
        } else {
            // Details may echo request payload, so they are redacted for logs
            let details = self
                .details
                .as_ref()
                .map(crate::sanitize::sanitize_json)
                .unwrap_or(Value::Null);
            error!(
                code = self.code,
                status = self.status.as_u16(),
                error_id = %self.error_id,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                message = %self.message,
                details = %details,
                "Request failed"
            );
        }

        // Internal detail stays in the logs; 5xx clients get a generic message
        let message = if self.status.is_server_error() {
            match self.status {
                StatusCode::SERVICE_UNAVAILABLE => {
                    "Service temporarily unavailable, please retry".to_string()
                }
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.message.clone()
        };

        HttpResponse::build(self.status).json(ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code.to_string(),
                message,
                details: if self.status.is_server_error() {
                    None
                } else {
                    self.details.clone()
                },
                error_id: self.error_id.clone(),
                request_id: self.request_id.clone(),
            },
        })
    }
}

impl From<cx_core::Error> for ApiError {
    fn from(error: cx_core::Error) -> Self {
        match error {
            cx_core::Error::Validation(msg) => Self::bad_request(msg),
            cx_core::Error::NotFound(msg) => Self::not_found(msg),
            cx_core::Error::Conflict { fields } => Self::conflict(&fields),
            cx_core::Error::Unauthorized(msg) => Self::unauthorized(msg),
            cx_core::Error::Forbidden(msg) => Self::forbidden(msg),
            cx_core::Error::DatabaseTimeout(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "DATABASE_TIMEOUT",
                msg,
            ),
            cx_core::Error::Database(msg) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                msg,
            ),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
