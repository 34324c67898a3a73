use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Pipeline error taxonomy. Reported to callers only through the callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    CollectDataFailed,
    GithubApiError,
    GenerateProviderError,
    GenerateValidationError,
    WorkflowTimeout,
    CallbackDeliveryFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::CollectDataFailed => "COLLECT_DATA_FAILED",
            ErrorCode::GithubApiError => "GITHUB_API_ERROR",
            ErrorCode::GenerateProviderError => "GENERATE_PROVIDER_ERROR",
            ErrorCode::GenerateValidationError => "GENERATE_VALIDATION_ERROR",
            ErrorCode::WorkflowTimeout => "WORKFLOW_TIMEOUT",
            ErrorCode::CallbackDeliveryFailed => "CALLBACK_DELIVERY_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application-level error type for the inbound HTTP surface.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {} field(s) rejected", .0.len())]
    InvalidInput(Vec<FieldError>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidInput(fields) => {
                let message = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.field, f.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                let body = Json(json!({
                    "error": {
                        "code": ErrorCode::InvalidInput,
                        "message": message,
                        "fields": fields,
                    }
                }));
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let value = serde_json::to_value(ErrorCode::GenerateValidationError).unwrap();
        assert_eq!(value, "GENERATE_VALIDATION_ERROR");
        assert_eq!(ErrorCode::WorkflowTimeout.to_string(), "WORKFLOW_TIMEOUT");
    }

    #[test]
    fn test_error_code_str_matches_serde() {
        for code in [
            ErrorCode::InvalidInput,
            ErrorCode::CollectDataFailed,
            ErrorCode::GithubApiError,
            ErrorCode::GenerateProviderError,
            ErrorCode::GenerateValidationError,
            ErrorCode::WorkflowTimeout,
            ErrorCode::CallbackDeliveryFailed,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), code.as_str());
        }
    }

    #[test]
    fn test_invalid_input_is_422() {
        let response =
            AppError::InvalidInput(vec![FieldError::new("position", "must not be empty")])
                .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
