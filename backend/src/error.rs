//! Error handling for the bonded inventory service
//!
//! Every failure is rendered as
//! `{"status": "failed", "message": ..., "errors": [{"field", "code", "message"}]}`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication and authorization errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing permission: {0}")]
    InsufficientPermissions(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation failed on {} field(s)", .0.len())]
    InvalidFields(Vec<FieldError>),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // State conflicts
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a single-field validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One entry of the `errors` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Failure envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            status: "failed".to_string(),
            message: message.into(),
            errors,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten_validation_errors("", &errors, &mut fields);
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::InvalidFields(fields)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("body", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation("path", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("query", rejection.body_text())
    }
}

/// Turn nested validator output into `items[0].quantity` style paths
fn flatten_validation_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", path));
                    out.push(FieldError::new(path.clone(), err.code.to_string(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match &self {
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
                vec![FieldError::new("authorization", "UNAUTHORIZED", msg.clone())],
            ),
            AppError::InsufficientPermissions(permission) => (
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action".to_string(),
                vec![FieldError::new(
                    "permission",
                    "INSUFFICIENT_PERMISSIONS",
                    format!("Requires {}", permission),
                )],
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                vec![FieldError::new(field.clone(), "VALIDATION_ERROR", message.clone())],
            ),
            AppError::InvalidFields(fields) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                fields.clone(),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                format!("A record with this {} already exists", field),
                vec![FieldError::new(
                    field.clone(),
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                )],
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                format!("{} not found", resource),
                vec![FieldError::new("id", "NOT_FOUND", format!("{} not found", resource))],
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::CONFLICT,
                msg.clone(),
                vec![FieldError::new("status", "INVALID_STATE_TRANSITION", msg.clone())],
            ),
            AppError::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "External service error".to_string(),
                vec![FieldError::new("insw", "EXTERNAL_SERVICE_ERROR", msg.clone())],
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                vec![FieldError::new("config", "CONFIGURATION_ERROR", msg.clone())],
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "A database error occurred".to_string(),
                vec![FieldError::new("database", "DATABASE_ERROR", "A database error occurred")],
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                vec![FieldError::new("server", "INTERNAL_ERROR", msg.clone())],
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse::new(message, errors))).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
