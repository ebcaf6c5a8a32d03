//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Store failures, retryable by the caller (5xx)
    #[error(transparent)]
    Store(StoreError),
}

/// Outcome taxonomy shared by every ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; nothing was written
    Validation,
    NotFound,
    /// Requester is known but not permitted
    Unauthorized,
    AlreadyExists,
    /// Transaction failure, duplicate key or connectivity loss; nothing was written
    Conflict,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidRequest(_) | AppError::MissingHeader(_) => ErrorKind::Validation,
            AppError::Domain(err) => match err {
                DomainError::UserNotFound(_) | DomainError::ExpenseNotFound(_) => {
                    ErrorKind::NotFound
                }
                DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
                DomainError::UserAlreadyExists(_) => ErrorKind::AlreadyExists,
                DomainError::DuplicateOperation { .. } => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
            AppError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            AppError::Store(StoreError::UniqueViolation(_)) => ErrorKind::AlreadyExists,
            AppError::Store(_) => ErrorKind::Conflict,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOperation(key) => AppError::Domain(DomainError::DuplicateOperation {
                key: key.to_string(),
            }),
            other => AppError::Store(other),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                }
                DomainError::InvalidCurrency(code) => {
                    (StatusCode::BAD_REQUEST, "invalid_currency", Some(code.clone()))
                }
                DomainError::EmptyDescription => {
                    (StatusCode::BAD_REQUEST, "empty_description", None)
                }
                DomainError::NoParticipants => (StatusCode::BAD_REQUEST, "no_participants", None),
                DomainError::DuplicateParticipant(who) => {
                    (StatusCode::BAD_REQUEST, "duplicate_participant", Some(who.clone()))
                }
                DomainError::SameUserSettlement => {
                    (StatusCode::BAD_REQUEST, "same_user_settlement", None)
                }
                DomainError::AmbiguousUser(mention) => {
                    (StatusCode::BAD_REQUEST, "ambiguous_user", Some(mention.clone()))
                }
                DomainError::UserNotFound(id) => {
                    (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
                }
                DomainError::ExpenseNotFound(id) => {
                    (StatusCode::NOT_FOUND, "expense_not_found", Some(id.clone()))
                }
                DomainError::Unauthorized(msg) => {
                    (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
                }
                DomainError::UserAlreadyExists(id) => {
                    (StatusCode::CONFLICT, "user_already_exists", Some(id.clone()))
                }
                DomainError::DuplicateOperation { key } => {
                    (StatusCode::CONFLICT, "duplicate_operation", Some(key.clone()))
                }
            },

            AppError::Store(StoreError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, "not_found", Some(what.clone()))
            }
            AppError::Store(StoreError::UniqueViolation(what)) => {
                (StatusCode::CONFLICT, "already_exists", Some(what.clone()))
            }
            // 503: nothing was written, the caller may retry
            AppError::Store(e) => {
                tracing::error!(error = ?e, "Store failure");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
