use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::annotations::service::AnnotationError;
use crate::auth::AuthError;
use crate::db::StoreError;
use crate::extraction::ExtractError;
use crate::llm_client::LlmError;
use crate::publisher::PublishError;
use crate::response::Envelope;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "Resource not found",
            AppError::Validation(_) => "Invalid request",
            AppError::Unauthorized(_) => "Authentication required",
            AppError::Forbidden(_) => "Access denied",
            AppError::Conflict(_) => "Resource already exists",
            AppError::BackendUnavailable(_) => "A required backend service is unavailable",
            AppError::Database(_) => "A database error occurred",
            AppError::Internal(_) => "An internal server error occurred",
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::BackendUnavailable(msg) => msg.clone(),
            AppError::Database(e) => e.to_string(),
            AppError::Internal(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {e}"),
            AppError::Internal(e) => tracing::error!("Internal error: {e:?}"),
            AppError::BackendUnavailable(msg) => tracing::warn!("Backend unavailable: {msg}"),
            _ => {}
        }

        let body = Envelope::<()>::failure(self.message(), self.detail());
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AlreadyExists => AppError::Conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) | AuthError::UnknownUser => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Store(e) => e.into(),
            AuthError::Hashing(_) | AuthError::Token(_) => {
                AppError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

impl From<AnnotationError> for AppError {
    fn from(err: AnnotationError) -> Self {
        match err {
            AnnotationError::Store(e) => e.into(),
            AnnotationError::NotFound(_) => AppError::NotFound(err.to_string()),
            AnnotationError::EmptyBody(_)
            | AnnotationError::Validation(_)
            | AnnotationError::Publish(PublishError::EmptyText)
            | AnnotationError::Publish(PublishError::UnsupportedImage(_)) => {
                AppError::Validation(err.to_string())
            }
            AnnotationError::PublisherUnavailable | AnnotationError::Publish(_) => {
                AppError::BackendUnavailable(err.to_string())
            }
            AnnotationError::Extraction {
                source: ExtractError::UnsupportedType(_),
                ..
            } => AppError::Validation(err.to_string()),
            AnnotationError::Generation {
                source: LlmError::Transport(_),
                ..
            } => AppError::BackendUnavailable(err.to_string()),
            AnnotationError::Extraction { .. }
            | AnnotationError::Generation { .. }
            | AnnotationError::Transition(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}
