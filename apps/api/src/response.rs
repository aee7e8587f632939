//! Shared `{ success, message, data?, error? }` envelope used by every JSON response.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Shorthand return type for handlers that reply with an enveloped payload.
pub type ApiResult<T> = Result<(StatusCode, Json<Envelope<T>>), crate::errors::AppError>;

pub fn ok<T: Serialize>(message: &str, data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(Envelope::ok(message, data))))
}

pub fn created<T: Serialize>(message: &str, data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(Envelope::ok(message, data))))
}
