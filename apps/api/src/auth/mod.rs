//! Identity: registration, login, session tokens and role-based capabilities.

pub mod extractor;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod roles;
pub mod service;
pub mod store;

use thiserror::Error;

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("a user with this email already exists")]
    AlreadyExists,

    /// Shared by "no such user" and "wrong password".
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("user account no longer exists")]
    UnknownUser,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("failed to issue session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
