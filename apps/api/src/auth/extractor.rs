//! Bearer-token extractor for axum handlers.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use uuid::Uuid;

use crate::auth::roles::{Capability, Role};
use crate::errors::AppError;
use crate::state::AppState;

/// The caller behind `Authorization: Bearer <token>`, reloaded from the user store.
///
/// ```ignore
/// async fn handler(user: AuthUser) -> Result<(), AppError> {
///     user.require(Capability::EditAnnotations)?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Fails with 403 unless the caller's role grants `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role '{}' is not permitted to perform this action",
                self.role
            )))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let user = state.identity.authenticate(token.trim()).await?;
        Ok(AuthUser {
            id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}
