use axum::{extract::State, Json};

use crate::auth::extractor::AuthUser;
use crate::auth::service::{LoginRequest, RegisterRequest, Session};
use crate::auth::store::User;
use crate::response::{self, ApiResult};
use crate::state::AppState;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Session> {
    let session = state.identity.register(req).await?;
    response::created("User registered successfully", session)
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Session> {
    let session = state.identity.login(req).await?;
    response::ok("Login successful", session)
}

/// GET /auth/profile
pub async fn profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<User> {
    let profile = state.identity.profile(user.id).await?;
    response::ok("Profile retrieved", profile)
}
