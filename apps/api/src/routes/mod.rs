pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::annotations::handlers as annotations;
use crate::auth::handlers as auth;
use crate::progress;
use crate::state::AppState;

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health::index_handler))
        .route("/health", get(health::health_handler))
        .route(
            "/system/services/status",
            get(health::services_status_handler),
        )
        // Identity
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::profile))
        // Annotations
        .route("/annotations", get(annotations::list))
        .route("/annotations/upload", post(annotations::upload))
        .route("/annotations/stats", get(annotations::stats))
        .route("/annotations/progress", get(progress::stream_progress))
        .route(
            "/annotations/:id",
            get(annotations::get_one)
                .patch(annotations::update)
                .delete(annotations::delete),
        )
        .route("/annotations/:id/tts", post(annotations::generate_speech))
        .route("/annotations/:id/audio", get(annotations::audio))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
