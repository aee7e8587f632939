use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::annotations::service::ServicesStatus;
use crate::response::Envelope;
use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME")
    }))
}

/// GET /
pub async fn index_handler() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": ["/auth/register", "/auth/login", "/auth/profile"],
            "annotations": "/annotations",
            "services": "/system/services/status",
            "health": "/health"
        }
    }))
}

/// GET /system/services/status
/// 200 when every backend answers, 503 otherwise. A publisher that is not
/// configured counts as unavailable.
pub async fn services_status_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Envelope<ServicesStatus>>) {
    let status = state.annotations.check_services().await;
    let healthy = status.all_ok();
    let (code, message) = if healthy {
        (StatusCode::OK, "All services are operational")
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "One or more services are unavailable",
        )
    };

    let body = Envelope {
        success: healthy,
        message: message.to_string(),
        data: Some(status),
        error: None,
    };
    (code, Json(body))
}
