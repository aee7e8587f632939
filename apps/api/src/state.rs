use std::sync::Arc;

use crate::annotations::service::AnnotationService;
use crate::auth::service::IdentityService;
use crate::progress::ProgressHub;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub annotations: Arc<AnnotationService>,
    pub identity: IdentityService,
    /// Same hub the annotation service publishes to; handlers subscribe here.
    pub progress: Arc<ProgressHub>,
}
