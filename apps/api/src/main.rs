mod annotations;
mod auth;
mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod progress;
mod publisher;
mod response;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::annotations::generator::AnnotationGenerator;
use crate::annotations::service::AnnotationService;
use crate::annotations::store::PgAnnotationStore;
use crate::auth::jwt::TokenIssuer;
use crate::auth::service::IdentityService;
use crate::auth::store::PgUserStore;
use crate::config::Config;
use crate::db::create_pool;
use crate::extraction::ExtractorRegistry;
use crate::llm_client::LlmClient;
use crate::progress::ProgressHub;
use crate::publisher::{aws::AwsPublisher, Publisher};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting annotator API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize text generation backend
    let llm = LlmClient::new(
        &config.ollama_base_url,
        &config.ollama_model,
        Duration::from_secs(config.ollama_timeout_secs),
    )?;
    info!(
        "LLM client initialized (model: {} at {})",
        llm.model(),
        llm.base_url()
    );

    // Initialize speech + object storage
    let publisher: Option<Arc<dyn Publisher>> = match &config.aws {
        Some(aws) => {
            let publisher = AwsPublisher::new(aws).await;
            info!("Publisher initialized (bucket: {})", aws.bucket);
            Some(Arc::new(publisher))
        }
        None => {
            warn!("S3_BUCKET/AWS credentials not set; speech and image upload are disabled");
            None
        }
    };

    let progress = Arc::new(ProgressHub::default());
    let annotations = AnnotationService::new(
        Arc::new(PgAnnotationStore::new(db.clone())),
        AnnotationGenerator::new(Arc::new(llm)),
        ExtractorRegistry::default(),
        publisher,
        progress.clone(),
    )
    .with_asset_cleanup(config.cleanup_assets_on_delete);

    let identity = IdentityService::new(
        Arc::new(PgUserStore::new(db)),
        TokenIssuer::new(&config.jwt_secret),
    );

    // Build app state
    let state = AppState {
        annotations: Arc::new(annotations),
        identity,
        progress,
    };

    // Build router
    let app = build_router(state, config.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
