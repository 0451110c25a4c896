mod chat;
mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod notify;
mod pipeline;
mod routes;
mod scoring;
mod sessions;
mod state;
mod storage;
mod uploads;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::extraction::DocumentExtractor;
use crate::llm_client::LlmClient;
use crate::notify::SmtpNotifier;
use crate::pipeline::store::SessionStore;
use crate::pipeline::EvaluationPipeline;
use crate::routes::build_router;
use crate::scoring::LlmCvScorer;
use crate::state::AppState;
use crate::storage::{PersistenceGateway, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV evaluator API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let pool = create_pool(&config.database_url).await?;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(PgStore::new(pool));

    // Initialize LLM client
    let llm = LlmClient::new(config.openai_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Extraction backend: local PDF parsing plus remote vision OCR
    let extractor = DocumentExtractor::new(config.ocr_api_url.clone(), config.ocr_api_key.clone());

    let scorer = Arc::new(LlmCvScorer::new(llm.clone()));

    // Email notifier; degrades to log-only without SMTP credentials
    let notifier = Arc::new(SmtpNotifier::from_config(&config)?);

    let sessions = SessionStore::new(gateway.clone());
    let pipeline = Arc::new(EvaluationPipeline::new(
        gateway.clone(),
        extractor,
        scorer,
        notifier,
        sessions.clone(),
    ));

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = AppState {
        config: config.clone(),
        gateway,
        llm,
        pipeline,
        sessions,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
