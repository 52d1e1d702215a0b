//! PantryPal REST API server
//!
//! Exposes the receipt OCR pipeline over HTTP, plus the configuration and
//! logging setup shared by the `pantrypal-server` and `pantrypal` binaries.

pub mod config;
pub mod handlers;
pub mod logging;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use core_pipeline::{OcrEngine, ReceiptPipeline};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReceiptPipeline<Box<dyn OcrEngine>>>,
}

impl AppState {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            pipeline: Arc::new(ReceiptPipeline::new(engine)),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ping", get(handlers::ping))
        .route("/health", get(handlers::health_check))
        .route("/ocr/parse-receipt", post(handlers::parse_receipt))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ServerConfig) -> Result<()> {
    let engine = config.engine.build_engine()?;
    let app = router(AppState::new(engine), config.max_upload_bytes);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        engine = ?config.engine.engine,
        lang = %config.engine.ocr_lang,
        "Server listening on {}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
