//! Affect Stream - Main entry point
//!
//! Real-time affect analysis service: consumes live media streams, runs
//! emotion and heart rate analyzers, persists checkpoint files, and reports
//! session aggregates to the exam backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use affect_stream::analyzer::AnalyzerSet;
use affect_stream::backend::BackendClient;
use affect_stream::checkpoint::CheckpointFileStore;
use affect_stream::config::Settings;
use affect_stream::http::{create_router, AppState};
use affect_stream::realtime::RealtimePublisher;
use affect_stream::stream::{RtspSourceFactory, StreamConsumerManager};

/// Command-line arguments for affect-stream
#[derive(Parser, Debug)]
#[command(name = "affect-stream")]
#[command(about = "Real-time affect analysis for live media streams")]
#[command(version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/affect-stream")]
    config: String,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "AFFECT_STREAM_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "affect_stream=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;
    if let Some(port) = args.port {
        settings.service.port = port;
    }
    let settings = Arc::new(settings);

    info!("Starting affect-stream");
    info!(
        "Media server at rtsp://{}:{}",
        settings.media.host, settings.media.rtsp_port
    );
    info!(
        "Checkpoint storage at {}",
        settings.checkpoint.storage_root.display()
    );

    let store = Arc::new(CheckpointFileStore::new(
        settings.checkpoint.storage_root.clone(),
    ));
    let publisher = Arc::new(RealtimePublisher::connect(&settings.realtime).await);
    let backend = Arc::new(BackendClient::new(&settings.backend)?);

    // Concrete analyzer models plug in here; without them every session
    // runs degraded and only the stream plumbing is exercised.
    let analyzers = AnalyzerSet::default();
    if analyzers.is_empty() {
        warn!("No analyzers registered, sessions will produce no analysis data");
    }

    let sources = Arc::new(RtspSourceFactory::new(
        settings.media.clone(),
        settings.analysis.clone(),
    ));
    let manager = Arc::new(StreamConsumerManager::new(
        Arc::clone(&settings),
        analyzers,
        sources,
        store,
        publisher,
        backend,
    ));

    let app = create_router(AppState::new(Arc::clone(&manager)));

    let addr: SocketAddr = format!("{}:{}", settings.service.host, settings.service.port)
        .parse()
        .context("invalid service host/port")?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    manager.stop_all().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
