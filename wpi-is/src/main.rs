//! Workplace Inspection Service (wpi-is) - Main entry point
//!
//! Serves the REST API and SSE streams for workplaces, models, training
//! data and inspections. Model inference runs in an external service
//! reached over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wpi_common::config::{load_toml_config, resolve_root_folder, RootFolderInitializer, ROOT_FOLDER_ENV};
use wpi_common::events::EventBus;

use wpi_is::services::{HttpInferenceEngine, InferenceEngine, UnconfiguredInference};
use wpi_is::storage::StoragePaths;
use wpi_is::{build_router, AppState, EVENT_BUS_CAPACITY};

/// Command-line arguments for wpi-is
#[derive(Parser, Debug)]
#[command(name = "wpi-is")]
#[command(about = "Workplace inspection service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "WPI_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database, uploads, models and exports
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Address to bind (overrides the config file)
    #[arg(long, env = "WPI_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "WPI_PORT")]
    port: Option<u16>,

    /// Inference service base URL (overrides the config file)
    #[arg(long, env = "WPI_INFERENCE_ENDPOINT")]
    inference_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("wpi_is={0},wpi_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting WPI Inspection Service (wpi-is) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Root folder: CLI, then environment, then config file, then OS default
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let storage = StoragePaths::new(initializer.root().to_path_buf());
    storage
        .ensure_layout()
        .context("Failed to create storage directories")?;

    let db_path = initializer.database_path();
    let db = wpi_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database ready: {}", db_path.display());

    let endpoint = args.inference_endpoint.or(config.inference.endpoint.clone());
    let inference: Arc<dyn InferenceEngine> = match endpoint {
        Some(endpoint) => {
            let engine = HttpInferenceEngine::new(
                &endpoint,
                Duration::from_secs(config.inference.timeout_secs),
            )
            .context("Failed to create inference client")?;
            info!("Inference service: {}", engine.predict_url());
            Arc::new(engine)
        }
        None => {
            warn!("No inference endpoint configured; inspections will answer 503");
            Arc::new(UnconfiguredInference)
        }
    };

    let state = AppState::new(db, EventBus::new(EVENT_BUS_CAPACITY), inference, storage);
    let app = build_router(state);

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
