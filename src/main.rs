//! # Perception Backend - Main Application Entry Point
//!
//! Real-time hand gesture and facial emotion recognition over websockets.
//! A browser streams webcam frames as base64 data URLs; each connection gets
//! its own perception session with its own inference backend.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: the HTTP server and asset downloads are asynchronous
//! - **spawn_blocking**: inference runs on blocking worker threads, one per session
//! - **Trait objects**: `Arc<dyn BackendFactory>` / `Arc<dyn ModelResolver>` decouple
//!   sessions from the candle backend and the HuggingFace Hub
//! - **static**: a global shutdown flag shared with the signal handler task
//!
//! ## Application Architecture:
//! - **config**: configuration (TOML file + environment variables)
//! - **state**: shared configuration, metrics and session counters
//! - **health**: health and metrics endpoints
//! - **middleware**: request metrics
//! - **handlers**: configuration and model asset endpoints
//! - **websocket**: `/ws` and `/ws/emotion` session transport
//! - **vision**: session state machine, protocol, frame decoding, emotion features
//! - **inference**: backend traits, candle landmark network, model asset registry
//! - **device**: CPU/GPU selection
//! - **error**: HTTP error responses

mod config;
mod device;
mod error;
mod handlers;
mod health;
mod inference;
mod middleware;
mod state;
mod vision;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use inference::{AssetRegistry, CandleBackendFactory};
use state::{AppState, PerceptionServices};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handler task once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the shared services**: state, asset registry, backend factory
/// 4. **Configures the HTTP server** with middleware, REST routes and websocket routes
/// 5. **Handles graceful shutdown** on SIGTERM/SIGINT
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        assets_dir = %config.models.assets_dir,
        hub_repo = %config.models.hub_repo,
        max_sessions = config.performance.max_concurrent_sessions,
        "Perception settings"
    );

    let app_state = web::Data::new(AppState::new(config.clone()));

    let registry = Arc::new(AssetRegistry::new(config.models.clone()));
    let factory = Arc::new(CandleBackendFactory::new(
        config.models.input_size,
        config.performance.gpu_capability(),
    ));
    let services = web::Data::new(PerceptionServices::new(factory, registry.clone()));
    let registry = web::Data::from(registry);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(registry.clone())
            .app_data(services.clone())
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/models", web::get().to(handlers::list_models))
                    .route("/models/{kind}/prefetch", web::post().to(handlers::prefetch_model)),
            )
            .route("/health", web::get().to(health::health_check))
            .configure(websocket::routes)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` controls verbosity; without it the default is
/// `perception_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perception_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise [`SHUTDOWN_SIGNAL`].
///
/// If the signal handlers cannot be installed the server still runs; it just
/// cannot shut down gracefully.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Resolve once the shutdown flag is set, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
