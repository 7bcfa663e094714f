use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use hivecast_db::pool::DbPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::lifecycle::StreamCoordinator;
use crate::transcode::StreamTranscoder;

pub mod routes_channels;
pub mod routes_hooks;
pub mod routes_streams;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub coordinator: Arc<StreamCoordinator>,
    pub transcoder: Arc<dyn StreamTranscoder>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api_routes = routes_streams::stream_routes().merge(routes_channels::channel_routes());

    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        // Ingest server callbacks
        .nest("/hooks", routes_hooks::hook_routes());

    // Serve HLS output and thumbnails straight from the media root.
    let live_dir = ctx.config.media.root.join("live");
    let thumb_dir = ctx.config.media.thumbnail_dir();
    if live_dir.exists() {
        app = app.nest_service("/live", ServeDir::new(&live_dir));
    }
    if thumb_dir.exists() {
        app = app.nest_service("/thumbnails", ServeDir::new(&thumb_dir));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
