use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, patch, post},
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod repository;
mod ws;


use crate::auth::{Credentials, JwtCredentials};
use crate::config::ServerConfig;
use crate::db::Database;
use crate::repository::ChatRepository;
use crate::ws::RoomChannels;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "duplexd")]
#[command(about = "Duplex direct-messaging server")]
struct Cli {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the API server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Custom data directory (defaults to ~/.duplex)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<ServerConfig>,
    pub repository: Arc<ChatRepository>,
    /// Credential collaborator: issue on login/register, verify on every
    /// authenticated request.
    pub credentials: Arc<dyn Credentials>,
    /// Per-room broadcast registry for the ws relay.
    pub channels: Arc<RoomChannels>,
}

pub(crate) fn build_router(state: AppState) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health_handler))
        // Auth collaborators
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        // Inbox + rooms
        .route("/api/rooms", get(handlers::list_rooms))
        .route("/api/rooms", post(handlers::open_room))
        .route("/api/rooms/{room_id}", get(handlers::get_room))
        .route("/api/rooms/{room_id}/messages", get(handlers::room_history))
        // Per-room live channel (the ws base has no /api prefix)
        .route("/rooms/{room_id}", get(ws::room_socket))
        // Profile
        .route("/api/users", patch(handlers::update_profile));

    app.layer(axum::middleware::from_fn_with_state(
        state.clone(),
        auth::auth_middleware,
    ))
    .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "duplexd=debug,tower_http=debug,info"
    } else {
        "duplexd=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting duplexd");

    let mut config = ServerConfig::load(cli.data_dir)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    info!("Initializing database...");
    let db = Database::new(&config).await?;
    let repository = Arc::new(ChatRepository::new(db.pool.clone()));

    let credentials = Arc::new(
        JwtCredentials::from_data_dir(&config.data_dir, config.auth.token_ttl_secs)
            .context("failed to initialize credential signing")?,
    );

    let channels = Arc::new(RoomChannels::new(config.server.room_channel_capacity));

    let state = AppState {
        config: config.clone(),
        repository,
        credentials,
        channels,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port)
        .parse::<SocketAddr>()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("duplexd listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  POST  /api/auth/register          - Create an account");
    info!("  POST  /api/auth/login             - Obtain a credential");
    info!("  GET   /api/rooms                  - Inbox (your rooms)");
    info!("  POST  /api/rooms                  - Open a room with a peer");
    info!("  GET   /api/rooms/:id/messages     - Message history");
    info!("  GET   /rooms/:id                  - Live room channel (WebSocket)");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
