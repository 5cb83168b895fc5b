use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod config;
mod listener;
mod realtime;
mod score;
mod store;

use api::AppState;
use config::Config;
use listener::ScoreboardListener;
use realtime::{ChannelOptions, RealtimeClient};
use score::{ScoreRepository, ScoreService, UnconfiguredRepository};
use store::PostgrestClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store_settings = config.store_settings();

    // Score repository: PostgREST when configured, otherwise every write fails
    // with a repository error and the API still answers.
    let repo: Arc<dyn ScoreRepository> = match &store_settings {
        Some(settings) => {
            info!("Supabase client initialized for {}", settings.url);
            Arc::new(PostgrestClient::new(settings, config.request_timeout())?)
        }
        None => Arc::new(UnconfiguredRepository),
    };

    // Bind before any realtime channel exists.
    let addr: SocketAddr = config.listen_addr().parse()?;
    let tcp_listener = tokio::net::TcpListener::bind(addr).await?;

    // Realtime listener
    let scoreboard = match (&store_settings, config.realtime_enabled) {
        (Some(settings), true) => {
            let client = RealtimeClient::for_project(
                &settings.url,
                &settings.anon_key,
                ChannelOptions {
                    heartbeat_interval: config.heartbeat_interval(),
                    join_timeout: config.join_timeout(),
                    shutdown_timeout: config.shutdown_timeout(),
                },
            )?;
            let client = Arc::new(client);
            let scoreboard =
                ScoreboardListener::new(Arc::clone(&client), listener::logging_router())
                    .with_events(config.realtime_events);
            scoreboard.start().await;
            info!("🟢 Realtime listener started for {}", listener::CHANNEL_NAME);
            info!("Active realtime channels: {:?}", client.active_channels().await);
            Some((client, scoreboard))
        }
        (None, true) => {
            warn!("🔴 Realtime listener disabled: Supabase is not configured");
            None
        }
        (_, false) => {
            info!("🟡 Realtime listener disabled by configuration");
            None
        }
    };

    let app = api::router(AppState {
        scores: ScoreService::new(repo),
    });
    info!("Stream daemon running on port {}", config.port);
    info!("Environment: {}", config.environment);

    // Serve until SIGINT/SIGTERM, then let in-flight requests finish.
    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((client, scoreboard)) = scoreboard {
        scoreboard.stop().await;
        client.unsubscribe_all().await;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt, shutting down"),
        _ = terminate => info!("Received termination signal, shutting down"),
    }
}
