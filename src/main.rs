mod background;
mod config;
mod constants;
mod handlers;
mod models;
mod server;
mod session_cache;
mod state;
mod upstream;
mod util;


use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::background::{run_board_metrics, run_passive_refresh};
use crate::config::Config;
use crate::constants::DEFAULT_STATIC_DIR;
use crate::server::build_router;
use crate::state::AppState;
use crate::upstream::HttpSource;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rep_leaderboard=info".into()),
        )
        .init();

    CryptoProvider::install_default(default_provider())
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::from_env()?;
    let source = HttpSource::new(
        config.source_url.clone(),
        config.source_submit_url.clone(),
        config.source_token.clone(),
        config.request_timeout,
    )?;
    let state = AppState::new(config.clone(), source);
    state.warm_from_session_cache().await;

    let disable_background = env::var("DISABLE_BACKGROUND_TASKS")
        .map(|value| {
            let trimmed = value.trim();
            !trimmed.is_empty() && trimmed != "0"
        })
        .unwrap_or(false);

    if disable_background {
        warn!("background tasks disabled via DISABLE_BACKGROUND_TASKS");
    } else {
        state.spawn_refresh(true);
        tokio::spawn(run_passive_refresh(Arc::clone(&state)));
        tokio::spawn(run_board_metrics(Arc::clone(&state)));
    }

    let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_string());

    let app = build_router(Arc::clone(&state), static_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        source = %config.source_url,
        category = %config.default_category,
        "rep-leaderboard listening on {}",
        addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
    .await
    .context("server error")?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        let ctrl_c = tokio::signal::ctrl_c();
        let terminate = match signal(SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                warn!(?err, "failed to install SIGTERM handler");
                None
            }
        };
        let quit = match signal(SignalKind::quit()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                warn!(?err, "failed to install SIGQUIT handler");
                None
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = async {
                if let Some(mut signal) = terminate {
                    signal.recv().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(mut signal) = quit {
                    signal.recv().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    state.broadcast_shutdown();
}
