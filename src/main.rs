mod api;
mod config;
mod db;
mod error;
mod models;
mod services;
#[cfg(test)]
mod test_support;
mod visual;

use crate::config::Config;
use crate::services::{break_builder, character_sync, BreakScheduler, PlayoutClient};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,break_studio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("configuration loaded");

    let pool = db::connect(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), "connected to embedded store");

    let recovered = db::recover_stale_preparing(&pool).await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "recovered stale PREPARING breaks from a previous run");
    }
    db::prune_retention(&pool).await?;

    if let Err(e) = character_sync::sync_all(&pool, &config.assets_dir).await {
        tracing::warn!(error = %e, "character config sync failed");
    }

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let playout = Arc::new(PlayoutClient::new(config.playout_socket.clone()));

    let scheduler = Arc::new(BreakScheduler::new(pool.clone(), {
        let pool = pool.clone();
        let config = config.clone();
        let http = http.clone();
        let playout = playout.clone();
        Arc::new(move || {
            let pool = pool.clone();
            let config = config.clone();
            let http = http.clone();
            let playout = playout.clone();
            Box::pin(async move {
                if let Err(e) = break_builder::prepare_break(&pool, &config, &http, &playout, false, None, None).await {
                    tracing::error!(error = %e, "scheduled break build failed");
                }
            })
        })
    }));
    scheduler.start().await;

    let state = Arc::new(api::AppState {
        pool: pool.clone(),
        config: config.clone(),
        http,
        playout,
        scheduler: scheduler.clone(),
        recent_tracks: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
    });

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    scheduler.stop().await;
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
