use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stt_relay::keepalive::spawn_keepalive;
use stt_relay::{create_router, AppState, Config, WebSocketEngine};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stt-relay", version, about = "Streaming speech-to-text relay")]
struct Args {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/stt-relay")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stt_relay=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(engine_url = %cfg.recognition.engine_url, "Recognition engine");
    info!(
        default_language = %cfg.recognition.default_language,
        sample_rate = cfg.recognition.sample_rate_hertz,
        permissive_parsing = cfg.protocol.permissive_parsing,
        max_sessions = cfg.service.max_sessions,
        "Session defaults"
    );

    let engine = Arc::new(WebSocketEngine::new(&cfg.recognition));
    let state = AppState::new(engine, &cfg);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keepalive = cfg.keepalive.enabled.then(|| {
        spawn_keepalive(
            cfg.keepalive.url.clone(),
            Duration::from_secs(cfg.keepalive.interval_secs),
            shutdown_rx,
        )
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = keepalive {
        if let Err(e) = handle.await {
            warn!(error = %e, "Keep-alive task failed");
        }
    }

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = wait_for_sigterm() => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
