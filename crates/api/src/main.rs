use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use v2t_api::config::ServerConfig;
use v2t_api::router::build_app_router;
use v2t_api::shutdown::{join_task, ORCHESTRATOR_STOP_TIMEOUT};
use v2t_api::state::AppState;
use v2t_pipeline::ffmpeg::FfmpegFrameSource;
use v2t_pipeline::{Orchestrator, RunExit};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "v2t_server=info,v2t_api=info,v2t_pipeline=info,v2t_store=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    if config.datasets.is_empty() {
        tracing::warn!("DATASETS is empty; nothing will be dispatched");
    }
    tracing::info!(
        host = %config.host,
        port = %config.port,
        run_base = %config.run_base.display(),
        run_id = %config.run_id,
        "Loaded server configuration",
    );

    // --- App state ---
    let state = AppState::new(config.clone());

    // --- Orchestrator ---
    let frames = Arc::new(FfmpegFrameSource::new(config.pipeline.encoding));
    let orchestrator = Orchestrator::start(
        config.datasets.clone(),
        config.pipeline.clone(),
        Arc::clone(&state.dispatcher),
        state.store.clone(),
        state.locks.clone(),
        frames,
        Arc::clone(&state.progress),
    )
    .await;

    let orchestrator_cancel = CancellationToken::new();
    let all_done = CancellationToken::new();
    let orchestrator_handle = {
        let cancel = orchestrator_cancel.clone();
        let all_done = all_done.clone();
        tokio::spawn(async move {
            if orchestrator.run(cancel).await == RunExit::AllDone {
                all_done.cancel();
            }
        })
    };

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = match config.host.parse() {
        Ok(ip) => SocketAddr::new(ip, config.port),
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    let shutdown = {
        let all_done = all_done.clone();
        async move {
            tokio::select! {
                () = shutdown_signal() => {}
                () = all_done.cancelled() => {
                    tracing::info!("All samples processed, starting graceful shutdown");
                }
            }
        }
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    orchestrator_cancel.cancel();
    join_task("orchestrator", orchestrator_handle, ORCHESTRATOR_STOP_TIMEOUT).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
