//! `v2t-worker` -- pull / infer / submit loop.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use v2t_vlm::create_backend;
use v2t_worker::{ServerClient, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "v2t_worker=info,v2t_vlm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("failed to load worker configuration")?;
    tracing::info!(
        server_url = %config.server_url,
        backend = ?config.backend,
        max_local_retries = config.max_local_retries,
        "Starting v2t-worker",
    );

    let backend = create_backend(config.backend, &config.remote)
        .context("failed to create inference backend")?;
    let client = ServerClient::new(&config.server_url).context("failed to build HTTP client")?;
    let worker = Worker::new(client, backend, config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, stopping after the current job");
            }
            cancel.cancel();
        });
    }

    worker.run(&cancel).await
}
