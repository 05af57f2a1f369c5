#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use plexus_config::Config;
use plexus_mcp::RouterState;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Logging goes to stderr; stdout belongs to the protocol
    plexus_telemetry::init(config.telemetry.as_ref(), "info")?;

    tracing::info!(
        config_path = %args.config.display(),
        upstreams = config.upstreams.len(),
        "starting plexus"
    );

    // Initialize the embedding provider, then connect upstreams and build
    // the catalog and index; any failure here is fatal and exits non-zero
    let provider = plexus_embeddings::build_provider(&config.embeddings)?;
    let state = Arc::new(RouterState::connect(&config, provider).await?);

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    // Serve the host on stdio until EOF or signal
    plexus_mcp::serve(Arc::clone(&state), tokio::io::stdin(), tokio::io::stdout(), shutdown).await?;

    state.shutdown().await;

    tracing::info!("plexus stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
