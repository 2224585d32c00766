use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llava_relay::config::Args;
use llava_relay::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let upstream = args.upstream();
    if !upstream.has_image_slot() {
        tracing::warn!(
            "prompt does not contain {}; the LLaVA server will ignore the image",
            upstream.image_slot()
        );
    }

    let state = Arc::new(
        AppState::new(upstream, args.max_body_bytes).context("failed to build HTTP client")?,
    );
    let app = llava_relay::app(Arc::clone(&state));

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Relay running on http://{}", addr);
    tracing::info!("Forwarding to LLaVA at {}", state.upstream.url);
    tracing::info!(
        "n_predict: {}, image slot: {}",
        state.upstream.n_predict,
        state.upstream.image_slot()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
