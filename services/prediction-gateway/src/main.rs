use anyhow::{Context, Result};
use housing_core::{config::GatewayConfig, init_tracing};
use prediction_gateway::server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("prediction-gateway");

    let cfg = GatewayConfig::from_env().context("loading gateway configuration")?;
    let source = cfg.model_source().context("selecting model source")?;
    info!(?source, "resolving model artifact");

    // Fail-fast: nothing is bound until the artifact is in memory.
    let ctx = server::load_context(&cfg, &source)
        .await
        .context("loading model artifact")?;
    info!(
        version = ctx.model_version.as_deref().unwrap_or("-"),
        trained_at = %ctx.artifact.created_at,
        "model loaded"
    );

    let app = server::router(ctx);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving requests")?;

    // Teardown releases the in-memory artifact; nothing is persisted.
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
