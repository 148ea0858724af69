use threadboard_core::BoardCore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let core = BoardCore::start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start board: {e}"))?;

    tracing::info!(
        database = %core.config.database_path().display(),
        "threadboard node running, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;

    core.shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("failed to shut down cleanly: {e}"))?;

    Ok(())
}
