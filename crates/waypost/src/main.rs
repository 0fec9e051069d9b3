use tracing_subscriber::EnvFilter;
use waypost::{Gateway, GatewayConfig, GatewayError};

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Read .env before the subscriber so RUST_LOG can come from it.
    let config = GatewayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let gateway = Gateway::builder().config(config).build().await?;
    gateway.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
