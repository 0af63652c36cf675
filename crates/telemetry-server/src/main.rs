//! POS telemetry server binary

use anyhow::Context;
use telemetry_server::{Config, TelemetryServer, setup_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (needed for tracing settings)
    let loaded = match std::env::var("TELEMETRY_CONFIG") {
        Ok(path) => Config::load_from_file(&path),
        Err(_) => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        // Can't use tracing yet - not initialized
        eprintln!("Configuration error: {}", e);
        eprintln!("Using default configuration");
        let mut config = Config::default();
        config.apply_env();
        config.resolve_api_base_url();
        config
    });

    let _telemetry_guard = setup_tracing(
        config.environment(),
        &config.logging.diagnostic_level,
        &config.telemetry,
    )
    .context("failed to initialize tracing")?;

    let server = TelemetryServer::new(config).context("failed to build telemetry server")?;
    server.run().await?;

    // Telemetry guard flushes spans on drop
    Ok(())
}
