use anyhow::{Context, Result};
use tracing::{error, info};
use utility_costs::logging::init_logging;
use utility_costs::{Config, Integration, web};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Utility Costs {} starting up (entries in {}, polling every {}s)",
        env!("APP_VERSION"),
        config.entries_file,
        config.polling.interval_seconds
    );

    let integration =
        Integration::from_config(config.clone()).context("Failed to open config entries")?;
    integration.setup_all().await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let result = web::serve(
        integration.clone(),
        &config.web.host,
        config.web.port,
        shutdown,
    )
    .await;

    integration.shutdown().await;
    match result {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Web server failed with error: {}", e);
            Err(e)
        }
    }
}
