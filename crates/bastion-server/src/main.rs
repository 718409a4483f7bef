//! # Bastion Server
//!
//! Loads configuration, starts logging and metrics, connects MySQL and
//! Redis, and runs the periodic tasks until Ctrl-C or SIGTERM.

use bastion_config::ConfigLoader;
use bastion_core::telemetry::init_telemetry;
use bastion_core::BastionResult;
use bastion_server::startup::{install_metrics_exporter, print_banner, shutdown_signal};
use bastion_server::App;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Application error");
        eprintln!("bastion-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> BastionResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_telemetry(&config.observability.telemetry(&config.app.name))?;
    print_banner();

    info!("Version: {}", config.app.version);
    info!("Environment: {}", config.app.environment);

    if config.observability.metrics_enabled {
        install_metrics_exporter(&config.observability)?;
    }

    let app = App::build(&config).await?;
    app.run(shutdown_signal()).await
}
