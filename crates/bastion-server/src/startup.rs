//! Server startup utilities.

use bastion_config::ObservabilityConfig;
use bastion_core::{BastionError, BastionResult};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    ____             __  _
   / __ )____ ______/ /_(_)___  ____
  / __  / __ `/ ___/ __/ / __ \/ __ \
 / /_/ / /_/ (__  ) /_/ / /_/ / / / /
/_____/\__,_/____/\__/_/\____/_/ /_/
    "#);
}

/// Installs the Prometheus exporter and describes every metric family.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> BastionResult<()> {
    let addr: SocketAddr = config.metrics_listen_addr.parse().map_err(|e| {
        BastionError::Configuration(format!(
            "Invalid metrics listen address '{}': {e}",
            config.metrics_listen_addr
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| BastionError::Internal(format!("Failed to install metrics exporter: {e}")))?;

    bastion_cache::register_metrics();
    bastion_jobs::register_metrics();

    info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_invalid_metrics_address_is_rejected() {
        let config = ObservabilityConfig {
            metrics_listen_addr: "not an address".to_string(),
            ..ObservabilityConfig::default()
        };

        let err = install_metrics_exporter(&config).unwrap_err();
        assert!(matches!(err, BastionError::Configuration(_)));
    }
}
