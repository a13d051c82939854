//! # Relay - Application Entry Point
//!
//! Runs one relay node: parses the command line, loads the TOML
//! configuration, sets up logging and drives the server until a shutdown
//! signal arrives.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (writes relay.toml if missing)
//! relay
//!
//! # Specify custom configuration
//! relay --config production.toml
//!
//! # Override specific settings
//! relay --bind 0.0.0.0:7800 --log-level debug --cluster
//!
//! # JSON logging for production
//! relay --json-logs
//! ```
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) start a graceful shutdown; a
//! second signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, sets up logging and runs the application.
///
/// Exits the process with code 1 on a startup or runtime failure.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // logging settings come from the file, before the full load and validation
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use logging::setup_logging;

pub use config::{
    ClusterSettings, DeliverySettings, HeartbeatSettings, LoggingSettings, NodeSettings,
    ServerSettings,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_application_creation() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("relay.toml"),
            bind_address: Some("127.0.0.1:0".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: false,
            cluster: true,
        };

        let app = Application::new(args).await.expect("application should build");
        assert!(app.server().node().is_clustered());
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("relay.toml"),
            bind_address: Some("not-an-address".to_string()),
            log_level: None,
            json_logs: false,
            cluster: false,
        };

        assert!(Application::new(args).await.is_err());
        assert!(dir.path().join("relay.toml").exists());
    }
}
