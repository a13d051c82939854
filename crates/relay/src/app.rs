//! Main application logic and lifecycle management.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use relay_server::{MemoryCluster, RelayServer, ShutdownState};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

/// How long the server gets to close its connections after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(8);

/// Owns the merged configuration and the relay server for one process run.
pub struct Application {
    config: AppConfig,
    server: Arc<RelayServer>,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates and builds the
    /// server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if args.cluster {
            config.cluster.enabled = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let relay_config = config.to_relay_config()?;
        let backend = config
            .cluster_config()
            .map(|settings| MemoryCluster::new().backend(settings));
        let server = Arc::new(RelayServer::new(relay_config, backend)?);

        Ok(Self { config, server })
    }

    pub fn server(&self) -> &Arc<RelayServer> {
        &self.server
    }

    /// Runs the server until a shutdown signal arrives, then drains it.
    ///
    /// A second signal during the drain exits the process immediately.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Relay Application");
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();

        let server_handle = {
            let server = self.server.clone();
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move {
                match server.start_with_shutdown_state(shutdown_state).await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        info!("✅ Relay is now running!");
        info!("🔌 Ready to accept connections on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal_shutdown_state = setup_signal_handlers().await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        if signal_shutdown_state.is_shutdown_initiated() {
            shutdown_state.initiate_shutdown();
        }

        let online = self.server.node().online_count().await;
        info!("🛑 Shutdown signal received, closing {} connection(s)...", online);

        match timeout(SHUTDOWN_GRACE, server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", SHUTDOWN_GRACE),
        }

        info!("✅ Relay shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🏷️ Advertised node: {}:{}",
            self.config.node.advertise_host, self.config.node.advertise_port
        );
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  💓 Heartbeat: every {}s, probe timeout {}s",
            self.config.heartbeat.interval_secs, self.config.heartbeat.probe_timeout_secs
        );
        info!(
            "  📬 Delivery queue: {} ({:?} on overflow)",
            self.config.delivery.queue_capacity, self.config.delivery.overflow
        );
        if self.config.cluster.enabled {
            info!(
                "  🌐 Cluster: {} backend, group limit {}, topic '{}'",
                self.config.cluster.backend,
                self.config.cluster.group_client_limit,
                self.config.cluster.fanout_topic
            );
        } else {
            info!("  🌐 Cluster: disabled (single-node)");
        }
    }
}
