//! Logging system setup.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes tracing with the configured level, unless `RUST_LOG` is set.
///
/// Output is human-readable by default and JSON when either the config
/// file or `--json-logs` asks for it. Thread ids and names are included.
///
/// # Arguments
///
/// * `config` - Logging section of the config file
/// * `json_format` - Forces JSON output (CLI override)
///
/// # Returns
///
/// `Ok(())` once the global subscriber is installed, or an error if one
/// was already set or the filter could not be built.
///
/// # Examples
///
/// ```rust,no_run
/// use lib_relay::{setup_logging, LoggingSettings};
///
/// let settings = LoggingSettings {
///     level: "info".to_string(),
///     json_format: false,
/// };
/// setup_logging(&settings, false).expect("logging initialized once");
/// ```
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer()
                .json()
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(true)
                .with_thread_names(true)
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer()
                .with_ansi(true)
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(true)
                .with_thread_names(true)
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Logs the startup banner.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║              📡 RELAY SERVER             ║");
    info!("║                 v{:<24}║", version);
    info!("║                                          ║");
    info!("║  🔐 Self-routing client identifiers      ║");
    info!("║  👥 Cluster-wide groups                  ║");
    info!("║  💓 Heartbeat eviction                   ║");
    info!("╚══════════════════════════════════════════╝");
}
