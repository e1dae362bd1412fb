//! Structured logging for LifeLink services.
//!
//! Log level is taken from `RUST_LOG` and defaults to `info`. Every
//! initializer may be called more than once; only the first call installs
//! the global subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize human readable logging.
///
/// # Example
/// ```no_run
/// use lifelink_core::logging;
///
/// logging::init();
/// tracing::info!("Dispatch service started");
/// ```
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .is_ok()
}

/// Initialize JSON logging for log aggregation.
///
/// # Example
/// ```no_run
/// use lifelink_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "dispatch-api", "Service started");
/// ```
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_json() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init()
        .is_ok()
}

/// Initialize logging according to the service configuration.
pub fn init_from_config(config: &LoggingConfig) -> bool {
    if config.json {
        init_json()
    } else {
        init()
    }
}
