use std::env;
use std::path::PathBuf;

use lifelink_core::Config;

/// Optional path to a TOML configuration file
pub const CONFIG_PATH_VAR: &str = "LIFELINK_CONFIG";

/// Load the service configuration from `LIFELINK_CONFIG` (if set) and the
/// environment overrides.
pub fn load() -> anyhow::Result<Config> {
    let path = env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    Ok(config)
}
