pub mod doctor;
pub mod onboard;
pub mod providers;
pub mod serve;
pub mod status;

use std::path::{Path, PathBuf};
use synapse_config::{AppConfig, ConfigError};

/// The `--config` path, else the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_from(&config_path(explicit))
}
