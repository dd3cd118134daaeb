//! Global configuration loader for Syllog.
//!
//! Reads `config.toml` from the data directory (`~/.syllog/` in
//! production, overridable with `SYLLOG_DATA_DIR`) and deserializes it
//! into [`GlobalConfig`]. Falls back to defaults when the file is
//! missing or malformed.

use std::path::{Path, PathBuf};

use syllog_types::config::GlobalConfig;

/// Resolve the data directory: `SYLLOG_DATA_DIR` if set, else `~/.syllog`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SYLLOG_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".syllog")
}

/// The SQLite database URL under a data directory.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/syllog.db?mode=rwc", data_dir.display())
}

/// Where paradigm definitions live under a data directory.
pub fn paradigm_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("paradigms")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}
