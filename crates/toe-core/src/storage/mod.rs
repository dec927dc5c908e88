mod archive;
pub mod config;
mod state;

pub use archive::SessionArchive;
pub use config::{CategoryConfig, Config};
pub use state::PromptMemory;

use crate::error::ConfigError;
use std::path::PathBuf;

/// Returns `~/.config/toe[-dev]/` based on TOE_ENV.
///
/// Set TOE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TOE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("toe-dev")
    } else {
        base_dir.join("toe")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Directory for rolling log files, `<data_dir>/logs`.
pub fn log_dir() -> Result<PathBuf, ConfigError> {
    let dir = data_dir()?.join("logs");
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
