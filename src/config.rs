//! Application-level configuration loading: board defaults, timings and data locations.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::{DEFAULT_GRID_SIZE, is_valid_grid_size};

/// Default location on disk where the configuration JSON is looked up.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MEMORY_MATCH_CONFIG_PATH";

const DEFAULT_RESOLVE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_AUTH_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AVATAR_URL: &str = "https://ionicframework.com/docs/img/demos/avatar.svg";
const DEFAULT_LOCAL_STORAGE_KEY: &str = "gameState";
const DEFAULT_CATALOG_URL: &str = "https://my-json-server.typicode.com/cmmnct/cards/cards";
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Board size dealt before the player picks one.
    pub default_grid_size: usize,
    /// Delay before a mismatch flips back or a completed board is recorded.
    pub resolve_delay: Duration,
    /// Upper bound for login/signup/logout to observe the reconciled session.
    pub auth_confirmation_timeout: Duration,
    /// Avatar assigned to freshly created profiles.
    pub default_avatar_url: String,
    /// Local storage key holding the anonymous game state.
    pub local_storage_key: String,
    /// Endpoint serving the card catalog.
    pub catalog_url: String,
    /// Root directory for directory-backed local and file storage.
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        grid_size = config.default_grid_size,
                        resolve_delay_ms = config.resolve_delay.as_millis() as u64,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Directory used by [`crate::dao::local_storage::DirectoryLocalStorage`].
    pub fn local_storage_dir(&self) -> PathBuf {
        self.data_dir.join("local")
    }

    /// Directory used by [`crate::dao::file_store::DirectoryFileStore`].
    pub fn file_store_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_grid_size: DEFAULT_GRID_SIZE,
            resolve_delay: DEFAULT_RESOLVE_DELAY,
            auth_confirmation_timeout: DEFAULT_AUTH_CONFIRMATION_TIMEOUT,
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
            local_storage_key: DEFAULT_LOCAL_STORAGE_KEY.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    default_grid_size: Option<usize>,
    resolve_delay_ms: Option<u64>,
    auth_confirmation_timeout_ms: Option<u64>,
    default_avatar_url: Option<String>,
    local_storage_key: Option<String>,
    catalog_url: Option<String>,
    data_dir: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let default_grid_size = match value.default_grid_size {
            Some(size) if is_valid_grid_size(size) => size,
            Some(size) => {
                warn!(grid_size = size, "ignoring invalid default grid size");
                defaults.default_grid_size
            }
            None => defaults.default_grid_size,
        };
        Self {
            default_grid_size,
            resolve_delay: value
                .resolve_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.resolve_delay),
            auth_confirmation_timeout: value
                .auth_confirmation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.auth_confirmation_timeout),
            default_avatar_url: value
                .default_avatar_url
                .unwrap_or(defaults.default_avatar_url),
            local_storage_key: value
                .local_storage_key
                .filter(|key| !key.is_empty())
                .unwrap_or(defaults.local_storage_key),
            catalog_url: value.catalog_url.unwrap_or(defaults.catalog_url),
            data_dir: value.data_dir.unwrap_or(defaults.data_dir),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let config = AppConfig::from_json(r#"{"resolveDelayMs": 250, "defaultGridSize": 8}"#)
            .unwrap();
        assert_eq!(config.resolve_delay, Duration::from_millis(250));
        assert_eq!(config.default_grid_size, 8);
        assert_eq!(config.local_storage_key, "gameState");
    }

    #[test]
    fn invalid_grid_size_falls_back() {
        let config = AppConfig::from_json(r#"{"defaultGridSize": 7}"#).unwrap();
        assert_eq!(config.default_grid_size, DEFAULT_GRID_SIZE);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{").is_err());
    }
}
