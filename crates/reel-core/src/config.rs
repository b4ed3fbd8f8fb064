use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ReelError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Sessions shorter than this are treated as accidental opens and not recorded.
pub const MIN_WATCH_SECS: f64 = 5.0;

/// Consecutive sessions for the same item within this window are merged.
pub const MERGE_WINDOW_MINUTES: i64 = 5;

/// An item is considered finished once position/duration exceeds this ratio.
pub const COMPLETION_THRESHOLD: f64 = 0.95;

/// Days since the last watch before a recap is suggested on resume.
pub const RECAP_SUGGESTION_DAYS: i64 = 7;

/// Days of history included in the streak calendar.
pub const STREAK_CALENDAR_DAYS: u32 = 365;

/// Number of titles shown in the most-watched list.
pub const MOST_WATCHED_LIMIT: u32 = 10;

/// Number of entries shown in the watch history.
pub const WATCH_HISTORY_LIMIT: u32 = 50;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub player: PlayerConfig,
    pub library: LibraryConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Configured player: "mpv" or "celluloid".
    pub kind: String,
    /// Explicit path to the player binary, overriding the PATH lookup.
    pub executable: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub tmdb_api_key: Option<String>,
    pub opensubtitles_api_key: Option<String>,
    pub subtitle_language: String,
}

impl AppConfig {
    /// Load config: user file (if exists) over built-in defaults, then
    /// API keys from the environment where the file leaves them unset.
    pub fn load() -> Result<Self, ReelError> {
        let mut config = if Self::config_path().exists() {
            let user_str = std::fs::read_to_string(Self::config_path())?;
            toml::from_str(&user_str).map_err(|e| ReelError::Config(e.to_string()))?
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| ReelError::Config(e.to_string()))?
        };
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), ReelError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ReelError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Path to the user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("reel.db"))
            .unwrap_or_else(|| PathBuf::from("reel.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, ReelError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "reel")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if config.metadata.tmdb_api_key.is_none() {
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            if !key.is_empty() {
                config.metadata.tmdb_api_key = Some(key);
            }
        }
    }
    if config.metadata.opensubtitles_api_key.is_none() {
        if let Ok(key) = std::env::var("OPENSUBTITLES_API_KEY") {
            if !key.is_empty() {
                config.metadata.opensubtitles_api_key = Some(key);
            }
        }
    }
}
