//! Persistent harness settings.
//!
//! Stores scalar configuration in `~/.gantry/config.json`: the remote
//! automation server URL and the path to the capability document. Both have
//! documented defaults and can be overridden per invocation via the
//! `GANTRY_SERVER_URL` and `GANTRY_CAPABILITIES` environment variables, which
//! take precedence over the file.
//!
//! # Example
//!
//! ```no_run
//! use gantry_core::settings::Settings;
//!
//! // Load (returns defaults if the file doesn't exist)
//! let settings = Settings::load();
//! println!("server: {}", settings.server_url());
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const SETTINGS_FILENAME: &str = "config.json";

/// Default remote automation server endpoint, used when nothing is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:4723/wd/hub";

/// Default capability document path, relative to the working directory.
pub const DEFAULT_CAPABILITIES_PATH: &str = "config/capabilities.json";

/// Environment override for the server URL.
pub const SERVER_URL_ENV: &str = "GANTRY_SERVER_URL";

/// Environment override for the capability document path.
pub const CAPABILITIES_PATH_ENV: &str = "GANTRY_CAPABILITIES";

/// Returns the gantry home directory (`~/.gantry`).
pub fn gantry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gantry")
}

/// Persistent gantry settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Remote automation server URL. Falls back to [`DEFAULT_SERVER_URL`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Path to the capability document. Falls back to
    /// [`DEFAULT_CAPABILITIES_PATH`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `~/.gantry/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = gantry_dir().join(SETTINGS_FILENAME);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to `~/.gantry/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = gantry_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(dir.join(SETTINGS_FILENAME), json)
    }

    /// Effective server URL: environment, then file, then default.
    pub fn server_url(&self) -> String {
        std::env::var(SERVER_URL_ENV)
            .ok()
            .or_else(|| self.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    /// Effective capability document path: environment, then file, then default.
    pub fn capabilities_path(&self) -> PathBuf {
        std::env::var_os(CAPABILITIES_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| self.capabilities_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CAPABILITIES_PATH))
    }
}
