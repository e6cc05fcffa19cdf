// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that graphkeep uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! # General Layout
//!
//! The configuration is split into four tables: `server` for the listening
//! address, `store` for where the graph document lives, `sync` for the git
//! synchronization that follows each save, and `cors` for the origins the
//! editor is served from. Every field has a default, so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Service configuration layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listening address.
    pub server: ServerSettings,

    /// Location of the persisted graph document.
    pub store: StoreSettings,

    /// Git synchronization of the persisted graph document.
    pub sync: SyncSettings,

    /// Cross-origin policy for the editor.
    pub cors: CorsSettings,
}

impl ServiceConfig {
    /// Resolve the directory that holds the persisted graph document.
    ///
    /// Uses the configured data directory if there is one. Otherwise the
    /// document is kept alongside the configuration file at `config_path`.
    pub fn data_dir(&self, config_path: impl AsRef<Path>) -> PathBuf {
        match &self.store.data_dir {
            Some(data_dir) => data_dir.as_path().to_path_buf(),
            None => config_path
                .as_ref()
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl FromStr for ServiceConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ServiceConfig = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on data directory field.
        if let Some(data_dir) = config.store.data_dir.take() {
            config.store.data_dir = Some(DataDir::new(
                shellexpand::full(data_dir.to_string().as_str())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(config)
    }
}

impl Display for ServiceConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Listening address settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host name or address to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7001,
        }
    }
}

/// Graph document location settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory to keep the graph document in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<DataDir>,

    /// File name of the graph document.
    pub file_name: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: "graph.json".into(),
        }
    }
}

/// Git synchronization settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Synchronize the graph document at all.
    pub enabled: bool,

    /// Quiet period after the last save before synchronizing.
    pub debounce_secs: u64,

    /// Remote to push to.
    pub remote: String,

    /// Ref to push.
    pub branch: String,

    /// Git binary to invoke.
    pub git: String,
}

impl SyncSettings {
    /// Debounce window as a [`Duration`].
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_secs: 60,
            remote: "origin".into(),
            branch: "HEAD".into(),
            git: "git".into(),
        }
    }
}

/// Cross-origin settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Refuse to echo origins that are not allow-listed.
    pub strict: bool,

    /// Origins the editor is expected to be served from.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            strict: false,
            allowed_origins: vec![
                "http://localhost:7000".into(),
                "http://127.0.0.1:7000".into(),
                "http://localhost:8000".into(),
                "http://127.0.0.1:8000".into(),
            ],
        }
    }
}

/// Directory holding the persisted graph document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DataDir(PathBuf);

impl DataDir {
    /// Construct new data directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat data directory as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Display for DataDir {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
