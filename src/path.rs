// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where graphkeep expects its configuration file to live. The
//! persisted graph document is kept alongside that configuration unless the
//! configuration says otherwise.

use std::path::PathBuf;

/// Name of the directory graphkeep claims inside the user's config directory.
pub const APP_DIR_NAME: &str = "graphkeep";

/// Name of the configuration file inside [`default_config_dir`].
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Determine default absolute path to graphkeep's configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/graphkeep` as the default.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the user's configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join(APP_DIR_NAME))
        .ok_or(NoConfigDir)
}

/// Determine default absolute path to graphkeep's configuration file.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the user's configuration directory cannot be
///   determined.
pub fn default_config_path() -> Result<PathBuf> {
    default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
