// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Graph document persistence.
//!
//! The graph editor hands graphkeep a __graph document__: a JSON array of
//! node and edge records. Graphkeep never interprets those records. It only
//! makes sure the top-level value really is an array, and keeps the most
//! recent one on disk as a single pretty-printed JSON file.
//!
//! # Atomic Replacement
//!
//! Every save writes the new document to a temporary file next to the
//! backing file and renames it into place. Readers, including the git
//! process that synchronizes the file, observe either the previous document
//! or the new one, never a half-written file.
//!
//! The staging file is named with [`STAGING_PREFIX`] so the sync can tell it
//! apart from real changes in the working tree. A save keeps whatever
//! permissions the backing file already had. A fresh backing file is created
//! as `0644` minus the umask. A symlinked backing file stays a symlink; its
//! target is what gets replaced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::Builder;
use tracing::{debug, info, instrument};

/// What [`GraphStore::load`] yields before anything has been saved.
pub const EMPTY_DOCUMENT: &[u8] = b"[]";

/// File name prefix of the staging file written during a save.
pub const STAGING_PREFIX: &str = ".graphkeep-stage-";

/// Ordered sequence of opaque node and edge records.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphDocument(Vec<Value>);

impl GraphDocument {
    /// Construct new graph document from records.
    pub fn new(records: Vec<Value>) -> Self {
        Self(records)
    }

    /// Parse graph document from raw request body.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::BadData`] if the body is not valid JSON, or
    ///   if its top-level value is anything other than an array.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::try_from(value),
            Err(error) => {
                debug!("reject malformed graph document: {error}");
                Err(StoreError::BadData)
            }
        }
    }

    /// Number of records in graph document.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Graph document has no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records of graph document.
    pub fn records(&self) -> &[Value] {
        self.0.as_slice()
    }
}

impl TryFrom<Value> for GraphDocument {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Array(records) => Ok(Self(records)),
            _ => {
                debug!("reject graph document that is not an array");
                Err(StoreError::BadData)
            }
        }
    }
}

/// Single-file store for the graph document.
#[derive(Debug, Clone)]
pub struct GraphStore {
    dir: PathBuf,
    path: PathBuf,
}

impl GraphStore {
    /// Open graph store in target directory.
    ///
    /// Creates the directory if it does not already exist yet. The backing
    /// file itself is only created by the first save.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::CreateDir`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, file_name: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        mkdirp::mkdirp(&dir).map_err(|source| StoreError::CreateDir {
            source,
            dir: dir.clone(),
        })?;
        let path = dir.join(file_name.as_ref());

        Ok(Self { dir, path })
    }

    /// Absolute or relative path to backing file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Directory holding backing file.
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Replace persisted graph document.
    ///
    /// Serializes the document as pretty-printed UTF-8 JSON with non-ASCII
    /// characters kept as is, then atomically swaps it in for the previous
    /// content of the backing file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Serialize`] if the document cannot be rendered.
    /// - Return [`StoreError::Write`] if the backing file cannot be replaced.
    #[instrument(skip(self, document), level = "debug")]
    pub fn save(&self, document: &GraphDocument) -> Result<()> {
        info!(
            "write graph document to {:?} (items={})",
            self.path.display(),
            document.len()
        );
        let rendered = serde_json::to_vec_pretty(document)?;

        let target = self.resolve_target();
        let write_error = |source: std::io::Error| StoreError::Write {
            source,
            path: target.clone(),
        };

        // INVARIANT: Stage in the same directory as the target so the final
        // rename never crosses a file system boundary.
        let staging_dir = target
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(self.dir.as_path());
        let existing = fs::metadata(&target)
            .ok()
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.permissions());

        let mut builder = Builder::new();
        builder.prefix(STAGING_PREFIX);
        if let (None, Some(permissions)) = (&existing, fresh_permissions()) {
            builder.permissions(permissions);
        }

        let mut staged = builder.tempfile_in(staging_dir).map_err(write_error)?;
        staged.write_all(&rendered).map_err(write_error)?;
        if let Some(permissions) = existing {
            staged
                .as_file()
                .set_permissions(permissions)
                .map_err(write_error)?;
        }
        staged.as_file().sync_all().map_err(write_error)?;
        staged
            .persist(&target)
            .map_err(|error| write_error(error.error))?;

        Ok(())
    }

    // Follow a symlinked backing file to the file it points at. Dangling
    // links are replaced like any other missing file.
    fn resolve_target(&self) -> PathBuf {
        match fs::symlink_metadata(&self.path) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone())
            }
            _ => self.path.clone(),
        }
    }

    /// Load persisted graph document as raw bytes.
    ///
    /// Yields [`EMPTY_DOCUMENT`] if nothing has been saved yet, so callers
    /// always get a well-formed graph.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if the backing file exists but cannot be
    ///   read.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no graph document at {:?} yet", self.path.display());
                Ok(EMPTY_DOCUMENT.to_vec())
            }
            Err(source) => Err(StoreError::Read {
                source,
                path: self.path.clone(),
            }),
        }
    }
}

#[cfg(unix)]
fn fresh_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;

    // Mode is applied at creation, so the umask still narrows it.
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn fresh_permissions() -> Option<fs::Permissions> {
    None
}

/// All possible error types for graph store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Graph document is not a JSON array.
    #[error("graph document must be a JSON array")]
    BadData,

    /// Data directory cannot be created.
    #[error("failed to create data directory {dir:?}")]
    CreateDir {
        #[source]
        source: std::io::Error,
        dir: PathBuf,
    },

    /// Graph document cannot be rendered.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    /// Backing file cannot be replaced.
    #[error("failed to write graph document {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backing file cannot be read.
    #[error("failed to read graph document {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;
