// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git command line adapter.
//!
//! Graphkeep does not link against libgit2 to synchronize the graph document.
//! It shells out to whatever git binary the user has configured, so remotes,
//! credential helpers, and SSH setup all behave exactly as they would in the
//! user's own shell.

use crate::sync::{CommandOutput, Result, SyncError, VersionControl};

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Version control through the git binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
    work_dir: PathBuf,
}

impl GitCli {
    /// Construct new git adapter operating inside `work_dir`.
    pub fn new(program: impl Into<OsString>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Directory git is invoked in.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_path()
    }
}

impl VersionControl for GitCli {
    #[instrument(skip(self), level = "debug")]
    fn gitcall(&self, args: &[OsString]) -> Result<CommandOutput> {
        syscall_non_interactive(&self.program, &self.work_dir, args)
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    work_dir: impl AsRef<Path>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<CommandOutput> {
    // INVARIANT: Never let a background sync block on a credential prompt.
    let output = Command::new(cmd.as_ref())
        .current_dir(work_dir.as_ref())
        .env("GIT_TERMINAL_PROMPT", "0")
        .args(args)
        .output()
        .map_err(|source| SyncError::Spawn {
            program: cmd.as_ref().to_string_lossy().into_owned(),
            source,
        })?;
    debug!("command {:?} exited with {}", cmd.as_ref(), output.status);

    Ok(CommandOutput::from(output))
}
