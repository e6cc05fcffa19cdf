// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Best-effort synchronization of the graph document to a git remote.
//!
//! After the graph document changes on disk, graphkeep publishes it by
//! running the usual status, add, commit, and push sequence in the directory
//! holding the document. Synchronization is strictly best-effort: a failing
//! step is logged and recorded, but never reported back to whoever saved the
//! document, and it never takes the service down with it.
//!
//! # Sync Sequence
//!
//! 1. Ask git whether the working tree has uncommitted changes. A clean tree
//!    ends the sequence, so repeated syncs of an unchanged document never
//!    produce empty commits. Staging files of a save that is still in
//!    progress do not count as changes.
//! 2. Stage the graph document.
//! 3. Commit with message `auto: update <file> (YYYY-MM-DD HH:MM:SS)`.
//! 4. Push to the configured remote.
//!
//! Steps 2 through 4 are each attempted even when an earlier one exits with
//! a non-zero status, so whatever did get committed still gets pushed. Only
//! a failure to launch git at all ends the sequence early.
//!
//! # Scheduling
//!
//! Saves do not sync directly. They go through [`SyncService::schedule`],
//! which debounces bursts of saves into one sync that runs once the editor
//! has been quiet for the configured window. See [`debounce`] for details.

pub mod debounce;
pub mod git;

use crate::{
    config::SyncSettings,
    store::STAGING_PREFIX,
    sync::{
        debounce::{SyncAction, SyncScheduler},
        git::GitCli,
    },
};

use chrono::{DateTime, Local, NaiveDateTime};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::Output,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Layer of indirection for version control access.
pub trait VersionControl: Send + Sync + 'static {
    /// Run version control with `args`, capturing its output.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Spawn`] if the version control tool cannot be
    ///   launched at all. A tool that runs and fails is not an error here, it
    ///   is reported through [`CommandOutput::success`].
    fn gitcall(&self, args: &[OsString]) -> Result<CommandOutput>;
}

/// Captured result of one version control invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,

    /// Process exited successfully.
    pub success: bool,

    /// Captured standard output, trailing newline chomped.
    pub stdout: String,

    /// Captured standard error, trailing newline chomped.
    pub stderr: String,
}

impl CommandOutput {
    /// Construct successful output.
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Construct failed output.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            success: output.status.success(),
            stdout: chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned()),
            stderr: chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned()),
        }
    }
}

fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// What caused a sync to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Debounce window elapsed after the last save.
    Debounced,

    /// Client explicitly asked for an immediate sync.
    Forced,

    /// Operator ran a sync from the command line.
    Manual,
}

/// Individual step of the sync sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Status,
    Stage,
    Commit,
    Push,
}

impl Display for SyncStep {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Status => "status",
            Self::Stage => "add",
            Self::Commit => "commit",
            Self::Push => "push",
        };
        fmt.write_str(name)
    }
}

/// Overall result of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Working tree had no changes, nothing was committed or pushed.
    Clean,

    /// Document was staged, committed, and pushed.
    Published,

    /// At least one of stage, commit, or push exited non-zero.
    Partial,

    /// Working tree could not be inspected, or git could not be launched.
    Failed,
}

/// Record of one executed sync step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: SyncStep,
    pub code: Option<i32>,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Record of one sync execution.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub outcome: SyncOutcome,
    pub steps: Vec<StepReport>,
}

impl SyncReport {
    /// Names of the steps that were executed, in order.
    pub fn step_names(&self) -> Vec<SyncStep> {
        self.steps.iter().map(|report| report.step).collect()
    }
}

/// Build commit message for an automatic sync.
pub fn commit_message(file_name: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "auto: update {file_name} ({})",
        timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Runs the sync sequence against a version control backend.
pub struct SyncRunner {
    vcs: Box<dyn VersionControl>,
    file_name: String,
    remote: String,
    branch: String,
    last: Mutex<Option<SyncReport>>,
    in_flight: AtomicUsize,
}

impl SyncRunner {
    /// Construct new sync runner.
    pub fn new(
        vcs: impl VersionControl,
        file_name: impl Into<String>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            vcs: Box::new(vcs),
            file_name: file_name.into(),
            remote: remote.into(),
            branch: branch.into(),
            last: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Construct sync runner that drives the git binary inside `work_dir`.
    pub fn from_settings(
        settings: &SyncSettings,
        work_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self::new(
            GitCli::new(&settings.git, work_dir),
            file_name,
            settings.remote.as_str(),
            settings.branch.as_str(),
        )
    }

    /// Run the sync sequence once.
    ///
    /// Blocks the calling thread for as long as the version control
    /// invocations take. Never fails: every problem is logged and recorded
    /// in the returned report.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self, trigger: SyncTrigger) -> SyncReport {
        let _in_flight = InFlight::enter(&self.in_flight);
        let started_at = Local::now();
        let mut steps = Vec::new();
        let outcome = match self.sequence(&mut steps) {
            Ok(outcome) => outcome,
            Err(error) => {
                error!("sync aborted: {error}");
                SyncOutcome::Failed
            }
        };
        let report = SyncReport {
            trigger,
            started_at,
            finished_at: Local::now(),
            outcome,
            steps,
        };

        match report.outcome {
            SyncOutcome::Clean => info!("{} unchanged, nothing to sync", self.file_name),
            SyncOutcome::Published => info!("published {} to {}", self.file_name, self.remote),
            SyncOutcome::Partial => warn!("sync of {} only partially succeeded", self.file_name),
            SyncOutcome::Failed => warn!("sync of {} failed", self.file_name),
        }
        *self.last.lock() = Some(report.clone());

        report
    }

    /// Most recently finished sync, if any.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last.lock().clone()
    }

    /// Number of syncs currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn sequence(&self, steps: &mut Vec<StepReport>) -> Result<SyncOutcome> {
        // INVARIANT: Staging files of an in-progress save never count as a
        // change to the working tree.
        let exclude_staging = format!(":(exclude){STAGING_PREFIX}*");
        let status = self.step(
            steps,
            SyncStep::Status,
            ["status", "--porcelain", "--", ":/", exclude_staging.as_str()],
        )?;
        if !status.success {
            return Ok(SyncOutcome::Failed);
        }

        if status.stdout.trim().is_empty() {
            return Ok(SyncOutcome::Clean);
        }

        let message = commit_message(&self.file_name, Local::now().naive_local());

        // INVARIANT: Later steps run even when earlier steps exit non-zero.
        let stage = self.step(steps, SyncStep::Stage, ["add", "--", self.file_name.as_str()])?;
        let commit = self.step(steps, SyncStep::Commit, ["commit", "-m", message.as_str()])?;
        let push = self.step(
            steps,
            SyncStep::Push,
            ["push", self.remote.as_str(), self.branch.as_str()],
        )?;

        if stage.success && commit.success && push.success {
            Ok(SyncOutcome::Published)
        } else {
            Ok(SyncOutcome::Partial)
        }
    }

    fn step(
        &self,
        steps: &mut Vec<StepReport>,
        step: SyncStep,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<CommandOutput> {
        let args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
        let output = self.vcs.gitcall(&args)?;
        if output.success {
            debug!("git {step} succeeded");
        } else {
            warn!("git {step} exited with {:?}: {}", output.code, output.stderr);
        }

        steps.push(StepReport {
            step,
            code: output.code,
            success: output.success,
            stderr: output.stderr.clone(),
        });

        Ok(output)
    }
}

// Counts one running sync for as long as it lives, even if the sync panics.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Debounced and immediate sync of the graph document.
///
/// Owns the [`SyncRunner`] and the [`SyncScheduler`] that decides when the
/// runner gets to run. All sync executions happen on Tokio's blocking pool,
/// never on a task that a client request is waiting on.
pub struct SyncService {
    runner: Arc<SyncRunner>,
    scheduler: SyncScheduler,
}

impl SyncService {
    /// Construct new sync service debouncing saves by `window`.
    pub fn new(runner: SyncRunner, window: Duration) -> Self {
        let runner = Arc::new(runner);
        let debounced = runner.clone();
        let action: SyncAction = Arc::new(move || {
            let runner = debounced.clone();
            async move {
                let result =
                    tokio::task::spawn_blocking(move || runner.run(SyncTrigger::Debounced)).await;
                if let Err(error) = result {
                    error!("debounced sync did not complete: {error}");
                }
            }
            .boxed()
        });

        Self {
            runner,
            scheduler: SyncScheduler::new(window, action),
        }
    }

    /// Schedule a debounced sync, superseding any pending one.
    ///
    /// Returns the instant at which the sync will fire.
    ///
    /// # Panics
    ///
    /// - Panics if called outside of a Tokio runtime.
    pub fn schedule(&self) -> Instant {
        self.scheduler.schedule()
    }

    /// Start a sync right away in the background, bypassing the debounce.
    ///
    /// Does not wait for the sync to finish.
    ///
    /// # Panics
    ///
    /// - Panics if called outside of a Tokio runtime.
    pub fn trigger_now(&self) {
        let runner = self.runner.clone();
        info!("start forced sync");
        let forced = tokio::task::spawn_blocking(move || runner.run(SyncTrigger::Forced));
        tokio::spawn(async move {
            if let Err(error) = forced.await {
                error!("forced sync did not complete: {error}");
            }
        });
    }

    /// Snapshot of the current sync state.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            enabled: true,
            pending: self.scheduler.is_armed(),
            fires_in_ms: self.scheduler.deadline().map(|deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64
            }),
            in_flight: self.runner.in_flight(),
            last: self.runner.last_report(),
        }
    }

    /// Run any pending debounced sync immediately and wait for it.
    ///
    /// Meant to be called once the server stopped accepting saves, so edits
    /// made right before shutdown still get published.
    pub async fn shutdown(&self) {
        if self.scheduler.flush().await {
            info!("flushed pending sync before shutdown");
        }
    }

    /// Sync runner backing this service.
    pub fn runner(&self) -> &SyncRunner {
        self.runner.as_ref()
    }
}

/// Introspection view of sync health.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Sync is configured at all.
    pub enabled: bool,

    /// A debounced sync is armed and waiting.
    pub pending: bool,

    /// Milliseconds until the pending sync fires.
    pub fires_in_ms: Option<u64>,

    /// Syncs currently executing.
    pub in_flight: usize,

    /// Most recently finished sync.
    pub last: Option<SyncReport>,
}

impl SyncStatus {
    /// Status reported when sync is switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            pending: false,
            fires_in_ms: None,
            in_flight: 0,
            last: None,
        }
    }
}

/// All possible error types for sync execution.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Version control tool cannot be launched.
    #[error("failed to launch {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub(crate) type Result<T, E = SyncError> = std::result::Result<T, E>;
