// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use graphkeep::{
    config::ServiceConfig,
    path::default_config_path,
    server::{cors::CorsPolicy, serve, AppState},
    store::GraphStore,
    sync::{SyncOutcome, SyncRunner, SyncService, SyncTrigger},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "graphkeep [options] <graphkeep-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Command::Serve(opts) => run_serve(config_path, opts).await,
            Command::Sync => run_sync(config_path).await,
            Command::Init(opts) => run_init(config_path, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Serve graph editor API.
    #[command(override_usage = "graphkeep serve [options]")]
    Serve(ServeOptions),

    /// Synchronize graph document with remote right now.
    #[command(override_usage = "graphkeep sync [options]")]
    Sync,

    /// Write default configuration file.
    #[command(override_usage = "graphkeep init [options]")]
    Init(InitOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ServeOptions {
    /// Address to listen on.
    #[arg(long, value_name = "host")]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, value_name = "port")]
    pub port: Option<u16>,

    /// Seconds of quiet after the last save before syncing.
    #[arg(long, value_name = "secs")]
    pub debounce_secs: Option<u64>,

    /// Do not synchronize saves with remote.
    #[arg(long)]
    pub no_sync: bool,
}

impl ServeOptions {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(debounce_secs) = self.debounce_secs {
            config.sync.debounce_secs = debounce_secs;
        }
        if self.no_sync {
            config.sync.enabled = false;
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Overwrite existing configuration file.
    #[arg(short, long)]
    pub force: bool,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact().with_target(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_config(path: &Path) -> Result<ServiceConfig> {
    match fs::read_to_string(path) {
        Ok(data) => data
            .parse::<ServiceConfig>()
            .with_context(|| format!("invalid configuration {path:?}")),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            info!("no configuration at {path:?}, using defaults");
            Ok(ServiceConfig::default())
        }
        Err(error) => Err(error).with_context(|| format!("failed to read {path:?}")),
    }
}

async fn run_serve(config_path: PathBuf, opts: ServeOptions) -> Result<()> {
    let mut config = load_config(&config_path)?;
    opts.apply(&mut config);

    let data_dir = config.data_dir(&config_path);
    let store = GraphStore::open(&data_dir, &config.store.file_name)?;
    info!("graph document lives at {:?}", store.path().display());

    let sync = if config.sync.enabled {
        let runner = SyncRunner::from_settings(&config.sync, &data_dir, &config.store.file_name);
        Some(Arc::new(SyncService::new(
            runner,
            config.sync.debounce_window(),
        )))
    } else {
        warn!("sync disabled, saves stay local");
        None
    };

    let state = AppState::new(store, sync.clone(), CorsPolicy::from_settings(&config.cors));
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    serve(listener, state, shutdown_signal()).await?;

    if let Some(sync) = sync {
        sync.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(error) => {
            error!("cannot listen for shutdown signal: {error}");
            std::future::pending::<()>().await;
        }
    }
}

async fn run_sync(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let data_dir = config.data_dir(&config_path);
    let runner = SyncRunner::from_settings(&config.sync, data_dir, &config.store.file_name);

    let report = tokio::task::spawn_blocking(move || runner.run(SyncTrigger::Manual)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.outcome {
        SyncOutcome::Clean | SyncOutcome::Published => Ok(()),
        SyncOutcome::Partial => bail!("sync only partially succeeded"),
        SyncOutcome::Failed => bail!("sync failed"),
    }
}

fn run_init(config_path: PathBuf, opts: InitOptions) -> Result<()> {
    if config_path.exists() && !opts.force {
        bail!("configuration {config_path:?} already exists, use --force to overwrite");
    }

    if let Some(parent) = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        mkdirp::mkdirp(parent)?;
    }
    fs::write(&config_path, ServiceConfig::default().to_string())?;
    info!("wrote default configuration to {config_path:?}");

    Ok(())
}
