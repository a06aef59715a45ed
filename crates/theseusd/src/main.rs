//! theseusd — the Theseus daemon.
//!
//! Single binary that assembles:
//! - Entity store (redb), opened once and closed once
//! - Deployment orchestrator against the local Docker Engine
//! - REST API
//!
//! # Usage
//!
//! ```text
//! theseusd serve --config /etc/theseus/theseusd.toml --port 8080
//! theseusd print-config
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{DaemonConfig, LogFormat};
use theseus_api::ApiState;
use theseus_deploy::{DockerRuntime, Orchestrator};
use theseus_state::{EntityStore, Repositories};

#[derive(Parser)]
#[command(name = "theseusd", about = "Theseus container management daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the store and serve the REST API until Ctrl-C.
    Serve {
        /// Path to theseusd.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the store file (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DaemonConfig> {
    match path {
        Some(path) => DaemonConfig::from_file(path),
        None => Ok(DaemonConfig::default()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,theseus=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => {
            let config = load_config(config.as_ref())?.with_overrides(port, data_dir);
            init_tracing(config.log_format);
            run(config).await
        }
        Command::PrintConfig { config } => {
            print!("{}", load_config(config.as_ref())?.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("Theseus daemon starting");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let db_path = config.db_path();

    // A store that cannot be opened is fatal for this process.
    let store = EntityStore::open_with_lock_timeout(&db_path, config.lock_timeout())
        .context("opening entity store")?;

    let repos = Repositories::new(&store);
    let orchestrator = Orchestrator::new(
        Arc::new(DockerRuntime::new()),
        Arc::new(repos.containers.clone()),
    );
    let router = theseus_api::build_router(ApiState {
        repos,
        orchestrator,
        deploy_timeout: config.deploy_timeout(),
    });

    let served = serve(config, router).await;

    // The router and every handler clone are gone once `serve` returns.
    store.close();
    info!("Theseus daemon stopped");
    served
}

async fn serve(config: DaemonConfig, router: axum::Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => {
                    // Without a signal handler, run until the process is killed.
                    warn!(error = %e, "failed to install Ctrl-C handler");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;
    Ok(())
}
