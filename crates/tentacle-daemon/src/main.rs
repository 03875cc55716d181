mod event_bus;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tentacle_core::config::load_config;
use tentacle_core::fleet::FleetController;
use tentacle_core::git_client::CliGitClient;
use tentacle_core::hosting::GithubHostingApi;
use tracing::{error, info};

use crate::event_bus::EventBus;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "tentacled", version, about = "Per-branch preview environment supervisor")]
struct Cli {
    /// Path to the fleet configuration file.
    #[arg(long, global = true, default_value = "tentacle.toml")]
    config: PathBuf,

    /// Address the HTTP server itself listens on (not a Tentacle's port).
    #[arg(long, global = true, default_value = "127.0.0.1:8000")]
    bind: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the fleet against the remote repository and serve the HTTP/proxy layer.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tentacle_core::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve) | None => serve(cli.config, cli.bind).await,
    }
}

async fn serve(config_path: PathBuf, bind: String) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let events = EventBus::new();
    let hosting = Arc::new(GithubHostingApi::new(
        config.repo_full_name.clone(),
        config.github_token.clone(),
    ));
    let git = Arc::new(CliGitClient::new());
    let fleet = Arc::new(FleetController::new(
        config,
        hosting,
        git,
        Arc::new(events.clone()),
    ));

    info!("reconciling fleet against remote branches");
    if let Err(e) = fleet.init().await {
        error!("fleet init failed: {e}");
        return Err(e.into());
    }

    let state = Arc::new(AppState::new(fleet.clone(), events));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "tentacled listening");

    let serve_fut = axum::serve(listener, app);

    tokio::select! {
        result = serve_fut => {
            result.context("http server exited unexpectedly")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping every tentacle");
            fleet.stop_all().await;
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
