use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use super::demo::demo_app;
use crate::config::{self, AppConfig};
use crate::logging::{init_logging_with_config, LogConfig};
use crate::router::Router;
use crate::server::{HttpServer, ServerHandle};

/// Command-line interface for waypost
#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Convention-driven controller dispatch", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Serve the demo application
    Serve {
        /// YAML configuration file
        #[arg(short, long, env = "WAYPOST_CONFIG")]
        config: Option<PathBuf>,

        /// Listen address, overriding `server.addr`
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the demo application's route table
    Routes,
}

/// Parse `std::env::args` and run the selected command.
pub fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { config, addr } => serve(config, addr),
        Commands::Routes => {
            let app = demo_app(AppConfig::default())?;
            for line in route_table(app.router()) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// `name  methods  templates` for every route, in registration order.
pub fn route_table(router: &Router) -> Vec<String> {
    let width = router
        .routes()
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0);
    router
        .routes()
        .iter()
        .map(|route| {
            format!(
                "{:<width$}  {:<12}  {}",
                route.name,
                route.methods_label(),
                route.templates.join(" ")
            )
        })
        .collect()
}

fn serve(config_path: Option<PathBuf>, addr: Option<String>) -> anyhow::Result<()> {
    let mut app_config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    app_config.apply_env();
    if let Some(addr) = addr {
        app_config.server.addr = addr;
    }

    let _guard = init_logging_with_config(&LogConfig::from_env())?;
    config::init(app_config.clone());

    let dispatcher = Arc::new(demo_app(app_config.clone())?);
    let handle = HttpServer::new(dispatcher)
        .start()
        .with_context(|| format!("Failed to bind {}", app_config.server.addr))?;
    handle.wait_ready()?;
    info!(addr = %handle.addr(), config = ?config_path, "waypost serving");
    wait_for_shutdown(handle)
}

#[cfg(unix)]
fn wait_for_shutdown(handle: ServerHandle) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    handle.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: ServerHandle) -> anyhow::Result<()> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("server coroutine panicked"))
}
