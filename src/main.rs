//! nfd-service host shell.
//!
//! Runs the embedded daemon the way an application host would: start with a
//! home path, keep it running until interrupted, then stop and wait.
//!
//! ```text
//!   host shell (this binary)          worker thread
//!   ─────────────────────────         ─────────────────────────────────────
//!   start_service(homePath) ───────▶  reset runtime
//!                                     Runner::new → forwarder + RIB service
//!   poll is_running()                 Reactor::run()
//!   Ctrl-C → stop_service() ───────▶  stop job → RIB, forwarder dropped
//!   wait_stopped()          ◀───────  reset runtime, state = Stopped
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use nfd_service::observability::{logging, targets};
use nfd_service::{ConfigSource, GlobalRuntime, ServiceFacade, StartupParameters};

#[derive(Debug, Parser)]
#[command(name = "nfd-service", version, about = "Run the embedded forwarding daemon")]
struct Cli {
    /// Directory used as HOME for the daemon's key chain.
    #[arg(long, env = "NFD_HOME")]
    home_path: Option<PathBuf>,

    /// TOML configuration to use instead of the built-in one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the log module names and exit.
    #[arg(long)]
    list_modules: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init("info") {
        eprintln!("nfd-service: {err}");
        return ExitCode::FAILURE;
    }

    let config = match cli.config {
        Some(path) => ConfigSource::File(path),
        None => ConfigSource::Builtin,
    };
    let facade = ServiceFacade::with_config(GlobalRuntime::global(), config);

    if cli.list_modules {
        for module in facade.list_log_modules() {
            println!("{module}");
        }
        return ExitCode::SUCCESS;
    }

    let mut params = StartupParameters::new();
    if let Some(home) = &cli.home_path {
        params = params.with_home_path(home);
    }

    tracing::info!(target: targets::SERVICE, version = env!("CARGO_PKG_VERSION"), "nfd-service starting");
    facade.start_service(&params);

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: targets::SERVICE, "interrupt received");
                break;
            }
            _ = ticker.tick() => {
                if !facade.is_running() {
                    break;
                }
            }
        }
    }

    facade.stop_service();
    let waiter = facade.clone();
    let stopped = tokio::task::spawn_blocking(move || waiter.wait_stopped(Duration::from_secs(30)))
        .await
        .unwrap_or(false);

    match facade.last_failure() {
        Some(kind) => {
            tracing::error!(target: targets::SERVICE, ?kind, "service failed");
            ExitCode::FAILURE
        }
        None if stopped => {
            tracing::info!(target: targets::SERVICE, "shutdown complete");
            ExitCode::SUCCESS
        }
        None => {
            tracing::warn!(target: targets::SERVICE, "worker still running at exit");
            ExitCode::FAILURE
        }
    }
}
