//! sensor-gateway: ingests temperature readings over TCP and persists them.
//!
//! Joins a connection-manager producer to a data-manager and a
//! storage-manager consumer through a shared buffer; see `DESIGN.md` for
//! the grounding ledger.

mod config;
mod connection;
mod connmgr;
mod coordinator;
mod datamgr;
mod error;
mod logger;
mod model;
mod registry;
mod sbuffer;
mod storage;
mod storagemgr;
mod wire;

use clap::Parser;
use config::{CliArgs, Config};
use coordinator::Coordinator;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    let config = match Config::from_args(cli) {
        Ok(config) => config,
        Err(error::ConfigError::PortOutOfRange(port)) => {
            eprintln!("port {port} is out of range [1024, 65535]");
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        port = config.port,
        registry = %config.registry_path.display(),
        database = %config.database_path.display(),
        "starting sensor gateway"
    );

    match Coordinator::new(config).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sensor gateway exited with an error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("usage: sensor-gateway <port> [--config <path>] [--registry <path>] [--database <path>] [--log <path>]");
}
