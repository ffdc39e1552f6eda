//! Memory RPC Server - JSON-RPC backend for the project memory store.
//!
//! Opens the store, runs the startup gate (schema migration and duplicate
//! check), then serves the maintenance methods over JSON-RPC 2.0.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use project_memory::{config, MemoryApi, MigrationGate};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "memory-rpc")]
#[command(about = "JSON-RPC server for the project memory store")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Store file (defaults to the platform data directory)
    #[arg(long, env = "PROJECT_MEMORY_DB")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Memory RPC Server");

    let db_path = match args.db_path {
        Some(path) => path,
        None => config::default_db_path()?,
    };
    info!("Store: {}", db_path.display());

    let api = MemoryApi::open_at(&db_path)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;

    // Startup gate runs to completion before any request is served.
    let gate_api = api.clone();
    let startup_report =
        tokio::task::spawn_blocking(move || MigrationGate::run(gate_api.store())).await??;
    if let Some(migration) = &startup_report.migration {
        if !migration.success {
            warn!("Serving a store whose migration failed; see get_startup_report");
        }
    }

    let state = Arc::new(server::AppState {
        api,
        startup_report,
        db_path,
    });
    let addr = server::start_server(state, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
