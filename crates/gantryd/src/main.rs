//! gantryd — the Gantry daemon.
//!
//! Single binary that assembles the orchestration subsystems:
//! - State store (redb)
//! - Trigger evaluator + instantiation orchestrator
//! - Rollback generator
//! - Retention resolver
//! - REST API
//!
//! # Usage
//!
//! ```text
//! gantryd standalone --port 8443 --data-dir /var/lib/gantry
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "gantryd", about = "Gantry daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (single-node, all subsystems in one process).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8443")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/gantry")]
        data_dir: PathBuf,

        /// Conflict retry budget for instantiate commits.
        #[arg(long, default_value = "3")]
        max_attempts: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gantryd=debug,gantry=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            max_attempts,
        } => run_standalone(port, data_dir, max_attempts).await,
    }
}

async fn run_standalone(port: u16, data_dir: PathBuf, max_attempts: u32) -> anyhow::Result<()> {
    info!("Gantry daemon starting in standalone mode");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("gantry.redb");

    let state = gantry_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let api_state = gantry_api::ApiState::with_max_attempts(state, max_attempts);
    info!(max_attempts, "orchestrator initialized");
    let router = gantry_api::build_router_with_state(api_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("Gantry daemon stopped");
    Ok(())
}
