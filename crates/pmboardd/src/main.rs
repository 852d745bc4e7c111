//! pmboardd: the pmboard daemon.
//!
//! Single binary that assembles the dashboard backend:
//! - State store (redb)
//! - Field permission cache
//! - Role-aware services (parameters, projects, accounts, messaging, audit)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! pmboardd init-config > pmboard.toml
//! pmboardd seed-admin --config pmboard.toml
//! pmboardd serve --config pmboard.toml --port 8080 --data-dir /var/lib/pmboard
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pmboard_access::{Board, MemoryPermissionCache, NoopPermissionCache, PermissionCache};
use pmboard_core::{BoardConfig, LogFormat};
use pmboard_state::StateStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pmboardd", about = "pmboard project dashboard daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// Path to pmboard.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Create the configured admin account if it does not exist yet.
    SeedAdmin {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print a starter pmboard.toml.
    InitConfig {
        /// Email of the seeded admin account.
        #[arg(long, default_value = "admin@example.com")]
        admin_email: String,
    },
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
            let config = load_config(config.as_deref(), port, data_dir)?;
            init_tracing(&config)?;
            run_serve(config).await
        }
        Command::SeedAdmin { config, data_dir } => {
            let config = load_config(config.as_deref(), None, data_dir)?;
            init_tracing(&config)?;
            let board = open_board(&config)?;
            if !seed_admin(&board, &config)? {
                warn!("no admin seeded: [seed] admin_email and admin_password must both be set");
            }
            Ok(())
        }
        Command::InitConfig { admin_email } => {
            print!("{}", BoardConfig::scaffold(&admin_email).to_toml_string()?);
            Ok(())
        }
    }
}

/// Read the config file (if any) and apply CLI overrides.
fn load_config(
    path: Option<&std::path::Path>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<BoardConfig> {
    let mut config = match path {
        Some(path) => BoardConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BoardConfig::default(),
    };
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &BoardConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.filter)
            .with_context(|| format!("invalid log filter {:?}", config.log.filter))?,
    };
    match config.log.format {
        LogFormat::Human => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}

fn open_board(config: &BoardConfig) -> anyhow::Result<Board> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.database_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let cache: Arc<dyn PermissionCache> = if config.cache.permissions {
        Arc::new(MemoryPermissionCache::new())
    } else {
        Arc::new(NoopPermissionCache)
    };
    info!(enabled = config.cache.permissions, "permission cache initialized");

    Ok(Board::new(store, cache).with_session_ttl(config.session.ttl_secs()))
}

/// Returns `false` when the seed section is incomplete.
fn seed_admin(board: &Board, config: &BoardConfig) -> anyhow::Result<bool> {
    let (Some(email), Some(password)) = (&config.seed.admin_email, &config.seed.admin_password) else {
        return Ok(false);
    };
    board
        .accounts
        .seed_admin(email, password, config.seed.admin_name.as_deref())?;
    Ok(true)
}

async fn run_serve(config: BoardConfig) -> anyhow::Result<()> {
    info!("pmboard daemon starting");

    let board = open_board(&config)?;
    seed_admin(&board, &config)?;

    let router = pmboard_api::build_router(board);
    let addr = config.listen_addr();

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("pmboard daemon stopped");
    Ok(())
}
