//! `appstore` binary: runs the HTTP service and the maintenance commands
//! against the same catalog and storage root.

use anyhow::{bail, Context, Result};
use appstore_api::{create_app, start_reconcile_task, AppState, Config};
use appstore_catalog::db::{backup_database, create_pool, run_migrations};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "appstore")]
#[command(about = "Application package store: publish, version and download app packages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite catalog file (overrides APPSTORE_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Directory holding package files (overrides APPSTORE_STORAGE_ROOT)
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind to (overrides APPSTORE_BIND)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Release abandoned uploads and delete orphaned files once
    Reconcile {
        /// Only touch uploads and files older than this many seconds
        #[arg(long)]
        grace_secs: Option<u64>,
    },

    /// Re-hash one stored package and compare it with its recorded digest
    Verify { app_id: String, version: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = appstore_logging::init_subscriber();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(storage_root) = cli.storage_root {
        config.storage_root = storage_root;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await
        }
        Commands::Reconcile { grace_secs } => {
            let grace = grace_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.stale_upload_grace());
            let pool = open_catalog(&config, false).await?;
            let state = AppState::new(pool, config.storage_root.clone());

            let report = state.store.reconcile(grace).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Verify { app_id, version } => {
            let pool = open_catalog(&config, false).await?;
            let state = AppState::new(pool, config.storage_root.clone());

            let report = state.store.verify(&app_id, &version).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.intact {
                bail!("{} {} does not match its recorded digest", app_id, version);
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(
        bind_addr = %config.bind_addr,
        db_path = %config.db_path.display(),
        storage_root = %config.storage_root.display(),
        "Starting appstore service"
    );

    let pool = open_catalog(&config, true).await?;
    tokio::fs::create_dir_all(&config.storage_root)
        .await
        .with_context(|| {
            format!(
                "failed to create storage root {}",
                config.storage_root.display()
            )
        })?;

    if config.reconcile_interval_secs > 0 {
        let state = AppState::new(pool.clone(), config.storage_root.clone());
        tokio::spawn(start_reconcile_task(
            state.store,
            config.reconcile_interval_secs,
            config.stale_upload_grace(),
        ));
    } else {
        warn!("Reconcile task disabled; abandoned uploads will not be reclaimed");
    }

    let app = create_app(pool, &config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the catalog, taking a backup before migrations when serving
async fn open_catalog(config: &Config, backup: bool) -> Result<SqlitePool> {
    let db_path = &config.db_path;

    if backup && db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!(backup = %backup_path.display(), "Catalog backed up");
    }

    let pool = create_pool(db_path)
        .await
        .with_context(|| format!("failed to open catalog {}", db_path.display()))?;
    run_migrations(&pool).await?;
    info!("Migrations complete");

    Ok(pool)
}
