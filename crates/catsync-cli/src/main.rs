mod script;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "catsync-cli")]
#[command(about = "Reconcile a product feed against the catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply a JSON feed file to the catalog database
    Sync {
        /// Path to the feed (a JSON array of records, or a single record)
        feed: PathBuf,

        /// Insert and update only; never mark missing products unavailable
        #[arg(long)]
        upsert_only: bool,

        /// Plan against the current catalog and print the counts without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Render a feed as an idempotent SQL script (no database needed)
    Script {
        /// Path to the feed
        feed: PathBuf,

        /// Where to write the script; stdout when omitted
        output: Option<PathBuf>,
    },
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Script { feed, output } => script::run_script(&feed, output.as_deref()),
        Commands::Sync {
            feed,
            upsert_only,
            dry_run,
        } => {
            let pool = connect().await?;
            let mode = if upsert_only {
                catsync_core::SyncMode::UpsertOnly
            } else {
                catsync_core::SyncMode::Full
            };
            if dry_run {
                sync::run_dry_run(&pool, &feed, mode).await
            } else {
                sync::run_sync(&pool, &feed, mode).await
            }
        }
        Commands::Migrate => {
            let pool = connect().await?;
            let applied = catsync_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout carries only stats or the rendered script.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(catsync_core::log_level_from_env()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<sqlx::PgPool> {
    let config = catsync_core::load_app_config()?;
    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}
