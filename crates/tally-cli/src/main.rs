//! Tally CLI - Bank statement tracker
//!
//! Usage:
//!   tally init                                  Initialize database
//!   tally import --file march.pdf --name March  Extract a statement
//!   tally ingest --file receipts.json           Ingest receipts
//!   tally serve --port 3000                     Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
            storage_dir,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
                &storage_dir,
            )
            .await
        }
        Commands::Statements { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_statements(&db, &user)
        }
        Commands::Import {
            file,
            name,
            user,
            storage_dir,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let store = commands::open_store(&storage_dir)?;
            let ai = commands::require_ai()?;
            commands::cmd_import(&db, &store, ai, &file, &name, &user).await?;
            Ok(())
        }
        Commands::Process { id, storage_dir } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let store = commands::open_store(&storage_dir)?;
            let ai = commands::require_ai()?;
            commands::cmd_process(&db, &store, ai, id).await?;
            Ok(())
        }
        Commands::Ingest { file, user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_ingest(&db, &file, user.as_deref())?;
            Ok(())
        }
        Commands::Duplicates { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_duplicates(&db, &user)
        }
        Commands::BackfillMerchants {
            user,
            batch_size,
            pause_ms,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ai = commands::require_ai()?;
            commands::cmd_backfill_merchants(&db, ai, &user, batch_size, pause_ms).await?;
            Ok(())
        }
    }
}
