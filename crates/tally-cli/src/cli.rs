//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// User that owns data created from the command line
pub const DEFAULT_USER: &str = "local-dev";

/// Tally - Turn bank statements into a searchable ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Self-hosted bank statement and receipt tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, counts)
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an identity header from the
        /// authenticating proxy or an API key.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Directory for uploaded statement files
        #[arg(long, default_value = "statement-files")]
        storage_dir: PathBuf,
    },

    /// List statements
    Statements {
        /// Owner of the statements
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Create a statement from a file and extract its transactions
    Import {
        /// Statement file (PDF or image)
        #[arg(short, long)]
        file: PathBuf,

        /// Statement name (e.g. "BCA March 2024")
        #[arg(short, long)]
        name: String,

        /// Owner of the statement
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Directory for uploaded statement files
        #[arg(long, default_value = "statement-files")]
        storage_dir: PathBuf,
    },

    /// Re-run extraction for a stored statement
    Process {
        /// Statement ID
        id: i64,

        /// Directory for uploaded statement files
        #[arg(long, default_value = "statement-files")]
        storage_dir: PathBuf,
    },

    /// Ingest receipts from a JSON file
    Ingest {
        /// JSON file: {"receipts": [...]}, an array, or a single receipt
        #[arg(short, long)]
        file: PathBuf,

        /// Owner of the receipts (otherwise each receipt needs user_id)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List receipts reconciled as duplicates of statement transactions
    Duplicates {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Ask the model for merchants of transactions that have none
    BackfillMerchants {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Transactions per request
        #[arg(long, default_value = "50")]
        batch_size: usize,

        /// Pause between requests in milliseconds
        #[arg(long, default_value = "2000")]
        pause_ms: u64,
    },
}
