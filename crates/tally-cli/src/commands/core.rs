//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_store` - Shared utility to open the statement file store
//! - `require_ai` - The LLM backend from the environment
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database status

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tally_core::ai::{AIBackend, AIClient};
use tally_core::db::{Database, DB_KEY_ENV};
use tally_core::prompts::PromptLibrary;
use tally_core::storage::FileStore;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow!("Database path must be valid UTF-8"))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Open the blob store for statement files
pub fn open_store(storage_dir: &Path) -> Result<FileStore> {
    FileStore::new(storage_dir)
        .with_context(|| format!("Failed to open storage at {}", storage_dir.display()))
}

/// The configured LLM backend, or an error naming the missing key
pub fn require_ai() -> Result<AIClient> {
    let ai = AIClient::from_env().ok_or_else(|| anyhow!(tally_server::AI_NOT_CONFIGURED))?;
    println!("   🤖 Model: {} ({})", ai.model(), ai.backend_name());
    Ok(ai)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import a statement: tally import --file march.pdf --name \"March\"");
    println!("  2. Start web UI: tally serve");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    let key_set = std::env::var(DB_KEY_ENV).is_ok();
    match (no_encrypt, key_set) {
        (true, _) => println!("   ⚠️  Encryption: DISABLED (--no-encrypt)"),
        (false, true) => println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV),
        (false, false) => println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV),
    }

    match std::fs::metadata(db_path) {
        Ok(metadata) => {
            println!("   Size: {}", format_size(metadata.len()));
            match open_db(db_path, no_encrypt) {
                Ok(db) => {
                    println!("   Statements: {}", db.count_statements()?);
                    println!("   Transactions: {}", db.count_transactions(None)?);
                }
                Err(e) => {
                    println!("   ❌ Error opening database: {:#}", e);
                    if key_set {
                        println!("      Check that {} is correct", DB_KEY_ENV);
                    } else if !no_encrypt {
                        println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                    }
                }
            }
        }
        Err(_) => println!("   Size: (database not initialized, run `tally init`)"),
    }

    println!();
    match AIClient::from_env() {
        Some(ai) => println!("   🤖 LLM: {} ({})", ai.model(), ai.backend_name()),
        None => println!("   💡 Tip: Set GEMINI_API_KEY to enable statement extraction"),
    }

    let prompts = PromptLibrary::new();
    let overridden = prompts.overridden();
    if !overridden.is_empty() {
        let names: Vec<&str> = overridden.iter().map(|id| id.as_str()).collect();
        let dir = prompts
            .override_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        println!("   📝 Prompt overrides: {} ({})", names.join(", "), dir);
    }

    println!();
    Ok(())
}

fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{:.1} KB", kb)
    } else {
        format!("{:.1} MB", kb / 1024.0)
    }
}
