//! Statement command implementations

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tally_core::ai::AIClient;
use tally_core::db::Database;
use tally_core::pipeline::{failure_message, StatementProcessor};
use tally_core::storage::FileStore;

use super::{format_amount, truncate};

pub fn cmd_statements(db: &Database, user: &str) -> Result<()> {
    let statements = db.list_statements(user)?;

    if statements.is_empty() {
        println!("No statements for {}.", user);
        println!("Import one with: tally import --file march.pdf --name \"March\"");
        return Ok(());
    }

    println!();
    println!(
        "{:>5}  {:<30}  {:<10}  {:>6}  {:<10}",
        "ID", "Name", "Status", "Rows", "Created"
    );
    println!("{}", "─".repeat(70));
    for statement in &statements {
        let rows = db.list_statement_transactions(statement.id)?.len();
        println!(
            "{:>5}  {:<30}  {:<10}  {:>6}  {:<10}",
            statement.id,
            truncate(&statement.name, 30),
            statement.status.as_str(),
            rows,
            statement.created_at.format("%Y-%m-%d"),
        );
    }
    println!();
    println!("{} statement(s)", statements.len());

    Ok(())
}

/// Create a statement from a file, store the file, and extract it
///
/// Returns the number of transactions stored.
pub async fn cmd_import(
    db: &Database,
    store: &FileStore,
    ai: AIClient,
    file: &Path,
    name: &str,
    user: &str,
) -> Result<usize> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("{} is empty", file.display());
    }

    let statement = db.create_statement(user, name)?;
    println!("📄 Created statement #{} \"{}\"", statement.id, statement.name);

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("statement.pdf");
    let key = FileStore::statement_key(statement.id, filename, None, Utc::now());
    store.put(&key, &bytes).context("Failed to store statement file")?;
    db.set_statement_file(statement.id, &key)?;
    println!("   Stored {} ({} bytes)", key, bytes.len());

    run_extraction(db, store, ai, statement.id).await
}

/// Re-run extraction for a draft or failed statement
pub async fn cmd_process(
    db: &Database,
    store: &FileStore,
    ai: AIClient,
    id: i64,
) -> Result<usize> {
    let statement = db
        .get_statement(id)?
        .with_context(|| format!("Statement {} not found", id))?;
    println!(
        "🔁 Processing statement #{} \"{}\" ({})",
        statement.id, statement.name, statement.status
    );

    run_extraction(db, store, ai, id).await
}

async fn run_extraction(db: &Database, store: &FileStore, ai: AIClient, id: i64) -> Result<usize> {
    println!("   Extracting transactions...");
    let processor = StatementProcessor::new(db.clone(), store.clone(), ai);

    match processor.process(id).await {
        Ok(count) => {
            let rows = db.list_statement_transactions(id)?;
            let total: f64 = rows.iter().map(|t| t.amount).sum();
            println!("✅ Stored {} new transaction(s)", count);
            println!("   Statement now has {} row(s), {} total", rows.len(), format_amount(total));
            Ok(count)
        }
        Err(e) => {
            println!("❌ Extraction failed: {}", failure_message(&e));
            println!("   Retry with: tally process {}", id);
            Err(e.into())
        }
    }
}
