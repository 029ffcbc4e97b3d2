//! Receipt command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::Database;
use tally_core::ingest::{IngestReport, ReceiptIngestor, ReceiptPayload};

use super::{format_amount, truncate};

/// Ingest a receipts file and print the outcome
pub fn cmd_ingest(db: &Database, file: &Path, user: Option<&str>) -> Result<IngestReport> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let payload: ReceiptPayload =
        serde_json::from_str(&content).context("Receipts file is not valid JSON")?;

    println!("🧾 Ingesting receipts from {}...", file.display());
    let report = ReceiptIngestor::new(db.clone()).ingest(payload, user);

    println!();
    println!("   Total:      {}", report.total);
    println!("   ✅ Stored:     {}", report.success);
    println!("   👯 Duplicates: {}", report.duplicates);
    println!("   ❌ Failed:     {}", report.failed);
    for error in &report.errors {
        println!(
            "      {}: {}",
            error.external_id.as_deref().unwrap_or("(no external_id)"),
            error.error
        );
    }
    if report.success > 0 {
        println!();
        println!("Review reconciled receipts with: tally duplicates");
    }

    Ok(report)
}

pub fn cmd_duplicates(db: &Database, user: &str) -> Result<()> {
    let pairs = db.list_duplicates(user)?;

    if pairs.is_empty() {
        println!("No duplicate receipts for {}.", user);
        return Ok(());
    }

    println!();
    println!("👯 Receipts matched to statement transactions");
    println!("{}", "─".repeat(78));
    for pair in &pairs {
        let receipt = &pair.duplicate;
        println!(
            "#{:<5} {}  {:>16}  {}",
            receipt.id,
            receipt.date,
            format_amount(receipt.amount),
            truncate(receipt.merchant.as_deref().unwrap_or(&receipt.transaction_name), 30)
        );
        match &pair.matched {
            Some(matched) => println!(
                "   ↳ #{:<3} {}  {:>16}  {}",
                matched.id,
                matched.date,
                format_amount(matched.amount),
                truncate(&matched.transaction_name, 30)
            ),
            None => println!("   ↳ matched transaction was deleted"),
        }
    }
    println!();
    println!("{} duplicate(s)", pairs.len());

    Ok(())
}
