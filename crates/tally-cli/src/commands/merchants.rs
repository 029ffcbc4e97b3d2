//! Merchant backfill command

use std::time::Duration;

use anyhow::Result;
use tally_core::ai::AIClient;
use tally_core::db::Database;
use tally_core::enrich::{BackfillOptions, BackfillReport, Enricher};

pub async fn cmd_backfill_merchants(
    db: &Database,
    ai: AIClient,
    user: &str,
    batch_size: usize,
    pause_ms: u64,
) -> Result<BackfillReport> {
    let options = BackfillOptions {
        batch_size: batch_size.max(1),
        pause: Duration::from_millis(pause_ms),
    };
    println!(
        "🏪 Backfilling merchants for {} (batches of {})...",
        user, options.batch_size
    );

    let report = Enricher::new(db.clone(), ai)
        .backfill_merchants(user, &options)
        .await?;

    if report.scanned == 0 {
        println!("✅ Every transaction already has a merchant");
        return Ok(report);
    }

    println!();
    println!("   Scanned:  {}", report.scanned);
    println!("   Batches:  {}", report.batches);
    println!("   Updated:  {}", report.updated);
    if report.failed_batches > 0 {
        println!(
            "   ⚠️  {} batch(es) failed; run again to retry them",
            report.failed_batches
        );
    }

    Ok(report)
}
