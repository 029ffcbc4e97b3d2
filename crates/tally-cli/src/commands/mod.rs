//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, status) and shared utilities (open_db, open_store)
//! - `merchants` - Merchant backfill
//! - `receipts` - Receipt ingestion and duplicate review
//! - `serve` - Web server command
//! - `statements` - Statement listing, import, and processing

pub mod core;
pub mod merchants;
pub mod receipts;
pub mod serve;
pub mod statements;

// Re-export command functions for main.rs
pub use core::*;
pub use merchants::*;
pub use receipts::*;
pub use serve::*;
pub use statements::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Amount with thousands separators and two decimals (1,234,567.50)
pub fn format_amount(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}.{}", sign, grouped, frac)
}
