//! Receipt ingestion
//!
//! Receipts arrive from an external source (a receipt scanner, an email
//! parser) as JSON. Each one is idempotent on its `external_id` and is
//! reconciled against statement transactions: a statement row with the same
//! amount dated within ±3 days marks the receipt as a duplicate of it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::types::amount_from_value;
use crate::db::{Database, ReceiptOutcome};
use crate::models::{
    parse_date, NewTransaction, TransactionSource, TransactionStatus, TransactionType,
    DEFAULT_CATEGORY, DEFAULT_CURRENCY,
};

/// Name stored for receipts without a merchant
const RECEIPT_FALLBACK_NAME: &str = "Receipt";

/// Accepted request shapes: `{receipts: [...]}`, a bare array, or one object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReceiptPayload {
    Batch { receipts: Vec<serde_json::Value> },
    List(Vec<serde_json::Value>),
    Single(serde_json::Value),
}

impl ReceiptPayload {
    pub fn into_receipts(self) -> Vec<serde_json::Value> {
        match self {
            Self::Batch { receipts } => receipts,
            Self::List(receipts) => receipts,
            Self::Single(receipt) => vec![receipt],
        }
    }
}

/// One failed receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub external_id: Option<String>,
    pub error: String,
}

/// Outcome counts for a payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub errors: Vec<RowError>,
}

/// Fields read from one receipt object
struct ReceiptFields {
    user_id: Option<String>,
    external_id: Option<String>,
    date: Option<String>,
    amount: Option<serde_json::Value>,
    merchant: Option<String>,
    currency: Option<String>,
    category: Option<String>,
    notes: Option<String>,
    items: Option<serde_json::Value>,
}

impl ReceiptFields {
    fn from_value(value: &serde_json::Value) -> Self {
        let text = |key: &str| -> Option<String> {
            match value.get(key)? {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        Self {
            user_id: text("user_id"),
            external_id: text("external_id"),
            date: text("date"),
            amount: value.get("amount").filter(|v| !v.is_null()).cloned(),
            merchant: text("merchant"),
            currency: text("currency"),
            category: text("category"),
            notes: text("notes"),
            items: value.get("items").filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Ingests receipt payloads into the transactions table
#[derive(Clone)]
pub struct ReceiptIngestor {
    db: Database,
}

impl ReceiptIngestor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ingest every receipt of a payload
    ///
    /// `caller_user` is the authenticated user; when absent (service callers)
    /// each receipt must carry its own `user_id`. Per-receipt failures are
    /// collected in the report; the batch never aborts.
    pub fn ingest(&self, payload: ReceiptPayload, caller_user: Option<&str>) -> IngestReport {
        let receipts = payload.into_receipts();
        let mut report = IngestReport {
            total: receipts.len(),
            ..Default::default()
        };
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for value in &receipts {
            let fields = ReceiptFields::from_value(value);
            let external_id = fields.external_id.clone();

            let Some(user_id) = caller_user
                .map(str::to_string)
                .or_else(|| fields.user_id.clone())
            else {
                report.fail(external_id, "Missing user_id");
                continue;
            };

            let amount = fields.amount.as_ref().and_then(amount_from_value);
            let (Some(ext), Some(date_str), Some(amount)) =
                (external_id.clone(), fields.date.clone(), amount.filter(|a| *a != 0.0))
            else {
                report.fail(external_id, "Missing required fields");
                continue;
            };

            if !seen.insert((user_id.clone(), ext.clone())) {
                debug!(external_id = %ext, "Receipt repeated within payload");
                report.duplicates += 1;
                continue;
            }

            let Some(date) = parse_date(&date_str) else {
                report.fail(external_id, &format!("Invalid date: {}", date_str));
                continue;
            };

            let row = receipt_row(&fields, user_id, ext.clone(), date, amount);
            match self.db.record_receipt(&row) {
                Ok(ReceiptOutcome::AlreadyIngested) => report.duplicates += 1,
                Ok(ReceiptOutcome::Pending(_)) | Ok(ReceiptOutcome::Reconciled { .. }) => {
                    report.success += 1
                }
                Err(e) => {
                    warn!(external_id = %ext, error = %e, "Failed to store receipt");
                    report.fail(external_id, &e.to_string());
                }
            }
        }

        info!(
            total = report.total,
            success = report.success,
            duplicates = report.duplicates,
            failed = report.failed,
            "Receipt ingestion finished"
        );
        report
    }
}

impl IngestReport {
    fn fail(&mut self, external_id: Option<String>, error: &str) {
        self.failed += 1;
        self.errors.push(RowError {
            external_id,
            error: error.to_string(),
        });
    }
}

fn receipt_row(
    fields: &ReceiptFields,
    user_id: String,
    external_id: String,
    date: chrono::NaiveDate,
    amount: f64,
) -> NewTransaction {
    let notes = match &fields.items {
        Some(items) => Some(format!(
            "Items: {}\n{}",
            items,
            fields.notes.as_deref().unwrap_or("")
        )),
        None => fields.notes.clone(),
    };

    NewTransaction {
        statement_id: None,
        user_id,
        date,
        amount,
        currency: fields
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        merchant: fields.merchant.clone(),
        transaction_name: fields
            .merchant
            .clone()
            .unwrap_or_else(|| RECEIPT_FALLBACK_NAME.to_string()),
        reference_id: None,
        category: fields
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        transaction_type: TransactionType::Expense,
        notes,
        source: TransactionSource::Receipt,
        external_id: Some(external_id),
        match_id: None,
        status: TransactionStatus::Pending,
        fingerprint: None,
    }
}
