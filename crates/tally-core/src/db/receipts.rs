//! Receipt reconciliation against statement transactions

use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::transactions::insert_row;
use super::Database;
use crate::error::Result;
use crate::models::{NewTransaction, TransactionStatus};

/// Date tolerance (days either side) when matching receipts to statement rows
pub const RECONCILE_WINDOW_DAYS: i64 = 3;

/// Amounts closer than this are equal
const AMOUNT_EPSILON: f64 = 1e-6;

/// What happened to one receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// The external id was already stored for this user; nothing written
    AlreadyIngested,
    /// Stored with `pending` status; no statement row fit the window
    Pending(i64),
    /// Stored as `duplicate` of the statement transaction `matched`
    Reconciled {
        id: i64,
        matched: i64,
        merchant_backfilled: bool,
    },
}

impl Database {
    /// Store a receipt, reconciling it against statement transactions
    ///
    /// The idempotency check, the window search, the merchant backfill, and
    /// the insert run in one immediate transaction. The insert itself is
    /// ON CONFLICT DO NOTHING on (user_id, external_id), so a receipt raced
    /// in by another writer is reported as already ingested.
    pub fn record_receipt(&self, receipt: &NewTransaction) -> Result<ReceiptOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(external_id) = receipt.external_id.as_deref() {
            if external_id_row(&tx, &receipt.user_id, external_id)?.is_some() {
                return Ok(ReceiptOutcome::AlreadyIngested);
            }
        }

        let mut row = receipt.clone();
        let candidate =
            reconciliation_candidate(&tx, &receipt.user_id, receipt.amount, receipt.date)?;

        let mut merchant_backfilled = false;
        if let Some((matched, merchant)) = &candidate {
            row.status = TransactionStatus::Duplicate;
            row.match_id = Some(*matched);

            let missing = merchant.as_deref().map_or(true, |m| m.trim().is_empty());
            let incoming = receipt.merchant.as_deref().filter(|m| !m.trim().is_empty());
            if let (true, Some(new_merchant)) = (missing, incoming) {
                tx.execute(
                    "UPDATE transactions SET merchant = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    params![new_merchant, matched],
                )?;
                merchant_backfilled = true;
            }
        }

        let Some(id) = insert_row(&tx, &row)? else {
            return Ok(ReceiptOutcome::AlreadyIngested);
        };
        tx.commit()?;

        Ok(match candidate {
            Some((matched, _)) => {
                debug!(receipt_id = id, matched, "Receipt reconciled");
                ReceiptOutcome::Reconciled {
                    id,
                    matched,
                    merchant_backfilled,
                }
            }
            None => ReceiptOutcome::Pending(id),
        })
    }
}

fn external_id_row(
    conn: &Connection,
    user_id: &str,
    external_id: &str,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM transactions WHERE user_id = ? AND external_id = ?",
        params![user_id, external_id],
        |row| row.get(0),
    )
    .optional()
}

/// Lowest-id unmatched statement transaction with this amount within the
/// window, with its current merchant
///
/// A statement row counts as unmatched when it has no match_id and no other
/// row points at it.
fn reconciliation_candidate(
    conn: &Connection,
    user_id: &str,
    amount: f64,
    date: NaiveDate,
) -> rusqlite::Result<Option<(i64, Option<String>)>> {
    let from = date - Duration::days(RECONCILE_WINDOW_DAYS);
    let to = date + Duration::days(RECONCILE_WINDOW_DAYS);

    conn.query_row(
        r#"
        SELECT t.id, t.merchant FROM transactions t
        WHERE t.user_id = ?
          AND t.source = 'statement'
          AND ABS(t.amount - ?) < ?
          AND t.date >= ? AND t.date <= ?
          AND t.match_id IS NULL
          AND NOT EXISTS (SELECT 1 FROM transactions r WHERE r.match_id = t.id)
        ORDER BY t.id
        LIMIT 1
        "#,
        params![
            user_id,
            amount,
            AMOUNT_EPSILON,
            from.to_string(),
            to.to_string()
        ],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}
