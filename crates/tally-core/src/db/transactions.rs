//! Transaction operations

use std::collections::{HashMap, HashSet};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use super::transaction_filter::TransactionFilter;
use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{DuplicatePair, NewTransaction, Transaction, TransactionUpdate};

/// Columns selected for `row_to_transaction`, aliased as `t`
pub(crate) const TRANSACTION_COLUMNS: &str = "t.id, t.statement_id, t.user_id, t.date, t.amount, \
     t.currency, t.merchant, t.transaction_name, t.reference_id, t.category, t.type, t.notes, \
     t.source, t.external_id, t.match_id, t.status, t.fingerprint, t.created_at, t.updated_at";

/// Fingerprints looked up per IN query
const FINGERPRINT_CHUNK: usize = 500;

/// Outcome of saving a batch of transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveResult {
    pub inserted: usize,
    /// Rows whose fingerprint (or external id) was already stored
    pub skipped: usize,
}

/// Insert one row, ignoring it if a uniqueness constraint already holds it
///
/// Returns the new ID, or `None` when the fingerprint or external id exists.
pub(crate) fn insert_row(conn: &Connection, tx: &NewTransaction) -> rusqlite::Result<Option<i64>> {
    let changed = conn.execute(
        r#"
        INSERT INTO transactions (statement_id, user_id, date, amount, currency, merchant,
            transaction_name, reference_id, category, type, notes, source, external_id,
            match_id, status, fingerprint)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
        params![
            tx.statement_id,
            tx.user_id,
            tx.date.to_string(),
            tx.amount,
            tx.currency,
            tx.merchant,
            tx.transaction_name,
            tx.reference_id,
            tx.category,
            tx.transaction_type.as_str(),
            tx.notes,
            tx.source.as_str(),
            tx.external_id,
            tx.match_id,
            tx.status.as_str(),
            tx.fingerprint,
        ],
    )?;
    Ok((changed > 0).then(|| conn.last_insert_rowid()))
}

impl Database {
    /// Save a batch, skipping rows whose fingerprint is already stored
    ///
    /// Existing fingerprints are fetched with batched IN queries and filtered
    /// out; the remainder is inserted with ON CONFLICT DO NOTHING so a
    /// concurrent import of the same rows cannot create duplicates. Identical
    /// rows inside one batch collapse to a single stored row.
    pub fn save_transactions(&self, rows: &[NewTransaction]) -> Result<SaveResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = existing_fingerprints(&tx, rows)?;
        let mut result = SaveResult::default();

        for row in rows {
            let known = row
                .fingerprint
                .as_ref()
                .is_some_and(|fp| existing.contains(&(row.user_id.clone(), fp.clone())));
            if !known && insert_row(&tx, row)?.is_some() {
                result.inserted += 1;
            } else {
                result.skipped += 1;
            }
        }

        tx.commit()?;
        debug!(
            inserted = result.inserted,
            skipped = result.skipped,
            "Saved transaction batch"
        );
        Ok(result)
    }

    /// Get a single transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t WHERE t.id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Transactions of one statement, oldest first
    pub fn list_statement_transactions(&self, statement_id: i64) -> Result<Vec<Transaction>> {
        self.search_transactions(
            TransactionFilter::new()
                .statement_id(Some(statement_id))
                .sort_field(Some("date"))
                .sort_order(Some("asc")),
        )
    }

    /// Search transactions with a filter
    pub fn search_transactions(&self, filter: TransactionFilter<'_>) -> Result<Vec<Transaction>> {
        let built = filter.build();
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions t {} {}",
            TRANSACTION_COLUMNS, built.where_clause, built.order_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params_from_iter(built.params.iter().map(|p| p.as_ref())),
                Self::row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count transactions, optionally for one user
    pub fn count_transactions(&self, user_id: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = match user_id {
            Some(user) => conn.query_row(
                "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
                params![user],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Apply a partial update to one transaction
    ///
    /// Returns false when the transaction does not exist.
    pub fn update_transaction(&self, id: i64, update: &TransactionUpdate) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(date) = update.date {
            sets.push("date = ?");
            values.push(Box::new(date.to_string()));
        }
        if let Some(amount) = update.amount {
            sets.push("amount = ?");
            values.push(Box::new(amount));
        }
        if let Some(currency) = &update.currency {
            sets.push("currency = ?");
            values.push(Box::new(currency.clone()));
        }
        if let Some(merchant) = &update.merchant {
            sets.push("merchant = ?");
            values.push(Box::new(merchant.clone()));
        }
        if let Some(name) = &update.transaction_name {
            sets.push("transaction_name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(reference) = &update.reference_id {
            sets.push("reference_id = ?");
            values.push(Box::new(reference.clone()));
        }
        if let Some(category) = &update.category {
            sets.push("category = ?");
            values.push(Box::new(category.clone()));
        }
        if let Some(kind) = update.transaction_type {
            sets.push("type = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(notes) = &update.notes {
            sets.push("notes = ?");
            values.push(Box::new(notes.clone()));
        }
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }

        let conn = self.conn()?;
        if sets.is_empty() {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transactions WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            return Ok(exists.is_some());
        }

        values.push(Box::new(id));
        let sql = format!(
            "UPDATE transactions SET {}, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            sets.join(", ")
        );
        let updated = conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(updated > 0)
    }

    /// Apply updates one row at a time, in order
    ///
    /// Not atomic across rows: an error stops the loop with earlier rows
    /// already written. Returns how many rows existed and were updated.
    pub fn update_transactions(&self, updates: &[(i64, TransactionUpdate)]) -> Result<usize> {
        let mut updated = 0;
        for (id, update) in updates {
            if self.update_transaction(*id, update)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Delete a transaction
    pub fn delete_transaction(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Reconciled receipts paired with the statement rows they matched
    pub fn list_duplicates(&self, user_id: &str) -> Result<Vec<DuplicatePair>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.user_id = ? AND t.status = 'duplicate' \
             ORDER BY t.date DESC, t.id DESC",
            TRANSACTION_COLUMNS
        ))?;
        let duplicates = stmt
            .query_map(params![user_id], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let match_ids: Vec<i64> = duplicates
            .iter()
            .filter_map(|t| t.match_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut matched: HashMap<i64, Transaction> = HashMap::new();
        for chunk in match_ids.chunks(FINGERPRINT_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM transactions t WHERE t.id IN ({})",
                TRANSACTION_COLUMNS, placeholders
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), Self::row_to_transaction)?;
            for row in rows {
                let row = row?;
                matched.insert(row.id, row);
            }
        }

        Ok(duplicates
            .into_iter()
            .map(|duplicate| {
                let matched = duplicate.match_id.and_then(|id| matched.get(&id).cloned());
                DuplicatePair { duplicate, matched }
            })
            .collect())
    }

    /// Resolve a duplicate by keeping both rows
    pub fn keep_transaction(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transactions SET status = 'verified', match_id = NULL, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![id],
        )?;
        if updated > 0 {
            info!(transaction_id = id, "Kept duplicate as verified");
        }
        Ok(updated > 0)
    }

    /// A user's transactions that have no merchant yet, in ID order
    pub fn transactions_missing_merchant(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.user_id = ? AND t.merchant IS NULL ORDER BY t.id",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(3)?;
        let type_str: String = row.get(10)?;
        let source_str: String = row.get(12)?;
        let status_str: String = row.get(15)?;
        let created_at: String = row.get(17)?;
        let updated_at: String = row.get(18)?;
        Ok(Transaction {
            id: row.get(0)?,
            statement_id: row.get(1)?,
            user_id: row.get(2)?,
            date: chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
            amount: row.get(4)?,
            currency: row.get(5)?,
            merchant: row.get(6)?,
            transaction_name: row.get(7)?,
            reference_id: row.get(8)?,
            category: row.get(9)?,
            transaction_type: type_str.parse().unwrap_or_default(),
            notes: row.get(11)?,
            source: source_str.parse().unwrap_or_default(),
            external_id: row.get(13)?,
            match_id: row.get(14)?,
            status: status_str.parse().unwrap_or_default(),
            fingerprint: row.get(16)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

/// (user_id, fingerprint) pairs of `rows` that are already stored
fn existing_fingerprints(
    conn: &Connection,
    rows: &[NewTransaction],
) -> Result<HashSet<(String, String)>> {
    let mut by_user: HashMap<&str, Vec<&str>> = HashMap::new();
    for row in rows {
        if let Some(fp) = row.fingerprint.as_deref() {
            by_user.entry(row.user_id.as_str()).or_default().push(fp);
        }
    }

    let mut existing = HashSet::new();
    for (user, fingerprints) in by_user {
        for chunk in fingerprints.chunks(FINGERPRINT_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT fingerprint FROM transactions WHERE user_id = ? AND fingerprint IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let values = std::iter::once(user).chain(chunk.iter().copied());
            let found = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
            for fp in found {
                existing.insert((user.to_string(), fp?));
            }
        }
    }
    Ok(existing)
}
