//! Statement operations and the status state machine

use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::{debug, info};

use super::{parse_datetime, Database, StatusEvent};
use crate::error::{Error, Result};
use crate::models::{Statement, StatementStatus};

const STATEMENT_COLUMNS: &str =
    "id, user_id, name, bank_statement_url, status, parsed_at, created_at, updated_at";

impl Database {
    /// Create a statement in `draft` status
    pub fn create_statement(&self, user_id: &str, name: &str) -> Result<Statement> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("Statement name is required".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO statements (user_id, name, status) VALUES (?, ?, 'draft')",
            params![user_id, name],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        info!(statement_id = id, "Created statement");
        self.get_statement(id)?
            .ok_or_else(|| Error::NotFound(format!("statement {}", id)))
    }

    /// Get a statement by ID
    pub fn get_statement(&self, id: i64) -> Result<Option<Statement>> {
        let conn = self.conn()?;
        let statement = conn
            .query_row(
                &format!("SELECT {} FROM statements WHERE id = ?", STATEMENT_COLUMNS),
                params![id],
                Self::row_to_statement,
            )
            .optional()?;
        Ok(statement)
    }

    /// Get a statement by ID only if it belongs to `user_id`
    pub fn get_user_statement(&self, id: i64, user_id: &str) -> Result<Option<Statement>> {
        Ok(self.get_statement(id)?.filter(|s| s.user_id == user_id))
    }

    /// List a user's statements, newest first
    pub fn list_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statements WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            STATEMENT_COLUMNS
        ))?;
        let statements = stmt
            .query_map(params![user_id], Self::row_to_statement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(statements)
    }

    /// Count statements (all users)
    pub fn count_statements(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM statements", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Record the blob key of the uploaded statement file
    pub fn set_statement_file(&self, id: i64, key: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE statements SET bank_statement_url = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![key, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("statement {}", id)));
        }
        Ok(())
    }

    /// Move a statement to `next`, enforcing the lifecycle
    ///
    /// Allowed moves: draft -> processing, failed -> processing,
    /// processing -> parsed, processing -> failed. The check and the write are
    /// a single conditional UPDATE, so concurrent callers cannot both win.
    /// `error` is published with the status event when moving to `failed`.
    pub fn transition_statement(
        &self,
        id: i64,
        next: StatementStatus,
        error: Option<&str>,
    ) -> Result<Statement> {
        let sources = StatementStatus::allowed_sources(next);
        let conn = self.conn()?;

        let updated = if sources.is_empty() {
            0
        } else {
            let placeholders = vec!["?"; sources.len()].join(", ");
            let parsed_at = if next == StatementStatus::Parsed {
                ", parsed_at = CURRENT_TIMESTAMP"
            } else {
                ""
            };
            let sql = format!(
                "UPDATE statements SET status = ?, updated_at = CURRENT_TIMESTAMP{} \
                 WHERE id = ? AND status IN ({})",
                parsed_at, placeholders
            );

            let mut values: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(next.as_str()), Box::new(id)];
            for source in sources {
                values.push(Box::new(source.as_str()));
            }
            conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?
        };
        drop(conn);

        let statement = self
            .get_statement(id)?
            .ok_or_else(|| Error::NotFound(format!("statement {}", id)))?;

        if updated == 0 {
            return Err(Error::InvalidTransition {
                id,
                from: statement.status,
                to: next,
            });
        }

        debug!(statement_id = id, status = %next, "Statement status changed");
        self.publish(StatusEvent {
            statement_id: id,
            status: next,
            error: error.map(str::to_string),
        });
        Ok(statement)
    }

    /// Fail statements left in `processing` by a run that never finished
    ///
    /// Called at server start, when no extraction can still be running.
    pub fn recover_stuck_statements(&self) -> Result<usize> {
        let conn = self.conn()?;
        let recovered = conn.execute(
            "UPDATE statements SET status = 'failed', updated_at = CURRENT_TIMESTAMP \
             WHERE status = 'processing'",
            [],
        )?;
        if recovered > 0 {
            info!(recovered, "Marked interrupted statements as failed");
        }
        Ok(recovered)
    }

    /// Delete a statement with its transactions and enrichment logs
    ///
    /// Returns the blob key of the statement file, if one was uploaded, so the
    /// caller can remove it from storage.
    pub fn delete_statement(&self, id: i64) -> Result<Option<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let file: Option<Option<String>> = tx
            .query_row(
                "SELECT bank_statement_url FROM statements WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(file) = file else {
            return Err(Error::NotFound(format!("statement {}", id)));
        };

        let transactions = tx.execute(
            "DELETE FROM transactions WHERE statement_id = ?",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM enrichment_logs WHERE statement_id = ?",
            params![id],
        )?;
        tx.execute("DELETE FROM statements WHERE id = ?", params![id])?;
        tx.commit()?;

        info!(statement_id = id, transactions, "Deleted statement");
        Ok(file)
    }

    pub(crate) fn row_to_statement(row: &rusqlite::Row) -> rusqlite::Result<Statement> {
        let status_str: String = row.get(4)?;
        let parsed_at: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(Statement {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            bank_statement_url: row.get(3)?,
            status: status_str.parse().unwrap_or_default(),
            parsed_at: parsed_at.as_deref().map(parse_datetime),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
