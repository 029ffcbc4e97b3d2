//! Enrichment log operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::EnrichmentLog;

impl Database {
    /// Append an enrichment summary for a statement
    pub fn add_enrichment_log(&self, statement_id: i64, summary: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO enrichment_logs (statement_id, enrichment_summary) VALUES (?, ?)",
            params![statement_id, summary],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Enrichment logs of a statement, newest first
    pub fn list_enrichment_logs(&self, statement_id: i64) -> Result<Vec<EnrichmentLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, statement_id, enrichment_summary, created_at FROM enrichment_logs \
             WHERE statement_id = ? ORDER BY created_at DESC, id DESC",
        )?;
        let logs = stmt
            .query_map(params![statement_id], |row| {
                let created_at: String = row.get(3)?;
                Ok(EnrichmentLog {
                    id: row.get(0)?,
                    statement_id: row.get(1)?,
                    enrichment_summary: row.get(2)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}
