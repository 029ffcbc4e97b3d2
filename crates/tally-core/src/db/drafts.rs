//! Draft text persistence (last write wins)

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Draft;

impl Database {
    /// Get a saved draft
    pub fn get_draft(&self, user_id: &str, key: &str) -> Result<Option<Draft>> {
        let conn = self.conn()?;
        let draft = conn
            .query_row(
                "SELECT key, value, updated_at FROM drafts WHERE user_id = ? AND key = ?",
                params![user_id, key],
                |row| {
                    let updated_at: String = row.get(2)?;
                    Ok(Draft {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: parse_datetime(&updated_at),
                    })
                },
            )
            .optional()?;
        Ok(draft)
    }

    /// Save a draft, replacing any earlier value
    pub fn put_draft(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO drafts (user_id, key, value, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![user_id, key, value],
        )?;
        Ok(())
    }
}
