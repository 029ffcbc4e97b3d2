//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `statements` - Statement CRUD and the status state machine
//! - `transactions` - Transaction CRUD, fingerprint dedupe, duplicates view
//! - `receipts` - Receipt reconciliation against statement transactions
//! - `enrichment` - Enrichment log operations
//! - `drafts` - Keyed draft text persistence

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::StatementStatus;

mod drafts;
mod enrichment;
mod receipts;
mod statements;
mod transaction_filter;
mod transactions;

pub use receipts::{ReceiptOutcome, RECONCILE_WINDOW_DAYS};
pub use transaction_filter::{FilterResult, TransactionFilter};
pub use transactions::SaveResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Capacity of the statement status channel; slow subscribers skip ahead
const STATUS_CHANNEL_CAPACITY: usize = 64;

const POOL_SIZE: u32 = 10;

/// SQLCipher raw key for a passphrase (Argon2id, hex encoded)
///
/// The salt is fixed per application so a database keeps opening after it
/// is moved or restored under another name.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    const KEY_SALT: &[u8; 16] = b"tally-salt-v1-ok";

    let salt = SaltString::encode_b64(KEY_SALT)
        .map_err(|e| Error::Encryption(format!("Invalid key salt: {}", e)))?;
    let derived = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?
        .hash
        .ok_or_else(|| Error::Encryption("Key derivation produced no output".into()))?;

    Ok(hex::encode(derived.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Published whenever a statement changes status
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusEvent {
    pub statement_id: i64,
    pub status: StatementStatus,
    /// Failure reason when `status` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    events: broadcast::Sender<StatusEvent>,
}

impl Database {
    /// Open an encrypted database keyed by `TALLY_DB_KEY`
    ///
    /// Fails when the variable is unset; `new_unencrypted` is the explicit
    /// opt-out for local development.
    pub fn new(path: &str) -> Result<Self> {
        let passphrase = std::env::var(DB_KEY_ENV).map_err(|_| {
            Error::Encryption(format!(
                "{} is not set. Export a passphrase, or pass --no-encrypt to use a plain database.",
                DB_KEY_ENV
            ))
        })?;
        Self::new_with_key(path, Some(&passphrase))
    }

    /// Open a plain SQLite database (development and tests)
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let mut init_sql = String::new();
        if let Some(passphrase) = passphrase {
            init_sql.push_str(&format!("PRAGMA key = 'x\"{}\"';", derive_key(passphrase)?));
        }
        init_sql.push_str("PRAGMA foreign_keys = ON;");

        // Every pooled connection needs the key before its first statement
        let manager =
            SqliteConnectionManager::file(path).with_init(move |conn| conn.execute_batch(&init_sql));
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let db = Self {
            pool,
            db_path: path.to_string(),
            events,
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Fresh throwaway database under the temp dir
    ///
    /// A real file is used because each pooled connection to `:memory:`
    /// would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Subscribe to statement status changes
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: StatusEvent) {
        // No receivers is the common case outside the server
        let _ = self.events.send(event);
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block the background extraction writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Uploaded bank statements
            CREATE TABLE IF NOT EXISTS statements (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                bank_statement_url TEXT,                 -- blob key: {statement_id}/{timestamp}.{ext}
                status TEXT NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft', 'processing', 'parsed', 'failed')),
                parsed_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_statements_user ON statements(user_id, created_at);

            -- Transactions from statements and receipts
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                statement_id INTEGER REFERENCES statements(id),   -- NULL for standalone receipts
                user_id TEXT NOT NULL,
                date DATE NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'IDR',
                merchant TEXT,
                transaction_name TEXT NOT NULL,
                reference_id TEXT,
                category TEXT NOT NULL DEFAULT 'Uncategorized',
                type TEXT NOT NULL DEFAULT 'expense',
                notes TEXT,
                source TEXT NOT NULL DEFAULT 'statement'
                    CHECK (source IN ('statement', 'receipt')),
                external_id TEXT,                        -- receipt idempotency key
                match_id INTEGER,                        -- reconciled counterpart (not enforced)
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'verified', 'duplicate')),
                fingerprint TEXT,                        -- sha256(date|amount|transaction_name)
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, fingerprint),
                UNIQUE(user_id, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_statement ON transactions(statement_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_reconcile ON transactions(user_id, source, amount, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);

            -- Enrichment pass summaries (append-only)
            CREATE TABLE IF NOT EXISTS enrichment_logs (
                id INTEGER PRIMARY KEY,
                statement_id INTEGER NOT NULL REFERENCES statements(id),
                enrichment_summary TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_enrichment_logs_statement ON enrichment_logs(statement_id);

            -- Draft editor text, last write wins
            CREATE TABLE IF NOT EXISTS drafts (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, key)
            );

            -- Single canonical transfer type
            UPDATE transactions SET type = 'internal_transfer' WHERE type = 'transfer';
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
