//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Currency assigned when a source document does not name one
pub const DEFAULT_CURRENCY: &str = "IDR";

/// Category assigned when a source document does not name one
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Parse a calendar date from model or API input
///
/// Accepts `YYYY-MM-DD`, an RFC 3339 / ISO datetime (the date part is
/// used), or `DD/MM/YYYY`.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(prefix) = s.get(..10) {
        if s[10..].starts_with(['T', ' ']) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()
}

/// Lifecycle of an uploaded statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    /// Created, no extraction attempted yet
    #[default]
    Draft,
    /// File uploaded and extraction running in the background
    Processing,
    /// Extraction finished and transactions were stored
    Parsed,
    /// Extraction or upload failed; may be retried
    Failed,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Parsed => "parsed",
            Self::Failed => "failed",
        }
    }

    /// Statuses a statement may be in before moving to `next`
    pub fn allowed_sources(next: StatementStatus) -> &'static [StatementStatus] {
        match next {
            Self::Draft => &[],
            Self::Processing => &[Self::Draft, Self::Failed],
            Self::Parsed | Self::Failed => &[Self::Processing],
        }
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "parsed" => Ok(Self::Parsed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown statement status: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded bank statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    /// Blob key of the uploaded file
    pub bank_statement_url: Option<String>,
    pub status: StatementStatus,
    pub parsed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction direction/kind
///
/// Older data used a single `transfer` value; it is read as `InternalTransfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Expense,
    Income,
    #[serde(alias = "transfer")]
    InternalTransfer,
    ExternalTransfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::InternalTransfer => "internal_transfer",
            Self::ExternalTransfer => "external_transfer",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "expense" | "debit" => Ok(Self::Expense),
            "income" | "credit" => Ok(Self::Income),
            "transfer" | "internal_transfer" => Ok(Self::InternalTransfer),
            "external_transfer" => Ok(Self::ExternalTransfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a transaction row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    #[default]
    Statement,
    Receipt,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Receipt => "receipt",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "statement" => Ok(Self::Statement),
            "receipt" => Ok(Self::Receipt),
            _ => Err(format!("Unknown transaction source: {}", s)),
        }
    }
}

/// Review status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Verified,
    /// Receipt reconciled against a statement transaction (see `match_id`)
    Duplicate,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Duplicate => "duplicate",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

/// A stored transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub statement_id: Option<i64>,
    pub user_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub currency: String,
    pub merchant: Option<String>,
    pub transaction_name: String,
    pub reference_id: Option<String>,
    pub category: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub notes: Option<String>,
    pub source: TransactionSource,
    /// Receipt idempotency key from the upstream system
    pub external_id: Option<String>,
    /// Reconciled counterpart; a lookup hint, not a foreign key
    pub match_id: Option<i64>,
    pub status: TransactionStatus,
    /// SHA-256 of `date|amount|transaction_name` (statement rows only)
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub statement_id: Option<i64>,
    pub user_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub currency: String,
    pub merchant: Option<String>,
    pub transaction_name: String,
    pub reference_id: Option<String>,
    pub category: String,
    pub transaction_type: TransactionType,
    pub notes: Option<String>,
    pub source: TransactionSource,
    pub external_id: Option<String>,
    pub match_id: Option<i64>,
    pub status: TransactionStatus,
    pub fingerprint: Option<String>,
}

/// Partial update of a transaction; `None` leaves the column untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub merchant: Option<String>,
    pub transaction_name: Option<String>,
    pub reference_id: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub notes: Option<String>,
    pub status: Option<TransactionStatus>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.amount.is_none()
            && self.currency.is_none()
            && self.merchant.is_none()
            && self.transaction_name.is_none()
            && self.reference_id.is_none()
            && self.category.is_none()
            && self.transaction_type.is_none()
            && self.notes.is_none()
            && self.status.is_none()
    }
}

/// Output of an enrichment pass over a statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentLog {
    pub id: i64,
    pub statement_id: i64,
    pub enrichment_summary: String,
    pub created_at: DateTime<Utc>,
}

/// A reconciled receipt together with the statement row it matched
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub duplicate: Transaction,
    /// `None` when the matched row has since been deleted
    pub matched: Option<Transaction>,
}

/// Saved editor text (prompt drafts, enrichment remarks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
