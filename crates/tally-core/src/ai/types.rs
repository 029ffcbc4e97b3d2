//! Types exchanged with LLM backends

use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::TransactionUpdate;

/// A document attached to a prompt (statement page, receipt photo, PDF)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineDocument {
    pub mime_type: String,
    /// Base64-encoded file content
    pub data: String,
}

impl InlineDocument {
    /// Wrap raw file bytes
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// One transaction as emitted by the extraction prompt
///
/// Models are loose with types: amounts arrive as numbers or numeric
/// strings and IDs as numbers or strings. Everything but `date` and
/// `amount` is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedTransaction {
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub merchant: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub transaction_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub reference_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub category: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_opt_string")]
    pub transaction_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub notes: Option<String>,
}

/// Changes proposed for one stored transaction by the enrichment prompt
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnrichedTransaction {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_amount")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub merchant: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub transaction_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub reference_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub category: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_opt_string")]
    pub transaction_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub notes: Option<String>,
}

impl EnrichedTransaction {
    /// Fields the model supplied, as a partial update
    ///
    /// Unparseable dates and unknown types are dropped rather than failing
    /// the whole pass.
    pub fn to_update(&self) -> TransactionUpdate {
        TransactionUpdate {
            date: self
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
            amount: self.amount,
            currency: self.currency.clone(),
            merchant: self.merchant.clone(),
            transaction_name: self.transaction_name.clone(),
            reference_id: self.reference_id.clone(),
            category: self.category.clone(),
            transaction_type: self
                .transaction_type
                .as_deref()
                .and_then(|t| t.parse().ok()),
            notes: self.notes.clone(),
            status: None,
        }
    }
}

/// Parsed enrichment prompt output
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnrichmentResponse {
    #[serde(default)]
    pub enriched_transactions: Vec<EnrichedTransaction>,
    #[serde(default)]
    pub summary: String,
}

/// Parse a money amount from a JSON number or a numeric string
///
/// Thousands separators and surrounding whitespace are ignored.
pub fn amount_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn value_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    value_to_string(value).ok_or_else(|| serde::de::Error::custom("expected a string"))
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_string(value))
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("invalid id: {}", value)))
}

fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    amount_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", value)))
}

fn lenient_opt_amount<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(amount_from_value(&value))
}
