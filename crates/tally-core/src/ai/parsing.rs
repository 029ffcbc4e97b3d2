//! JSON parsing helpers for LLM responses
//!
//! Models wrap their JSON in prose or code fences. These helpers take the
//! widest `[...]` or `{...}` span of the text and parse that.

use std::collections::HashMap;

use regex::Regex;

use super::types::{EnrichmentResponse, ExtractedTransaction};
use crate::error::{Error, Result};

/// Truncate long responses for error messages
fn truncated(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

/// First `[` through last `]` of the response
pub fn extract_json_array(response: &str) -> Result<Option<&str>> {
    let re = Regex::new(r"\[[\s\S]*\]")?;
    Ok(re.find(response).map(|m| m.as_str()))
}

/// First `{` through last `}` of the response
pub fn extract_json_object(response: &str) -> Result<Option<&str>> {
    let re = Regex::new(r"\{[\s\S]*\}")?;
    Ok(re.find(response).map(|m| m.as_str()))
}

/// Parse the transaction array of an extraction response
///
/// A missing or malformed array is an error; an empty one is returned as is.
pub fn parse_extracted_transactions(response: &str) -> Result<Vec<ExtractedTransaction>> {
    let json_str = extract_json_array(response)?.ok_or_else(|| {
        Error::Llm(format!(
            "Failed to parse transactions from Gemini response | Raw: {}",
            truncated(response.trim())
        ))
    })?;

    serde_json::from_str(json_str).map_err(|e| {
        Error::Llm(format!(
            "Failed to parse transactions from Gemini response: {} | Raw: {}",
            e,
            truncated(json_str)
        ))
    })
}

/// Parse an enrichment response; `None` when no valid object is present
pub fn parse_enrichment(response: &str) -> Option<EnrichmentResponse> {
    let json_str = extract_json_object(response).ok().flatten()?;
    serde_json::from_str(json_str).ok()
}

/// Parse a `{ "<transaction id>": "<merchant>" | null }` map
///
/// Null, empty, and literal `"null"` merchants are skipped, as are keys that
/// are not transaction IDs.
pub fn parse_merchant_map(response: &str) -> Result<HashMap<i64, String>> {
    let json_str = extract_json_object(response)?.ok_or_else(|| {
        Error::Llm(format!(
            "No JSON object in merchant response | Raw: {}",
            truncated(response.trim())
        ))
    })?;

    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json_str)
        .map_err(|e| Error::Llm(format!("Invalid merchant JSON: {}", e)))?;

    Ok(raw
        .into_iter()
        .filter_map(|(id, value)| {
            let id = id.trim().parse::<i64>().ok()?;
            let merchant = value.as_str()?.trim();
            if merchant.is_empty() || merchant.eq_ignore_ascii_case("null") {
                return None;
            }
            Some((id, merchant.to_string()))
        })
        .collect())
}
