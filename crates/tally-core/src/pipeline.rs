//! Statement processing pipeline
//!
//! Loads the uploaded statement file, asks the LLM for its transactions,
//! fingerprints and stores them, and drives the statement status:
//!
//! ```text
//! draft ──begin──▶ processing ──run ok──▶ parsed
//!                      │
//!                      └──run error──▶ failed ──begin (retry)──▶ processing
//! ```

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::ai::parsing::parse_extracted_transactions;
use crate::ai::{AIBackend, AIClient, ExtractedTransaction, InlineDocument};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::models::{
    parse_date, NewTransaction, Statement, StatementStatus, TransactionSource, TransactionStatus,
    DEFAULT_CATEGORY, DEFAULT_CURRENCY,
};
use crate::prompts::{PromptId, PromptLibrary};
use crate::storage::{mime_type_for, FileStore};

/// Name stored when the model gives neither a name nor a merchant
const UNKNOWN_TRANSACTION_NAME: &str = "Unknown transaction";

/// Runs extraction for statements
#[derive(Clone)]
pub struct StatementProcessor {
    db: Database,
    store: FileStore,
    ai: AIClient,
    prompts: PromptLibrary,
}

impl StatementProcessor {
    pub fn new(db: Database, store: FileStore, ai: AIClient) -> Self {
        Self {
            db,
            store,
            ai,
            prompts: PromptLibrary::new(),
        }
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Move a statement into `processing` (first run or retry after failure)
    pub fn begin(&self, statement_id: i64) -> Result<Statement> {
        self.db
            .transition_statement(statement_id, StatementStatus::Processing, None)
    }

    /// `begin` followed by `run`
    pub async fn process(&self, statement_id: i64) -> Result<usize> {
        self.begin(statement_id)?;
        self.run(statement_id).await
    }

    /// Extract and store transactions for a statement in `processing`
    ///
    /// On success the statement becomes `parsed` and the number of newly
    /// stored rows is returned. On any error the statement becomes `failed`
    /// and the error is returned.
    pub async fn run(&self, statement_id: i64) -> Result<usize> {
        match self.extract_and_store(statement_id).await {
            Ok(count) => {
                self.db
                    .transition_statement(statement_id, StatementStatus::Parsed, None)?;
                info!(statement_id, count, "Statement parsed");
                Ok(count)
            }
            Err(e) => {
                error!(statement_id, error = %e, "Statement processing failed");
                let reason = failure_message(&e);
                if let Err(mark_err) = self.db.transition_statement(
                    statement_id,
                    StatementStatus::Failed,
                    Some(&reason),
                ) {
                    warn!(statement_id, error = %mark_err, "Could not mark statement failed");
                }
                Err(e)
            }
        }
    }

    async fn extract_and_store(&self, statement_id: i64) -> Result<usize> {
        let statement = self
            .db
            .get_statement(statement_id)?
            .ok_or_else(|| Error::NotFound("Statement not found".into()))?;

        let key = statement
            .bank_statement_url
            .as_deref()
            .ok_or_else(|| Error::InvalidData("No bank statement file found".into()))?;

        let bytes = self.store.get(key).map_err(|e| {
            Error::Storage(format!("Failed to download statement file: {}", e))
        })?;
        let document = InlineDocument::from_bytes(mime_type_for(key), &bytes);

        let prompt = self
            .prompts
            .get(PromptId::ExtractTransactions)?
            .render(&HashMap::new());

        info!(
            statement_id,
            backend = self.ai.backend_name(),
            model = self.ai.model(),
            size = bytes.len(),
            "Extracting transactions"
        );
        let response = self.ai.generate(&prompt, &[document]).await?;

        let extracted = parse_extracted_transactions(&response)?;
        if extracted.is_empty() {
            return Err(Error::Llm("No transactions found in the statement".into()));
        }

        let rows = to_new_transactions(&statement, &extracted)?;
        let saved = self.db.save_transactions(&rows)?;
        if saved.skipped > 0 {
            info!(
                statement_id,
                skipped = saved.skipped,
                "Skipped transactions already stored"
            );
        }
        Ok(saved.inserted)
    }
}

/// Statement rows for extracted transactions, fingerprinted
///
/// A row whose date cannot be read fails the whole batch.
pub fn to_new_transactions(
    statement: &Statement,
    extracted: &[ExtractedTransaction],
) -> Result<Vec<NewTransaction>> {
    extracted
        .iter()
        .map(|tx| {
            let date = parse_date(&tx.date).ok_or_else(|| {
                Error::InvalidData(format!("Invalid transaction date: {}", tx.date))
            })?;
            let merchant = non_empty(tx.merchant.as_deref());
            let transaction_name = non_empty(tx.transaction_name.as_deref())
                .or_else(|| merchant.clone())
                .unwrap_or_else(|| UNKNOWN_TRANSACTION_NAME.to_string());

            Ok(NewTransaction {
                statement_id: Some(statement.id),
                user_id: statement.user_id.clone(),
                date,
                amount: tx.amount,
                currency: non_empty(tx.currency.as_deref())
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                fingerprint: Some(fingerprint(date, tx.amount, &transaction_name)),
                merchant,
                transaction_name,
                reference_id: non_empty(tx.reference_id.as_deref()),
                category: non_empty(tx.category.as_deref())
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                transaction_type: tx
                    .transaction_type
                    .as_deref()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or_default(),
                notes: non_empty(tx.notes.as_deref()),
                source: TransactionSource::Statement,
                external_id: None,
                match_id: None,
                status: TransactionStatus::Pending,
            })
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// User-facing reason for a failed run
pub fn failure_message(e: &Error) -> String {
    match e {
        Error::NotFound(msg)
        | Error::InvalidData(msg)
        | Error::Llm(msg)
        | Error::Storage(msg) => msg.clone(),
        other => other.to_string(),
    }
}
