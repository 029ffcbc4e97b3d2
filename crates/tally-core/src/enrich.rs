//! Secondary LLM passes over stored transactions
//!
//! - Enrichment: reference documents (receipts, invoices) plus free-text
//!   remarks are used to fill in details of a statement's transactions.
//!   Every pass appends an enrichment log.
//! - Merchant backfill: transactions without a merchant are sent in batches
//!   and the model names a merchant for each where it can.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::ai::parsing::{parse_enrichment, parse_merchant_map};
use crate::ai::{AIBackend, AIClient, InlineDocument};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Transaction, TransactionUpdate};
use crate::prompts::{PromptId, PromptLibrary};

/// Summary logged when the model's reply cannot be parsed
pub const UNPARSEABLE_ENRICHMENT_SUMMARY: &str = "Failed to parse enrichment response";

/// A named document supplied for enrichment
#[derive(Debug, Clone)]
pub struct ReferenceDocument {
    pub name: String,
    pub document: InlineDocument,
}

/// Result of one enrichment pass
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichmentOutcome {
    pub summary: String,
    /// Transactions actually updated
    pub updated: usize,
    pub log_id: i64,
}

/// Merchant backfill settings
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub batch_size: usize,
    /// Pause between batches to stay under provider rate limits
    pub pause: Duration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            pause: Duration::from_secs(2),
        }
    }
}

/// Result of a merchant backfill run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub batches: usize,
    pub updated: usize,
    pub failed_batches: usize,
}

/// The subset of a transaction shown to the model
#[derive(Serialize)]
struct PromptTransaction<'a> {
    id: i64,
    date: String,
    amount: f64,
    currency: &'a str,
    merchant: Option<&'a str>,
    transaction_name: &'a str,
    reference_id: Option<&'a str>,
    category: &'a str,
    #[serde(rename = "type")]
    transaction_type: &'a str,
    notes: Option<&'a str>,
}

impl<'a> From<&'a Transaction> for PromptTransaction<'a> {
    fn from(t: &'a Transaction) -> Self {
        Self {
            id: t.id,
            date: t.date.to_string(),
            amount: t.amount,
            currency: &t.currency,
            merchant: t.merchant.as_deref(),
            transaction_name: &t.transaction_name,
            reference_id: t.reference_id.as_deref(),
            category: &t.category,
            transaction_type: t.transaction_type.as_str(),
            notes: t.notes.as_deref(),
        }
    }
}

/// Fields shown to the merchant prompt
#[derive(Serialize)]
struct MerchantHint<'a> {
    id: i64,
    transaction_name: &'a str,
    notes: Option<&'a str>,
    category: &'a str,
}

/// Runs enrichment and merchant backfill passes
#[derive(Clone)]
pub struct Enricher {
    db: Database,
    ai: AIClient,
    prompts: PromptLibrary,
}

impl Enricher {
    pub fn new(db: Database, ai: AIClient) -> Self {
        Self {
            db,
            ai,
            prompts: PromptLibrary::new(),
        }
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Enrich a statement's transactions from reference documents and remarks
    ///
    /// Updates are applied one row at a time and only to transactions of this
    /// statement. An unparseable reply still logs a summary and changes nothing.
    pub async fn enrich_statement(
        &self,
        statement_id: i64,
        documents: &[ReferenceDocument],
        remarks: &str,
    ) -> Result<EnrichmentOutcome> {
        let transactions = self.db.list_statement_transactions(statement_id)?;
        if transactions.is_empty() {
            return Err(Error::InvalidData(
                "Statement has no transactions to enrich".into(),
            ));
        }

        let shown: Vec<PromptTransaction> = transactions.iter().map(Into::into).collect();
        let transactions_json = serde_json::to_string_pretty(&shown)?;
        let document_list = documents
            .iter()
            .enumerate()
            .map(|(i, d)| format!("- Image {}: \"{}\" document", i + 1, d.name))
            .collect::<Vec<_>>()
            .join("\n");
        let remarks = if remarks.trim().is_empty() {
            "None"
        } else {
            remarks.trim()
        };

        let mut vars = HashMap::new();
        vars.insert("transactions", transactions_json.as_str());
        vars.insert("documents", document_list.as_str());
        vars.insert("remarks", remarks);
        let prompt = self.prompts.get(PromptId::EnrichTransactions)?.render(&vars);

        let attachments: Vec<InlineDocument> =
            documents.iter().map(|d| d.document.clone()).collect();
        let response = self.ai.generate(&prompt, &attachments).await?;

        let (summary, updated) = match parse_enrichment(&response) {
            Some(parsed) => {
                let own: HashSet<i64> = transactions.iter().map(|t| t.id).collect();
                let updates: Vec<(i64, TransactionUpdate)> = parsed
                    .enriched_transactions
                    .iter()
                    .filter(|e| {
                        let ours = own.contains(&e.id);
                        if !ours {
                            warn!(statement_id, id = e.id, "Ignoring enrichment for foreign transaction");
                        }
                        ours
                    })
                    .map(|e| (e.id, e.to_update()))
                    .filter(|(_, u)| !u.is_empty())
                    .collect();
                let updated = self.db.update_transactions(&updates)?;
                (parsed.summary, updated)
            }
            None => {
                warn!(statement_id, "Could not parse enrichment response");
                (UNPARSEABLE_ENRICHMENT_SUMMARY.to_string(), 0)
            }
        };

        let log_id = self.db.add_enrichment_log(statement_id, &summary)?;
        info!(statement_id, updated, "Enrichment pass finished");

        Ok(EnrichmentOutcome {
            summary,
            updated,
            log_id,
        })
    }

    /// Name merchants for a user's transactions that have none
    ///
    /// A batch whose request or reply fails is logged and skipped.
    pub async fn backfill_merchants(
        &self,
        user_id: &str,
        options: &BackfillOptions,
    ) -> Result<BackfillReport> {
        let pending = self.db.transactions_missing_merchant(user_id)?;
        let mut report = BackfillReport {
            scanned: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let template = self.prompts.get(PromptId::SuggestMerchants)?;
        let batch_size = options.batch_size.max(1);
        let batch_count = pending.len().div_ceil(batch_size);

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            report.batches += 1;
            match self.suggest_batch(&template, batch).await {
                Ok(merchants) => {
                    for tx in batch {
                        if let Some(merchant) = merchants.get(&tx.id) {
                            let update = TransactionUpdate {
                                merchant: Some(merchant.clone()),
                                ..Default::default()
                            };
                            if self.db.update_transaction(tx.id, &update)? {
                                report.updated += 1;
                            }
                        }
                    }
                    info!(
                        batch = index + 1,
                        of = batch_count,
                        named = merchants.len(),
                        "Merchant batch done"
                    );
                }
                Err(e) => {
                    warn!(batch = index + 1, error = %e, "Merchant batch failed, skipping");
                    report.failed_batches += 1;
                }
            }

            if index + 1 < batch_count && !options.pause.is_zero() {
                tokio::time::sleep(options.pause).await;
            }
        }

        Ok(report)
    }

    async fn suggest_batch(
        &self,
        template: &crate::prompts::Prompt,
        batch: &[Transaction],
    ) -> Result<HashMap<i64, String>> {
        let hints: Vec<MerchantHint> = batch
            .iter()
            .map(|t| MerchantHint {
                id: t.id,
                transaction_name: &t.transaction_name,
                notes: t.notes.as_deref(),
                category: &t.category,
            })
            .collect();
        let json = serde_json::to_string_pretty(&hints)?;

        let mut vars = HashMap::new();
        vars.insert("transactions", json.as_str());
        let response = self.ai.generate(&template.render(&vars), &[]).await?;
        parse_merchant_map(&response)
    }
}
