//! Tally Core Library
//!
//! Shared functionality for the Tally statement tracker:
//! - Database access and migrations
//! - Transaction fingerprints for duplicate suppression
//! - Blob storage for uploaded statement files
//! - Pluggable LLM backends (Gemini, mock) and response parsing
//! - Prompt library for customizable extraction prompts
//! - Statement processing pipeline
//! - Receipt ingestion with statement reconciliation
//! - Enrichment and merchant backfill passes
//! - Dashboard summaries

pub mod ai;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod reports;
pub mod storage;

/// Test utilities including mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, ExtractedTransaction, GeminiBackend, InlineDocument, MockBackend};
pub use db::{Database, ReceiptOutcome, SaveResult, StatusEvent, TransactionFilter};
pub use enrich::{BackfillOptions, BackfillReport, EnrichmentOutcome, Enricher, ReferenceDocument};
pub use error::{Error, Result};
pub use fingerprint::fingerprint;
pub use ingest::{IngestReport, ReceiptIngestor, ReceiptPayload, RowError};
pub use pipeline::StatementProcessor;
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use reports::{dashboard, Dashboard, MonthPeriod, Summary};
pub use storage::FileStore;
