//! Integration tests for tally-core
//!
//! These tests exercise the upload → extract → reconcile → enrich workflow
//! against a mock model.

use chrono::Utc;
use serde_json::json;
use tally_core::{
    ai::{AIBackend, AIClient, GeminiBackend, InlineDocument, MockBackend},
    db::{Database, TransactionFilter},
    enrich::{BackfillOptions, Enricher, ReferenceDocument},
    ingest::{ReceiptIngestor, ReceiptPayload},
    models::{StatementStatus, TransactionSource, TransactionStatus, TransactionType},
    pipeline::StatementProcessor,
    reports::{dashboard, MonthPeriod},
    storage::FileStore,
    test_utils::{MockGeminiServer, MockReply},
    Error,
};

/// Extraction reply for a small March statement
fn march_extraction() -> String {
    json!([
        {"date": "2024-03-01", "amount": 5000000, "transaction_name": "GAJI MARET", "type": "income", "category": "Salary"},
        {"date": "2024-03-04", "amount": "75,000", "transaction_name": "QRIS KOPI", "type": "expense", "category": "Food"},
        {"date": "2024-03-09", "amount": 250000, "transaction_name": "TRF KE TABUNGAN", "type": "transfer"}
    ])
    .to_string()
}

/// A database, a blob store, and a draft statement with an uploaded file
fn setup_statement(dir: &tempfile::TempDir) -> (Database, FileStore, i64) {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let store = FileStore::new(dir.path()).expect("Failed to create store");

    let statement = db.create_statement("a@example.com", "March BCA").unwrap();
    let key = FileStore::statement_key(statement.id, "march.pdf", None, Utc::now());
    store.put(&key, b"%PDF-1.4 statement").unwrap();
    db.set_statement_file(statement.id, &key).unwrap();

    (db, store, statement.id)
}

// =============================================================================
// Gemini Backend Tests
// =============================================================================

#[tokio::test]
async fn test_gemini_backend_against_mock_server() {
    let server = MockGeminiServer::start().await;
    server.push_text("```json\n[{\"date\": \"2024-03-01\", \"amount\": 1}]\n```");

    let backend = GeminiBackend::new(&server.url(), "test-key");
    let doc = InlineDocument::from_bytes("application/pdf", b"%PDF");
    let text = backend.generate("Extract", &[doc]).await.unwrap();
    assert!(text.contains("2024-03-01"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model_action, "gemini-2.5-flash:generateContent");
    assert_eq!(requests[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(requests[0].prompt(), Some("Extract"));
    assert_eq!(requests[0].attachment_count(), 1);
}

#[tokio::test]
async fn test_gemini_backend_errors() {
    let server = MockGeminiServer::start().await;
    server.push(MockReply::Status(429, "quota exceeded".into()));
    server.push(MockReply::Empty);

    let backend = GeminiBackend::new(&server.url(), "test-key").with_model("gemini-test");

    match backend.generate("hi", &[]).await {
        Err(Error::Llm(msg)) => {
            assert!(msg.contains("429"), "unexpected message: {}", msg);
            assert!(msg.contains("quota exceeded"));
        }
        other => panic!("expected Llm error, got {:?}", other.map(|_| ())),
    }

    match backend.generate("hi", &[]).await {
        Err(Error::Llm(msg)) => assert_eq!(msg, "No response from Gemini API"),
        other => panic!("expected Llm error, got {:?}", other.map(|_| ())),
    }

    assert_eq!(server.requests()[1].model_action, "gemini-test:generateContent");
}

// =============================================================================
// Statement Processing Tests
// =============================================================================

#[tokio::test]
async fn test_process_statement_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    let mut events = db.subscribe();

    let server = MockGeminiServer::start().await;
    server.push_text(march_extraction());
    let processor = StatementProcessor::new(db.clone(), store, AIClient::gemini(&server.url(), "k"));

    let inserted = processor.process(statement_id).await.unwrap();
    assert_eq!(inserted, 3);

    let statement = db.get_statement(statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
    assert!(statement.parsed_at.is_some());

    assert_eq!(events.try_recv().unwrap().status, StatementStatus::Processing);
    assert_eq!(events.try_recv().unwrap().status, StatementStatus::Parsed);

    let rows = db.list_statement_transactions(statement_id).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].amount, 75000.0);
    assert_eq!(rows[2].transaction_type, TransactionType::InternalTransfer);
    assert!(rows.iter().all(|t| t.fingerprint.is_some()));
    assert_eq!(server.requests()[0].attachment_count(), 1);
}

#[tokio::test]
async fn test_failed_processing_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);

    let mock = MockBackend::new();
    mock.push_error("Gemini API error 503: overloaded")
        .push_response(&march_extraction());
    let processor = StatementProcessor::new(db.clone(), store, AIClient::Mock(mock));

    let mut events = db.subscribe();
    assert!(processor.process(statement_id).await.is_err());

    let statement = db.get_statement(statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Failed);
    events.try_recv().unwrap();
    let failed = events.try_recv().unwrap();
    assert_eq!(failed.status, StatementStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("Gemini API error 503: overloaded"));

    assert_eq!(processor.process(statement_id).await.unwrap(), 3);
    let statement = db.get_statement(statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
}

#[tokio::test]
async fn test_processing_rejects_parsed_statement() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);

    let mock = MockBackend::with_default(&march_extraction());
    let processor = StatementProcessor::new(db.clone(), store, AIClient::Mock(mock.clone()));
    processor.process(statement_id).await.unwrap();

    let err = processor.process(statement_id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    // No model call for the rejected run
    assert_eq!(mock.prompts().len(), 1);
    assert_eq!(db.list_statement_transactions(statement_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_reprocessing_skips_known_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);

    let mock = MockBackend::new();
    mock.push_response(&march_extraction());
    let processor = StatementProcessor::new(db.clone(), store.clone(), AIClient::Mock(mock));
    processor.process(statement_id).await.unwrap();

    // A second statement for the same user overlapping the first
    let second = db.create_statement("a@example.com", "March again").unwrap();
    let key = FileStore::statement_key(second.id, "march.pdf", None, Utc::now());
    store.put(&key, b"%PDF").unwrap();
    db.set_statement_file(second.id, &key).unwrap();

    let overlap = json!([
        {"date": "2024-03-04", "amount": 75000, "transaction_name": "QRIS KOPI"},
        {"date": "2024-03-12", "amount": 18000, "transaction_name": "PARKIR"}
    ])
    .to_string();
    let processor = StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&overlap)),
    );
    assert_eq!(processor.process(second.id).await.unwrap(), 1);
    assert_eq!(db.count_transactions(Some("a@example.com")).unwrap(), 4);
}

#[tokio::test]
async fn test_processing_failures_mark_statement_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);

    // Empty extraction
    let processor = StatementProcessor::new(db.clone(), store.clone(), AIClient::mock());
    let err = processor.process(statement_id).await.unwrap_err();
    assert!(err.to_string().contains("No transactions found in the statement"));
    assert_eq!(
        db.get_statement(statement_id).unwrap().unwrap().status,
        StatementStatus::Failed
    );

    // No file uploaded
    let bare = db.create_statement("a@example.com", "No file").unwrap();
    let err = processor.process(bare.id).await.unwrap_err();
    assert!(err.to_string().contains("No bank statement file found"));
    assert_eq!(
        db.get_statement(bare.id).unwrap().unwrap().status,
        StatementStatus::Failed
    );

    // Garbage reply
    let garbage = StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default("I could not read this file.")),
    );
    assert!(garbage.process(statement_id).await.is_err());
    assert_eq!(db.count_transactions(None).unwrap(), 0);
}

// =============================================================================
// Receipt Ingestion Tests
// =============================================================================

#[tokio::test]
async fn test_receipts_reconcile_against_processed_statement() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    let processor = StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&march_extraction())),
    );
    processor.process(statement_id).await.unwrap();

    let ingestor = ReceiptIngestor::new(db.clone());
    let payload: ReceiptPayload = serde_json::from_value(json!({
        "receipts": [
            {"user_id": "a@example.com", "external_id": "rcpt-1", "date": "2024-03-05", "amount": 75000, "merchant": "Kopi Kenangan"},
            {"user_id": "a@example.com", "external_id": "rcpt-2", "date": "2024-03-20", "amount": 42000, "merchant": "Indomaret"},
            {"user_id": "a@example.com", "external_id": "rcpt-3", "date": "2024-03-20"}
        ]
    }))
    .unwrap();

    let report = ingestor.ingest(payload.clone(), None);
    assert_eq!(report.total, 3);
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].external_id.as_deref(), Some("rcpt-3"));

    // Replaying the payload stores nothing new
    let replay = ingestor.ingest(payload, None);
    assert_eq!(replay.success, 0);
    assert_eq!(replay.duplicates, 2);

    let pairs = db.list_duplicates("a@example.com").unwrap();
    assert_eq!(pairs.len(), 1);
    let matched = pairs[0].matched.as_ref().unwrap();
    assert_eq!(matched.transaction_name, "QRIS KOPI");
    assert_eq!(matched.merchant.as_deref(), Some("Kopi Kenangan"));

    let pending = db
        .search_transactions(
            TransactionFilter::new()
                .user_id(Some("a@example.com"))
                .source(Some(TransactionSource::Receipt))
                .status(Some(TransactionStatus::Pending)),
        )
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].external_id.as_deref(), Some("rcpt-2"));
}

// =============================================================================
// Enrichment Tests
// =============================================================================

#[tokio::test]
async fn test_enrichment_updates_own_transactions_only() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&march_extraction())),
    )
    .process(statement_id)
    .await
    .unwrap();
    let rows = db.list_statement_transactions(statement_id).unwrap();

    let server = MockGeminiServer::start().await;
    server.push_text(
        json!({
            "enriched_transactions": [
                {"id": rows[1].id, "merchant": "Kopi Kenangan", "notes": "2x latte"},
                {"id": 999999, "merchant": "Somebody else"}
            ],
            "summary": "Matched the coffee receipt"
        })
        .to_string(),
    );
    let enricher = Enricher::new(db.clone(), AIClient::gemini(&server.url(), "k"));

    let docs = vec![ReferenceDocument {
        name: "receipt.jpg".into(),
        document: InlineDocument::from_bytes("image/jpeg", b"jpeg"),
    }];
    let outcome = enricher
        .enrich_statement(statement_id, &docs, "coffee with Dina")
        .await
        .unwrap();
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.summary, "Matched the coffee receipt");

    let coffee = db.get_transaction(rows[1].id).unwrap().unwrap();
    assert_eq!(coffee.merchant.as_deref(), Some("Kopi Kenangan"));
    assert_eq!(coffee.notes.as_deref(), Some("2x latte"));

    let request = &server.requests()[0];
    assert_eq!(request.attachment_count(), 1);
    let prompt = request.prompt().unwrap();
    assert!(prompt.contains("coffee with Dina"));
    assert!(prompt.contains("receipt.jpg"));

    let logs = db.list_enrichment_logs(statement_id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, outcome.log_id);
}

#[tokio::test]
async fn test_unparseable_enrichment_still_logged() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&march_extraction())),
    )
    .process(statement_id)
    .await
    .unwrap();

    let enricher = Enricher::new(
        db.clone(),
        AIClient::Mock(MockBackend::with_default("Sorry, nothing to add.")),
    );
    let outcome = enricher
        .enrich_statement(statement_id, &[], "")
        .await
        .unwrap();
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.summary, "Failed to parse enrichment response");
    assert_eq!(db.list_enrichment_logs(statement_id).unwrap().len(), 1);

    // Nothing to enrich on an empty statement
    let empty = db.create_statement("a@example.com", "Empty").unwrap();
    assert!(matches!(
        enricher.enrich_statement(empty.id, &[], "").await,
        Err(Error::InvalidData(_))
    ));
}

#[tokio::test]
async fn test_backfill_merchants_in_batches() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&march_extraction())),
    )
    .process(statement_id)
    .await
    .unwrap();
    let rows = db.list_statement_transactions(statement_id).unwrap();

    let mock = MockBackend::new();
    let merchants = format!(
        r#"{{"{}": "PT Kantor", "{}": null}}"#,
        rows[0].id, rows[1].id
    );
    mock.push_response(&merchants).push_error("rate limited");
    let enricher = Enricher::new(db.clone(), AIClient::Mock(mock.clone()));

    let options = BackfillOptions {
        batch_size: 2,
        pause: std::time::Duration::ZERO,
    };
    let report = enricher
        .backfill_merchants("a@example.com", &options)
        .await
        .unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.batches, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(mock.prompts().len(), 2);

    let salary = db.get_transaction(rows[0].id).unwrap().unwrap();
    assert_eq!(salary.merchant.as_deref(), Some("PT Kantor"));
    assert_eq!(db.transactions_missing_merchant("a@example.com").unwrap().len(), 2);
}

// =============================================================================
// Dashboard Tests
// =============================================================================

#[tokio::test]
async fn test_dashboard_excludes_transfers() {
    let dir = tempfile::tempdir().unwrap();
    let (db, store, statement_id) = setup_statement(&dir);
    StatementProcessor::new(
        db.clone(),
        store,
        AIClient::Mock(MockBackend::with_default(&march_extraction())),
    )
    .process(statement_id)
    .await
    .unwrap();

    let march = dashboard(&db, "a@example.com", MonthPeriod::new(2024, 3).unwrap(), None, None).unwrap();
    assert_eq!(march.summary.count, 3);
    assert_eq!(march.summary.income, 5_000_000.0);
    assert_eq!(march.summary.expense, 75_000.0);
    assert_eq!(march.summary.balance, 4_925_000.0);
    assert_eq!(march.transactions[0].transaction_name, "TRF KE TABUNGAN");

    let april = dashboard(&db, "a@example.com", MonthPeriod::new(2024, 4).unwrap(), None, None).unwrap();
    assert_eq!(april.summary.count, 0);

    let other_user = dashboard(&db, "b@example.com", MonthPeriod::new(2024, 3).unwrap(), None, None).unwrap();
    assert!(other_user.transactions.is_empty());
}
