//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rusqlite::params;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn statement_row(statement_id: i64, user: &str, day: u32, amount: f64, name: &str) -> NewTransaction {
        let date = date(2024, 3, day);
        NewTransaction {
            statement_id: Some(statement_id),
            user_id: user.to_string(),
            date,
            amount,
            currency: "IDR".into(),
            merchant: None,
            transaction_name: name.to_string(),
            reference_id: None,
            category: "Uncategorized".into(),
            transaction_type: TransactionType::Expense,
            notes: None,
            source: TransactionSource::Statement,
            external_id: None,
            match_id: None,
            status: TransactionStatus::Pending,
            fingerprint: Some(crate::fingerprint::fingerprint(date, amount, name)),
        }
    }

    fn receipt_row(user: &str, external_id: &str, day: u32, amount: f64, merchant: Option<&str>) -> NewTransaction {
        NewTransaction {
            statement_id: None,
            user_id: user.to_string(),
            date: date(2024, 3, day),
            amount,
            currency: "IDR".into(),
            merchant: merchant.map(str::to_string),
            transaction_name: merchant.unwrap_or("Receipt").to_string(),
            reference_id: None,
            category: "Uncategorized".into(),
            transaction_type: TransactionType::Expense,
            notes: None,
            source: TransactionSource::Receipt,
            external_id: Some(external_id.to_string()),
            match_id: None,
            status: TransactionStatus::Pending,
            fingerprint: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.count_statements().unwrap(), 0);
        assert_eq!(db.count_transactions(None).unwrap(), 0);
        assert!(db.list_statements("a@example.com").unwrap().is_empty());
    }

    #[test]
    fn test_statement_crud() {
        let db = Database::in_memory().unwrap();

        let s = db.create_statement("a@example.com", "  March BCA  ").unwrap();
        assert_eq!(s.name, "March BCA");
        assert_eq!(s.status, StatementStatus::Draft);
        assert!(s.bank_statement_url.is_none());
        assert!(s.parsed_at.is_none());

        let other = db.create_statement("b@example.com", "Other").unwrap();

        let mine = db.list_statements("a@example.com").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, s.id);

        assert!(db.get_user_statement(s.id, "a@example.com").unwrap().is_some());
        assert!(db.get_user_statement(other.id, "a@example.com").unwrap().is_none());

        db.set_statement_file(s.id, "1/1700000000000.pdf").unwrap();
        let s = db.get_statement(s.id).unwrap().unwrap();
        assert_eq!(s.bank_statement_url.as_deref(), Some("1/1700000000000.pdf"));

        assert!(matches!(
            db.create_statement("a@example.com", "   "),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            db.set_statement_file(9999, "x.pdf"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_statements_newest_first() {
        let db = Database::in_memory().unwrap();
        let first = db.create_statement("u", "January").unwrap();
        let second = db.create_statement("u", "February").unwrap();

        let list = db.list_statements("u").unwrap();
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
    }

    #[test]
    fn test_statement_lifecycle() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        let s = db
            .transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap();
        assert_eq!(s.status, StatementStatus::Processing);

        let s = db
            .transition_statement(s.id, StatementStatus::Parsed, None)
            .unwrap();
        assert_eq!(s.status, StatementStatus::Parsed);
        assert!(s.parsed_at.is_some());

        // Parsed is terminal
        let err = db
            .transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: StatementStatus::Parsed,
                to: StatementStatus::Processing,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_statement_can_retry() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        db.transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap();
        let failed = db
            .transition_statement(s.id, StatementStatus::Failed, Some("No response"))
            .unwrap();
        assert_eq!(failed.status, StatementStatus::Failed);
        assert!(failed.parsed_at.is_none());

        let retried = db
            .transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap();
        assert_eq!(retried.status, StatementStatus::Processing);
    }

    #[test]
    fn test_invalid_transitions_leave_status_unchanged() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        assert!(db
            .transition_statement(s.id, StatementStatus::Parsed, None)
            .is_err());
        assert!(db
            .transition_statement(s.id, StatementStatus::Failed, None)
            .is_err());
        assert!(db
            .transition_statement(s.id, StatementStatus::Draft, None)
            .is_err());

        // Processing twice: the second caller loses
        db.transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap();
        assert!(db
            .transition_statement(s.id, StatementStatus::Processing, None)
            .is_err());

        let s = db.get_statement(s.id).unwrap().unwrap();
        assert_eq!(s.status, StatementStatus::Processing);

        assert!(matches!(
            db.transition_statement(9999, StatementStatus::Processing, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_recover_stuck_statements() {
        let db = Database::in_memory().unwrap();
        let stuck = db.create_statement("u", "Stuck").unwrap();
        let draft = db.create_statement("u", "Draft").unwrap();
        db.transition_statement(stuck.id, StatementStatus::Processing, None)
            .unwrap();

        assert_eq!(db.recover_stuck_statements().unwrap(), 1);
        assert_eq!(
            db.get_statement(stuck.id).unwrap().unwrap().status,
            StatementStatus::Failed
        );
        assert_eq!(
            db.get_statement(draft.id).unwrap().unwrap().status,
            StatementStatus::Draft
        );
        assert_eq!(db.recover_stuck_statements().unwrap(), 0);
    }

    #[test]
    fn test_status_events_published() {
        let db = Database::in_memory().unwrap();
        let mut rx = db.subscribe();
        let s = db.create_statement("u", "March").unwrap();

        db.transition_statement(s.id, StatementStatus::Processing, None)
            .unwrap();
        db.transition_statement(s.id, StatementStatus::Failed, Some("boom"))
            .unwrap();
        // Rejected transitions publish nothing
        let _ = db.transition_statement(s.id, StatementStatus::Parsed, None);

        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent {
                statement_id: s.id,
                status: StatementStatus::Processing,
                error: None,
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent {
                statement_id: s.id,
                status: StatementStatus::Failed,
                error: Some("boom".into()),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_delete_statement_cascades() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        let keep = db.create_statement("u", "April").unwrap();
        db.set_statement_file(s.id, "1/1.pdf").unwrap();

        db.save_transactions(&[
            statement_row(s.id, "u", 1, 100.0, "A"),
            statement_row(s.id, "u", 2, 200.0, "B"),
            statement_row(keep.id, "u", 3, 300.0, "C"),
        ])
        .unwrap();
        db.add_enrichment_log(s.id, "Added merchants").unwrap();

        let file = db.delete_statement(s.id).unwrap();
        assert_eq!(file.as_deref(), Some("1/1.pdf"));

        assert!(db.get_statement(s.id).unwrap().is_none());
        assert!(db.list_statement_transactions(s.id).unwrap().is_empty());
        assert!(db.list_enrichment_logs(s.id).unwrap().is_empty());
        assert_eq!(db.list_statement_transactions(keep.id).unwrap().len(), 1);

        assert!(matches!(db.delete_statement(s.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_save_transactions_skips_known_fingerprints() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        let first = vec![
            statement_row(s.id, "u", 1, 100.0, "A"),
            statement_row(s.id, "u", 2, 200.0, "B"),
            statement_row(s.id, "u", 3, 300.0, "C"),
        ];
        let result = db.save_transactions(&first).unwrap();
        assert_eq!(result, SaveResult { inserted: 3, skipped: 0 });

        // Re-extraction returns two known rows and two new ones
        let second = vec![
            statement_row(s.id, "u", 1, 100.0, "A"),
            statement_row(s.id, "u", 3, 300.0, "C"),
            statement_row(s.id, "u", 4, 400.0, "D"),
            statement_row(s.id, "u", 5, 500.0, "E"),
        ];
        let result = db.save_transactions(&second).unwrap();
        assert_eq!(result, SaveResult { inserted: 2, skipped: 2 });
        assert_eq!(db.list_statement_transactions(s.id).unwrap().len(), 5);
    }

    #[test]
    fn test_save_transactions_collapses_batch_duplicates() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        let row = statement_row(s.id, "u", 1, 100.0, "A");
        let result = db.save_transactions(&[row.clone(), row]).unwrap();
        assert_eq!(result, SaveResult { inserted: 1, skipped: 1 });
    }

    #[test]
    fn test_fingerprints_scoped_per_user() {
        let db = Database::in_memory().unwrap();
        let a = db.create_statement("a", "March").unwrap();
        let b = db.create_statement("b", "March").unwrap();

        db.save_transactions(&[statement_row(a.id, "a", 1, 100.0, "A")])
            .unwrap();
        let result = db
            .save_transactions(&[statement_row(b.id, "b", 1, 100.0, "A")])
            .unwrap();
        assert_eq!(result.inserted, 1);
    }

    #[test]
    fn test_statement_transactions_ordered_by_date() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[
            statement_row(s.id, "u", 9, 1.0, "late"),
            statement_row(s.id, "u", 2, 2.0, "early"),
        ])
        .unwrap();

        let rows = db.list_statement_transactions(s.id).unwrap();
        assert_eq!(rows[0].transaction_name, "early");
        assert_eq!(rows[1].transaction_name, "late");
    }

    #[test]
    fn test_update_and_delete_transaction() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "u", 1, 100.0, "A")])
            .unwrap();
        let id = db.list_statement_transactions(s.id).unwrap()[0].id;

        let update = TransactionUpdate {
            merchant: Some("Starbucks".into()),
            category: Some("Food".into()),
            transaction_type: Some(TransactionType::Income),
            ..Default::default()
        };
        assert!(db.update_transaction(id, &update).unwrap());

        let t = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(t.merchant.as_deref(), Some("Starbucks"));
        assert_eq!(t.category, "Food");
        assert_eq!(t.transaction_type, TransactionType::Income);
        assert_eq!(t.transaction_name, "A");

        assert!(!db.update_transaction(9999, &update).unwrap());

        let updated = db
            .update_transactions(&[
                (
                    id,
                    TransactionUpdate {
                        notes: Some("lunch".into()),
                        ..Default::default()
                    },
                ),
                (9999, update.clone()),
            ])
            .unwrap();
        assert_eq!(updated, 1);

        assert!(db.delete_transaction(id).unwrap());
        assert!(!db.delete_transaction(id).unwrap());
        assert!(db.get_transaction(id).unwrap().is_none());
    }

    #[test]
    fn test_receipt_idempotent_on_external_id() {
        let db = Database::in_memory().unwrap();

        let receipt = receipt_row("u", "r-1", 5, 50.0, Some("Cafe"));
        let first = db.record_receipt(&receipt).unwrap();
        assert!(matches!(first, ReceiptOutcome::Pending(_)));

        let again = db.record_receipt(&receipt).unwrap();
        assert_eq!(again, ReceiptOutcome::AlreadyIngested);
        assert_eq!(db.count_transactions(Some("u")).unwrap(), 1);

        // Same external id for another user is a different receipt
        let other = receipt_row("v", "r-1", 5, 50.0, Some("Cafe"));
        assert!(matches!(
            db.record_receipt(&other).unwrap(),
            ReceiptOutcome::Pending(_)
        ));
    }

    #[test]
    fn test_receipt_reconciles_within_window() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "u", 10, 75000.0, "QRIS CAFE")])
            .unwrap();
        let statement_tx = db.list_statement_transactions(s.id).unwrap()[0].id;

        // Three days after is still inside the window
        let outcome = db
            .record_receipt(&receipt_row("u", "r-1", 13, 75000.0, Some("Kopi Kenangan")))
            .unwrap();
        let ReceiptOutcome::Reconciled {
            id,
            matched,
            merchant_backfilled,
        } = outcome
        else {
            panic!("expected reconciliation, got {:?}", outcome);
        };
        assert_eq!(matched, statement_tx);
        assert!(merchant_backfilled);

        let receipt = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(receipt.status, TransactionStatus::Duplicate);
        assert_eq!(receipt.match_id, Some(statement_tx));

        let original = db.get_transaction(statement_tx).unwrap().unwrap();
        assert_eq!(original.merchant.as_deref(), Some("Kopi Kenangan"));
    }

    #[test]
    fn test_receipt_outside_window_stays_pending() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "u", 10, 75000.0, "QRIS CAFE")])
            .unwrap();

        // Four days away
        let outcome = db
            .record_receipt(&receipt_row("u", "r-1", 6, 75000.0, None))
            .unwrap();
        let ReceiptOutcome::Pending(id) = outcome else {
            panic!("expected pending, got {:?}", outcome);
        };
        let receipt = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(receipt.status, TransactionStatus::Pending);
        assert!(receipt.match_id.is_none());

        // Amount mismatch
        let outcome = db
            .record_receipt(&receipt_row("u", "r-2", 10, 75001.0, None))
            .unwrap();
        assert!(matches!(outcome, ReceiptOutcome::Pending(_)));
    }

    #[test]
    fn test_receipt_keeps_existing_merchant() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        let mut row = statement_row(s.id, "u", 10, 20.0, "TOKO");
        row.merchant = Some("Toko Buku".into());
        db.save_transactions(&[row]).unwrap();

        let outcome = db
            .record_receipt(&receipt_row("u", "r-1", 10, 20.0, Some("Gramedia")))
            .unwrap();
        assert!(matches!(
            outcome,
            ReceiptOutcome::Reconciled {
                merchant_backfilled: false,
                ..
            }
        ));
        let original = &db.list_statement_transactions(s.id).unwrap()[0];
        assert_eq!(original.merchant.as_deref(), Some("Toko Buku"));
    }

    #[test]
    fn test_matched_statement_row_not_reused() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[
            statement_row(s.id, "u", 10, 20.0, "first"),
            statement_row(s.id, "u", 11, 20.0, "second"),
        ])
        .unwrap();
        let rows = db.list_statement_transactions(s.id).unwrap();

        let a = db
            .record_receipt(&receipt_row("u", "r-1", 10, 20.0, None))
            .unwrap();
        let b = db
            .record_receipt(&receipt_row("u", "r-2", 10, 20.0, None))
            .unwrap();
        let c = db
            .record_receipt(&receipt_row("u", "r-3", 10, 20.0, None))
            .unwrap();

        assert!(matches!(a, ReceiptOutcome::Reconciled { matched, .. } if matched == rows[0].id));
        assert!(matches!(b, ReceiptOutcome::Reconciled { matched, .. } if matched == rows[1].id));
        assert!(matches!(c, ReceiptOutcome::Pending(_)));
    }

    #[test]
    fn test_receipts_never_match_other_users_or_receipts() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("v", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "v", 10, 20.0, "other user")])
            .unwrap();
        let first = db
            .record_receipt(&receipt_row("u", "r-1", 10, 20.0, None))
            .unwrap();
        assert!(matches!(first, ReceiptOutcome::Pending(_)));

        // A stored receipt is not a statement row to match against
        let second = db
            .record_receipt(&receipt_row("u", "r-2", 10, 20.0, None))
            .unwrap();
        assert!(matches!(second, ReceiptOutcome::Pending(_)));

        // External ids are scoped per user
        let replay = db
            .record_receipt(&receipt_row("u", "r-1", 10, 20.0, None))
            .unwrap();
        assert_eq!(replay, ReceiptOutcome::AlreadyIngested);
        let other = db
            .record_receipt(&receipt_row("v", "r-1", 10, 20.0, None))
            .unwrap();
        assert!(matches!(other, ReceiptOutcome::Reconciled { .. }));
    }

    #[test]
    fn test_duplicates_and_keep() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "u", 10, 20.0, "CAFE")])
            .unwrap();
        let statement_tx = db.list_statement_transactions(s.id).unwrap()[0].id;

        let ReceiptOutcome::Reconciled { id, .. } = db
            .record_receipt(&receipt_row("u", "r-1", 11, 20.0, None))
            .unwrap()
        else {
            panic!("expected reconciliation");
        };

        let pairs = db.list_duplicates("u").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].duplicate.id, id);
        assert_eq!(pairs[0].matched.as_ref().map(|t| t.id), Some(statement_tx));
        assert!(db.list_duplicates("v").unwrap().is_empty());

        assert!(db.keep_transaction(id).unwrap());
        let kept = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Verified);
        assert!(kept.match_id.is_none());
        assert!(db.list_duplicates("u").unwrap().is_empty());
        assert!(!db.keep_transaction(9999).unwrap());
    }

    #[test]
    fn test_duplicate_with_deleted_match() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        db.save_transactions(&[statement_row(s.id, "u", 10, 20.0, "CAFE")])
            .unwrap();
        db.record_receipt(&receipt_row("u", "r-1", 10, 20.0, None))
            .unwrap();

        db.delete_statement(s.id).unwrap();

        let pairs = db.list_duplicates("u").unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].matched.is_none());
    }

    #[test]
    fn test_search_transactions_filters() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        let mut income = statement_row(s.id, "u", 20, 5_000_000.0, "SALARY");
        income.transaction_type = TransactionType::Income;
        let mut food = statement_row(s.id, "u", 5, 30000.0, "GOFOOD");
        food.category = "Food".into();
        db.save_transactions(&[income, food, statement_row(s.id, "u", 7, 10.0, "misc")])
            .unwrap();
        db.record_receipt(&receipt_row("v", "r-1", 5, 30000.0, Some("GOFOOD")))
            .unwrap();

        let all = db
            .search_transactions(TransactionFilter::new().user_id(Some("u")))
            .unwrap();
        assert_eq!(all.len(), 3);
        // Default order: newest first
        assert_eq!(all[0].transaction_name, "SALARY");

        let food = db
            .search_transactions(TransactionFilter::new().user_id(Some("u")).search(Some("food")))
            .unwrap();
        assert_eq!(food.len(), 1);

        let income = db
            .search_transactions(
                TransactionFilter::new()
                    .user_id(Some("u"))
                    .transaction_type(Some(TransactionType::Income)),
            )
            .unwrap();
        assert_eq!(income.len(), 1);

        let by_amount = db
            .search_transactions(
                TransactionFilter::new()
                    .user_id(Some("u"))
                    .sort_field(Some("amount"))
                    .sort_order(Some("asc")),
            )
            .unwrap();
        assert_eq!(by_amount[0].transaction_name, "misc");

        let early = db
            .search_transactions(
                TransactionFilter::new()
                    .user_id(Some("u"))
                    .date_range(Some((date(2024, 3, 1), date(2024, 3, 10)))),
            )
            .unwrap();
        assert_eq!(early.len(), 2);
    }

    #[test]
    fn test_transactions_missing_merchant() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();
        let mut named = statement_row(s.id, "u", 1, 1.0, "A");
        named.merchant = Some("Alfamart".into());
        db.save_transactions(&[named, statement_row(s.id, "u", 2, 2.0, "B")])
            .unwrap();

        let missing = db.transactions_missing_merchant("u").unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].transaction_name, "B");
    }

    #[test]
    fn test_enrichment_logs_newest_first() {
        let db = Database::in_memory().unwrap();
        let s = db.create_statement("u", "March").unwrap();

        let first = db.add_enrichment_log(s.id, "first pass").unwrap();
        let second = db.add_enrichment_log(s.id, "second pass").unwrap();

        let logs = db.list_enrichment_logs(s.id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, second);
        assert_eq!(logs[1].id, first);
        assert_eq!(logs[1].enrichment_summary, "first pass");
    }

    #[test]
    fn test_drafts_last_write_wins() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_draft("u", "remarks").unwrap().is_none());

        db.put_draft("u", "remarks", "first").unwrap();
        db.put_draft("u", "remarks", "second").unwrap();
        db.put_draft("v", "remarks", "other user").unwrap();

        let draft = db.get_draft("u", "remarks").unwrap().unwrap();
        assert_eq!(draft.key, "remarks");
        assert_eq!(draft.value, "second");
    }

    #[test]
    fn test_legacy_transfer_type_migrated() {
        let db = Database::in_memory().unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "INSERT INTO transactions (user_id, date, amount, transaction_name, type) \
                 VALUES ('u', '2024-03-01', 10, 'old', 'transfer')",
                params![],
            )
            .unwrap();
        }

        db.run_migrations().unwrap();

        let conn = db.conn().unwrap();
        let stored: String = conn
            .query_row("SELECT type FROM transactions WHERE transaction_name = 'old'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, "internal_transfer");
    }

    #[test]
    fn test_schema_constraints() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let bad_status = conn.execute(
            "INSERT INTO statements (user_id, name, status) VALUES ('u', 'x', 'archived')",
            [],
        );
        assert!(bad_status.is_err());

        let bad_fk = conn.execute(
            "INSERT INTO transactions (statement_id, user_id, date, amount, transaction_name) \
             VALUES (424242, 'u', '2024-03-01', 1, 'orphan')",
            [],
        );
        assert!(bad_fk.is_err());
    }
}
