//! Integration tests for the lifecycle engine.
//!
//! Tests: InventoryEngine → InMemoryInventoryStore (+ sweeper, notifier)
//!
//! Verifies:
//! - Batch transitions report missing barcodes and write one summary entry
//! - Failed validations and id exhaustion leave the store untouched
//! - Staleness warnings are written once per item, regardless of delivery
//! - Retention, pagination and log deletion

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use brapool_core::{FixedClock, SystemId};
    use brapool_inventory::{Category, ItemEdit, ItemStatus, NewItem, Severity, kinds};

    use crate::config::EngineConfig;
    use crate::engine::{EngineError, InventoryEngine};
    use crate::notify::{Notifier, StaticRecipients, TransportError};
    use crate::store::{InMemoryInventoryStore, InventoryStore};
    use crate::worker::MaintenanceWorker;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<String, TransportError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(TransportError::Send("relay refused".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((to.to_string(), subject.to_string()));
            Ok(format!("msg-{}", sent.len()))
        }
    }

    struct Harness {
        engine: InventoryEngine<InMemoryInventoryStore>,
        store: InMemoryInventoryStore,
        clock: Arc<FixedClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
    }

    fn setup_with(config: EngineConfig, notifier: RecordingNotifier) -> Harness {
        let store = InMemoryInventoryStore::new();
        let clock = Arc::new(FixedClock::new(test_time()));
        let notifier = Arc::new(notifier);
        let engine = InventoryEngine::new(store.clone(), config)
            .with_clock(clock.clone())
            .with_notifier(notifier.clone())
            .with_recipients(Arc::new(StaticRecipients::new(vec![
                "lager@example.org".to_string(),
                "leitung@example.org".to_string(),
            ])));
        Harness {
            engine,
            store,
            clock,
            notifier,
        }
    }

    fn setup() -> Harness {
        setup_with(EngineConfig::default(), RecordingNotifier::default())
    }

    fn new_item(barcode: &str, category: Category, size: &str) -> NewItem {
        NewItem {
            barcode: barcode.to_string(),
            category,
            size: size.to_string(),
            known_to_partner: false,
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn seed(h: &Harness, barcodes: &[&str]) {
        let items = barcodes
            .iter()
            .map(|b| new_item(b, Category::Hose, "L"))
            .collect();
        h.engine.bulk_create(items).await.unwrap();
    }

    /// Let detached delivery tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn count_kind(store: &InMemoryInventoryStore, kind: &str) -> usize {
        store.logs().await.iter().filter(|e| e.kind == kind).count()
    }

    #[tokio::test]
    async fn store_in_reports_missing_and_writes_one_summary() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;

        let outcome = h.engine.store_in(&codes(&["A1", "A2", "A3"])).await.unwrap();

        assert_eq!(outcome.updated_count, 2);
        assert_eq!(outcome.missing, vec!["A3".to_string()]);

        let logs = h.store.logs().await;
        let summaries: Vec<_> = logs.iter().filter(|e| e.kind == kinds::STORE_IN_SUMMARY).collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].severity, Severity::Green);
        assert!(summaries[0].message.starts_with("2 items stored"));
        assert!(summaries[0].message.contains("2x HOSE L"));
    }

    #[tokio::test]
    async fn store_in_clears_issue_fields() {
        let h = setup();
        seed(&h, &["A1"]).await;
        h.engine.issue_out(&codes(&["A1"]), "Mia", "Team Nord").await.unwrap();

        h.clock.advance(TimeDelta::hours(2));
        h.engine.store_in(&codes(&["A1"])).await.unwrap();

        let item = &h.store.items().await[0];
        assert_eq!(item.status, ItemStatus::Stored);
        assert_eq!(item.stored_at, Some(test_time() + TimeDelta::hours(2)));
        assert_eq!(item.issued_by, None);
        assert_eq!(item.issued_to, None);
        assert_eq!(item.issued_at, None);
    }

    #[tokio::test]
    async fn issue_out_stamps_items_and_logs_red_summary() {
        let h = setup();
        h.engine
            .bulk_create(vec![
                new_item("P1", Category::Polo, "M"),
                new_item("H1", Category::Hose, "L"),
                new_item("H2", Category::Hose, "L"),
            ])
            .await
            .unwrap();

        let outcome = h
            .engine
            .issue_out(&codes(&["P1", "H1", "H2"]), " Mia ", "Team Nord")
            .await
            .unwrap();
        assert_eq!(outcome.updated_count, 3);

        for item in h.store.items().await {
            assert_eq!(item.status, ItemStatus::Circulating);
            assert_eq!(item.issued_by.as_deref(), Some("Mia"));
            assert_eq!(item.issued_to.as_deref(), Some("Team Nord"));
            assert_eq!(item.issued_at, Some(test_time()));
            assert_eq!(item.stored_at, None);
        }

        let logs = h.store.logs().await;
        let summary = logs
            .iter()
            .find(|e| e.kind == kinds::ISSUE_OUT_SUMMARY)
            .unwrap();
        assert_eq!(summary.severity, Severity::Red);
        assert_eq!(
            summary.message,
            "Mia issued 2x HOSE L, 1x POLO M to Team Nord on 03.03.2025 08:00."
        );
    }

    #[tokio::test]
    async fn issue_out_with_blank_recipient_changes_nothing() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;
        let before = h.store.items().await;
        let logs_before = h.store.logs().await.len();

        let err = h
            .engine
            .issue_out(&codes(&["A1", "A2"]), "Mia", "  ")
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.store.items().await, before);
        assert_eq!(h.store.logs().await.len(), logs_before);
    }

    #[tokio::test]
    async fn empty_barcode_batch_is_rejected() {
        let h = setup();
        assert!(matches!(
            h.engine.store_in(&[]).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            h.engine.store_in(&codes(&["", "  "])).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn batch_without_matches_writes_no_entry() {
        let h = setup();
        let outcome = h.engine.store_in(&codes(&["X1"])).await.unwrap();
        assert_eq!(outcome.updated_count, 0);
        assert_eq!(outcome.missing, vec!["X1".to_string()]);
        assert!(h.store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn zero_padded_scans_match_stored_barcode() {
        let h = setup();
        seed(&h, &["00042"]).await;

        let outcome = h.engine.store_in(&codes(&["42", "042"])).await.unwrap();
        assert_eq!(outcome.updated_count, 1);
        assert!(outcome.missing.is_empty());

        let outcome = h.engine.store_in(&codes(&["0042X"])).await.unwrap();
        assert_eq!(outcome.updated_count, 0);
        assert_eq!(outcome.missing, vec!["0042X".to_string()]);
    }

    #[tokio::test]
    async fn bulk_create_allocates_sequential_ids_and_skips_existing() {
        let h = setup();
        seed(&h, &["A1"]).await;

        let outcome = h
            .engine
            .bulk_create(vec![
                new_item("A1", Category::Hose, "L"),
                new_item("B1", Category::Polo, "S"),
                new_item("B2", Category::Polo, "S"),
                new_item("B1", Category::Polo, "XL"),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.skipped_existing, 1);
        let created: Vec<(i32, &str)> = outcome
            .created
            .iter()
            .map(|c| (c.system_id.get(), c.barcode.as_str()))
            .collect();
        assert_eq!(created, vec![(1001, "B1"), (1002, "B2")]);

        let items = h.store.items().await;
        let b1 = items.iter().find(|i| i.barcode == "B1").unwrap();
        assert_eq!(b1.size, "XL");
        assert_eq!(b1.status, ItemStatus::Stored);
        assert_eq!(b1.stored_at, Some(test_time()));
        assert_eq!(count_kind(&h.store, kinds::CREATION_SUMMARY).await, 2);
    }

    #[tokio::test]
    async fn bulk_create_with_blank_size_is_rejected() {
        let h = setup();
        let err = h
            .engine
            .bulk_create(vec![new_item("A1", Category::Hose, " ")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(h.store.items().await.is_empty());
    }

    #[tokio::test]
    async fn overflow_at_ceiling_persists_nothing() {
        let h = setup();
        {
            let mut tx = h.store.begin().await.unwrap();
            let item = brapool_inventory::InventoryItem::create(
                SystemId::new(9998).unwrap(),
                new_item("LAST", Category::Hose, "M"),
                test_time(),
            );
            tx.insert_item(&item).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = h
            .engine
            .bulk_create(vec![
                new_item("N1", Category::Hose, "M"),
                new_item("N2", Category::Hose, "M"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Overflow(_)));
        assert_eq!(h.store.items().await.len(), 1);
        assert!(h.store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn system_ids_are_not_reused_after_delete() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;
        h.engine.delete_item(SystemId::new(1001).unwrap()).await.unwrap();

        let outcome = h
            .engine
            .bulk_create(vec![new_item("A3", Category::Hose, "L")])
            .await
            .unwrap();
        assert_eq!(outcome.created[0].system_id.get(), 1002);
    }

    #[tokio::test]
    async fn delete_writes_manual_entry_with_reference() {
        let h = setup();
        seed(&h, &["A1"]).await;
        let id = SystemId::new(1000).unwrap();

        h.engine.delete_item(id).await.unwrap();

        assert!(h.store.items().await.is_empty());
        let logs = h.store.logs().await;
        let entry = logs.iter().find(|e| e.kind == kinds::MANUAL).unwrap();
        assert_eq!(entry.severity, Severity::Info);
        assert_eq!(entry.related_item_id, Some(id));
        assert!(entry.message.contains("1000"));
    }

    #[tokio::test]
    async fn edit_and_delete_of_unknown_item_are_not_found() {
        let h = setup();
        let id = SystemId::new(4711).unwrap();

        assert!(matches!(
            h.engine.edit_item(id, ItemEdit::default()).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            h.engine.delete_item(id).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(h.store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn edit_overwrites_fields_and_refreshes_issued_at() {
        let h = setup();
        seed(&h, &["A1"]).await;
        h.clock.advance(TimeDelta::days(1));

        let item = h
            .engine
            .edit_item(
                SystemId::new(1000).unwrap(),
                ItemEdit {
                    size: Some("XXL".to_string()),
                    status: Some(ItemStatus::DefectiveRepair),
                    remark: Some("zip broken".to_string()),
                    ..ItemEdit::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(item.size, "XXL");
        assert_eq!(item.status, ItemStatus::DefectiveRepair);
        assert_eq!(item.remark.as_deref(), Some("zip broken"));
        assert_eq!(item.issued_at, Some(test_time() + TimeDelta::days(1)));
        assert_eq!(count_kind(&h.store, kinds::MANUAL).await, 1);
    }

    #[tokio::test]
    async fn edit_to_taken_barcode_is_a_conflict() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;

        let err = h
            .engine
            .edit_item(
                SystemId::new(1001).unwrap(),
                ItemEdit {
                    barcode: Some("A1".to_string()),
                    ..ItemEdit::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Conflict(_)));
        let items = h.store.items().await;
        assert_eq!(items[1].barcode, "A2");
        assert_eq!(count_kind(&h.store, kinds::MANUAL).await, 0);
    }

    #[tokio::test]
    async fn staleness_warning_is_written_once_per_item() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;
        h.engine.issue_out(&codes(&["A1"]), "Mia", "Team Nord").await.unwrap();
        h.clock.advance(TimeDelta::days(43));

        h.engine.list_logs(1).await.unwrap();
        h.engine.list_logs(1).await.unwrap();

        let logs = h.store.logs().await;
        let warnings: Vec<_> = logs.iter().filter(|e| e.is_staleness_warning()).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Yellow);
        assert_eq!(warnings[0].related_item_id, Some(SystemId::new(1000).unwrap()));
        assert!(warnings[0].message.contains("6 weeks"));

        // One message per recipient, sent once.
        settle().await;
        assert_eq!(h.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn items_within_threshold_are_not_stale() {
        let h = setup();
        seed(&h, &["A1"]).await;
        h.engine.issue_out(&codes(&["A1"]), "Mia", "Team Nord").await.unwrap();
        h.clock.advance(TimeDelta::days(41));

        h.engine.list_logs(1).await.unwrap();

        assert_eq!(count_kind(&h.store, kinds::STALENESS_WARNING).await, 0);
        settle().await;
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_still_writes_warnings() {
        let h = setup_with(EngineConfig::default(), RecordingNotifier::failing());
        seed(&h, &["A1", "A2"]).await;
        h.engine
            .issue_out(&codes(&["A1", "A2"]), "Mia", "Team Nord")
            .await
            .unwrap();
        h.clock.advance(TimeDelta::weeks(7));

        let listing = h.engine.list_logs(1).await.unwrap();

        assert_eq!(count_kind(&h.store, kinds::STALENESS_WARNING).await, 2);
        assert!(listing.logs.iter().any(|e| e.is_staleness_warning()));
    }

    #[tokio::test(start_paused = true)]
    async fn list_logs_does_not_wait_for_slow_deliveries() {
        let h = setup_with(
            EngineConfig::default(),
            RecordingNotifier::slow(Duration::from_secs(3600)),
        );
        let barcodes = ["S1", "S2", "S3", "S4", "S5"];
        seed(&h, &barcodes).await;
        h.engine
            .issue_out(&codes(&barcodes), "Mia", "Team Nord")
            .await
            .unwrap();
        h.clock.advance(TimeDelta::weeks(7));

        let started = tokio::time::Instant::now();
        let listing = h.engine.list_logs(1).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(count_kind(&h.store, kinds::STALENESS_WARNING).await, 5);
        assert_eq!(
            listing.logs.iter().filter(|e| e.is_staleness_warning()).count(),
            5
        );
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sweeps_warn_once() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;
        h.engine
            .issue_out(&codes(&["A1", "A2"]), "Mia", "Team Nord")
            .await
            .unwrap();
        h.clock.advance(TimeDelta::weeks(7));

        let (listing, maintenance) = tokio::join!(h.engine.list_logs(1), h.engine.run_maintenance());
        listing.unwrap();
        maintenance.unwrap();

        assert_eq!(count_kind(&h.store, kinds::STALENESS_WARNING).await, 2);
        settle().await;
        assert_eq!(h.notifier.sent().len(), 4);
    }

    #[tokio::test]
    async fn concurrent_bulk_creates_get_disjoint_ids() {
        let h = setup();
        let batch = |prefix: &str| -> Vec<NewItem> {
            (0..3)
                .map(|n| new_item(&format!("{prefix}{n}"), Category::Polo, "M"))
                .collect()
        };

        let (left, right) = tokio::join!(h.engine.bulk_create(batch("L")), h.engine.bulk_create(batch("R")));
        let left = left.unwrap();
        let right = right.unwrap();

        let mut ids: Vec<i32> = left
            .created
            .iter()
            .chain(right.created.iter())
            .map(|c| c.system_id.get())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1000..=1005).collect::<Vec<_>>());
        assert_eq!(left.created.len(), 3);
        assert_eq!(right.created.len(), 3);
        assert_eq!(h.store.items().await.len(), 6);
        assert_eq!(count_kind(&h.store, kinds::CREATION_SUMMARY).await, 2);
    }

    #[tokio::test]
    async fn concurrent_store_in_and_edit_keep_both_changes() {
        let h = setup();
        seed(&h, &["A1"]).await;
        h.engine.issue_out(&codes(&["A1"]), "Mia", "Team Nord").await.unwrap();
        let id = SystemId::new(1000).unwrap();
        let edit = ItemEdit {
            remark: Some("button missing".to_string()),
            ..ItemEdit::default()
        };

        let store_codes = codes(&["A1"]);
        let (stored, edited) = tokio::join!(h.engine.store_in(&store_codes), h.engine.edit_item(id, edit));
        assert_eq!(stored.unwrap().updated_count, 1);
        edited.unwrap();

        let item = &h.store.items().await[0];
        assert_eq!(item.status, ItemStatus::Stored);
        assert_eq!(item.remark.as_deref(), Some("button missing"));
    }

    #[tokio::test]
    async fn expired_entries_are_purged_on_read() {
        let h = setup();
        seed(&h, &["A1"]).await;
        assert_eq!(h.store.logs().await.len(), 1);
        h.clock.advance(TimeDelta::weeks(10) + TimeDelta::minutes(1));

        let listing = h.engine.list_logs(1).await.unwrap();

        assert_eq!(listing.total, 0);
        assert_eq!(listing.pages, 1);
        assert!(h.store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn logs_are_paginated_newest_first() {
        let config = EngineConfig {
            log_page_size: 2,
            ..EngineConfig::default()
        };
        let h = setup_with(config, RecordingNotifier::default());
        for n in 0..5 {
            seed(&h, &[format!("A{n}").as_str()]).await;
            h.clock.advance(TimeDelta::minutes(1));
        }

        let first = h.engine.list_logs(0).await.unwrap();
        assert_eq!(first.page, 1);
        assert_eq!(first.pages, 3);
        assert_eq!(first.total, 5);
        assert_eq!(first.logs.len(), 2);
        assert!(first.logs[0].created_at > first.logs[1].created_at);
        assert!(first.logs[0].message.contains("HOSE L"));

        let last = h.engine.list_logs(3).await.unwrap();
        assert_eq!(last.logs.len(), 1);
        assert_eq!(last.logs[0].created_at, test_time());
    }

    #[tokio::test]
    async fn delete_logs_removes_given_entries() {
        let h = setup();
        seed(&h, &["A1"]).await;
        seed(&h, &["A2"]).await;
        let logs = h.store.logs().await;

        let deleted = h
            .engine
            .delete_logs(&[logs[0].id.to_string()])
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        let remaining = h.store.logs().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, logs[1].id);
    }

    #[tokio::test]
    async fn delete_logs_rejects_bad_ids() {
        let h = setup();
        assert!(matches!(
            h.engine.delete_logs(&[]).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            h.engine.delete_logs(&["not-a-uuid".to_string()]).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn list_items_is_most_recently_updated_first() {
        let h = setup();
        seed(&h, &["A1", "A2"]).await;
        h.clock.advance(TimeDelta::minutes(5));
        h.engine.store_in(&codes(&["A1"])).await.unwrap();

        let items = h.engine.list_items().await.unwrap();
        assert_eq!(items[0].barcode, "A1");
        assert_eq!(items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_worker_sweeps_on_schedule() {
        let config = EngineConfig {
            sweep_interval: Some(Duration::from_secs(3600)),
            ..EngineConfig::default()
        };
        let h = setup_with(config, RecordingNotifier::default());
        seed(&h, &["A1"]).await;
        h.engine.issue_out(&codes(&["A1"]), "Mia", "Team Nord").await.unwrap();
        h.clock.advance(TimeDelta::weeks(7));

        let Harness { engine, store, .. } = h;
        let engine = Arc::new(engine);
        let handle = engine
            .config()
            .sweep_interval
            .map(|every| MaintenanceWorker::spawn(engine.clone(), every))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown().await;

        assert_eq!(count_kind(&store, kinds::STALENESS_WARNING).await, 1);
    }
}
