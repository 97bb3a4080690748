//! Integration tests for the sync scheduler.
//!
//! These run against the in-memory remote and store, so no network or
//! database is needed.

use offsync_client::queue_store::QUEUE_KEY;
use offsync_client::{
    ConflictStrategy, Document, FileStore, KeyValueStore, MemoryRemote, MemoryStore,
    StorageError, SyncOptions, SyncResult, SyncScheduler,
};
use offsync_engine::{CategorySchema, FieldDef, FieldType, Schema};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn scheduler_with(
    store: &MemoryStore,
    remote: &Arc<MemoryRemote>,
    strategy: ConflictStrategy,
) -> SyncScheduler {
    let options = SyncOptions {
        strategy,
        ..SyncOptions::default()
    };
    SyncScheduler::new(Arc::new(store.clone()), remote.clone(), options)
}

fn setup(strategy: ConflictStrategy) -> (SyncScheduler, Arc<MemoryRemote>, MemoryStore) {
    let store = MemoryStore::new();
    let remote = Arc::new(MemoryRemote::new());
    let scheduler = scheduler_with(&store, &remote, strategy);
    (scheduler, remote, store)
}

fn queue(scheduler: &SyncScheduler, category: &str, changes: Vec<Value>) -> String {
    scheduler
        .queue_changes(category, changes, Map::new())
        .unwrap()
}

#[cfg(test)]
mod reconciliation_tests {
    use super::*;

    #[tokio::test]
    async fn test_newer_local_edit_replaces_remote_record() {
        let (scheduler, remote, _) = setup(ConflictStrategy::LastModifiedWins);
        remote.set_snapshot(
            "loot",
            vec![
                doc(json!({"id": 1, "copies": 1})),
                doc(json!({"id": 2, "copies": 5})),
            ],
        );

        queue(&scheduler, "loot", vec![json!({"id": 1, "copies": 3})]);
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.items_synced, 1);
        assert_eq!(
            remote.snapshot("loot"),
            vec![
                doc(json!({"id": 1, "copies": 3})),
                doc(json!({"id": 2, "copies": 5})),
            ]
        );
        assert!(!scheduler.has_pending_changes(None));
        assert_eq!(scheduler.sync_status().pending_items, 0);
    }

    #[tokio::test]
    async fn test_older_local_edit_is_discarded() {
        let (scheduler, remote, _) = setup(ConflictStrategy::LastModifiedWins);
        remote.set_snapshot(
            "loot",
            vec![doc(json!({"id": 1, "copies": 9, "modifiedAt": "2999-01-01T00:00:00Z"}))],
        );

        queue(&scheduler, "loot", vec![json!({"id": 1, "copies": 3})]);
        let result = scheduler.force_sync_all_changes().await;

        // The pass succeeds; the remote record simply stays.
        assert!(result.success);
        assert_eq!(remote.snapshot("loot")[0].get("copies"), Some(&json!(9)));
        assert!(!scheduler.has_pending_changes(Some("loot")));
    }

    #[tokio::test]
    async fn test_edits_apply_in_enqueue_order() {
        let (scheduler, remote, _) = setup(ConflictStrategy::LocalWins);
        remote.set_snapshot("loot", vec![doc(json!({"id": 1, "copies": 1}))]);

        queue(&scheduler, "loot", vec![json!({"id": 1, "copies": 2})]);
        queue(&scheduler, "loot", vec![json!({"id": 1, "copies": 7})]);
        queue(&scheduler, "loot", vec![json!({"id": 3, "copies": 1})]);

        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(result.items_synced, 3);
        assert_eq!(
            remote.snapshot("loot"),
            vec![
                doc(json!({"id": 1, "copies": 7})),
                doc(json!({"id": 3, "copies": 1})),
            ]
        );
        assert!(!scheduler.has_pending_changes(None));
    }

    #[tokio::test]
    async fn test_merge_overlays_local_fields() {
        let (scheduler, remote, _) = setup(ConflictStrategy::Merge);
        remote.set_snapshot(
            "movies",
            vec![doc(json!({"id": "m1", "title": "Alien", "watched": false}))],
        );

        queue(&scheduler, "movies", vec![json!({"id": "m1", "watched": true})]);
        scheduler.force_sync_all_changes().await;

        assert_eq!(
            remote.snapshot("movies"),
            vec![doc(json!({"id": "m1", "title": "Alien", "watched": true}))]
        );
    }

    #[tokio::test]
    async fn test_remote_wins_keeps_existing_and_adds_new() {
        let (scheduler, remote, _) = setup(ConflictStrategy::RemoteWins);
        remote.set_snapshot("loot", vec![doc(json!({"id": 1, "copies": 1}))]);

        queue(
            &scheduler,
            "loot",
            vec![json!({"id": 1, "copies": 3}), json!({"id": 2, "copies": 4})],
        );
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(
            remote.snapshot("loot"),
            vec![
                doc(json!({"id": 1, "copies": 1})),
                doc(json!({"id": 2, "copies": 4})),
            ]
        );
    }
}

#[cfg(test)]
mod pass_tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_with_nothing_pending_makes_no_calls() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());

        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(result.items_synced, 0);
        assert_eq!(result.message, SyncResult::NOTHING_PENDING);
        assert_eq!(remote.total_saves(), 0);
        assert_eq!(remote.health_calls(), 0);

        let status = scheduler.sync_status();
        assert!(status.stats.last_attempt_at.is_some());
        assert_eq!(status.stats.successful_syncs, 0);
        assert_eq!(status.stats.failed_syncs, 0);
        assert!(status.stats.last_success_at.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_remote_keeps_queue() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        remote.set_reachable(false);

        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        let result = scheduler.force_sync_all_changes().await;

        assert!(!result.success);
        assert!(result.can_retry);
        assert_eq!(result.message, SyncResult::UNREACHABLE);
        assert!(scheduler.has_pending_changes(None));
        assert_eq!(remote.fetch_calls("loot"), 0);

        let status = scheduler.sync_status();
        assert_eq!(status.remote_reachable, Some(false));
        assert_eq!(status.stats.consecutive_failures, 1);
        assert_eq!(status.stats.failed_syncs, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_reachability_returns() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        remote.set_reachable(false);
        queue(&scheduler, "loot", vec![json!({"id": 1})]);

        scheduler.force_sync_all_changes().await;
        scheduler.force_sync_all_changes().await;
        assert_eq!(scheduler.sync_status().stats.consecutive_failures, 2);

        remote.set_reachable(true);
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        let status = scheduler.sync_status();
        assert_eq!(status.stats.consecutive_failures, 0);
        assert_eq!(status.stats.successful_syncs, 1);
        assert!(status.stats.last_success_at.is_some());
        assert_eq!(status.remote_reachable, Some(true));
        assert!(!status.has_pending());
    }

    #[tokio::test]
    async fn test_bulk_threshold_uses_one_round_trip() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());

        for i in 0..6 {
            queue(&scheduler, "movies", vec![json!({"id": i, "title": format!("movie {i}")})]);
        }
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(result.items_synced, 6);
        assert_eq!(remote.fetch_calls("movies"), 1);
        assert_eq!(remote.save_calls("movies"), 1);
        assert_eq!(remote.snapshot("movies").len(), 6);
    }

    #[tokio::test]
    async fn test_below_threshold_syncs_item_by_item() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());

        for i in 0..4 {
            queue(&scheduler, "movies", vec![json!({"id": i})]);
        }
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(remote.fetch_calls("movies"), 4);
        assert_eq!(remote.save_calls("movies"), 4);
        assert_eq!(remote.snapshot("movies").len(), 4);
    }

    #[tokio::test]
    async fn test_failed_category_does_not_block_others() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        remote.fail_saves("loot", true);

        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        queue(&scheduler, "movies", vec![json!({"id": "m1"})]);
        let result = scheduler.force_sync_all_changes().await;

        assert!(!result.success);
        assert!(result.is_partial());
        assert!(result.can_retry);
        assert_eq!(result.items_synced, 1);
        assert_eq!(result.items_failed, 1);
        assert!(scheduler.has_pending_changes(Some("loot")));
        assert!(!scheduler.has_pending_changes(Some("movies")));

        let loot = result
            .categories
            .iter()
            .find(|outcome| outcome.category == "loot")
            .unwrap();
        assert!(!loot.success);
        assert!(loot.error.is_some());

        remote.fail_saves("loot", false);
        let retry = scheduler.force_sync_all_changes().await;
        assert!(retry.success);
        assert!(!scheduler.has_pending_changes(None));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_category() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        remote.fail_fetches("loot", true);

        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        queue(&scheduler, "loot", vec![json!({"id": 2})]);
        let result = scheduler.force_sync_all_changes().await;

        assert!(!result.success);
        assert_eq!(result.items_failed, 2);
        assert_eq!(scheduler.pending_items("loot").len(), 2);
        // Stops at the first failing item
        assert_eq!(remote.fetch_calls("loot"), 1);
        assert_eq!(remote.save_calls("loot"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_rejected() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        queue(&scheduler, "loot", vec![json!({"id": 1})]);

        remote.hold();
        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.force_sync_all_changes().await }
        });
        remote.wait_for_fetch().await;

        assert!(scheduler.sync_status().syncing);
        let second = scheduler.force_sync_all_changes().await;
        assert!(!second.success);
        assert_eq!(second.message, SyncResult::IN_PROGRESS);

        remote.release();
        let first = first.await.unwrap();

        assert!(first.success);
        assert_eq!(remote.fetch_calls("loot"), 1);
        assert_eq!(remote.save_calls("loot"), 1);
        assert!(!scheduler.sync_status().syncing);
    }

    #[tokio::test]
    async fn test_items_queued_mid_pass_survive() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        queue(&scheduler, "loot", vec![json!({"id": 1})]);

        remote.hold();
        let pass = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.force_sync_all_changes().await }
        });
        remote.wait_for_fetch().await;

        let late = queue(&scheduler, "loot", vec![json!({"id": 2})]);
        remote.release();
        let result = pass.await.unwrap();

        assert!(result.success);
        assert_eq!(result.items_synced, 1);
        let pending = scheduler.pending_items("loot");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late);

        scheduler.force_sync_all_changes().await;
        assert_eq!(remote.snapshot("loot").len(), 2);
    }

    #[tokio::test]
    async fn test_clear_pending_changes_is_local() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        queue(&scheduler, "movies", vec![json!({"id": 2})]);

        assert_eq!(scheduler.clear_pending_changes(Some("loot")), 1);

        assert!(!scheduler.has_pending_changes(Some("loot")));
        assert!(scheduler.has_pending_changes(Some("movies")));
        assert_eq!(remote.health_calls(), 0);
        assert_eq!(remote.fetch_calls("loot"), 0);

        assert_eq!(scheduler.clear_pending_changes(None), 1);
        assert!(!scheduler.has_pending_changes(None));
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let store = MemoryStore::new();
        let remote = Arc::new(MemoryRemote::new());

        let first = scheduler_with(&store, &remote, ConflictStrategy::default());
        queue(&first, "loot", vec![json!({"id": 1, "copies": 3})]);
        let origin = first.origin_id().clone();
        let before = first.pending_items("loot");
        drop(first);

        let second = scheduler_with(&store, &remote, ConflictStrategy::default());

        assert!(second.has_pending_changes(Some("loot")));
        assert_eq!(second.pending_items("loot"), before);
        assert_eq!(second.origin_id(), &origin);
        assert_eq!(before[0].origin_id, origin);
    }

    #[tokio::test]
    async fn test_queue_survives_restart_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let open = || -> Arc<dyn KeyValueStore> { Arc::new(FileStore::open(dir.path()).unwrap()) };

        let first = SyncScheduler::new(open(), remote.clone(), SyncOptions::default());
        queue(&first, "loot", vec![json!({"id": 1, "copies": 3})]);
        drop(first);

        let second = SyncScheduler::new(open(), remote.clone(), SyncOptions::default());
        assert_eq!(second.pending_items("loot").len(), 1);

        second.force_sync_all_changes().await;
        drop(second);

        let third = SyncScheduler::new(open(), remote, SyncOptions::default());
        assert!(!third.has_pending_changes(None));
    }

    #[tokio::test]
    async fn test_cleared_queue_stays_cleared_after_restart() {
        let store = MemoryStore::new();
        let remote = Arc::new(MemoryRemote::new());

        let first = scheduler_with(&store, &remote, ConflictStrategy::default());
        queue(&first, "loot", vec![json!({"id": 1})]);
        first.clear_pending_changes(None);
        drop(first);

        let second = scheduler_with(&store, &remote, ConflictStrategy::default());
        assert!(!second.has_pending_changes(None));
    }

    /// Records the scheduler's pending count from inside every queue write.
    struct ObservingStore {
        inner: MemoryStore,
        scheduler: Arc<OnceLock<SyncScheduler>>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl KeyValueStore for ObservingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == QUEUE_KEY {
                if let Some(scheduler) = self.scheduler.get() {
                    self.seen
                        .lock()
                        .unwrap()
                        .push(scheduler.sync_status().pending_items);
                }
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_queue_is_readable_while_persisting() {
        let handle = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = ObservingStore {
            inner: MemoryStore::new(),
            scheduler: handle.clone(),
            seen: seen.clone(),
        };
        let remote = Arc::new(MemoryRemote::new());
        let scheduler = SyncScheduler::new(Arc::new(store), remote, SyncOptions::default());
        assert!(handle.set(scheduler.clone()).is_ok());

        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        queue(&scheduler, "loot", vec![json!({"id": 2})]);
        let result = scheduler.force_sync_all_changes().await;

        assert!(result.success);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_invalid_changes_are_not_queued() {
        let (scheduler, _, _) = setup(ConflictStrategy::default());

        assert!(scheduler.queue_changes("loot", vec![], Map::new()).is_err());
        assert!(scheduler
            .queue_changes("", vec![json!({"id": 1})], Map::new())
            .is_err());
        assert!(scheduler
            .queue_changes("loot", vec![json!({"copies": 1})], Map::new())
            .is_err());
        assert!(scheduler
            .queue_changes("loot", vec![json!("not an object")], Map::new())
            .is_err());

        assert!(!scheduler.has_pending_changes(None));
    }

    #[test]
    fn test_schema_and_validators_reject_changes() {
        let store = MemoryStore::new();
        let remote = Arc::new(MemoryRemote::new());
        let schema = Schema::new().with_category(CategorySchema::new(
            "loot",
            vec![FieldDef::required("copies", FieldType::Int)],
        ));
        let scheduler = SyncScheduler::builder(Arc::new(store), remote)
            .schema(schema)
            .validator(|category, records| {
                if category == "movies" && records.len() > 2 {
                    Err("too many movies at once".to_string())
                } else {
                    Ok(())
                }
            })
            .build();

        let err = scheduler
            .queue_changes("loot", vec![json!({"id": 1, "copies": "three"})], Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("copies"));

        let err = scheduler
            .queue_changes(
                "movies",
                vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
                Map::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("too many movies"));

        assert!(!scheduler.has_pending_changes(None));
        assert!(scheduler
            .queue_changes("loot", vec![json!({"id": 1, "copies": 3})], Map::new())
            .is_ok());
    }

    #[test]
    fn test_metadata_is_kept() {
        let (scheduler, _, _) = setup(ConflictStrategy::default());
        let mut metadata = Map::new();
        metadata.insert("source".into(), json!("scanner"));

        scheduler
            .queue_changes("loot", vec![json!({"id": 1})], metadata.clone())
            .unwrap();

        assert_eq!(scheduler.pending_items("loot")[0].metadata, metadata);
    }

    #[test]
    fn test_status_is_published_on_enqueue() {
        let (scheduler, _, _) = setup(ConflictStrategy::default());
        let mut status = scheduler.subscribe();

        queue(&scheduler, "loot", vec![json!({"id": 1})]);

        assert!(status.has_changed().unwrap());
        let current = status.borrow_and_update().clone();
        assert_eq!(current.pending_items, 1);
        assert_eq!(current.pending_categories, vec!["loot".to_string()]);
    }
}

#[cfg(test)]
mod background_tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_enqueue_triggers_background_sync() {
        let (scheduler, remote, _) = setup(ConflictStrategy::default());
        let background = scheduler.spawn_background();
        let mut status = scheduler.subscribe();

        queue(&scheduler, "loot", vec![json!({"id": 1})]);

        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.pending_items == 0 && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(remote.snapshot("loot"), vec![doc(json!({"id": 1}))]);

        scheduler.shutdown();
        timeout(Duration::from_secs(5), background).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_interval_retries_when_remote_returns() {
        let store = MemoryStore::new();
        let remote = Arc::new(MemoryRemote::new());
        remote.set_reachable(false);
        let options = SyncOptions {
            health_interval: Duration::from_secs(10),
            ..SyncOptions::default()
        };
        let scheduler = SyncScheduler::new(Arc::new(store), remote.clone(), options);
        let background = scheduler.spawn_background();
        let mut status = scheduler.subscribe();

        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.stats.failed_syncs == 1 && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(scheduler.has_pending_changes(None));

        remote.set_reachable(true);
        timeout(
            Duration::from_secs(60),
            status.wait_for(|s| s.pending_items == 0 && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(remote.snapshot("loot").len(), 1);

        scheduler.shutdown();
        background.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_probe_runs_only_while_pending() {
        let remote = Arc::new(MemoryRemote::new());
        let options = SyncOptions {
            health_interval: Duration::from_secs(10),
            ..SyncOptions::default()
        };
        let scheduler = SyncScheduler::new(Arc::new(MemoryStore::new()), remote.clone(), options);
        let background = scheduler.spawn_background();
        let mut status = scheduler.subscribe();

        // Empty queue: several intervals pass without a probe
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(remote.health_calls(), 0);

        remote.set_reachable(false);
        queue(&scheduler, "loot", vec![json!({"id": 1})]);
        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.stats.failed_syncs == 1 && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(remote.health_calls(), 1);

        // Next probe comes one full interval after the triggered one
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(remote.health_calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(remote.health_calls(), 2);

        scheduler.clear_pending_changes(None);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(remote.health_calls(), 2);

        scheduler.shutdown();
        background.await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_syncs_restored_changes() {
        let store = MemoryStore::new();
        let remote = Arc::new(MemoryRemote::new());

        let offline = scheduler_with(&store, &remote, ConflictStrategy::default());
        queue(&offline, "loot", vec![json!({"id": 1})]);
        drop(offline);

        let scheduler = scheduler_with(&store, &remote, ConflictStrategy::default());
        let background = scheduler.spawn_background();
        let mut status = scheduler.subscribe();
        assert!(scheduler.has_pending_changes(None));

        scheduler.notify_resumed();
        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.pending_items == 0 && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(remote.save_calls("loot"), 1);

        scheduler.shutdown();
        background.await.unwrap();
    }

    #[tokio::test]
    async fn test_background_task_starts_once() {
        let (scheduler, _, _) = setup(ConflictStrategy::default());

        let first = scheduler.spawn_background();
        let second = scheduler.spawn_background();

        timeout(Duration::from_secs(5), second).await.unwrap().unwrap();
        assert!(!first.is_finished());

        scheduler.shutdown();
        timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
    }
}
