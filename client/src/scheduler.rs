//! Sync scheduler: owns the pending-change queue and reconciles it with the
//! remote service.
//!
//! # Sync pass
//!
//! 1. Take the single-flight guard; if another pass holds it, return
//!    "Sync already in progress"
//! 2. Copy the queue; an empty queue ends the pass without network calls
//! 3. Probe reachability; an unreachable remote ends the pass with a
//!    retryable failure and leaves the queue untouched
//! 4. For every category with queued items:
//!    - at or above the bulk threshold: fetch once, resolve all items, save once
//!    - below it: for each item, fetch, resolve that item, save
//!    - on success, remove exactly the items that were copied in step 2
//!    - on failure, keep the category's items for a later pass
//! 5. Aggregate the outcomes, update the counters and publish the status
//!
//! Queue and counters sit behind short-held mutexes that are never held
//! across an `.await`, so enqueueing during a pass never waits on the network.

use crate::config::SyncOptions;
use crate::error::{ClientError, Result};
use crate::monitor::{ConnectionMonitor, ConnectionStatus};
use crate::queue_store::QueueStore;
use crate::remote::{RemoteError, RemoteService};
use crate::storage::KeyValueStore;
use chrono::Utc;
use offsync_engine::{
    CategoryOutcome, Document, Error as EngineError, ItemId, OriginId, QueueItem, Resolver,
    Schema, SyncQueue, SyncResult, SyncStats, SyncStatus,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Caller-supplied check run on every change set before it is queued.
pub type ChangeValidator =
    Arc<dyn Fn(&str, &[Document]) -> std::result::Result<(), String> + Send + Sync>;

/// Reasons to attempt a background sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A change was queued
    Enqueued,
    /// The host process became active again
    Resumed,
    /// Stop the background task
    Shutdown,
}

/// Builder for [`SyncScheduler`].
pub struct SchedulerBuilder {
    storage: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteService>,
    options: SyncOptions,
    schema: Schema,
    validators: Vec<ChangeValidator>,
}

impl SchedulerBuilder {
    /// Replace all tuning options.
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Conflict strategy for every category.
    pub fn strategy(mut self, strategy: offsync_engine::ConflictStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Queued-item count at which a category is synced in one batch.
    pub fn bulk_sync_threshold(mut self, threshold: usize) -> Self {
        self.options.bulk_sync_threshold = threshold;
        self
    }

    /// Per-category field rules.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Add a validator. Returning `Err(reason)` rejects the change set.
    pub fn validator(
        mut self,
        validator: impl Fn(&str, &[Document]) -> std::result::Result<(), String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Restore the queue from storage and build the scheduler.
    pub fn build(mut self) -> SyncScheduler {
        self.options.bulk_sync_threshold = self.options.bulk_sync_threshold.max(1);

        let store = QueueStore::new(self.storage);
        let origin_id = store.device_id();
        let queue = store.load();
        let monitor = ConnectionMonitor::new(self.remote.clone(), self.options.health_timeout);
        let (triggers, trigger_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SyncStatus::default());

        tracing::info!(
            origin_id = %origin_id,
            strategy = %self.options.strategy,
            pending = queue.pending_count(None),
            "Sync scheduler ready"
        );

        let inner = Arc::new(Inner {
            options: self.options,
            schema: self.schema,
            validators: self.validators,
            origin_id,
            store,
            remote: self.remote,
            monitor,
            queue: Mutex::new(queue),
            revision: AtomicU64::new(0),
            persisted_revision: Mutex::new(0),
            stats: Mutex::new(SyncStats::default()),
            remote_reachable: Mutex::new(None),
            syncing: AtomicBool::new(false),
            status_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        });
        inner.publish_status();

        SyncScheduler { inner, triggers }
    }
}

/// Handle to the offline write queue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
    triggers: mpsc::UnboundedSender<SyncTrigger>,
}

impl SyncScheduler {
    /// Start building a scheduler over `storage` and `remote`.
    pub fn builder(
        storage: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteService>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            storage,
            remote,
            options: SyncOptions::default(),
            schema: Schema::new(),
            validators: Vec::new(),
        }
    }

    /// Build a scheduler with the given options and no extra validation.
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteService>,
        options: SyncOptions,
    ) -> Self {
        Self::builder(storage, remote).options(options).build()
    }

    /// Validate and queue a change set.
    ///
    /// Returns the new queue item's id. Nothing is queued if validation
    /// fails. A background sync attempt is requested but not awaited.
    pub fn queue_changes(
        &self,
        category: &str,
        changes: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> Result<ItemId> {
        let payload = self.inner.schema.validate_changes(category, changes)?;
        for validator in &self.inner.validators {
            validator(category, &payload)
                .map_err(|reason| ClientError::Validation(EngineError::Rejected(reason)))?;
        }

        let records = payload.len();
        let item = QueueItem::new(
            uuid::Uuid::new_v4().to_string(),
            category,
            payload,
            Utc::now(),
            self.inner.origin_id.clone(),
        )
        .with_metadata(metadata);
        let item_id = item.id.clone();

        let pending = self.inner.mutate_queue(|queue| {
            queue.enqueue(item);
            queue.pending_count(Some(category))
        });
        tracing::info!(category, records, pending, "Queued changes");

        self.trigger(SyncTrigger::Enqueued);
        Ok(item_id)
    }

    /// Run a sync pass now and wait for its result.
    pub async fn force_sync_all_changes(&self) -> SyncResult {
        self.inner.perform_sync(None).await
    }

    /// Whether `category` (or any category) has queued items.
    pub fn has_pending_changes(&self, category: Option<&str>) -> bool {
        self.inner.queue().has_pending(category)
    }

    /// Queued items of one category, oldest first.
    pub fn pending_items(&self, category: &str) -> Vec<QueueItem> {
        self.inner.queue().items(category).to_vec()
    }

    /// Counters plus the categories with pending work.
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Drop queued items without syncing them. Returns how many were removed.
    pub fn clear_pending_changes(&self, category: Option<&str>) -> usize {
        let removed = self.inner.mutate_queue(|queue| queue.clear(category));
        tracing::info!(category = category.unwrap_or("*"), removed, "Cleared pending changes");
        removed
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Identifier stamped on every queued item from this device.
    pub fn origin_id(&self) -> &OriginId {
        &self.inner.origin_id
    }

    /// Options in effect.
    pub fn options(&self) -> &SyncOptions {
        &self.inner.options
    }

    /// Signal that the host process became active again.
    pub fn notify_resumed(&self) {
        self.trigger(SyncTrigger::Resumed);
    }

    /// Stop the background task, if running.
    pub fn shutdown(&self) {
        self.trigger(SyncTrigger::Shutdown);
    }

    /// Start the background task that reacts to triggers and polls the
    /// remote while changes are pending. Only the first call starts a task.
    pub fn spawn_background(&self) -> JoinHandle<()> {
        let receiver = self
            .inner
            .trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let inner = self.inner.clone();

        tokio::spawn(async move {
            match receiver {
                Some(receiver) => crate::background::run(inner, receiver).await,
                None => tracing::warn!("Background sync already started"),
            }
        })
    }

    fn trigger(&self, trigger: SyncTrigger) {
        // The receiver is gone only once the background task has stopped.
        if self.triggers.send(trigger).is_err() {
            tracing::debug!(?trigger, "Background sync not running");
        }
    }
}

/// Shared scheduler state.
pub(crate) struct Inner {
    pub(crate) options: SyncOptions,
    schema: Schema,
    validators: Vec<ChangeValidator>,
    origin_id: OriginId,
    store: QueueStore,
    remote: Arc<dyn RemoteService>,
    pub(crate) monitor: ConnectionMonitor,
    queue: Mutex<SyncQueue>,
    revision: AtomicU64,
    persisted_revision: Mutex<u64>,
    stats: Mutex<SyncStats>,
    remote_reachable: Mutex<Option<bool>>,
    syncing: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<SyncTrigger>>>,
}

/// Holds the single-flight flag for the duration of a pass.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, SyncQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, SyncStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.queue().has_pending(None)
    }

    /// Apply `f` to the queue and persist a copy of the result. Storage IO
    /// happens outside the queue lock; persistence failures are logged and
    /// the in-memory queue stays authoritative.
    fn mutate_queue<T>(&self, f: impl FnOnce(&mut SyncQueue) -> T) -> T {
        let (out, copy, revision) = {
            let mut queue = self.queue();
            let out = f(&mut queue);
            let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
            (out, queue.clone(), revision)
        };
        self.persist(&copy, revision);
        self.publish_status();
        out
    }

    fn persist(&self, queue: &SyncQueue, revision: u64) {
        let mut persisted = self
            .persisted_revision
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A newer copy already reached storage.
        if revision <= *persisted {
            return;
        }
        match self.store.persist(queue, &self.origin_id) {
            Ok(()) => *persisted = revision,
            Err(e) => tracing::error!(error = %e, "Failed to persist sync queue"),
        }
    }

    pub(crate) fn record_connection(&self, connection: ConnectionStatus) {
        *self
            .remote_reachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(connection.remote_reachable);
        self.publish_status();
    }

    fn status(&self) -> SyncStatus {
        let (pending_items, pending_categories) = {
            let queue = self.queue();
            (
                queue.pending_count(None),
                queue.categories().cloned().collect(),
            )
        };
        SyncStatus {
            stats: self.stats().clone(),
            pending_items,
            pending_categories,
            syncing: self.syncing.load(Ordering::Acquire),
            remote_reachable: *self
                .remote_reachable
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Run one sync pass. `connection` skips the reachability probe when the
    /// caller has just performed one.
    pub(crate) async fn perform_sync(&self, connection: Option<ConnectionStatus>) -> SyncResult {
        let Some(guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("Sync already in progress");
            return SyncResult::in_progress();
        };

        let started = Utc::now();
        self.stats().record_attempt(started);
        self.publish_status();

        let pass = self.run_pass(connection).await;
        drop(guard);

        let result = match pass {
            Some(result) => {
                self.stats().record_result(&result, Utc::now());
                result
            }
            // Only the attempt is recorded for a pass with nothing to do.
            None => SyncResult::nothing_pending(),
        };
        if result.success {
            tracing::info!(synced = result.items_synced, "{}", result.message);
        } else {
            tracing::warn!(
                synced = result.items_synced,
                failed = result.items_failed,
                "{}",
                result.message
            );
        }
        self.publish_status();
        result
    }

    /// `None` when the queue was empty and no remote call was made.
    async fn run_pass(&self, connection: Option<ConnectionStatus>) -> Option<SyncResult> {
        let work: Vec<(String, Vec<QueueItem>)> = self
            .queue()
            .iter()
            .map(|(category, items)| (category.clone(), items.to_vec()))
            .collect();
        if work.is_empty() {
            return None;
        }

        let connection = match connection {
            Some(connection) => connection,
            None => self.monitor.check_connection().await,
        };
        self.record_connection(connection);
        if !connection.remote_reachable {
            let pending = work.iter().map(|(_, items)| items.len()).sum();
            return Some(SyncResult::unreachable(pending));
        }

        let mut outcomes = Vec::with_capacity(work.len());
        for (category, items) in work {
            let outcome = match self.sync_category(&category, &items).await {
                Ok(()) => {
                    let ids: Vec<ItemId> = items.iter().map(|item| item.id.clone()).collect();
                    self.mutate_queue(|queue| queue.acknowledge(&category, &ids));
                    tracing::info!(category = %category, items = items.len(), "Category synced");
                    CategoryOutcome::synced(category, items.len())
                }
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "Category sync failed");
                    CategoryOutcome::failed(category, items.len(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        Some(SyncResult::from_outcomes(outcomes))
    }

    /// Reconcile one category. The remote write is all-or-nothing per save.
    async fn sync_category(
        &self,
        category: &str,
        items: &[QueueItem],
    ) -> std::result::Result<(), RemoteError> {
        let resolver = Resolver::new(self.options.strategy);

        if items.len() >= self.options.bulk_sync_threshold {
            tracing::debug!(category, items = items.len(), "Bulk sync");
            let remote = self.remote.fetch_latest(category).await?;
            self.write_resolved(category, &resolver, items, remote).await?;
            return Ok(());
        }

        let mut ordered: Vec<&QueueItem> = items.iter().collect();
        ordered.sort_by_key(|item| item.timestamp);
        for item in ordered {
            tracing::debug!(category, item = %item.id, "Incremental sync");
            let remote = self.remote.fetch_latest(category).await?;
            self.write_resolved(category, &resolver, std::slice::from_ref(item), remote)
                .await?;
        }
        Ok(())
    }

    async fn write_resolved(
        &self,
        category: &str,
        resolver: &Resolver,
        items: &[QueueItem],
        remote: Vec<Document>,
    ) -> std::result::Result<(), RemoteError> {
        let resolution = resolver.resolve(items, remote);
        if !resolution.discarded.is_empty() {
            tracing::warn!(
                category,
                strategy = %resolver.strategy(),
                discarded = ?resolution.discarded,
                "Local edits discarded in favour of existing records"
            );
        }
        self.remote.save(category, &resolution.records).await
    }
}
