//! Sync manager: replays the change queue against the remote store.
//!
//! A drain takes a fixed snapshot of the queue, replays it in ascending id
//! order and removes each entry as soon as the remote confirms it. A failing
//! entry stays queued together with every later entry for the same record,
//! so a record's changes always reach the remote in the order they were
//! made. Entries for other records still get their turn. Drains never
//! return an error; the outcome is summarised in a [`DrainReport`].

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CleanupPolicy, SyncConfig};
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::db::{LocalStore, Table};
use crate::error::{RemoteError, RemoteResult};
use crate::models::{QueueEntry, SyncAction};
use crate::remote::{Collection, RemoteStore};

/// Document id of the settings singleton.
pub const SETTINGS_DOC_ID: &str = "shop";

/// What the manager is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining,
}

/// Why a drain did not walk the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyDraining,
    SnapshotFailed,
}

/// Outcome of one call to [`SyncManager::sync_pending_changes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub skipped: Option<SkipReason>,
    /// Entries in the snapshot that were replayed.
    pub attempted: usize,
    /// Entries confirmed by the remote and removed.
    pub applied: usize,
    /// Entries that failed and were left in place.
    pub failed: usize,
    /// Entries left in place without a remote call, because an earlier
    /// entry for the same record failed or the remote refused the
    /// credentials.
    pub deferred: usize,
    /// Entries that can never apply (unknown action, malformed payload) and
    /// were removed.
    pub discarded: usize,
    /// Entries removed by the end-of-drain clear under `ClearAll`.
    pub cleared: usize,
}

impl DrainReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// Why a single entry did not apply.
#[derive(Debug)]
enum ReplayError {
    /// Retrying cannot help; the entry is dropped.
    Unreplayable(String),
    /// Remote failure, timeout included; the entry stays queued.
    Remote(RemoteError),
}

impl From<RemoteError> for ReplayError {
    fn from(err: RemoteError) -> Self {
        ReplayError::Remote(err)
    }
}

/// A confirmed write to a keyed table.
#[derive(Debug)]
struct Applied {
    table: Table,
    /// Id the entry was replayed under.
    id: String,
    /// Id the remote reports for the document.
    remote_id: String,
}

/// The remote document an entry writes to. `None` for entries that cannot
/// be replayed at all.
fn entity_key(entry: &QueueEntry) -> Option<(Collection, String)> {
    let collection = match SyncAction::from_tag(&entry.action)? {
        SyncAction::SaveSettings => return Some((Collection::Settings, SETTINGS_DOC_ID.into())),
        SyncAction::SaveClient => Collection::Clients,
        _ => Collection::Orders,
    };
    Some((collection, entry.entity_id()?.to_string()))
}

/// Clears the draining flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The only component that replays queued writes against the remote.
pub struct SyncManager {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    draining: AtomicBool,
    last_sync: Mutex<Option<String>>,
    last_report: Mutex<Option<DrainReport>>,
}

impl SyncManager {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            monitor,
            config,
            draining: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            last_report: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn phase(&self) -> SyncPhase {
        if self.draining.load(Ordering::SeqCst) {
            SyncPhase::Draining
        } else {
            SyncPhase::Idle
        }
    }

    /// RFC 3339 time of the last drain that walked the queue.
    pub fn last_sync(&self) -> Option<String> {
        self.last_sync.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn last_report(&self) -> Option<DrainReport> {
        self.last_report.lock().ok().and_then(|guard| guard.clone())
    }

    /// Drain the change queue once.
    ///
    /// No-op while offline. A call made while another drain is in flight
    /// returns immediately without touching the queue.
    pub async fn sync_pending_changes(&self) -> DrainReport {
        if !self.monitor.is_online() {
            debug!("Offline; leaving sync queue pending");
            return DrainReport::skipped(SkipReason::Offline);
        }
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already in progress; skipping");
            return DrainReport::skipped(SkipReason::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.draining);

        let report = self.drain().await;

        if report.skipped.is_none() {
            if let Ok(mut guard) = self.last_sync.lock() {
                *guard = Some(Utc::now().to_rfc3339());
            }
        }
        if let Ok(mut guard) = self.last_report.lock() {
            *guard = Some(report.clone());
        }
        report
    }

    async fn drain(&self) -> DrainReport {
        let snapshot = match self.store.queue_snapshot() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Sync queue snapshot failed: {e}");
                return DrainReport::skipped(SkipReason::SnapshotFailed);
            }
        };
        if snapshot.is_empty() {
            return DrainReport::default();
        }
        info!(entries = snapshot.len(), "Draining sync queue");

        let mut report = DrainReport::default();
        // Placeholder ids replaced during this drain. Later snapshot entries
        // still carry the placeholder.
        let mut adopted: HashMap<(Table, String), String> = HashMap::new();
        // Records with a failed entry in this drain.
        let mut blocked: HashSet<(Collection, String)> = HashSet::new();
        let mut credentials_refused = false;

        for entry in &snapshot {
            let key = entity_key(entry);
            if credentials_refused || key.as_ref().is_some_and(|k| blocked.contains(k)) {
                report.deferred += 1;
                debug!(
                    queue_id = entry.id,
                    action = %entry.action,
                    "Deferring sync entry behind an earlier failure"
                );
                continue;
            }
            report.attempted += 1;
            match self.replay(entry, &adopted).await {
                Ok(applied) => {
                    report.applied += 1;
                    if let Err(e) = self.store.remove_queue_entry(entry.id) {
                        warn!(queue_id = entry.id, "Applied entry could not be dequeued: {e}");
                    }
                    if let Some(applied) = applied {
                        self.settle(applied, &mut adopted);
                    }
                }
                Err(ReplayError::Unreplayable(reason)) => {
                    report.discarded += 1;
                    warn!(
                        queue_id = entry.id,
                        action = %entry.action,
                        reason = %reason,
                        "Discarding unreplayable sync entry"
                    );
                    if let Err(e) = self.store.remove_queue_entry(entry.id) {
                        warn!(queue_id = entry.id, "Discarded entry could not be dequeued: {e}");
                    }
                }
                Err(ReplayError::Remote(e)) => {
                    report.failed += 1;
                    if let Some(key) = key {
                        blocked.insert(key);
                    }
                    if e.is_retryable() {
                        warn!(
                            queue_id = entry.id,
                            action = %entry.action,
                            error = %e,
                            "Sync failed for entry; will retry on next drain"
                        );
                    } else {
                        error!(
                            queue_id = entry.id,
                            action = %entry.action,
                            error = %e,
                            "Remote refused sync entry; it stays queued until the cause is fixed"
                        );
                    }
                    if matches!(e, RemoteError::Unauthorized(_)) {
                        credentials_refused = true;
                    }
                }
            }
        }

        if self.config.cleanup == CleanupPolicy::ClearAll {
            match self.store.clear_queue() {
                Ok(cleared) => {
                    report.cleared = cleared;
                    if report.failed > 0 {
                        warn!(
                            failed = report.failed,
                            deferred = report.deferred,
                            cleared, "Queue cleared with failed entries still unapplied"
                        );
                    }
                }
                Err(e) => warn!("End-of-drain queue clear failed: {e}"),
            }
        }

        info!(
            applied = report.applied,
            failed = report.failed,
            deferred = report.deferred,
            discarded = report.discarded,
            "Sync complete"
        );
        report
    }

    /// Run a remote call under the configured timeout.
    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.config.remote_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    async fn replay(
        &self,
        entry: &QueueEntry,
        adopted: &HashMap<(Table, String), String>,
    ) -> Result<Option<Applied>, ReplayError> {
        let action = SyncAction::from_tag(&entry.action)
            .ok_or_else(|| ReplayError::Unreplayable(format!("unknown action {:?}", entry.action)))?;
        let Value::Object(fields) = &entry.data else {
            return Err(ReplayError::Unreplayable("payload is not an object".into()));
        };

        if action == SyncAction::SaveSettings {
            self.replay_settings(&entry.data).await?;
            return Ok(None);
        }

        let (table, collection) = match action {
            SyncAction::SaveClient => (Table::Clients, Collection::Clients),
            _ => (Table::Orders, Collection::Orders),
        };
        let local_id = entry
            .entity_id()
            .ok_or_else(|| ReplayError::Unreplayable("payload has no id".into()))?;
        let id = adopted
            .get(&(table, local_id.to_string()))
            .cloned()
            .unwrap_or_else(|| local_id.to_string());
        let mut record = fields.clone();
        record.insert("id".into(), Value::String(id.clone()));

        let remote_id = match action {
            SyncAction::CreateOrder => {
                self.bounded(self.remote.create(collection, &Value::Object(record)))
                    .await?
            }
            SyncAction::UpdateOrder | SyncAction::SaveClient => {
                self.upsert(collection, &id, record).await?
            }
            SyncAction::UpdateOrderStatus => {
                let status = fields
                    .get("status")
                    .cloned()
                    .ok_or_else(|| ReplayError::Unreplayable("status missing".into()))?;
                let partial = Value::Object(Map::from_iter([("status".to_string(), status)]));
                match self.bounded(self.remote.update(collection, &id, &partial)).await {
                    Ok(()) => id.clone(),
                    Err(RemoteError::NotFound { .. }) => {
                        return Err(ReplayError::Unreplayable(format!(
                            "order {id} no longer exists remotely"
                        )));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            SyncAction::DeleteOrder => {
                match self.bounded(self.remote.delete(collection, &id)).await {
                    Ok(()) | Err(RemoteError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                return Ok(None);
            }
            SyncAction::SaveSettings => return Ok(None),
        };

        Ok(Some(Applied {
            table,
            id,
            remote_id,
        }))
    }

    /// Update, or create when the remote has never seen the document.
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        mut record: Map<String, Value>,
    ) -> RemoteResult<String> {
        let full = Value::Object(record.clone());
        record.remove("id");
        match self
            .bounded(self.remote.update(collection, id, &Value::Object(record)))
            .await
        {
            Ok(()) => Ok(id.to_string()),
            Err(RemoteError::NotFound { .. }) => {
                debug!(%collection, id, "Document missing remotely; creating");
                self.bounded(self.remote.create(collection, &full)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn replay_settings(&self, data: &Value) -> Result<(), ReplayError> {
        let collection = Collection::Settings;
        match self
            .bounded(self.remote.update(collection, SETTINGS_DOC_ID, data))
            .await
        {
            Ok(()) => Ok(()),
            Err(RemoteError::NotFound { .. }) => {
                let mut doc = data.clone();
                if let Value::Object(ref mut map) = doc {
                    map.insert("id".into(), Value::String(SETTINGS_DOC_ID.into()));
                }
                self.bounded(self.remote.create(collection, &doc)).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Local bookkeeping once the remote confirmed a write and its entry is
    /// dequeued. Failures here do not undo the remote write, so they are
    /// only logged.
    fn settle(&self, applied: Applied, adopted: &mut HashMap<(Table, String), String>) {
        let Applied {
            table,
            id,
            remote_id,
        } = applied;
        let (id, remote_id) = (id.as_str(), remote_id.as_str());
        if remote_id != id {
            match self.store.adopt_remote_id(table, id, remote_id) {
                Ok(()) => {
                    adopted.insert((table, id.to_string()), remote_id.to_string());
                }
                Err(e) => warn!(local_id = id, remote_id, "Adopting remote id failed: {e}"),
            }
        }
        match self.store.mark_synced(table, remote_id) {
            Ok(true) => debug!(table = table.name(), id = remote_id, "Record synced"),
            Ok(false) => {}
            Err(e) => warn!(id = remote_id, "Marking record synced failed: {e}"),
        }
    }

    /// Drain on every `Online` event, and every `retry_interval` while
    /// online, until `cancel` fires.
    pub fn watch_connectivity(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut events = manager.monitor.subscribe();
        tokio::spawn(async move {
            let retry = manager.config.retry_interval;
            loop {
                let retry_tick = async {
                    match retry {
                        Some(interval) => tokio::time::sleep(interval).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(ConnectivityEvent::Online) => {
                            info!("Application online - syncing queued changes");
                            manager.sync_pending_changes().await;
                        }
                        Ok(ConnectivityEvent::Offline) => {
                            debug!("Application offline - changes will sync when online");
                        }
                        Err(RecvError::Lagged(missed)) => {
                            debug!(missed, "Connectivity events lagged");
                            manager.sync_pending_changes().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = retry_tick => {
                        manager.sync_pending_changes().await;
                    }
                }
            }
            debug!("Connectivity watcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Order;
    use crate::remote::{MemoryRemoteStore, RemoteCall};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        store: Arc<LocalStore>,
        remote: Arc<MemoryRemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
        manager: Arc<SyncManager>,
    }

    fn harness_with(online: bool, config: SyncConfig) -> Harness {
        let store = LocalStore::open_in_memory().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let manager = Arc::new(SyncManager::new(
            store.clone(),
            remote.clone(),
            monitor.clone(),
            config,
        ));
        Harness {
            store,
            remote,
            monitor,
            manager,
        }
    }

    fn harness(online: bool) -> Harness {
        harness_with(online, SyncConfig::default())
    }

    fn created_ids(remote: &MemoryRemoteStore) -> Vec<String> {
        remote
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Create { record, .. } => record["id"].as_str().map(str::to_string),
                _ => None,
            })
            .collect()
    }

    fn enqueue_create(store: &LocalStore, id: &str) -> i64 {
        store
            .enqueue("createOrder", &json!({ "id": id, "total": 100 }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order() {
        let h = harness(true);
        for id in ["a", "b", "c"] {
            enqueue_create(&h.store, id);
        }

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(created_ids(&h.remote), ["a", "b", "c"]);
        assert_eq!(report.applied, 3);
        assert_eq!(h.store.queue_len().unwrap(), 0);
        assert!(h.manager.last_sync().is_some());
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_block_later_entries() {
        let h = harness(true);
        for id in ["a", "b", "c"] {
            enqueue_create(&h.store, id);
        }
        h.remote.fail_for("b");

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(created_ids(&h.remote), ["a", "b", "c"]);
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        let remaining = h.store.queue_snapshot().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id(), Some("b"));

        // next drain retries only b
        h.remote.heal("b");
        let report = h.manager.sync_pending_changes().await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_holds_back_later_update_of_same_order() {
        let h = harness(true);
        h.store
            .enqueue("createOrder", &json!({ "id": "o1", "status": "pending", "total": 100 }))
            .unwrap();
        h.store
            .enqueue("updateOrder", &json!({ "id": "o1", "status": "paid", "total": 200 }))
            .unwrap();
        enqueue_create(&h.store, "other");
        h.remote.fail_next("o1");

        let first = h.manager.sync_pending_changes().await;

        assert_eq!(first.failed, 1);
        assert_eq!(first.deferred, 1);
        assert_eq!(first.applied, 1);
        assert!(h.remote.document(Collection::Orders, "o1").is_none());
        assert!(h.remote.document(Collection::Orders, "other").is_some());
        assert_eq!(h.store.queue_len().unwrap(), 2);

        let second = h.manager.sync_pending_changes().await;

        assert_eq!(second.applied, 2);
        let doc = h.remote.document(Collection::Orders, "o1").unwrap();
        assert_eq!(doc["status"], "paid");
        assert_eq!(doc["total"], 200);
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_change_waits_for_failed_create() {
        let h = harness(true);
        h.store
            .enqueue("createOrder", &json!({ "id": "o1", "status": "pending", "total": 100 }))
            .unwrap();
        h.store
            .enqueue("updateOrderStatus", &json!({ "id": "o1", "status": "delivered" }))
            .unwrap();
        h.remote.fail_next("o1");

        let first = h.manager.sync_pending_changes().await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.deferred, 1);
        assert_eq!(first.discarded, 0);

        let second = h.manager.sync_pending_changes().await;
        assert_eq!(second.applied, 2);
        assert_eq!(
            h.remote.document(Collection::Orders, "o1").unwrap()["status"],
            "delivered"
        );
    }

    #[tokio::test]
    async fn test_create_replayed_after_lost_reply_leaves_one_copy() {
        let h = harness(true);
        enqueue_create(&h.store, "o1");
        h.remote.lose_reply_next("o1");

        let first = h.manager.sync_pending_changes().await;
        assert_eq!(first.failed, 1);
        assert_eq!(h.store.queue_len().unwrap(), 1);

        let second = h.manager.sync_pending_changes().await;
        assert_eq!(second.applied, 1);
        assert_eq!(created_ids(&h.remote), ["o1", "o1"]);
        assert_eq!(h.remote.len(Collection::Orders), 1);
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refused_credentials_stop_the_drain() {
        let h = harness(true);
        for id in ["a", "b", "c"] {
            enqueue_create(&h.store, id);
        }
        h.remote.set_refuse_credentials(true);

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 2);
        assert_eq!(h.remote.calls().len(), 1);
        assert_eq!(h.store.queue_len().unwrap(), 3);

        h.remote.set_refuse_credentials(false);
        let report = h.manager.sync_pending_changes().await;
        assert_eq!(report.applied, 3);
    }

    #[tokio::test]
    async fn test_clear_all_policy_drops_failed_entries() {
        let h = harness_with(
            true,
            SyncConfig::default().with_cleanup(CleanupPolicy::ClearAll),
        );
        for id in ["a", "b", "c"] {
            enqueue_create(&h.store, id);
        }
        h.remote.fail_for("b");

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(created_ids(&h.remote), ["a", "b", "c"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.cleared, 1);
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_drain_is_a_noop() {
        let h = harness(false);
        enqueue_create(&h.store, "a");

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(report.skipped, Some(SkipReason::Offline));
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.store.queue_len().unwrap(), 1);
        assert!(h.manager.last_sync().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_drain_is_skipped() {
        let h = harness(true);
        enqueue_create(&h.store, "a");
        h.remote.set_latency(Some(Duration::from_millis(200)));

        let first = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.sync_pending_changes().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.manager.phase(), SyncPhase::Draining);

        let second = h.manager.sync_pending_changes().await;
        assert_eq!(second.skipped, Some(SkipReason::AlreadyDraining));

        let first = first.await.unwrap();
        assert_eq!(first.applied, 1);
        assert_eq!(created_ids(&h.remote), ["a"]);
        assert_eq!(h.manager.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_hung_remote_call_times_out_and_stays_queued() {
        let h = harness_with(
            true,
            SyncConfig::default().with_remote_timeout(Duration::from_millis(50)),
        );
        enqueue_create(&h.store, "slow");
        h.remote.set_latency(Some(Duration::from_secs(5)));

        let report = tokio::time::timeout(Duration::from_secs(2), h.manager.sync_pending_changes())
            .await
            .expect("drain must not hang");

        assert_eq!(report.failed, 1);
        assert_eq!(h.store.queue_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entries_enqueued_during_drain_wait_for_next_run() {
        let h = harness(true);
        enqueue_create(&h.store, "a");
        h.remote.set_latency(Some(Duration::from_millis(100)));

        let drain = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.sync_pending_changes().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        enqueue_create(&h.store, "late");

        let report = drain.await.unwrap();
        assert_eq!(report.attempted, 1);
        let remaining = h.store.queue_snapshot().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id(), Some("late"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_entries_are_discarded() {
        let h = harness(true);
        h.store.enqueue("dropTable", &json!({ "id": "x" })).unwrap();
        h.store.enqueue("createOrder", &json!("not an object")).unwrap();
        h.store.enqueue("updateOrder", &json!({ "total": 3 })).unwrap();

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(report.discarded, 3);
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_absent_remote_document_succeeds() {
        let h = harness(true);
        h.store.enqueue("deleteOrder", &json!({ "id": "gone" })).unwrap();

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(report.applied, 1);
        assert_eq!(h.store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_falls_back_to_create_when_missing() {
        let h = harness(true);
        h.store
            .enqueue("updateOrder", &json!({ "id": "o9", "status": "paid", "total": 5 }))
            .unwrap();

        h.manager.sync_pending_changes().await;

        let doc = h.remote.document(Collection::Orders, "o9").unwrap();
        assert_eq!(doc["status"], "paid");
    }

    #[tokio::test]
    async fn test_remote_assigned_id_flows_to_later_entries() {
        let h = harness(true);
        h.remote.set_assign_ids(true);
        let order: Order = serde_json::from_value(json!({
            "id": "local-1",
            "clientName": "Awa",
            "clientPhone": "650000001",
            "clientAddress": "Akwa",
            "items": [],
            "status": "pending",
            "total": 0.0,
            "date": "2026-03-01T09:00:00+00:00"
        }))
        .unwrap();
        h.store.put(&order).unwrap();
        h.store
            .enqueue("createOrder", &serde_json::to_value(&order).unwrap())
            .unwrap();
        h.store
            .enqueue("updateOrderStatus", &json!({ "id": "local-1", "status": "paid" }))
            .unwrap();

        let report = h.manager.sync_pending_changes().await;

        assert_eq!(report.applied, 2);
        let doc = h.remote.document(Collection::Orders, "remote-1").unwrap();
        assert_eq!(doc["status"], "paid");
        let local = h.store.get::<Order>("remote-1").unwrap().unwrap();
        assert!(local.synced);
        assert!(h.store.get::<Order>("local-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings_are_upserted_as_singleton() {
        let h = harness(true);
        h.store
            .enqueue("saveSettings", &json!({ "name": "Chez Awa" }))
            .unwrap();
        h.store
            .enqueue("saveSettings", &json!({ "name": "Chez Awa 2" }))
            .unwrap();

        h.manager.sync_pending_changes().await;

        assert_eq!(h.remote.len(Collection::Settings), 1);
        let doc = h.remote.document(Collection::Settings, SETTINGS_DOC_ID).unwrap();
        assert_eq!(doc["name"], "Chez Awa 2");
    }

    #[tokio::test]
    async fn test_offline_create_replays_once_when_back_online() {
        let h = harness(false);
        let cancel = CancellationToken::new();
        let watcher = h.manager.watch_connectivity(cancel.clone());

        h.store
            .enqueue("createOrder", &json!({ "id": "o1", "total": 1500 }))
            .unwrap();
        assert!(h.remote.calls().is_empty());

        h.monitor.report(true);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while h.store.queue_len().unwrap() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Create {
                collection: Collection::Orders,
                record: json!({ "id": "o1", "total": 1500 }),
            }]
        );
        assert_eq!(h.store.queue_len().unwrap(), 0);

        cancel.cancel();
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_interval_drains_without_connectivity_edge() {
        let h = harness_with(
            true,
            SyncConfig::default().with_retry_interval(Duration::from_millis(20)),
        );
        h.remote.fail_for("a");
        enqueue_create(&h.store, "a");
        h.manager.sync_pending_changes().await;
        assert_eq!(h.store.queue_len().unwrap(), 1);

        let cancel = CancellationToken::new();
        let watcher = h.manager.watch_connectivity(cancel.clone());
        h.remote.heal("a");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while h.store.queue_len().unwrap() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.store.queue_len().unwrap(), 0);

        cancel.cancel();
        watcher.await.unwrap();
    }
}
