//! Composition root.
//!
//! Builds the store, the remote adapter, the connectivity monitor and the
//! sync manager, wires them together and owns their background tasks.

use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::HttpRemoteStore;
use crate::config::SyncConfig;
use crate::connectivity::{spawn_probe_loop, ConnectivityMonitor, ReachabilityProbe};
use crate::db::LocalStore;
use crate::diagnostics;
use crate::error::{AuthError, StoreResult};
use crate::remote::RemoteStore;
use crate::storage;
use crate::sync::{DrainReport, SyncManager};

/// A running instance: local store always, sync only when the auth gate
/// passed.
pub struct App {
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    sync: Option<Arc<SyncManager>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Open the store under `config.data_dir` and, when remote credentials
    /// are stored, connect to the backend and drain pending changes.
    ///
    /// Missing credentials are not an error: the app runs local-only and
    /// keeps queueing writes.
    pub async fn start(config: SyncConfig) -> anyhow::Result<App> {
        info!(about = %diagnostics::get_about_info(), "Starting shopsync");
        let store = LocalStore::open(&config.data_dir)
            .with_context(|| format!("opening local store in {}", config.data_dir.display()))?;

        match storage::load_credentials() {
            Ok(creds) => {
                let http = Arc::new(
                    HttpRemoteStore::new(&creds.remote_url, creds.api_key)
                        .context("building HTTP remote store")?,
                );
                info!(remote = http.base_url(), "Remote configured");
                Ok(Self::with_remote(config, store, http.clone(), http).await)
            }
            Err(AuthError::NotConfigured(missing)) => {
                warn!(missing, "Remote not configured; running local-only");
                Ok(Self::local_only(store))
            }
            Err(e) => Err(e).context("reading remote credentials"),
        }
    }

    /// Wire a sync manager against `remote`, start the background tasks and
    /// run the startup drain.
    pub async fn with_remote(
        config: SyncConfig,
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> App {
        let online = probe.is_reachable().await;
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let sync = Arc::new(SyncManager::new(
            store.clone(),
            remote,
            monitor.clone(),
            config.clone(),
        ));

        let cancel = CancellationToken::new();
        let tasks = vec![
            sync.watch_connectivity(cancel.child_token()),
            spawn_probe_loop(
                monitor.clone(),
                probe,
                config.probe_interval,
                cancel.child_token(),
            ),
        ];

        let report = sync.sync_pending_changes().await;
        log_startup_drain(&report, online);

        App {
            store,
            monitor,
            sync: Some(sync),
            cancel,
            tasks,
        }
    }

    /// No remote: writes are stored and queued, nothing is replayed.
    pub fn local_only(store: Arc<LocalStore>) -> App {
        App {
            store,
            monitor: Arc::new(ConnectivityMonitor::new(false)),
            sync: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn sync(&self) -> Option<&Arc<SyncManager>> {
        self.sync.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Store and sync state for support screens.
    pub fn health(&self) -> StoreResult<serde_json::Value> {
        diagnostics::get_sync_health(&self.store, self.sync.as_deref())
    }

    /// Drain now, e.g. after a user-triggered refresh. `None` when
    /// local-only.
    pub async fn sync_now(&self) -> Option<DrainReport> {
        match &self.sync {
            Some(sync) => Some(sync.sync_pending_changes().await),
            None => None,
        }
    }

    /// Stop the background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {e}");
            }
        }
        info!("shopsync stopped");
    }
}

fn log_startup_drain(report: &DrainReport, online: bool) {
    match report.skipped {
        Some(reason) => info!(online, ?reason, "Startup sync skipped"),
        None => info!(
            applied = report.applied,
            failed = report.failed,
            deferred = report.deferred,
            "Startup sync finished"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use crate::orders::{self, NewOrder};
    use crate::remote::{Collection, MemoryRemoteStore};
    use serde_json::json;
    use std::time::Duration;

    fn config() -> SyncConfig {
        SyncConfig::default().with_probe_interval(Duration::from_millis(10))
    }

    async fn wait_for_empty_queue(store: &LocalStore) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.queue_len().unwrap() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_startup_drain_replays_pending_changes() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .enqueue("createOrder", &json!({ "id": "o1", "total": 1500 }))
            .unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());

        let app = App::with_remote(config(), store.clone(), remote.clone(), remote.clone()).await;

        assert!(app.is_online());
        assert_eq!(store.queue_len().unwrap(), 0);
        assert_eq!(remote.document(Collection::Orders, "o1").unwrap()["total"], 1500);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_write_syncs_after_reconnect() {
        let store = LocalStore::open_in_memory().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_unreachable(true);

        let app = App::with_remote(config(), store.clone(), remote.clone(), remote.clone()).await;
        assert!(!app.is_online());

        let order = orders::create_order(
            app.store(),
            NewOrder {
                client_name: "Awa".into(),
                client_phone: "650000001".into(),
                client_address: "Akwa".into(),
                items: vec![OrderItem {
                    name: "pagne".into(),
                    quantity: 3,
                    price: 500.0,
                    stock: 0,
                }],
                ..NewOrder::default()
            },
        )
        .unwrap();
        assert_eq!(store.queue_len().unwrap(), 2);

        remote.set_unreachable(false);
        wait_for_empty_queue(&store).await;

        assert!(app.is_online());
        assert_eq!(store.queue_len().unwrap(), 0);
        let doc = remote.document(Collection::Orders, &order.id).unwrap();
        assert_eq!(doc["total"], 1500.0);
        assert_eq!(remote.len(Collection::Clients), 1);
        assert!(app.sync().unwrap().last_sync().is_some());
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_local_only_never_syncs() {
        let store = LocalStore::open_in_memory().unwrap();
        store.enqueue("saveSettings", &json!({ "name": "x" })).unwrap();

        let app = App::local_only(store.clone());

        assert!(app.sync_now().await.is_none());
        assert!(!app.is_online());
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(app.health().unwrap()["remoteConfigured"], false);
        app.shutdown().await;
    }
}
