//! Remote store abstraction.
//!
//! The sync manager only ever talks to the system of record through
//! [`RemoteStore`]. The HTTP implementation lives in `api.rs`; the in-memory
//! one here backs tests and local demos.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::connectivity::ReachabilityProbe;
use crate::error::{RemoteError, RemoteResult};

/// Remote collections used by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Orders,
    Clients,
    /// Holds the single `shop` document.
    Settings,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Orders => "orders",
            Collection::Clients => "clients",
            Collection::Settings => "settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort key for [`RemoteStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<'a> {
    pub field: &'a str,
    pub descending: bool,
}

impl<'a> OrderBy<'a> {
    pub fn asc(field: &'a str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: &'a str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// A document database keyed by entity id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store a new document. Returns the id the remote assigned, which may
    /// differ from any `id` carried in `record`.
    ///
    /// Creating under an id the remote already holds replaces that document,
    /// so a create replayed after a lost reply leaves a single copy.
    async fn create(&self, collection: Collection, record: &Value) -> RemoteResult<String>;

    /// Merge `partial` into an existing document.
    async fn update(&self, collection: Collection, id: &str, partial: &Value) -> RemoteResult<()>;

    /// Remove a document. Removing an absent id succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()>;

    async fn list(
        &self,
        collection: Collection,
        order_by: Option<OrderBy<'_>>,
    ) -> RemoteResult<Vec<Value>>;
}

/// A call observed by [`MemoryRemoteStore`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create {
        collection: Collection,
        record: Value,
    },
    Update {
        collection: Collection,
        id: String,
        partial: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
    List {
        collection: Collection,
    },
}

/// In-memory document store with failure and latency injection.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    docs: Mutex<HashMap<Collection, BTreeMap<String, Value>>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing_ids: Mutex<HashSet<String>>,
    fail_next: Mutex<HashSet<String>>,
    lose_reply_next: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
    refuse_credentials: AtomicBool,
    assign_ids: AtomicBool,
    next_id: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call touching `id` fails as unreachable until [`Self::heal`].
    pub fn fail_for(&self, id: &str) {
        if let Ok(mut failing) = self.failing_ids.lock() {
            failing.insert(id.to_string());
        }
    }

    pub fn heal(&self, id: &str) {
        if let Ok(mut failing) = self.failing_ids.lock() {
            failing.remove(id);
        }
    }

    /// The next call touching `id` times out before reaching the store.
    pub fn fail_next(&self, id: &str) {
        if let Ok(mut ids) = self.fail_next.lock() {
            ids.insert(id.to_string());
        }
    }

    /// The next write touching `id` is applied, but its reply is lost and
    /// the caller sees a timeout.
    pub fn lose_reply_next(&self, id: &str) {
        if let Ok(mut ids) = self.lose_reply_next.lock() {
            ids.insert(id.to_string());
        }
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Fail every call and every reachability probe.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Answer every call as if the API key were revoked.
    pub fn set_refuse_credentials(&self, refuse: bool) {
        self.refuse_credentials.store(refuse, Ordering::SeqCst);
    }

    /// When set, `create` ignores the caller's id and assigns `remote-N`.
    pub fn set_assign_ids(&self, assign: bool) {
        self.assign_ids.store(assign, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn document(&self, collection: Collection, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .ok()
            .and_then(|docs| docs.get(&collection).and_then(|c| c.get(id)).cloned())
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.docs
            .lock()
            .map(|docs| docs.get(&collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn record_call(&self, call: RemoteCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn gate(&self, id: Option<&str>) -> RemoteResult<()> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("memory remote offline".into()));
        }
        if self.refuse_credentials.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized("memory remote refused the API key".into()));
        }
        if let Some(id) = id {
            let failing = self
                .failing_ids
                .lock()
                .map(|f| f.contains(id))
                .unwrap_or(false);
            if failing {
                return Err(RemoteError::Unreachable(format!("injected failure for {id}")));
            }
            if take(&self.fail_next, id) {
                return Err(RemoteError::Timeout);
            }
        }
        Ok(())
    }

    /// Answer for a write that has already been applied.
    fn reply(&self, id: &str) -> RemoteResult<()> {
        if take(&self.lose_reply_next, id) {
            return Err(RemoteError::Timeout);
        }
        Ok(())
    }

    fn docs(&self) -> RemoteResult<std::sync::MutexGuard<'_, HashMap<Collection, BTreeMap<String, Value>>>> {
        self.docs
            .lock()
            .map_err(|_| RemoteError::Rejected("memory remote poisoned".into()))
    }
}

/// Remove `id` from a one-shot injection set, reporting whether it was armed.
fn take(set: &Mutex<HashSet<String>>, id: &str) -> bool {
    set.lock().map(|mut ids| ids.remove(id)).unwrap_or(false)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(&self, collection: Collection, record: &Value) -> RemoteResult<String> {
        let requested = record.get("id").and_then(Value::as_str).map(str::to_string);
        self.record_call(RemoteCall::Create {
            collection,
            record: record.clone(),
        });
        self.gate(requested.as_deref()).await?;

        let id = match requested {
            Some(id) if !self.assign_ids.load(Ordering::SeqCst) => id,
            _ => format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let mut doc = record.clone();
        if let Value::Object(ref mut map) = doc {
            map.insert("id".into(), Value::String(id.clone()));
        }
        self.docs()?
            .entry(collection)
            .or_default()
            .insert(id.clone(), doc);
        self.reply(&id)?;
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, partial: &Value) -> RemoteResult<()> {
        self.record_call(RemoteCall::Update {
            collection,
            id: id.to_string(),
            partial: partial.clone(),
        });
        self.gate(Some(id)).await?;

        let mut docs = self.docs()?;
        let doc = docs
            .get_mut(&collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.name().to_string(),
                id: id.to_string(),
            })?;
        if let (Value::Object(target), Value::Object(fields)) = (doc, partial) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        drop(docs);
        self.reply(id)
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        self.record_call(RemoteCall::Delete {
            collection,
            id: id.to_string(),
        });
        self.gate(Some(id)).await?;

        if let Some(docs) = self.docs()?.get_mut(&collection) {
            docs.remove(id);
        }
        self.reply(id)
    }

    async fn list(
        &self,
        collection: Collection,
        order_by: Option<OrderBy<'_>>,
    ) -> RemoteResult<Vec<Value>> {
        self.record_call(RemoteCall::List { collection });
        self.gate(None).await?;

        let mut docs: Vec<Value> = self
            .docs()?
            .get(&collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        if let Some(order) = order_by {
            docs.sort_by(|a, b| {
                let ka = a.get(order.field).map(Value::to_string).unwrap_or_default();
                let kb = b.get(order.field).map(Value::to_string).unwrap_or_default();
                if order.descending {
                    kb.cmp(&ka)
                } else {
                    ka.cmp(&kb)
                }
            });
        }
        Ok(docs)
    }
}

#[async_trait]
impl ReachabilityProbe for MemoryRemoteStore {
    async fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }
}
