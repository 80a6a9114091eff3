//! Diagnostics.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Sync health**: online/offline, queue backlog, unsynced records
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::LocalStore;
use crate::error::StoreResult;
use crate::models::{Client, Order};
use crate::sync::SyncManager;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "shopsync";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": build_timestamp(),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

/// The embedded build time (unix seconds) as RFC 3339.
fn build_timestamp() -> Option<String> {
    env!("BUILD_TIMESTAMP")
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
}

// ---------------------------------------------------------------------------
// Sync health
// ---------------------------------------------------------------------------

/// Queue backlog grouped by action tag.
fn get_sync_backlog(store: &LocalStore) -> StoreResult<Value> {
    let mut by_action: BTreeMap<String, usize> = BTreeMap::new();
    let entries = store.queue_snapshot()?;
    let oldest = entries.first().map(|e| e.timestamp);
    for entry in &entries {
        *by_action.entry(entry.action.clone()).or_default() += 1;
    }
    Ok(json!({
        "total": entries.len(),
        "byAction": by_action,
        "oldestTimestamp": oldest,
    }))
}

/// Snapshot of local store and sync state for support screens and logs.
pub fn get_sync_health(store: &LocalStore, manager: Option<&SyncManager>) -> StoreResult<Value> {
    let db_size = fs::metadata(store.path()).map(|m| m.len()).ok();
    Ok(json!({
        "schemaVersion": store.schema_version()?,
        "dbPath": store.path().display().to_string(),
        "dbSizeBytes": db_size,
        "syncBacklog": get_sync_backlog(store)?,
        "unsyncedOrders": store.get_unsynced::<Order>()?.len(),
        "unsyncedClients": store.get_unsynced::<Client>()?.len(),
        "isOnline": manager.map(SyncManager::is_online),
        "lastSync": manager.and_then(SyncManager::last_sync),
        "remoteConfigured": manager.is_some(),
    }))
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Prune old log files in `log_dir`, keeping only the most recent
/// `MAX_LOG_FILES`. Returns how many were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    if !log_dir.exists() {
        return 0;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first; ties broken by name so daily files sort by date
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}
