//! shopsync - offline-first order store and sync engine.
//!
//! Application writes land in the local SQLite store first and append an
//! entry to the change queue. The [`SyncManager`] replays that queue against
//! the remote document store whenever connectivity returns, and once at
//! startup. [`App`] wires everything together.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod analytics;
pub mod api;
pub mod app;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod orders;
pub mod remote;
pub mod storage;
pub mod sync;

pub use app::App;
pub use config::{CleanupPolicy, SyncConfig};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ReachabilityProbe};
pub use db::{LocalStore, Table};
pub use error::{AuthError, OrderError, RemoteError, StoreError};
pub use models::{Client, Order, OrderItem, OrderStatus, QueueEntry, ShopSettings, SyncAction};
pub use remote::{Collection, MemoryRemoteStore, RemoteStore};
pub use sync::{DrainReport, SyncManager, SyncPhase};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,shopsync=debug";

/// Initialize structured logging: console plus a daily rolling file in
/// `log_dir`, normally [`SyncConfig::log_dir`].
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes and stops the file writer.
pub fn init_logging(
    log_dir: &Path,
) -> Result<WorkerGuard, tracing_subscriber::util::TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Prune old log files before setting up the appender
    std::fs::create_dir_all(log_dir).ok();
    diagnostics::prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
