//! Configuration for the local store and the sync manager.

use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single remote call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between reachability probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// What happens to entries that failed once a drain has walked its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Failed entries stay queued and are retried by the next drain.
    #[default]
    RetainFailed,
    /// Clear the whole queue after every drain, failed entries included.
    /// Reproduces the behaviour of the first web release; loses data on
    /// partial failure.
    ClearAll,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding `shop.db`.
    pub data_dir: PathBuf,
    /// Bound on each remote call made while draining.
    pub remote_timeout: Duration,
    /// How often the connectivity probe polls the remote.
    pub probe_interval: Duration,
    /// Periodic drain while online, so failed entries are retried without
    /// waiting for the next offline/online cycle. `None` disables it.
    pub retry_interval: Option<Duration>,
    pub cleanup: CleanupPolicy,
}

impl SyncConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            retry_interval: None,
            cleanup: CleanupPolicy::default(),
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Where [`crate::init_logging`] should write, next to the database.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.remote_timeout, DEFAULT_REMOTE_TIMEOUT);
        assert_eq!(config.probe_interval, DEFAULT_PROBE_INTERVAL);
        assert_eq!(config.cleanup, CleanupPolicy::RetainFailed);
        assert!(config.retry_interval.is_none());
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::new("/tmp/shop")
            .with_remote_timeout(Duration::from_millis(250))
            .with_retry_interval(Duration::from_secs(30))
            .with_cleanup(CleanupPolicy::ClearAll);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/shop"));
        assert_eq!(config.remote_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.cleanup, CleanupPolicy::ClearAll);
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/shop/logs"));
    }
}
