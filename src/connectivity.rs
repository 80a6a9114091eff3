//! Online/offline state holder.
//!
//! [`ConnectivityMonitor`] turns raw reachability readings into
//! edge-triggered [`ConnectivityEvent`]s. Readings are best effort: a false
//! "online" is tolerated because each remote call still fails normally.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// A transition between reachability states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Something that can tell whether the remote looks reachable right now.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Single source of truth for "should remote I/O be attempted now".
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            online: AtomicBool::new(initially_online),
            events,
        }
    }

    /// Current status. Never blocks.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Feed a platform reading. Emits and returns an event only when the
    /// reading differs from the current state; concurrent identical readings
    /// produce exactly one event.
    pub fn report(&self, reachable: bool) -> Option<ConnectivityEvent> {
        if self
            .online
            .compare_exchange(!reachable, reachable, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let event = if reachable {
            info!("Network online");
            ConnectivityEvent::Online
        } else {
            info!("Network offline; changes will be queued locally");
            ConnectivityEvent::Offline
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
        Some(event)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

/// Poll `probe` every `interval` and feed the readings into `monitor` until
/// `cancel` fires.
pub fn spawn_probe_loop(
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Connectivity probe started (interval: {}ms)", interval.as_millis());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let reachable = probe.is_reachable().await;
            if monitor.report(reachable).is_none() {
                debug!(reachable, "Connectivity unchanged");
            }
        }
        info!("Connectivity probe stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    #[test]
    fn test_initial_state_is_reported() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[test]
    fn test_only_edges_emit_events() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        assert_eq!(monitor.report(false), None);
        assert_eq!(monitor.report(true), Some(ConnectivityEvent::Online));
        assert_eq!(monitor.report(true), None);
        assert_eq!(monitor.report(true), None);
        assert_eq!(monitor.report(false), Some(ConnectivityEvent::Offline));

        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::Online);
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::Offline);
        assert!(rx.try_recv().is_err());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_probe_loop_tracks_remote_reachability() {
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_unreachable(true);
        let mut rx = monitor.subscribe();
        let cancel = CancellationToken::new();

        let handle = spawn_probe_loop(
            monitor.clone(),
            remote.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("offline event")
            .unwrap();
        assert_eq!(event, ConnectivityEvent::Offline);

        remote.set_unreachable(false);
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("online event")
            .unwrap();
        assert_eq!(event, ConnectivityEvent::Online);

        cancel.cancel();
        handle.await.unwrap();
    }
}
