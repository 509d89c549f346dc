//! Connectivity signal.
//!
//! The host platform adapts its network notifications to
//! [`ConnectivityMonitor`]. Subscribers receive a `watch` receiver; dropping
//! it unsubscribes. [`ConnectivityRelay`] turns edges into bus events.

use std::sync::Arc;

use fieldledger_events::{EventBus, SyncEvent, SyncEventKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that observes every online/offline change.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity flipped by hand. Used by tests and by hosts that already
/// track reachability themselves.
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Set the current state. Subscribers are only woken on an actual edge.
    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Publishes one device-wide `ConnectivityChanged` per edge. Stops when
/// dropped or shut down, or when the connectivity source closes.
pub struct ConnectivityRelay {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ConnectivityRelay {
    pub fn spawn(connectivity: &dyn ConnectivityMonitor, bus: Arc<EventBus>) -> Self {
        let cancel = CancellationToken::new();
        let mut online_rx = connectivity.subscribe();
        online_rx.borrow_and_update();
        let join = tokio::spawn(relay(cancel.clone(), online_rx, bus));
        Self {
            cancel,
            join: Some(join),
        }
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Connectivity relay task failed");
            }
        }
    }
}

impl Drop for ConnectivityRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn relay(cancel: CancellationToken, mut online_rx: watch::Receiver<bool>, bus: Arc<EventBus>) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = online_rx.changed() => {
                if changed.is_err() {
                    tracing::warn!("Connectivity source closed");
                    break;
                }
                let online = *online_rx.borrow_and_update();
                tracing::info!(online, "Connectivity changed");
                bus.publish(SyncEvent::new(SyncEventKind::ConnectivityChanged { online }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_edges_only() {
        let connectivity = ManualConnectivity::new(false);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(false);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn relay_publishes_each_edge_once() {
        let connectivity = ManualConnectivity::new(true);
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let relay = ConnectivityRelay::spawn(&connectivity, Arc::clone(&bus));

        connectivity.set_online(false);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, SyncEventKind::ConnectivityChanged { online: false });
        assert_eq!(event.tenant_id, None);

        connectivity.set_online(true);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, SyncEventKind::ConnectivityChanged { online: true });

        relay.shutdown().await;
        connectivity.set_online(false);
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
    }
}
