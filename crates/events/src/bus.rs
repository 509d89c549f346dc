//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`SyncEvent`]s from the queue, the coordinator, and
//! the scheduler to any number of observers (UI status, logging). Nothing in
//! the sync path depends on an event being received.

use chrono::{DateTime, Utc};
use fieldledger_core::types::{OperationId, RecordId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// SyncEvent
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    OperationQueued {
        operation_id: OperationId,
        action: String,
    },
    DrainStarted,
    DrainCompleted {
        synced: usize,
        conflicted: usize,
        failed: usize,
        expired: usize,
    },
    /// A drain ended early or an operation hit a transport failure.
    SyncFailed { error: String },
    ConnectivityChanged { online: bool },
    /// Ledger verification found a break. Never mixed with sync errors.
    IntegrityAlert {
        sequence: i64,
        record_id: RecordId,
        reason: String,
    },
}

/// An event on the sync bus.
///
/// Constructed via [`SyncEvent::new`] and optionally scoped to a tenant with
/// [`with_tenant`](SyncEvent::with_tenant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// `None` for device-wide events such as connectivity changes.
    pub tenant_id: Option<String>,
    pub kind: SyncEventKind,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind) -> Self {
        Self {
            tenant_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Dot-separated event name, e.g. `"drain.completed"`.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            SyncEventKind::OperationQueued { .. } => "operation.queued",
            SyncEventKind::DrainStarted => "drain.started",
            SyncEventKind::DrainCompleted { .. } => "drain.completed",
            SyncEventKind::SyncFailed { .. } => "sync.failed",
            SyncEventKind::ConnectivityChanged { .. } => "connectivity.changed",
            SyncEventKind::IntegrityAlert { .. } => "integrity.alert",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one lags.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for [`SyncEvent`]s. Shared as `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// A receiver that falls more than `capacity` events behind loses the
    /// oldest ones and sees `RecvError::Lagged` on its next receive.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_tenant_scoped_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::new(SyncEventKind::DrainStarted).with_tenant("acme"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.tenant_id.as_deref(), Some("acme"));
        assert_eq!(received.event_type(), "drain.started");
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(SyncEvent::new(SyncEventKind::ConnectivityChanged { online: true }));

        let (first, second) = (rx1.recv().await.unwrap(), rx2.recv().await.unwrap());
        assert_eq!(first, second);
        assert!(first.tenant_id.is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        for _ in 0..8 {
            bus.publish(SyncEvent::new(SyncEventKind::DrainStarted));
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = SyncEvent::new(SyncEventKind::SyncFailed {
            error: "timeout".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "sync_failed");
        assert_eq!(json["kind"]["error"], "timeout");
    }
}
