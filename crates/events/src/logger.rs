//! Structured logging of sync events.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! turns every [`SyncEvent`] into a `tracing` event. It runs as a long-lived
//! background task and exits when the bus is dropped.

use tokio::sync::broadcast;

use crate::bus::{SyncEvent, SyncEventKind};

/// Background service that logs sync events.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the channel closes.
    pub async fn run(mut receiver: broadcast::Receiver<SyncEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => Self::log(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
    }

    fn log(event: &SyncEvent) {
        let tenant_id = event.tenant_id.as_deref().unwrap_or("-");
        let event_type = event.event_type();

        match &event.kind {
            SyncEventKind::OperationQueued {
                operation_id,
                action,
            } => {
                tracing::debug!(%tenant_id, %event_type, %operation_id, %action, "Operation queued");
            }
            SyncEventKind::DrainStarted => {
                tracing::debug!(%tenant_id, %event_type, "Drain started");
            }
            SyncEventKind::DrainCompleted {
                synced,
                conflicted,
                failed,
                expired,
            } => {
                tracing::info!(
                    %tenant_id,
                    %event_type,
                    synced,
                    conflicted,
                    failed,
                    expired,
                    "Drain completed"
                );
            }
            SyncEventKind::SyncFailed { error } => {
                tracing::warn!(%tenant_id, %event_type, %error, "Sync failed");
            }
            SyncEventKind::ConnectivityChanged { online } => {
                tracing::info!(%event_type, online, "Connectivity changed");
            }
            SyncEventKind::IntegrityAlert {
                sequence,
                record_id,
                reason,
            } => {
                tracing::error!(
                    %tenant_id,
                    %event_type,
                    sequence,
                    %record_id,
                    %reason,
                    "Decision ledger failed verification"
                );
            }
        }
    }
}
