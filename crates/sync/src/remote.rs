//! The remote system of record, as seen by the coordinator.

use async_trait::async_trait;
use fieldledger_core::conflict::ServerState;
use fieldledger_core::operation::OfflineOperation;

/// Transport-level failure. Never a conflict: the operation is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Round trip timed out")]
    Timeout,
}

/// Result of asking the remote to apply an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The remote refused the payload on validation grounds.
    Rejected { reason: String },
}

#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Current authoritative state of `(entity, entity_id)` for a tenant.
    async fn fetch_current_state(
        &self,
        tenant_id: &str,
        entity: &str,
        entity_id: &str,
    ) -> Result<ServerState, RemoteError>;

    async fn apply(&self, op: &OfflineOperation) -> Result<ApplyOutcome, RemoteError>;
}
