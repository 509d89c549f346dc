use fieldledger_core::error::CoreError;
use fieldledger_core::types::OperationId;
use fieldledger_db::StoreError;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Tenant id is required")]
    TenantRequired,

    #[error("Human decisions require an actor")]
    ActorRequired,

    #[error("Lost the chain tail race {attempts} times for tenant '{tenant_id}'")]
    Contention { tenant_id: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Enqueue validation errors are synchronous and never retried.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Tenant id is required")]
    TenantRequired,

    #[error("Actor id is required")]
    ActorRequired,

    #[error("Action '{0}' is not allowed offline")]
    ActionNotWhitelisted(String),

    #[error("Offline queue for tenant '{tenant_id}' is full ({limit} pending)")]
    QueueFull { tenant_id: String, limit: usize },

    #[error("Operation {0} not found")]
    NotFound(OperationId),

    #[error("Operation {0} has an unresolved conflict")]
    UnresolvedConflict(OperationId),

    #[error(transparent)]
    Transition(#[from] CoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TenantRequired => QueueError::TenantRequired,
            StoreError::CapacityExceeded { tenant_id, limit } => {
                QueueError::QueueFull { tenant_id, limit }
            }
            StoreError::NotFound(id) => QueueError::NotFound(id),
            other => QueueError::Store(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Tenant id is required")]
    TenantRequired,

    #[error("Tenant '{0}' is already draining")]
    AlreadyDraining(String),

    #[error("Device is offline")]
    Offline,

    #[error("Operation {0} is not awaiting conflict resolution")]
    NotConflicted(OperationId),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Remote rejected the operation: {0}")]
    Rejected(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
