use fieldledger_core::types::OperationId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Tenant id is required")]
    TenantRequired,

    #[error("Tenant '{tenant_id}' already has {limit} pending operations")]
    CapacityExceeded { tenant_id: String, limit: usize },

    #[error("Operation {0} not found")]
    NotFound(OperationId),

    #[error("Chain tail moved (expected {expected})")]
    TailMismatch { expected: String },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub(crate) fn require_tenant(tenant_id: &str) -> Result<(), StoreError> {
    if tenant_id.trim().is_empty() {
        Err(StoreError::TenantRequired)
    } else {
        Ok(())
    }
}
