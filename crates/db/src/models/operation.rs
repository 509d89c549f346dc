//! `offline_operations` row model.

use fieldledger_core::operation::{ConflictDetail, OfflineOperation};
use fieldledger_core::types::Provenance;
use serde_json::Value;
use sqlx::FromRow;

use super::{decode_json, decode_opt_json, decode_opt_ts, decode_ts, decode_uuid};
use crate::error::StoreError;

/// A row from `offline_operations`.
#[derive(Debug, Clone, FromRow)]
pub struct OperationRow {
    pub seq: i64,
    pub id: String,
    pub tenant_id: String,
    pub actor_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub payload: String,
    pub prior_payload: Option<String>,
    pub created_at_local: String,
    pub status: String,
    pub attempts: i64,
    pub last_attempt_at: Option<String>,
    pub synced_at: Option<String>,
    pub conflict: Option<String>,
    pub provenance: Option<String>,
}

impl TryFrom<OperationRow> for OfflineOperation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &str, e: fieldledger_core::error::CoreError| {
            StoreError::Corrupt(format!("{column}: {e}"))
        };

        Ok(OfflineOperation::from_parts(
            decode_uuid("id", &row.id)?,
            row.tenant_id,
            row.actor_id,
            row.action.parse().map_err(|e| corrupt("action", e))?,
            row.entity,
            row.entity_id,
            decode_json::<Value>(&row.payload)?,
            decode_opt_json::<Value>(row.prior_payload.as_deref())?,
            decode_ts("created_at_local", &row.created_at_local)?,
            row.status.parse().map_err(|e| corrupt("status", e))?,
            u32::try_from(row.attempts)
                .map_err(|_| StoreError::Corrupt(format!("attempts: {}", row.attempts)))?,
            decode_opt_ts("last_attempt_at", row.last_attempt_at.as_deref())?,
            decode_opt_ts("synced_at", row.synced_at.as_deref())?,
            decode_opt_json::<ConflictDetail>(row.conflict.as_deref())?,
            decode_opt_json::<Provenance>(row.provenance.as_deref())?,
        ))
    }
}
