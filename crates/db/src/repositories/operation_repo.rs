//! Repository for the `offline_operations` table.

use fieldledger_core::operation::{OfflineOperation, OperationStatus};
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::operation::OperationRow;
use crate::models::{encode_json, encode_opt_json, encode_ts};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `offline_operations` SELECT queries.
const COLUMNS: &str = "\
    seq, id, tenant_id, actor_id, action, entity, entity_id, payload, \
    prior_payload, created_at_local, status, attempts, last_attempt_at, \
    synced_at, conflict, provenance";

/// Column list for INSERT (excludes auto-generated `seq`).
const INSERT_COLUMNS: &str = "\
    id, tenant_id, actor_id, action, entity, entity_id, payload, \
    prior_payload, created_at_local, status, attempts, last_attempt_at, \
    synced_at, conflict, provenance";

// ---------------------------------------------------------------------------
// OperationRepo
// ---------------------------------------------------------------------------

/// Provides CRUD operations for offline operations.
pub struct OperationRepo;

impl OperationRepo {
    /// Insert `op` unless the tenant already has `limit` Pending rows.
    ///
    /// Count and insert are one statement. Returns `false` when the limit
    /// blocked the insert.
    pub async fn insert_bounded(
        pool: &SqlitePool,
        op: &OfflineOperation,
        limit: usize,
    ) -> Result<bool, StoreError> {
        let query = format!(
            "INSERT INTO offline_operations ({INSERT_COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE (SELECT COUNT(*) FROM offline_operations \
                    WHERE tenant_id = ? AND status = 'pending') < ?"
        );

        let result = sqlx::query(&query)
            .bind(op.id.to_string())
            .bind(op.tenant_id())
            .bind(op.actor_id())
            .bind(op.action.as_str())
            .bind(&op.entity)
            .bind(&op.entity_id)
            .bind(encode_json(&op.payload)?)
            .bind(encode_opt_json(op.prior_payload.as_ref())?)
            .bind(encode_ts(&op.created_at_local))
            .bind(op.status.as_str())
            .bind(i64::from(op.attempts))
            .bind(op.last_attempt_at.as_ref().map(encode_ts))
            .bind(op.synced_at.as_ref().map(encode_ts))
            .bind(encode_opt_json(op.conflict.as_ref())?)
            .bind(encode_opt_json(op.provenance.as_ref())?)
            .bind(op.tenant_id())
            .bind(limit as i64)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Find an operation by tenant and id.
    pub async fn find_by_id(
        pool: &SqlitePool,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<OperationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offline_operations WHERE tenant_id = ? AND id = ?"
        );
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Write back the mutable fields. Returns `false` if no row matched.
    pub async fn update_state(pool: &SqlitePool, op: &OfflineOperation) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE offline_operations SET \
                 status = ?, attempts = ?, last_attempt_at = ?, synced_at = ?, \
                 conflict = ?, payload = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(op.status.as_str())
        .bind(i64::from(op.attempts))
        .bind(op.last_attempt_at.as_ref().map(encode_ts))
        .bind(op.synced_at.as_ref().map(encode_ts))
        .bind(encode_opt_json(op.conflict.as_ref())?)
        .bind(encode_json(&op.payload)?)
        .bind(op.tenant_id())
        .bind(op.id.to_string())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete one operation. Returns `true` if a row was removed.
    pub async fn delete(pool: &SqlitePool, tenant_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM offline_operations WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operations with a status in `statuses`, oldest first.
    pub async fn list_by_status(
        pool: &SqlitePool,
        tenant_id: &str,
        statuses: &[OperationStatus],
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let query = format!(
            "SELECT {COLUMNS} FROM offline_operations \
             WHERE tenant_id = ? AND status IN ({placeholders}) \
             ORDER BY created_at_local ASC, seq ASC"
        );

        let mut q = sqlx::query_as::<_, OperationRow>(&query).bind(tenant_id);
        for status in statuses {
            q = q.bind(status.as_str());
        }
        q.fetch_all(pool).await
    }

    pub async fn count_by_status(
        pool: &SqlitePool,
        tenant_id: &str,
        status: OperationStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM offline_operations WHERE tenant_id = ? AND status = ?",
        )
        .bind(tenant_id)
        .bind(status.as_str())
        .fetch_one(pool)
        .await
    }

    /// Delete every operation of one tenant.
    pub async fn delete_for_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM offline_operations WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_tenants(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tenant_id FROM offline_operations ORDER BY tenant_id",
        )
        .fetch_all(pool)
        .await
    }
}
