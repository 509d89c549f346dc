//! Repository for the append-only `decision_records` table.

use fieldledger_core::chain::GENESIS_DIGEST;
use fieldledger_core::record::DecisionRecord;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::decision::{ChainTailRow, DecisionRecordRow};
use crate::models::{encode_json, encode_opt_json, encode_ts};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `decision_records` SELECT queries. Also the INSERT list:
/// every column is supplied by the ledger.
const COLUMNS: &str = "\
    tenant_id, sequence, id, actor_id, kind, origin, severity, title, \
    description, entity, entity_id, action, before_snapshot, after_snapshot, \
    agent, provenance, timestamp, previous_digest, digest";

// ---------------------------------------------------------------------------
// DecisionRecordRepo
// ---------------------------------------------------------------------------

/// Append and read operations for decision records. There is no update or
/// delete: the table's triggers reject both.
pub struct DecisionRecordRepo;

impl DecisionRecordRepo {
    /// Tail of a tenant's chain, `None` when the chain is empty.
    pub async fn find_tail(
        pool: &SqlitePool,
        tenant_id: &str,
    ) -> Result<Option<ChainTailRow>, sqlx::Error> {
        sqlx::query_as::<_, ChainTailRow>(
            "SELECT sequence, digest, timestamp FROM decision_records \
             WHERE tenant_id = ? ORDER BY sequence DESC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Insert `record` only if the tenant's current tail digest equals
    /// `expected_tail` (genesis for an empty chain).
    ///
    /// Returns `false` when the tail moved. A concurrent writer that slipped
    /// in the same sequence surfaces as a primary-key violation, which is
    /// reported the same way.
    pub async fn append_if_tail(
        pool: &SqlitePool,
        record: &DecisionRecord,
        expected_tail: &str,
    ) -> Result<bool, StoreError> {
        let query = format!(
            "INSERT INTO decision_records ({COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE COALESCE( \
                 (SELECT digest FROM decision_records \
                  WHERE tenant_id = ? ORDER BY sequence DESC LIMIT 1), \
                 ?) = ?"
        );

        let result = sqlx::query(&query)
            .bind(&record.tenant_id)
            .bind(record.sequence)
            .bind(record.id.to_string())
            .bind(&record.actor_id)
            .bind(record.kind.as_str())
            .bind(record.origin.as_str())
            .bind(record.severity.as_str())
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.entity)
            .bind(&record.entity_id)
            .bind(&record.action)
            .bind(encode_opt_json(record.before.as_ref())?)
            .bind(encode_json(&record.after)?)
            .bind(encode_opt_json(record.agent.as_ref())?)
            .bind(encode_opt_json(record.provenance.as_ref())?)
            .bind(encode_ts(&record.timestamp))
            .bind(&record.previous_digest)
            .bind(&record.digest)
            .bind(&record.tenant_id)
            .bind(GENESIS_DIGEST)
            .bind(expected_tail)
            .execute(pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every record of a tenant in sequence order.
    pub async fn list_for_tenant(
        pool: &SqlitePool,
        tenant_id: &str,
    ) -> Result<Vec<DecisionRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM decision_records WHERE tenant_id = ? ORDER BY sequence ASC"
        );
        sqlx::query_as::<_, DecisionRecordRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_tenants(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tenant_id FROM decision_records ORDER BY tenant_id",
        )
        .fetch_all(pool)
        .await
    }
}
