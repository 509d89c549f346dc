//! Offline audit of a device database.
//!
//! Replays every tenant's decision ledger and reports queue health. Exits
//! non-zero if any chain is broken.

use std::sync::Arc;

use anyhow::Context;
use fieldledger_core::clock::SystemClock;
use fieldledger_core::config::SyncLimits;
use fieldledger_db::{SqliteStore, TenantScopedStore};
use fieldledger_events::{EventBus, EventLogger};
use fieldledger_sync::{AuditLedger, OperationQueue};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldledger_auditor=info,fieldledger_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let limits = SyncLimits::from_env();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    // --- Database ---
    let pool = fieldledger_db::create_pool(&database_url)
        .await
        .context("Failed to open device database")?;
    fieldledger_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    fieldledger_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Services ---
    let store: Arc<dyn TenantScopedStore> = Arc::new(SqliteStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(bus.subscribe()));

    let ledger = Arc::new(AuditLedger::new(
        Arc::clone(&store),
        clock.clone(),
        Arc::clone(&bus),
        limits.append_retries,
    ));
    let queue = OperationQueue::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&bus),
        clock,
        limits,
    );

    // --- Audit ---
    let tenants = store.list_tenants().await.context("Failed to list tenants")?;
    tracing::info!(tenants = tenants.len(), "Auditing device database");

    let mut broken = Vec::new();
    for tenant_id in &tenants {
        let verification = ledger
            .verify(tenant_id)
            .await
            .with_context(|| format!("Failed to verify ledger for tenant '{tenant_id}'"))?;
        if verification.intact {
            tracing::info!(
                tenant_id,
                entries = verification.verified_entries,
                tail = %verification.tail_digest,
                "Ledger intact"
            );
        } else {
            broken.push(tenant_id.clone());
        }

        let pending = queue.count_pending(tenant_id).await?;
        let oldest_hours = queue
            .oldest_pending_age(tenant_id)
            .await?
            .map(|age| age.num_hours());
        let conflicted = queue.list_conflicted(tenant_id).await?.len();
        let exhausted = queue.list_exhausted(tenant_id).await?.len();
        tracing::info!(
            tenant_id,
            pending,
            oldest_hours,
            conflicted,
            exhausted,
            "Queue health"
        );
    }

    // Closing the bus lets the logger drain and exit.
    drop(queue);
    drop(ledger);
    drop(bus);
    let _ = logger_handle.await;
    pool.close().await;

    if !broken.is_empty() {
        anyhow::bail!("Ledger integrity broken for tenant(s): {}", broken.join(", "));
    }
    tracing::info!("Audit complete");
    Ok(())
}
