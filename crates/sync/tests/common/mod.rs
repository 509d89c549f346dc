#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fieldledger_core::clock::ManualClock;
use fieldledger_core::config::SyncLimits;
use fieldledger_core::conflict::ServerState;
use fieldledger_core::operation::{NewOperation, OfflineOperation};
use fieldledger_core::types::Timestamp;
use fieldledger_db::MemoryStore;
use fieldledger_sync::{
    ApplyOutcome, ManualConnectivity, OfflineContext, RemoteEndpoint, RemoteError,
};
use serde_json::{Map, Value};
use tokio::sync::Notify;

type Target = (String, String, String);

/// In-memory remote. Unknown targets exist with no fields.
#[derive(Default)]
pub struct FakeRemote {
    states: Mutex<HashMap<Target, ServerState>>,
    applied: Mutex<Vec<OfflineOperation>>,
    failing: AtomicBool,
    reject: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    fetches: AtomicUsize,
}

impl FakeRemote {
    pub fn set_state(&self, tenant_id: &str, entity: &str, entity_id: &str, state: Value) {
        let fields = state.as_object().cloned().unwrap_or_default();
        self.states.lock().unwrap().insert(
            (tenant_id.into(), entity.into(), entity_id.into()),
            ServerState::Current(fields),
        );
    }

    pub fn delete(&self, tenant_id: &str, entity: &str, entity_id: &str) {
        self.states.lock().unwrap().insert(
            (tenant_id.into(), entity.into(), entity_id.into()),
            ServerState::Gone,
        );
    }

    pub fn state(&self, tenant_id: &str, entity: &str, entity_id: &str) -> Option<ServerState> {
        self.states
            .lock()
            .unwrap()
            .get(&(tenant_id.into(), entity.into(), entity_id.into()))
            .cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reject_with(&self, reason: Option<&str>) {
        *self.reject.lock().unwrap() = reason.map(str::to_string);
    }

    /// Hold every fetch until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Stop holding fetches. Fetches already waiting stay parked.
    pub fn release(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn applied(&self) -> Vec<OfflineOperation> {
        self.applied.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteEndpoint for FakeRemote {
    async fn fetch_current_state(
        &self,
        tenant_id: &str,
        entity: &str,
        entity_id: &str,
    ) -> Result<ServerState, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        Ok(self
            .state(tenant_id, entity, entity_id)
            .unwrap_or_else(|| ServerState::Current(Map::new())))
    }

    async fn apply(&self, op: &OfflineOperation) -> Result<ApplyOutcome, RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Ok(ApplyOutcome::Rejected { reason });
        }

        let key = (op.tenant_id().to_string(), op.entity.clone(), op.entity_id.clone());
        let mut states = self.states.lock().unwrap();
        let mut fields = match states.get(&key) {
            Some(ServerState::Current(fields)) => fields.clone(),
            _ => Map::new(),
        };
        if let Some(payload) = op.payload.as_object() {
            fields.extend(payload.clone());
        }
        states.insert(key, ServerState::Current(fields));
        self.applied.lock().unwrap().push(op.clone());
        Ok(ApplyOutcome::Applied)
    }
}

pub struct Harness {
    pub ctx: OfflineContext,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<FakeRemote>,
    pub connectivity: Arc<ManualConnectivity>,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 29, 8, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(SyncLimits::default())
}

pub fn harness_with(limits: SyncLimits) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::default());
    let connectivity = Arc::new(ManualConnectivity::new(true));
    let clock = Arc::new(ManualClock::new(start_time()));
    let ctx = OfflineContext::new(
        store.clone(),
        remote.clone(),
        connectivity.clone(),
        clock.clone(),
        limits,
    );
    Harness {
        ctx,
        store,
        remote,
        connectivity,
        clock,
    }
}

/// A job operation by actor `u1`.
pub fn job_op(tenant_id: &str, action: &str, job_id: &str, payload: Value) -> NewOperation {
    NewOperation::new(tenant_id, "u1", action, "job", job_id, payload)
}
