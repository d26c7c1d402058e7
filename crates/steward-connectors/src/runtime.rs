// crates/steward-connectors/src/runtime.rs
// ============================================================================
// Module: Steward Connector Runtime
// Description: Pull-job execution over registered connectors.
// Purpose: Capture content-addressed evidence with atomic sync-state advance.
// Dependencies: crate::{connector, rate_limit}, steward-core, serde_json
// ============================================================================

//! ## Overview
//! The runtime executes pull jobs: it consults the token bucket before the
//! outward call, connects, polls, writes every new record as a
//! content-addressed snapshot, and only then persists the advanced sync
//! state. Poll failures emit `CONNECTOR_POLL_FAILED` and leave sync state
//! untouched, so no delta is lost. Evidence identifiers derive from payload
//! content, making re-captures idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::json;
use steward_core::AccountId;
use steward_core::Classified;
use steward_core::Clock;
use steward_core::ConnectorId;
use steward_core::ErrorKind;
use steward_core::EventEnvelope;
use steward_core::EventKind;
use steward_core::EvidenceId;
use steward_core::EvidenceRef;
use steward_core::EvidenceSnapshot;
use steward_core::PullJob;
use steward_core::TenantId;
use steward_core::interfaces::BusError;
use steward_core::interfaces::EventBus;
use steward_core::interfaces::EvidenceStore;
use steward_core::interfaces::EvidenceStoreError;
use steward_core::interfaces::StoreError;
use thiserror::Error;

use crate::connector::Connector;
use crate::connector::ConnectorError;
use crate::connector::ConnectorRecord;
use crate::connector::SyncState;
use crate::connector::SyncStateStore;
use crate::rate_limit::TokenBucket;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Connector runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No connector registered under the requested identifier.
    #[error("unknown connector: {0}")]
    UnknownConnector(String),
    /// Connector call failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    /// Evidence write failed.
    #[error(transparent)]
    Evidence(#[from] EvidenceStoreError),
    /// Sync-state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Event emission failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl Classified for RuntimeError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownConnector(_) => ErrorKind::Config,
            Self::Connector(inner) => inner.kind(),
            Self::Evidence(inner) => inner.kind(),
            Self::Store(inner) => inner.kind(),
            Self::Bus(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: In-Memory Sync State Store
// ============================================================================

/// In-memory sync state store for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct InMemorySyncStateStore {
    /// Sync states keyed by (tenant, connector, account).
    rows: Arc<Mutex<BTreeMap<(String, String, String), SyncState>>>,
}

impl InMemorySyncStateStore {
    /// Creates an empty sync state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStateStore for InMemorySyncStateStore {
    fn load_sync_state(
        &self,
        tenant_id: &TenantId,
        connector_id: &ConnectorId,
        account_id: &AccountId,
    ) -> Result<Option<SyncState>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Store("sync state mutex poisoned".to_string()))?;
        Ok(rows
            .get(&(
                tenant_id.as_str().to_string(),
                connector_id.as_str().to_string(),
                account_id.as_str().to_string(),
            ))
            .cloned())
    }

    fn save_sync_state(
        &self,
        tenant_id: &TenantId,
        connector_id: &ConnectorId,
        account_id: &AccountId,
        state: &SyncState,
    ) -> Result<(), StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Store("sync state mutex poisoned".to_string()))?
            .insert(
                (
                    tenant_id.as_str().to_string(),
                    connector_id.as_str().to_string(),
                    account_id.as_str().to_string(),
                ),
                state.clone(),
            );
        Ok(())
    }
}

// ============================================================================
// SECTION: Connector Runtime
// ============================================================================

/// Pull-job executor over registered connectors.
pub struct ConnectorRuntime {
    /// Registered connectors keyed by identifier.
    connectors: BTreeMap<ConnectorId, Arc<dyn Connector>>,
    /// Per-connector token buckets.
    limiters: BTreeMap<ConnectorId, TokenBucket>,
    /// Sync-state persistence.
    sync_states: Arc<dyn SyncStateStore>,
    /// Evidence store.
    evidence: Arc<dyn EvidenceStore + Send + Sync>,
    /// Event bus.
    bus: Arc<dyn EventBus + Send + Sync>,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl ConnectorRuntime {
    /// Creates a runtime with no connectors registered.
    #[must_use]
    pub fn new(
        sync_states: Arc<dyn SyncStateStore>,
        evidence: Arc<dyn EvidenceStore + Send + Sync>,
        bus: Arc<dyn EventBus + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            connectors: BTreeMap::new(),
            limiters: BTreeMap::new(),
            sync_states,
            evidence,
            bus,
            clock,
        }
    }

    /// Registers a connector with its rate limit.
    #[must_use]
    pub fn with_connector(
        mut self,
        connector: impl Connector + 'static,
        requests_per_minute: u32,
        burst: u32,
    ) -> Self {
        let connector_id = connector.connector_id();
        self.limiters.insert(
            connector_id.clone(),
            TokenBucket::new(requests_per_minute, burst, self.clock.now()),
        );
        self.connectors.insert(connector_id, Arc::new(connector));
        self
    }

    /// Executes a pull job, returning the emitted evidence refs.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] on connector, store, or bus failures; poll
    /// failures are ledgered to the bus before returning.
    pub fn run_pull(&self, job: &PullJob) -> Result<Vec<EvidenceRef>, RuntimeError> {
        let connector = self
            .connectors
            .get(&job.connector_id)
            .ok_or_else(|| RuntimeError::UnknownConnector(job.connector_id.to_string()))?;

        let now = self.clock.now();
        let admitted = self
            .limiters
            .get(&job.connector_id)
            .is_none_or(|limiter| limiter.try_acquire(now));
        if !admitted {
            return Err(RuntimeError::Connector(ConnectorError::RateLimited(
                job.connector_id.to_string(),
            )));
        }

        let state = self
            .sync_states
            .load_sync_state(&job.tenant_id, &job.connector_id, &job.account_id)?
            .unwrap_or_default();

        connector.connect(&job.tenant_id)?;
        let batch =
            match connector.poll(&job.tenant_id, &job.account_id, job.depth, &state) {
                Ok(batch) => batch,
                Err(err) => {
                    self.emit_poll_failed(job, &err)?;
                    let _ = connector.disconnect(&job.tenant_id);
                    return Err(RuntimeError::Connector(err));
                }
            };

        let mut refs = Vec::with_capacity(batch.records.len());
        for record in &batch.records {
            refs.push(self.capture(job, record)?);
        }

        // Sync state advances only after the whole batch was emitted.
        self.sync_states.save_sync_state(
            &job.tenant_id,
            &job.connector_id,
            &job.account_id,
            &batch.next_state,
        )?;

        self.bus.emit(
            &EventEnvelope::new(
                EventKind::ConnectorPollCompleted,
                self.clock.now(),
                json!({
                    "tenant_id": job.tenant_id.as_str(),
                    "account_id": job.account_id.as_str(),
                    "connector_id": job.connector_id.as_str(),
                    "pull_job_id": job.pull_job_id.as_str(),
                    "snapshot_count": refs.len(),
                }),
            )
            .with_correlation(job.correlation_id.clone()),
        )?;
        connector.disconnect(&job.tenant_id)?;
        Ok(refs)
    }

    /// Writes one record as a content-addressed snapshot.
    fn capture(
        &self,
        job: &PullJob,
        record: &ConnectorRecord,
    ) -> Result<EvidenceRef, RuntimeError> {
        let snapshot = EvidenceSnapshot {
            evidence_id: EvidenceId::new("pending"),
            tenant_id: job.tenant_id.clone(),
            entity: record.entity.clone(),
            schema_version: record.schema_version,
            detector_input_version: record.detector_input_version,
            captured_at: self.clock.now(),
            payload: record.payload.clone(),
        };
        let digest = snapshot
            .content_hash()
            .map_err(|err| RuntimeError::Evidence(EvidenceStoreError::Io(err.to_string())))?;
        let evidence_id: String = digest.value.chars().take(24).collect();
        let snapshot = EvidenceSnapshot {
            evidence_id: EvidenceId::new(evidence_id),
            ..snapshot
        };
        Ok(self.evidence.store_snapshot(&snapshot)?)
    }

    /// Emits a poll-failure event.
    fn emit_poll_failed(&self, job: &PullJob, err: &ConnectorError) -> Result<(), RuntimeError> {
        self.bus.emit(
            &EventEnvelope::new(
                EventKind::ConnectorPollFailed,
                self.clock.now(),
                json!({
                    "tenant_id": job.tenant_id.as_str(),
                    "account_id": job.account_id.as_str(),
                    "connector_id": job.connector_id.as_str(),
                    "pull_job_id": job.pull_job_id.as_str(),
                    "error_kind": err.kind(),
                    "message": err.to_string(),
                }),
            )
            .with_correlation(job.correlation_id.clone()),
        )?;
        Ok(())
    }
}
