// crates/steward-core/src/runtime/stores.rs
// ============================================================================
// Module: Steward In-Memory Stores
// Description: Deterministic in-memory store implementations.
// Purpose: Provide reference semantics for every store seam without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! These mutex-protected implementations back tests and local demos, and
//! serve as the reference semantics for conditional writes: non-exists
//! guards, first-writer-wins reservations, TTL reclaim, and the atomic
//! coupling of signal rows with the lifecycle read-model. They are not
//! intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AccountId;
use crate::core::AccountState;
use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActionOutcome;
use crate::core::AuditExportRecord;
use crate::core::CompensationStatus;
use crate::core::ConnectorId;
use crate::core::DecisionRunState;
use crate::core::EventEnvelope;
use crate::core::EvidenceRef;
use crate::core::EvidenceSnapshot;
use crate::core::ExecutionAttempt;
use crate::core::ExportJobId;
use crate::core::HashDigest;
use crate::core::HeatState;
use crate::core::LedgerEntry;
use crate::core::PostureRecord;
use crate::core::Signal;
use crate::core::SignalId;
use crate::core::SignalStatus;
use crate::core::SuppressionMeta;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::ToolInvocationResponse;
use crate::core::TraceId;
use crate::core::evidence_object_key;
use crate::core::verify_evidence_payload;
use crate::interfaces::AccountStateStore;
use crate::interfaces::ArtifactStore;
use crate::interfaces::AttemptLock;
use crate::interfaces::AttemptStore;
use crate::interfaces::AuditExportStore;
use crate::interfaces::BudgetConsume;
use crate::interfaces::BudgetScope;
use crate::interfaces::BudgetStore;
use crate::interfaces::BusError;
use crate::interfaces::DecisionRunStore;
use crate::interfaces::DedupeReservation;
use crate::interfaces::DedupeStore;
use crate::interfaces::EventBus;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;
use crate::interfaces::HeatStore;
use crate::interfaces::IdempotencyStore;
use crate::interfaces::IntentStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::OutcomeStore;
use crate::interfaces::PostureStore;
use crate::interfaces::Reservation;
use crate::interfaces::SignalStore;
use crate::interfaces::SignalWrite;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Lock Helper
// ============================================================================

/// Locks a mutex, mapping poisoning into a store error.
fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Store("store mutex poisoned".to_string()))
}

// ============================================================================
// SECTION: Perception Store
// ============================================================================

/// Inner state for the perception store.
#[derive(Debug, Default)]
struct PerceptionInner {
    /// Signal rows keyed by (tenant, signal id).
    signals: BTreeMap<(String, String), Signal>,
    /// Dedupe index keyed by (tenant, dedupe digest).
    dedupe: BTreeMap<(String, String), SignalId>,
    /// Lifecycle read-models keyed by (tenant, account).
    accounts: BTreeMap<(String, String), AccountState>,
}

/// In-memory signal and read-model store with transactional coupling.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPerceptionStore {
    /// Signals, dedupe index, and accounts under one mutex.
    inner: Arc<Mutex<PerceptionInner>>,
}

impl InMemoryPerceptionStore {
    /// Creates an empty perception store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalStore for InMemoryPerceptionStore {
    fn insert_signal_with_state(
        &self,
        signal: &Signal,
        state: &AccountState,
    ) -> Result<SignalWrite, StoreError> {
        let mut inner = lock(&self.inner)?;
        let key = (signal.tenant_id.as_str().to_string(), signal.signal_id.as_str().to_string());
        if let Some(existing) = inner.signals.get(&key) {
            return Ok(SignalWrite::Duplicate(Box::new(existing.clone())));
        }
        inner.signals.insert(key, signal.clone());
        inner.dedupe.insert(
            (signal.tenant_id.as_str().to_string(), signal.dedupe_key.value.clone()),
            signal.signal_id.clone(),
        );
        inner.accounts.insert(
            (state.tenant_id.as_str().to_string(), state.account_id.as_str().to_string()),
            state.clone(),
        );
        Ok(SignalWrite::Inserted)
    }

    fn insert_execution_signal(&self, signal: &Signal) -> Result<SignalWrite, StoreError> {
        let mut inner = lock(&self.inner)?;
        let key = (signal.tenant_id.as_str().to_string(), signal.signal_id.as_str().to_string());
        if let Some(existing) = inner.signals.get(&key) {
            return Ok(SignalWrite::Duplicate(Box::new(existing.clone())));
        }
        inner.signals.insert(key, signal.clone());
        inner.dedupe.insert(
            (signal.tenant_id.as_str().to_string(), signal.dedupe_key.value.clone()),
            signal.signal_id.clone(),
        );
        Ok(SignalWrite::Inserted)
    }

    fn update_status_with_state(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        status: SignalStatus,
        suppression: Option<&SuppressionMeta>,
        state: &AccountState,
    ) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner)?;
        let key = (tenant_id.as_str().to_string(), signal_id.as_str().to_string());
        let Some(signal) = inner.signals.get_mut(&key) else {
            return Err(StoreError::Invalid(format!("signal not found: {signal_id}")));
        };
        signal.status = status;
        signal.suppression = suppression.cloned();
        inner.accounts.insert(
            (state.tenant_id.as_str().to_string(), state.account_id.as_str().to_string()),
            state.clone(),
        );
        Ok(())
    }

    fn get_signal(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
    ) -> Result<Option<Signal>, StoreError> {
        let inner = lock(&self.inner)?;
        Ok(inner
            .signals
            .get(&(tenant_id.as_str().to_string(), signal_id.as_str().to_string()))
            .cloned())
    }

    fn find_by_dedupe_key(
        &self,
        tenant_id: &TenantId,
        dedupe_key: &HashDigest,
    ) -> Result<Option<Signal>, StoreError> {
        let inner = lock(&self.inner)?;
        let Some(signal_id) = inner
            .dedupe
            .get(&(tenant_id.as_str().to_string(), dedupe_key.value.clone()))
            .cloned()
        else {
            return Ok(None);
        };
        Ok(inner
            .signals
            .get(&(tenant_id.as_str().to_string(), signal_id.as_str().to_string()))
            .cloned())
    }

    fn signals_for_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Vec<Signal>, StoreError> {
        let inner = lock(&self.inner)?;
        Ok(inner
            .signals
            .values()
            .filter(|signal| {
                signal.tenant_id == *tenant_id && signal.account_id == *account_id
            })
            .cloned()
            .collect())
    }
}

impl AccountStateStore for InMemoryPerceptionStore {
    fn load_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<AccountState>, StoreError> {
        let inner = lock(&self.inner)?;
        Ok(inner
            .accounts
            .get(&(tenant_id.as_str().to_string(), account_id.as_str().to_string()))
            .cloned())
    }

    fn save_account(&self, state: &AccountState) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner)?;
        inner.accounts.insert(
            (state.tenant_id.as_str().to_string(), state.account_id.as_str().to_string()),
            state.clone(),
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: Posture and Heat Stores
// ============================================================================

/// In-memory posture store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPostureStore {
    /// Latest posture rows keyed by (tenant, account).
    rows: Arc<Mutex<BTreeMap<(String, String), PostureRecord>>>,
}

impl InMemoryPostureStore {
    /// Creates an empty posture store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostureStore for InMemoryPostureStore {
    fn save_posture(&self, record: &PostureRecord) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(
            (record.tenant_id.as_str().to_string(), record.account_id.as_str().to_string()),
            record.clone(),
        );
        Ok(())
    }

    fn load_posture(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<PostureRecord>, StoreError> {
        Ok(lock(&self.rows)?
            .get(&(tenant_id.as_str().to_string(), account_id.as_str().to_string()))
            .cloned())
    }
}

/// In-memory heat store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHeatStore {
    /// Latest heat rows keyed by (tenant, account).
    rows: Arc<Mutex<BTreeMap<(String, String), HeatState>>>,
}

impl InMemoryHeatStore {
    /// Creates an empty heat store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeatStore for InMemoryHeatStore {
    fn save_heat(&self, state: &HeatState) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(
            (state.tenant_id.as_str().to_string(), state.account_id.as_str().to_string()),
            state.clone(),
        );
        Ok(())
    }

    fn load_heat(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<HeatState>, StoreError> {
        Ok(lock(&self.rows)?
            .get(&(tenant_id.as_str().to_string(), account_id.as_str().to_string()))
            .cloned())
    }
}

// ============================================================================
// SECTION: Budget Store
// ============================================================================

/// Budget window counters.
#[derive(Debug, Default, Clone, Copy)]
struct BudgetRow {
    /// Units consumed within the window.
    units_consumed: u32,
    /// Consumptions recorded within the window.
    consume_count: u32,
}

/// In-memory budget store with atomic two-row consumption.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBudgetStore {
    /// Budget rows keyed by (scope, tenant, day, connector).
    rows: Arc<Mutex<BTreeMap<(String, String, i64, Option<String>), BudgetRow>>>,
}

impl InMemoryBudgetStore {
    /// Creates an empty budget store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BudgetStore for InMemoryBudgetStore {
    fn consume(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
        units: u32,
        tenant_cap: u32,
        connector: Option<(&ConnectorId, u32)>,
    ) -> Result<BudgetConsume, StoreError> {
        let mut rows = lock(&self.rows)?;
        let tenant_key =
            (scope.as_str().to_string(), tenant_id.as_str().to_string(), day_key, None);

        // Check the per-connector row first, then tenant-wide, under one lock.
        if let Some((connector_id, cap)) = connector {
            let connector_key = (
                scope.as_str().to_string(),
                tenant_id.as_str().to_string(),
                day_key,
                Some(connector_id.as_str().to_string()),
            );
            let consumed = rows.get(&connector_key).map_or(0, |row| row.units_consumed);
            if cap > 0 && consumed + units > cap {
                return Ok(BudgetConsume::Exceeded);
            }
            let tenant_consumed = rows.get(&tenant_key).map_or(0, |row| row.units_consumed);
            if tenant_cap > 0 && tenant_consumed + units > tenant_cap {
                return Ok(BudgetConsume::Exceeded);
            }
            let row = rows.entry(connector_key).or_default();
            row.units_consumed += units;
            row.consume_count += 1;
        } else {
            let tenant_consumed = rows.get(&tenant_key).map_or(0, |row| row.units_consumed);
            if tenant_cap > 0 && tenant_consumed + units > tenant_cap {
                return Ok(BudgetConsume::Exceeded);
            }
        }

        let row = rows.entry(tenant_key).or_default();
        row.units_consumed += units;
        row.consume_count += 1;
        let remaining = (tenant_cap > 0).then(|| tenant_cap - row.units_consumed);
        Ok(BudgetConsume::Consumed {
            tenant_remaining: remaining,
        })
    }

    fn consumed(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
    ) -> Result<u32, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows
            .get(&(scope.as_str().to_string(), tenant_id.as_str().to_string(), day_key, None))
            .map_or(0, |row| row.units_consumed))
    }
}

// ============================================================================
// SECTION: Idempotency Store
// ============================================================================

/// In-memory first-writer-wins reservation store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyStore {
    /// Reservations keyed by key with (reserved at, TTL hours).
    rows: Arc<Mutex<BTreeMap<String, (Timestamp, u32)>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty idempotency store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn reserve(
        &self,
        key: &str,
        now: Timestamp,
        ttl_hours: u32,
    ) -> Result<Reservation, StoreError> {
        let mut rows = lock(&self.rows)?;
        if let Some((reserved_at, ttl)) = rows.get(key) {
            let expires_at = reserved_at.plus_hours(i64::from(*ttl));
            if now < expires_at {
                return Ok(Reservation::Duplicate);
            }
        }
        rows.insert(key.to_string(), (now, ttl_hours));
        Ok(Reservation::Reserved)
    }
}

// ============================================================================
// SECTION: Attempt Store
// ============================================================================

/// In-memory attempt-lock store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAttemptStore {
    /// Locks keyed by (tenant, intent id).
    rows: Arc<Mutex<BTreeMap<(String, String), ExecutionAttempt>>>,
}

impl InMemoryAttemptStore {
    /// Creates an empty attempt store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn acquire(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<AttemptLock, StoreError> {
        let mut rows = lock(&self.rows)?;
        let key = (tenant_id.as_str().to_string(), action_intent_id.as_str().to_string());
        let attempt_count = match rows.get(&key) {
            Some(held) if now < held.expires_at => {
                return Ok(AttemptLock::Held(held.clone()));
            }
            Some(expired) => expired.attempt_count + 1,
            None => 1,
        };
        let attempt = ExecutionAttempt {
            action_intent_id: action_intent_id.clone(),
            tenant_id: tenant_id.clone(),
            attempt_count,
            started_at: now,
            expires_at,
        };
        rows.insert(key, attempt.clone());
        Ok(AttemptLock::Acquired(attempt))
    }

    fn release(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        if let Some(attempt) = rows
            .get_mut(&(tenant_id.as_str().to_string(), action_intent_id.as_str().to_string()))
        {
            attempt.expires_at = attempt.started_at;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: External-Write Dedupe Store
// ============================================================================

/// In-memory external-write dedupe store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDedupeStore {
    /// Reservations keyed by (tenant, digest); value holds the cached success.
    rows: Arc<Mutex<BTreeMap<(String, String), Option<ToolInvocationResponse>>>>,
}

impl InMemoryDedupeStore {
    /// Creates an empty dedupe store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupeStore for InMemoryDedupeStore {
    fn reserve_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
    ) -> Result<DedupeReservation, StoreError> {
        let mut rows = lock(&self.rows)?;
        let key = (tenant_id.as_str().to_string(), idempotency_key.value.clone());
        if let Some(Some(cached)) = rows.get(&key) {
            return Ok(DedupeReservation::Prior(Box::new(cached.clone())));
        }
        rows.insert(key, None);
        Ok(DedupeReservation::Reserved)
    }

    fn record_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
        response: &ToolInvocationResponse,
    ) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        rows.insert(
            (tenant_id.as_str().to_string(), idempotency_key.value.clone()),
            Some(response.clone()),
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: Intent, Outcome, and Decision Stores
// ============================================================================

/// In-memory action intent store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIntentStore {
    /// Intents keyed by (tenant, intent id).
    rows: Arc<Mutex<BTreeMap<(String, String), ActionIntent>>>,
}

impl InMemoryIntentStore {
    /// Creates an empty intent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntentStore for InMemoryIntentStore {
    fn load_intent(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionIntent>, StoreError> {
        Ok(lock(&self.rows)?
            .get(&(tenant_id.as_str().to_string(), action_intent_id.as_str().to_string()))
            .cloned())
    }

    fn save_intent(&self, intent: &ActionIntent) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(
            (
                intent.tenant_id.as_str().to_string(),
                intent.action_intent_id.as_str().to_string(),
            ),
            intent.clone(),
        );
        Ok(())
    }
}

/// In-memory action outcome store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutcomeStore {
    /// Latest outcomes keyed by (tenant, intent id).
    rows: Arc<Mutex<BTreeMap<(String, String), ActionOutcome>>>,
}

impl InMemoryOutcomeStore {
    /// Creates an empty outcome store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeStore for InMemoryOutcomeStore {
    fn save_outcome(&self, outcome: &ActionOutcome) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(
            (
                outcome.tenant_id.as_str().to_string(),
                outcome.action_intent_id.as_str().to_string(),
            ),
            outcome.clone(),
        );
        Ok(())
    }

    fn load_outcome(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionOutcome>, StoreError> {
        Ok(lock(&self.rows)?
            .get(&(tenant_id.as_str().to_string(), action_intent_id.as_str().to_string()))
            .cloned())
    }

    fn update_compensation(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        status: CompensationStatus,
    ) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        let Some(outcome) = rows
            .get_mut(&(tenant_id.as_str().to_string(), action_intent_id.as_str().to_string()))
        else {
            return Err(StoreError::Invalid(format!("outcome not found: {action_intent_id}")));
        };
        outcome.compensation_status = status;
        Ok(())
    }
}

/// In-memory decision run state store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDecisionRunStore {
    /// Run states keyed by (tenant, account, day).
    rows: Arc<Mutex<BTreeMap<(String, String, i64), DecisionRunState>>>,
}

impl InMemoryDecisionRunStore {
    /// Creates an empty decision run store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionRunStore for InMemoryDecisionRunStore {
    fn load_run_state(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        day_key: i64,
    ) -> Result<Option<DecisionRunState>, StoreError> {
        Ok(lock(&self.rows)?
            .get(&(
                tenant_id.as_str().to_string(),
                account_id.as_str().to_string(),
                day_key,
            ))
            .cloned())
    }

    fn save_run_state(&self, state: &DecisionRunState) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(
            (
                state.tenant_id.as_str().to_string(),
                state.account_id.as_str().to_string(),
                state.day_key,
            ),
            state.clone(),
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: Ledger Store
// ============================================================================

/// In-memory append-only ledger.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    /// Entries keyed by (partition key, sort key).
    rows: Arc<Mutex<BTreeMap<(String, String), LedgerEntry>>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map_or(0, |rows| rows.len())
    }

    /// Returns true when the ledger holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, entry: &LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| LedgerError::WriteFailed("ledger mutex poisoned".to_string()))?;
        let key = (entry.partition_key.clone(), entry.sort_key.clone());
        if let Some(existing) = rows.get(&key) {
            return Ok(existing.clone());
        }
        rows.insert(key, entry.clone());
        Ok(entry.clone())
    }

    fn by_trace(&self, trace_id: &TraceId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.by_plan(trace_id.as_str())
    }

    fn by_account_time_range(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| LedgerError::ReadFailed("ledger mutex poisoned".to_string()))?;
        Ok(rows
            .values()
            .filter(|entry| {
                entry.tenant_id == *tenant_id
                    && entry.account_id == *account_id
                    && entry.event_time >= from
                    && entry.event_time <= to
            })
            .cloned()
            .collect())
    }

    fn by_plan(&self, plan_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| LedgerError::ReadFailed("ledger mutex poisoned".to_string()))?;
        Ok(rows
            .iter()
            .filter(|((partition, _), _)| partition == plan_id)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// In-memory content-addressed evidence store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEvidenceStore {
    /// Snapshots keyed by object URI.
    rows: Arc<Mutex<BTreeMap<String, EvidenceSnapshot>>>,
}

impl InMemoryEvidenceStore {
    /// Creates an empty evidence store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn store_snapshot(
        &self,
        snapshot: &EvidenceSnapshot,
    ) -> Result<EvidenceRef, EvidenceStoreError> {
        let digest = snapshot
            .content_hash()
            .map_err(|err| EvidenceStoreError::Io(err.to_string()))?;
        let uri = format!("mem://{}", evidence_object_key(&snapshot.entity, &snapshot.evidence_id));
        self.rows
            .lock()
            .map_err(|_| EvidenceStoreError::Io("evidence mutex poisoned".to_string()))?
            .insert(uri.clone(), snapshot.clone());
        Ok(EvidenceRef {
            uri,
            sha256: digest,
            captured_at: snapshot.captured_at,
            schema_version: snapshot.schema_version,
            detector_input_version: snapshot.detector_input_version,
        })
    }

    fn fetch_snapshot(
        &self,
        reference: &EvidenceRef,
    ) -> Result<EvidenceSnapshot, EvidenceStoreError> {
        if reference.is_execution_ref() {
            return Err(EvidenceStoreError::NotFetchable(reference.uri.clone()));
        }
        let snapshot = self
            .rows
            .lock()
            .map_err(|_| EvidenceStoreError::Io("evidence mutex poisoned".to_string()))?
            .get(&reference.uri)
            .cloned()
            .ok_or_else(|| EvidenceStoreError::Missing(reference.uri.clone()))?;
        verify_evidence_payload(reference, &snapshot.payload)
            .map_err(|err| EvidenceStoreError::Integrity(err.to_string()))?;
        Ok(snapshot)
    }
}

// ============================================================================
// SECTION: Artifact and Export Stores
// ============================================================================

/// In-memory artifact store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactStore {
    /// Artifacts keyed by object key.
    rows: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty artifact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put_artifact(&self, key: &str, bytes: &[u8]) -> Result<String, StoreError> {
        lock(&self.rows)?.insert(key.to_string(), bytes.to_vec());
        Ok(format!("mem://artifacts/{key}"))
    }

    fn get_artifact(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        lock(&self.rows)?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Invalid(format!("artifact not found: {key}")))
    }
}

/// In-memory audit export store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditExportStore {
    /// Export records keyed by job id.
    rows: Arc<Mutex<BTreeMap<String, AuditExportRecord>>>,
}

impl InMemoryAuditExportStore {
    /// Creates an empty export store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditExportStore for InMemoryAuditExportStore {
    fn save_export(&self, record: &AuditExportRecord) -> Result<(), StoreError> {
        lock(&self.rows)?.insert(record.export_job_id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn load_export(
        &self,
        export_job_id: &ExportJobId,
    ) -> Result<Option<AuditExportRecord>, StoreError> {
        Ok(lock(&self.rows)?.get(export_job_id.as_str()).cloned())
    }
}

// ============================================================================
// SECTION: Recording Event Bus
// ============================================================================

/// Event bus that records emitted envelopes for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventBus {
    /// Emitted envelopes in order.
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl RecordingEventBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the emitted envelopes.
    #[must_use]
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().map_or_else(|_| Vec::new(), |events| events.clone())
    }
}

impl EventBus for RecordingEventBus {
    fn emit(&self, envelope: &EventEnvelope) -> Result<(), BusError> {
        self.events
            .lock()
            .map_err(|_| BusError::EmitFailed("bus mutex poisoned".to_string()))?
            .push(envelope.clone());
        Ok(())
    }
}
