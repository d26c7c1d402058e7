// crates/steward-core/src/interfaces/mod.rs
// ============================================================================
// Module: Steward Interfaces
// Description: Backend-agnostic interfaces for stores, bus, evidence, and tools.
// Purpose: Define the contract surfaces used by the Steward runtimes.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Steward integrates with persistent stores, the event
//! bus, the object store, and the tool gateway without embedding backend
//! details. Implementations must be deterministic where the contract demands
//! it and fail closed on missing or invalid data. Conditional-write races
//! surface as structured outcomes, never as errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::AccountState;
use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActionOutcome;
use crate::core::AuditExportRecord;
use crate::core::Classified;
use crate::core::CompensationStatus;
use crate::core::ConnectorId;
use crate::core::DecisionRunState;
use crate::core::ErrorKind;
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
use crate::core::ToolName;
use crate::core::TraceId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Store errors shared by every persistence seam.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

impl Classified for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Store(_) => ErrorKind::Internal,
            Self::Corrupt(_) | Self::VersionMismatch(_) => ErrorKind::Invariant,
            Self::Invalid(_) => ErrorKind::Validation,
        }
    }
}

// ============================================================================
// SECTION: Signal Store
// ============================================================================

/// Result of a conditional signal insert.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalWrite {
    /// The signal row was inserted.
    Inserted,
    /// A row with the same identity already exists; returned idempotently.
    Duplicate(Box<Signal>),
}

/// Persistence seam for signals and the lifecycle read-model.
///
/// Implementations must apply `insert_signal_with_state` and
/// `update_status_with_state` atomically: readers observe the signal write
/// and the account-state write together or neither.
pub trait SignalStore {
    /// Inserts a signal and the updated read-model in one transaction.
    ///
    /// The insert is guarded on `signal_id` non-existence. A duplicate
    /// resolves to the stored row and leaves the read-model untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails for any reason
    /// other than the existence guard.
    fn insert_signal_with_state(
        &self,
        signal: &Signal,
        state: &AccountState,
    ) -> Result<SignalWrite, StoreError>;

    /// Inserts an execution-outcome signal without touching the read-model.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails beyond the guard.
    fn insert_execution_signal(&self, signal: &Signal) -> Result<SignalWrite, StoreError>;

    /// Updates a signal status and the read-model in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the signal is missing or the write fails.
    fn update_status_with_state(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        status: SignalStatus,
        suppression: Option<&SuppressionMeta>,
        state: &AccountState,
    ) -> Result<(), StoreError>;

    /// Loads a signal by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_signal(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
    ) -> Result<Option<Signal>, StoreError>;

    /// Resolves a dedupe key to the original signal, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_by_dedupe_key(
        &self,
        tenant_id: &TenantId,
        dedupe_key: &HashDigest,
    ) -> Result<Option<Signal>, StoreError>;

    /// Returns all signals for an account ordered by creation time descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn signals_for_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Vec<Signal>, StoreError>;
}

// ============================================================================
// SECTION: Account State Store
// ============================================================================

/// Persistence seam for the lifecycle read-model.
pub trait AccountStateStore {
    /// Loads the read-model for an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<AccountState>, StoreError>;

    /// Saves the read-model outside the signal transaction.
    ///
    /// Used only for fields owned by collaborators (contract flag); all
    /// signal-coupled updates go through [`SignalStore`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_account(&self, state: &AccountState) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Posture and Heat Stores
// ============================================================================

/// Persistence seam for posture records.
pub trait PostureStore {
    /// Saves a posture record as the latest row for the account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_posture(&self, record: &PostureRecord) -> Result<(), StoreError>;

    /// Loads the latest posture record for an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_posture(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<PostureRecord>, StoreError>;
}

/// Persistence seam for heat state.
pub trait HeatStore {
    /// Saves the latest heat row for an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_heat(&self, state: &HeatState) -> Result<(), StoreError>;

    /// Loads the latest heat row for an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_heat(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<HeatState>, StoreError>;
}

// ============================================================================
// SECTION: Budget Store
// ============================================================================

/// Budget scope separating independent daily windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetScope {
    /// Connector pull units.
    Pull,
    /// Decision runs.
    Decision,
    /// Autonomy auto-approved actions.
    Autonomy,
}

impl BudgetScope {
    /// Returns the stable key segment for the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Decision => "decision",
            Self::Autonomy => "autonomy",
        }
    }
}

/// Result of an atomic budget consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetConsume {
    /// Units were consumed.
    Consumed {
        /// Tenant-wide units remaining after consumption, when capped.
        tenant_remaining: Option<u32>,
    },
    /// Consumption would exceed a cap; nothing was consumed.
    Exceeded,
}

/// Persistence seam for atomic daily budget consumption.
///
/// When both a tenant-wide and a per-connector cap are supplied, the
/// implementation must consume both rows in one transaction (per-connector
/// first) or consume neither.
pub trait BudgetStore {
    /// Atomically consumes `units` from the scoped daily window.
    ///
    /// A cap of zero disables the corresponding limit. Exceeding any supplied
    /// cap consumes nothing and reports [`BudgetConsume::Exceeded`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails beyond the
    /// conditional check.
    fn consume(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
        units: u32,
        tenant_cap: u32,
        connector: Option<(&ConnectorId, u32)>,
    ) -> Result<BudgetConsume, StoreError>;

    /// Returns the units consumed in the scoped tenant-wide window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn consumed(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
    ) -> Result<u32, StoreError>;
}

// ============================================================================
// SECTION: Idempotency Store
// ============================================================================

/// Result of an idempotency reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The key was reserved by this caller.
    Reserved,
    /// The key is already held and its TTL has not elapsed.
    Duplicate,
}

/// Persistence seam for first-writer-wins reservations with TTL reclaim.
pub trait IdempotencyStore {
    /// Reserves a key; duplicates within the TTL lose.
    ///
    /// An expired reservation may be reclaimed by a new caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails beyond the guard.
    fn reserve(
        &self,
        key: &str,
        now: Timestamp,
        ttl_hours: u32,
    ) -> Result<Reservation, StoreError>;
}

// ============================================================================
// SECTION: Attempt Store
// ============================================================================

/// Result of an attempt-lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptLock {
    /// The lock was acquired with the stored attempt row.
    Acquired(ExecutionAttempt),
    /// A live lock is held by another execution.
    Held(ExecutionAttempt),
}

/// Persistence seam for per-intent execution locks.
pub trait AttemptStore {
    /// Acquires the execution lock for an intent.
    ///
    /// The insert is guarded on `action_intent_id` non-existence; an expired
    /// lock is replaced with an incremented attempt counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails beyond the guard.
    fn acquire(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<AttemptLock, StoreError>;

    /// Releases the lock after a terminal outcome is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn release(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: External-Write Dedupe Store
// ============================================================================

/// Result of an external-write dedupe reservation.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupeReservation {
    /// The key was reserved; the adapter may perform the write.
    Reserved,
    /// A prior successful write exists; its cached outcome is returned.
    Prior(Box<ToolInvocationResponse>),
}

/// Persistence seam preventing duplicate external writes on retry.
pub trait DedupeStore {
    /// Reserves an external-write idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails beyond the guard.
    fn reserve_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
    ) -> Result<DedupeReservation, StoreError>;

    /// Records the successful outcome for a reserved key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn record_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
        response: &ToolInvocationResponse,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Outcome and Decision Stores
// ============================================================================

/// Persistence seam for action intents.
pub trait IntentStore {
    /// Loads an intent by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_intent(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionIntent>, StoreError>;

    /// Saves an intent row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_intent(&self, intent: &ActionIntent) -> Result<(), StoreError>;
}

/// Persistence seam for terminal action outcomes.
pub trait OutcomeStore {
    /// Saves a terminal outcome row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_outcome(&self, outcome: &ActionOutcome) -> Result<(), StoreError>;

    /// Loads the latest outcome for an intent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_outcome(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionOutcome>, StoreError>;

    /// Updates the compensation status of an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the outcome is missing or the write fails.
    fn update_compensation(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        status: CompensationStatus,
    ) -> Result<(), StoreError>;
}

/// Persistence seam for decision run state.
pub trait DecisionRunStore {
    /// Loads the run state for an account window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_run_state(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        day_key: i64,
    ) -> Result<Option<DecisionRunState>, StoreError>;

    /// Saves the run state for an account window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_run_state(&self, state: &DecisionRunState) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Ledger Store
// ============================================================================

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger write failed.
    #[error("ledger write failed: {0}")]
    WriteFailed(String),
    /// Ledger read failed.
    #[error("ledger read failed: {0}")]
    ReadFailed(String),
}

impl Classified for LedgerError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Append-only ledger seam.
///
/// Appends are guarded on sort-key uniqueness; a duplicate returns the
/// existing entry rather than an error. No updates, no deletes.
pub trait LedgerStore {
    /// Appends an entry, returning the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::WriteFailed`] for any failure other than the
    /// uniqueness guard; guard rejections return the existing entry.
    fn append(&self, entry: &LedgerEntry) -> Result<LedgerEntry, LedgerError>;

    /// Returns entries for a trace in sort-key order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReadFailed`] when the query fails.
    fn by_trace(&self, trace_id: &TraceId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Returns entries for an account within a time range.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReadFailed`] when the query fails.
    fn by_account_time_range(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Returns entries for a plan partition in sort-key order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReadFailed`] when the query fails.
    fn by_plan(&self, plan_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;
}

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// Evidence store errors.
#[derive(Debug, Error)]
pub enum EvidenceStoreError {
    /// Object store I/O failed.
    #[error("evidence store io error: {0}")]
    Io(String),
    /// Stored payload failed integrity verification.
    #[error("evidence integrity failure: {0}")]
    Integrity(String),
    /// Reference is not fetchable (synthetic scheme).
    #[error("evidence ref is not fetchable: {0}")]
    NotFetchable(String),
    /// Referenced object is missing.
    #[error("evidence object missing: {0}")]
    Missing(String),
}

impl Classified for EvidenceStoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Internal,
            Self::Integrity(_) | Self::NotFetchable(_) => ErrorKind::Invariant,
            Self::Missing(_) => ErrorKind::Validation,
        }
    }
}

/// Content-addressed evidence store seam.
pub trait EvidenceStore {
    /// Stores a snapshot and returns its content-addressed reference.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError`] when hashing or the write fails.
    fn store_snapshot(&self, snapshot: &EvidenceSnapshot)
    -> Result<EvidenceRef, EvidenceStoreError>;

    /// Fetches and verifies a snapshot by reference.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError::Integrity`] on digest mismatch and
    /// [`EvidenceStoreError::NotFetchable`] for `execution://` refs.
    fn fetch_snapshot(
        &self,
        reference: &EvidenceRef,
    ) -> Result<EvidenceSnapshot, EvidenceStoreError>;
}

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Object-store seam for export and execution artifacts.
pub trait ArtifactStore {
    /// Writes an artifact and returns its object-store URI.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_artifact(&self, key: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Reads an artifact by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the artifact is missing or the read fails.
    fn get_artifact(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Persistence seam for audit export records.
pub trait AuditExportStore {
    /// Saves an export record under its job id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_export(&self, record: &AuditExportRecord) -> Result<(), StoreError>;

    /// Loads an export record by job id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_export(
        &self,
        export_job_id: &ExportJobId,
    ) -> Result<Option<AuditExportRecord>, StoreError>;
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Event bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Event emission failed.
    #[error("event emission failed: {0}")]
    EmitFailed(String),
}

impl Classified for BusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::TransientUpstream
    }
}

/// Event bus seam for named events with JSON detail.
pub trait EventBus {
    /// Emits an event envelope.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::EmitFailed`] when delivery fails.
    fn emit(&self, envelope: &EventEnvelope) -> Result<(), BusError>;
}

// ============================================================================
// SECTION: Tool Gateway
// ============================================================================

/// Tool gateway errors classified for retry policy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Retryable upstream failure (5xx, 429, network errors).
    #[error("transient gateway failure ({code}): {message}")]
    Transient {
        /// Stable error code (status or errno label).
        code: String,
        /// Failure description.
        message: String,
    },
    /// Non-retryable upstream failure (4xx except 429).
    #[error("permanent gateway failure ({code}): {message}")]
    Permanent {
        /// Stable error code.
        code: String,
        /// Failure description.
        message: String,
    },
    /// Credential acquisition or authorization failed.
    #[error("gateway auth failure: {0}")]
    Auth(String),
    /// Invocation deadline elapsed.
    #[error("gateway timeout: {0}")]
    Timeout(String),
}

impl Classified for GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientUpstream,
            Self::Permanent { .. } => ErrorKind::PermanentUpstream,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Tool gateway seam performing the single outbound call per attempt.
///
/// Implementations obtain ephemeral credentials internally; the mapper stage
/// stays pure and passes only the resolved tool, schema version, and
/// parameters.
pub trait ToolGateway {
    /// Invokes a tool through the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] classified for retry policy.
    fn invoke(
        &self,
        tool: &ToolName,
        schema_version: u32,
        params: &Value,
    ) -> Result<ToolInvocationResponse, GatewayError>;
}

// ============================================================================
// SECTION: Sleeper
// ============================================================================

/// Backoff sleeper seam so retry pacing stays testable.
pub trait Sleeper {
    /// Sleeps for the given number of milliseconds.
    fn sleep_millis(&self, millis: u64);
}

/// Sleeper that does not sleep, for tests and replay.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep_millis(&self, _millis: u64) {}
}

/// Thread-blocking sleeper for hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep_millis(&self, millis: u64) {
        std::thread::sleep(std::time::Duration::from_millis(millis));
    }
}
