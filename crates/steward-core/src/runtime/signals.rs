// crates/steward-core/src/runtime/signals.rs
// ============================================================================
// Module: Steward Signal Service
// Description: Atomic signal writes, status transitions, queries, and replay.
// Purpose: Couple signal rows and the lifecycle read-model under one service.
// Dependencies: crate::{core, interfaces, runtime::detectors}, serde_json
// ============================================================================

//! ## Overview
//! The signal service is the single write path for signals. Creation inserts
//! the signal row and updates the account's active-signal index in one
//! transaction, re-infers the lifecycle state from the updated index, and
//! emits bus events for detection and state changes. Status updates enforce
//! the monotonic state machine. Execution-outcome signals bypass the
//! lifecycle coupling. The service surface is split into narrow capability
//! traits so handlers compose exactly the subset they need.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::AccountState;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ErrorKind;
use crate::core::EventEnvelope;
use crate::core::EventKind;
use crate::hashing::HashError;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::LifecycleTransition;
use crate::core::Signal;
use crate::core::SignalId;
use crate::core::SignalStatus;
use crate::core::SignalType;
use crate::core::SuppressionMeta;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::infer_lifecycle_state;
use crate::interfaces::AccountStateStore;
use crate::interfaces::BusError;
use crate::interfaces::EventBus;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::SignalStore;
use crate::interfaces::SignalWrite;
use crate::interfaces::StoreError;
use crate::runtime::detectors::Detector;
use crate::runtime::detectors::DetectorContext;
use crate::runtime::detectors::DetectorError;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Result of a signal creation.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateSignalResult {
    /// The signal row was created.
    Created {
        /// Stored signal.
        signal: Signal,
        /// Lifecycle transition observed by re-inference, when coupled.
        transition: Option<LifecycleTransition>,
    },
    /// An identical detection already exists; the original row is returned.
    Duplicate {
        /// Previously stored signal.
        signal: Signal,
    },
}

impl CreateSignalResult {
    /// Returns the stored signal regardless of creation outcome.
    #[must_use]
    pub const fn signal(&self) -> &Signal {
        match self {
            Self::Created { signal, .. } | Self::Duplicate { signal } => signal,
        }
    }
}

/// Query filter for account signals.
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    /// Status filter; `None` defaults to `Active`.
    pub status: Option<SignalStatus>,
    /// Type filter; empty means all types.
    pub types: Vec<SignalType>,
    /// Inclusive lower creation bound.
    pub from: Option<Timestamp>,
    /// Inclusive upper creation bound.
    pub to: Option<Timestamp>,
}

/// Replay comparison report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Signal identifier replayed.
    pub signal_id: SignalId,
    /// True when the recomputed signal matches the stored one.
    pub matches: bool,
    /// Mismatching field labels, empty when matching.
    pub mismatches: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signal service errors.
#[derive(Debug, Error)]
pub enum SignalServiceError {
    /// Signal not found.
    #[error("signal not found: {0}")]
    NotFound(String),
    /// Transition rejected by the status state machine.
    #[error("invalid signal transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: SignalStatus,
        /// Requested status.
        to: SignalStatus,
    },
    /// Expiry requested before the TTL elapsed.
    #[error("signal ttl has not elapsed: {0}")]
    NotYetExpired(String),
    /// Execution-outcome signals must use the execution write path.
    #[error("signal type requires the execution write path: {0}")]
    WrongWritePath(String),
    /// Replay could not re-run the detector.
    #[error(transparent)]
    Detector(#[from] DetectorError),
    /// Evidence fetch failed during replay.
    #[error(transparent)]
    Evidence(#[from] EvidenceStoreError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for SignalServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NotYetExpired(_) | Self::WrongWritePath(_) => {
                ErrorKind::Validation
            }
            Self::InvalidTransition { .. } => ErrorKind::Invariant,
            Self::Detector(inner) => inner.kind(),
            Self::Evidence(inner) => inner.kind(),
            Self::Store(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
            Self::Bus(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Capability Traits
// ============================================================================

/// Write capability for detector-produced signals.
pub trait SignalWriter {
    /// Creates a signal atomically with the lifecycle read-model.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError`] when the transaction fails; duplicate
    /// detections resolve idempotently to the original row.
    fn create_signal(&self, signal: Signal) -> Result<CreateSignalResult, SignalServiceError>;

    /// Applies a status transition, synchronizing the active-signal index.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError::InvalidTransition`] on state-machine
    /// violations.
    fn update_status(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        status: SignalStatus,
        reason: Option<&str>,
    ) -> Result<(), SignalServiceError>;
}

/// Read capability for account signals.
pub trait SignalReader {
    /// Returns account signals matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError`] when loading fails.
    fn signals_for_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        filter: &SignalFilter,
    ) -> Result<Vec<Signal>, SignalServiceError>;

    /// Loads one signal by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError`] when loading fails.
    fn signal(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
    ) -> Result<Option<Signal>, SignalServiceError>;
}

/// Write capability for execution-outcome signals.
pub trait ExecutionSignalWriter {
    /// Creates an execution-outcome signal without lifecycle coupling.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError`] when the insert fails beyond the guard.
    fn create_execution_signal(
        &self,
        signal: Signal,
    ) -> Result<CreateSignalResult, SignalServiceError>;
}

/// Replay capability re-running detectors over stored evidence.
pub trait SignalReplayer {
    /// Re-runs a detector over the stored evidence and compares the result.
    ///
    /// A mismatch appends a `VALIDATION` ledger entry; stored state is never
    /// mutated.
    ///
    /// # Errors
    ///
    /// Returns [`SignalServiceError`] when the signal or evidence cannot be
    /// loaded.
    fn replay(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        detector: &dyn Detector,
    ) -> Result<ReplayReport, SignalServiceError>;
}

// ============================================================================
// SECTION: Signal Service
// ============================================================================

/// Canonical implementation of the signal capabilities.
#[derive(Clone)]
pub struct SignalService {
    /// Signal and read-model store.
    signals: Arc<dyn SignalStore + Send + Sync>,
    /// Account state store for initial loads.
    accounts: Arc<dyn AccountStateStore + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Event bus.
    bus: Arc<dyn EventBus + Send + Sync>,
    /// Evidence store for replay.
    evidence: Arc<dyn EvidenceStore + Send + Sync>,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SignalService {
    /// Creates a signal service from its required collaborators.
    #[must_use]
    pub fn new(
        signals: Arc<dyn SignalStore + Send + Sync>,
        accounts: Arc<dyn AccountStateStore + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        bus: Arc<dyn EventBus + Send + Sync>,
        evidence: Arc<dyn EvidenceStore + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            signals,
            accounts,
            ledger,
            bus,
            evidence,
            clock,
        }
    }

    /// Loads the read-model or builds a default one.
    fn load_or_default(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<AccountState, StoreError> {
        Ok(self
            .accounts
            .load_account(tenant_id, account_id)?
            .unwrap_or_else(|| AccountState::new(tenant_id.clone(), account_id.clone())))
    }

    /// Appends a signal ledger entry for a stored signal.
    fn ledger_signal_entry(&self, signal: &Signal, label: &str) -> Result<(), LedgerError> {
        let entry = LedgerEntry::for_trace(
            signal.tenant_id.clone(),
            signal.account_id.clone(),
            signal.trace_id.clone(),
            LedgerEventType::Signal,
            self.clock.now(),
            &format!("{label}-{}", signal.signal_id),
            json!({
                "signal_id": signal.signal_id.as_str(),
                "signal_type": signal.signal_type.as_str(),
                "status": signal.status,
                "dedupe_key": signal.dedupe_key.value,
                "window_key": signal.window_key,
            }),
        )
        .with_evidence(vec![signal.evidence.clone()]);
        self.ledger.append(&entry)?;
        Ok(())
    }

    /// Emits detection events for a created signal.
    fn emit_created(
        &self,
        signal: &Signal,
        transition: Option<LifecycleTransition>,
    ) -> Result<(), BusError> {
        let now = self.clock.now();
        let detail = json!({
            "tenant_id": signal.tenant_id.as_str(),
            "account_id": signal.account_id.as_str(),
            "signal_id": signal.signal_id.as_str(),
        });
        self.bus.emit(&EventEnvelope::new(EventKind::SignalCreated, now, detail.clone()))?;
        self.bus.emit(&EventEnvelope::new(EventKind::SignalDetected, now, detail))?;
        if let Some(transition) = transition {
            if transition.changed() {
                self.bus.emit(&EventEnvelope::new(
                    EventKind::LifecycleStateChanged,
                    now,
                    json!({
                        "tenant_id": signal.tenant_id.as_str(),
                        "account_id": signal.account_id.as_str(),
                        "from": transition.from.as_str(),
                        "to": transition.to.as_str(),
                    }),
                ))?;
            }
        }
        Ok(())
    }
}

impl SignalWriter for SignalService {
    fn create_signal(&self, signal: Signal) -> Result<CreateSignalResult, SignalServiceError> {
        if signal.signal_type.is_execution_outcome() {
            return self.create_execution_signal(signal);
        }

        if let Some(existing) =
            self.signals.find_by_dedupe_key(&signal.tenant_id, &signal.dedupe_key)?
        {
            return Ok(CreateSignalResult::Duplicate { signal: existing });
        }

        let mut state = self.load_or_default(&signal.tenant_id, &signal.account_id)?;
        let before = state.lifecycle_state;
        state.index_signal(signal.signal_type, &signal.signal_id);
        if signal.signal_type == SignalType::FirstEngagementOccurred {
            state.last_engagement_at = Some(signal.created_at);
        }
        let after = infer_lifecycle_state(&state);
        state.lifecycle_state = after;
        state.last_inference_at = Some(self.clock.now());
        let transition = LifecycleTransition {
            from: before,
            to: after,
        };

        match self.signals.insert_signal_with_state(&signal, &state)? {
            SignalWrite::Inserted => {}
            SignalWrite::Duplicate(existing) => {
                return Ok(CreateSignalResult::Duplicate { signal: *existing });
            }
        }

        self.ledger_signal_entry(&signal, "created")?;
        self.emit_created(&signal, Some(transition))?;

        Ok(CreateSignalResult::Created {
            signal,
            transition: Some(transition),
        })
    }

    fn update_status(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        status: SignalStatus,
        reason: Option<&str>,
    ) -> Result<(), SignalServiceError> {
        let Some(signal) = self.signals.get_signal(tenant_id, signal_id)? else {
            return Err(SignalServiceError::NotFound(signal_id.to_string()));
        };

        if !signal.status.can_transition_to(status) {
            return Err(SignalServiceError::InvalidTransition {
                from: signal.status,
                to: status,
            });
        }
        let now = self.clock.now();
        if status == SignalStatus::Expired && !signal.ttl_elapsed(now) {
            return Err(SignalServiceError::NotYetExpired(signal_id.to_string()));
        }

        let mut state = self.load_or_default(tenant_id, &signal.account_id)?;
        if signal.status == SignalStatus::Active {
            state.unindex_signal(signal.signal_type, signal_id);
            state.lifecycle_state = infer_lifecycle_state(&state);
            state.last_inference_at = Some(now);
        }

        let suppression = (status == SignalStatus::Suppressed).then(|| SuppressionMeta {
            reason: reason.unwrap_or("unspecified").to_string(),
            suppressed_at: now,
        });
        self.signals.update_status_with_state(
            tenant_id,
            signal_id,
            status,
            suppression.as_ref(),
            &state,
        )?;

        let mut updated = signal;
        updated.status = status;
        updated.suppression = suppression;
        self.ledger_signal_entry(&updated, "status")?;
        Ok(())
    }
}

impl SignalReader for SignalService {
    fn signals_for_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        filter: &SignalFilter,
    ) -> Result<Vec<Signal>, SignalServiceError> {
        let now = self.clock.now();
        let status = filter.status.unwrap_or(SignalStatus::Active);
        let mut rows = self.signals.signals_for_account(tenant_id, account_id)?;
        rows.retain(|signal| {
            let effective = if signal.status == SignalStatus::Active && signal.ttl_elapsed(now) {
                SignalStatus::Expired
            } else {
                signal.status
            };
            if effective != status {
                return false;
            }
            if !filter.types.is_empty() && !filter.types.contains(&signal.signal_type) {
                return false;
            }
            if filter.from.is_some_and(|from| signal.created_at < from) {
                return false;
            }
            if filter.to.is_some_and(|to| signal.created_at > to) {
                return false;
            }
            true
        });
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn signal(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
    ) -> Result<Option<Signal>, SignalServiceError> {
        Ok(self.signals.get_signal(tenant_id, signal_id)?)
    }
}

impl ExecutionSignalWriter for SignalService {
    fn create_execution_signal(
        &self,
        signal: Signal,
    ) -> Result<CreateSignalResult, SignalServiceError> {
        if !signal.signal_type.is_execution_outcome() {
            return Err(SignalServiceError::WrongWritePath(
                signal.signal_type.as_str().to_string(),
            ));
        }
        match self.signals.insert_execution_signal(&signal)? {
            SignalWrite::Inserted => {}
            SignalWrite::Duplicate(existing) => {
                return Ok(CreateSignalResult::Duplicate { signal: *existing });
            }
        }
        self.ledger_signal_entry(&signal, "created")?;
        self.emit_created(&signal, None)?;
        Ok(CreateSignalResult::Created {
            signal,
            transition: None,
        })
    }
}

impl SignalReplayer for SignalService {
    fn replay(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        detector: &dyn Detector,
    ) -> Result<ReplayReport, SignalServiceError> {
        let Some(stored) = self.signals.get_signal(tenant_id, signal_id)? else {
            return Err(SignalServiceError::NotFound(signal_id.to_string()));
        };

        let snapshot = self.evidence.fetch_snapshot(&stored.evidence)?;
        let context = DetectorContext {
            prior_state: self.accounts.load_account(tenant_id, &stored.account_id)?,
            trace_id: stored.trace_id.clone(),
        };
        let recomputed = detector.detect(&snapshot, &stored.evidence, &context)?;
        let candidate = recomputed
            .into_iter()
            .find(|signal| signal.signal_type == stored.signal_type);

        let mut mismatches = Vec::new();
        match candidate {
            Some(candidate) => {
                if candidate.dedupe_key != stored.dedupe_key {
                    mismatches.push("dedupe_key".to_string());
                }
                if candidate.window_key != stored.window_key {
                    mismatches.push("window_key".to_string());
                }
                if (candidate.confidence.value - stored.confidence.value).abs() > f64::EPSILON {
                    mismatches.push("confidence".to_string());
                }
            }
            None => mismatches.push("signal_absent".to_string()),
        }

        if !mismatches.is_empty() {
            let entry = LedgerEntry::for_trace(
                stored.tenant_id.clone(),
                stored.account_id.clone(),
                stored.trace_id.clone(),
                LedgerEventType::Validation,
                self.clock.now(),
                &format!("replay-{}", stored.signal_id),
                json!({
                    "signal_id": stored.signal_id.as_str(),
                    "detector": detector.name().as_str(),
                    "detector_version": detector.version(),
                    "mismatches": mismatches,
                }),
            );
            self.ledger.append(&entry)?;
        }

        Ok(ReplayReport {
            signal_id: stored.signal_id,
            matches: mismatches.is_empty(),
            mismatches,
        })
    }
}
