// crates/steward-core/src/runtime/decision.rs
// ============================================================================
// Module: Steward Decision Scheduler
// Description: Cost-gated, idempotent dispatch of decision runs.
// Purpose: Admit RUN_DECISION events under cost and budget policy.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Decision dispatch follows the same four-step discipline as pull
//! scheduling: cost-gate eligibility, idempotency reservation keyed by the
//! decision correlation id (24h TTL), atomic daily-run budget consumption,
//! and emission. A run rejected by the cost gate is re-queued through
//! `RUN_DECISION_DEFERRED` with a scheduler-bound delay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::Classified;
use crate::core::Clock;
use crate::core::DecisionDeclineReason;
use crate::core::DecisionDispatch;
use crate::core::DecisionRunRequest;
use crate::core::DecisionRunState;
use crate::core::ErrorKind;
use crate::core::EventEnvelope;
use crate::core::EventKind;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::TraceId;
use crate::interfaces::BudgetConsume;
use crate::interfaces::BudgetScope;
use crate::interfaces::BudgetStore;
use crate::interfaces::BusError;
use crate::interfaces::DecisionRunStore;
use crate::interfaces::EventBus;
use crate::interfaces::IdempotencyStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::Reservation;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TTL for decision idempotency reservations, in hours.
const DECISION_IDEMPOTENCY_TTL_HOURS: u32 = 24;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Cost-gate configuration for decision dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostGateConfig {
    /// Maximum decision runs per account per day (0 disables).
    pub max_runs_per_day: u32,
    /// Minimum hours between runs for one account.
    pub min_hours_between_runs: u32,
    /// Delay applied to deferred runs, in hours.
    pub defer_retry_hours: u32,
}

impl Default for CostGateConfig {
    fn default() -> Self {
        Self {
            max_runs_per_day: 8,
            min_hours_between_runs: 2,
            defer_retry_hours: 2,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Decision scheduler errors.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// Store failure outside the conditional guards.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl Classified for DecisionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
            Self::Bus(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: Decision Scheduler
// ============================================================================

/// Cost-gated decision dispatcher.
#[derive(Clone)]
pub struct DecisionScheduler {
    /// Per-account run state.
    run_state: Arc<dyn DecisionRunStore + Send + Sync>,
    /// Idempotency reservation store.
    idempotency: Arc<dyn IdempotencyStore + Send + Sync>,
    /// Budget store.
    budgets: Arc<dyn BudgetStore + Send + Sync>,
    /// Event bus for deferred re-queues.
    bus: Arc<dyn EventBus + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Gate configuration.
    config: CostGateConfig,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl DecisionScheduler {
    /// Creates a decision scheduler from its collaborators.
    #[must_use]
    pub fn new(
        run_state: Arc<dyn DecisionRunStore + Send + Sync>,
        idempotency: Arc<dyn IdempotencyStore + Send + Sync>,
        budgets: Arc<dyn BudgetStore + Send + Sync>,
        bus: Arc<dyn EventBus + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        config: CostGateConfig,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            run_state,
            idempotency,
            budgets,
            bus,
            ledger,
            config,
            clock,
        }
    }

    /// Handles a `RUN_DECISION` event.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError`] only for failures outside the conditional
    /// guards; declines and deferrals are structured outcomes.
    pub fn handle_run_decision(
        &self,
        request: &DecisionRunRequest,
    ) -> Result<DecisionDispatch, DecisionError> {
        let now = self.clock.now();
        let day_key = now.day_key();

        let state = self.run_state.load_run_state(
            &request.tenant_id,
            &request.account_id,
            day_key,
        )?;
        let too_soon = state.as_ref().and_then(|state| state.last_run_at).is_some_and(|last| {
            now.hours_since(last) < i64::from(self.config.min_hours_between_runs)
        });
        if too_soon {
            self.bus.emit(
                &EventEnvelope::new(
                    EventKind::RunDecisionDeferred,
                    now,
                    json!({
                        "tenant_id": request.tenant_id.as_str(),
                        "account_id": request.account_id.as_str(),
                        "correlation_id": request.correlation_id.as_str(),
                        "retry_after_hours": self.config.defer_retry_hours,
                    }),
                )
                .with_correlation(request.correlation_id.clone()),
            )?;
            return Ok(DecisionDispatch::Deferred {
                correlation_id: request.correlation_id.clone(),
                retry_after_hours: self.config.defer_retry_hours,
            });
        }

        let reservation_key =
            format!("decision:{}:{}", request.tenant_id, request.correlation_id);
        if self.idempotency.reserve(&reservation_key, now, DECISION_IDEMPOTENCY_TTL_HOURS)?
            == Reservation::Duplicate
        {
            return Ok(DecisionDispatch::Declined {
                reason: DecisionDeclineReason::DuplicateCorrelationId,
            });
        }

        let consume = self.budgets.consume(
            BudgetScope::Decision,
            &request.tenant_id,
            day_key,
            1,
            self.config.max_runs_per_day,
            None,
        )?;
        if consume == BudgetConsume::Exceeded {
            return Ok(DecisionDispatch::Declined {
                reason: DecisionDeclineReason::BudgetExceeded,
            });
        }

        let mut state = state.unwrap_or(DecisionRunState {
            tenant_id: request.tenant_id.clone(),
            account_id: request.account_id.clone(),
            day_key,
            runs_consumed: 0,
            last_run_at: None,
        });
        state.runs_consumed += 1;
        state.last_run_at = Some(now);
        self.run_state.save_run_state(&state)?;

        let entry = LedgerEntry::for_trace(
            request.tenant_id.clone(),
            request.account_id.clone(),
            TraceId::new(request.correlation_id.as_str()),
            LedgerEventType::Schedule,
            now,
            &format!("decision-{}", request.correlation_id),
            json!({
                "correlation_id": request.correlation_id.as_str(),
                "runs_consumed": state.runs_consumed,
            }),
        );
        self.ledger.append(&entry)?;

        Ok(DecisionDispatch::Dispatched {
            correlation_id: request.correlation_id.clone(),
        })
    }
}
