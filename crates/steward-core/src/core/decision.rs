// crates/steward-core/src/core/decision.rs
// ============================================================================
// Module: Steward Decision Model
// Description: Decision run state, dispatch requests, and gate outcomes.
// Purpose: Provide the data contracts for idempotent decision scheduling.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Decision runs are dispatched through the same four-step discipline as
//! pulls: rate gate, idempotency reservation, atomic budget consumption, and
//! emission. Run state is the per-account mutable row the cost gate consults;
//! idempotency keys live in a TTL-reclaimed reservation store keyed by the
//! decision correlation id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AccountId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Decision Run State
// ============================================================================

/// Per-account mutable state consulted by the decision cost gate.
///
/// # Invariants
/// - Keyed by (tenant, account, window); one row per window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRunState {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// UTC day key of the cost window.
    pub day_key: i64,
    /// Decision runs consumed within the window.
    pub runs_consumed: u32,
    /// Timestamp of the most recent run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Dispatch Requests
// ============================================================================

/// Request to run the decision layer for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRunRequest {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Correlation identifier keying idempotency.
    pub correlation_id: CorrelationId,
    /// Request timestamp.
    pub requested_at: Timestamp,
}

/// Reason a decision dispatch was declined.
///
/// # Invariants
/// - Variants are stable for serialization and admin-surface reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionDeclineReason {
    /// Cost gate rejected the run for this window.
    CostGate,
    /// The correlation id was already reserved.
    DuplicateCorrelationId,
    /// Budget consumption would exceed the daily run cap.
    BudgetExceeded,
}

/// Structured result of a decision dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionDispatch {
    /// Run was dispatched for evaluation.
    Dispatched {
        /// Correlation identifier of the dispatched run.
        correlation_id: CorrelationId,
    },
    /// Run was deferred and re-queued with a scheduler delay.
    Deferred {
        /// Correlation identifier of the deferred run.
        correlation_id: CorrelationId,
        /// Delay before the re-queued run, in hours.
        retry_after_hours: u32,
    },
    /// Run was declined with a stable reason.
    Declined {
        /// Decline reason.
        reason: DecisionDeclineReason,
    },
}

impl DecisionDispatch {
    /// Returns true when the run was dispatched.
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}
