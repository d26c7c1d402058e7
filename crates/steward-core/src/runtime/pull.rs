// crates/steward-core/src/runtime/pull.rs
// ============================================================================
// Module: Steward Pull Orchestrator
// Description: Four-step pull scheduling with budgets and idempotency.
// Purpose: Emit at-most-once pull jobs under per-tenant and per-connector caps.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Scheduling executes four steps in order and stops on the first negative:
//! rate-limit eligibility, idempotency reservation on the derived pull job
//! id, atomic budget consumption (per-connector row first when both caps are
//! configured), and job emission. The idempotency reservation represents the
//! intent to schedule and is never rolled back on downstream failure; callers
//! retry with the next time-bucketed job id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ConnectorId;
use crate::core::CorrelationId;
use crate::core::DepthUnits;
use crate::core::ErrorKind;
use crate::core::HeatTier;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::PullBudgetConfig;
use crate::core::PullDepth;
use crate::core::PullJob;
use crate::core::ScheduleDeclineReason;
use crate::core::ScheduleOutcome;
use crate::core::TenantId;
use crate::core::TierPolicyTable;
use crate::core::TraceId;
use crate::core::derive_pull_job_id;
use crate::interfaces::BudgetConsume;
use crate::interfaces::BudgetScope;
use crate::interfaces::BudgetStore;
use crate::interfaces::IdempotencyStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::Reservation;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TTL for pull idempotency reservations, in hours.
const PULL_IDEMPOTENCY_TTL_HOURS: u32 = 24;

// ============================================================================
// SECTION: Rate Gate
// ============================================================================

/// Cheap eligibility gate consulted before any reservation.
pub trait RateGate: Send + Sync {
    /// Returns true when a pull for the connector is currently eligible.
    fn eligible(&self, tenant_id: &TenantId, connector_id: &ConnectorId) -> bool;
}

/// Gate that always admits; hosts plug in connector-aware gates.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRateGate;

impl RateGate for OpenRateGate {
    fn eligible(&self, _tenant_id: &TenantId, _connector_id: &ConnectorId) -> bool {
        true
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Pull scheduling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Connector to poll.
    pub connector_id: ConnectorId,
    /// Pull depth.
    pub depth: PullDepth,
    /// Heat tier whose cadence buckets the job id.
    pub tier: HeatTier,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pull orchestrator errors.
#[derive(Debug, Error)]
pub enum PullError {
    /// Store failure outside the conditional guards.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Classified for PullError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: Pull Orchestrator
// ============================================================================

/// Four-step pull scheduler.
#[derive(Clone)]
pub struct PullOrchestrator {
    /// Rate eligibility gate.
    gate: Arc<dyn RateGate>,
    /// Idempotency reservation store.
    idempotency: Arc<dyn IdempotencyStore + Send + Sync>,
    /// Budget store.
    budgets: Arc<dyn BudgetStore + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Units consumed per depth.
    depth_units: DepthUnits,
    /// Daily budget caps.
    budget: PullBudgetConfig,
    /// Tier policy table for cadence buckets.
    policy: TierPolicyTable,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl PullOrchestrator {
    /// Creates a pull orchestrator from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "Construction wires every scheduling seam once.")]
    pub fn new(
        gate: Arc<dyn RateGate>,
        idempotency: Arc<dyn IdempotencyStore + Send + Sync>,
        budgets: Arc<dyn BudgetStore + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        depth_units: DepthUnits,
        budget: PullBudgetConfig,
        policy: TierPolicyTable,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            gate,
            idempotency,
            budgets,
            ledger,
            depth_units,
            budget,
            policy,
            clock,
        }
    }

    /// Schedules a pull job, stopping on the first negative step.
    ///
    /// # Errors
    ///
    /// Returns [`PullError`] only for failures outside the conditional
    /// guards; declines are structured outcomes.
    pub fn schedule(&self, request: &PullRequest) -> Result<ScheduleOutcome, PullError> {
        if !self.gate.eligible(&request.tenant_id, &request.connector_id) {
            return Ok(ScheduleOutcome::Declined {
                reason: ScheduleDeclineReason::RateLimit,
            });
        }

        let now = self.clock.now();
        let cadence_hours = self.policy.policy(request.tier).cadence_hours;
        let pull_job_id = derive_pull_job_id(
            &request.tenant_id,
            &request.account_id,
            &request.connector_id,
            request.depth,
            now,
            cadence_hours,
        );

        let reservation_key = format!("pull:{}:{pull_job_id}", request.tenant_id);
        if self.idempotency.reserve(&reservation_key, now, PULL_IDEMPOTENCY_TTL_HOURS)?
            == Reservation::Duplicate
        {
            return Ok(ScheduleOutcome::Declined {
                reason: ScheduleDeclineReason::DuplicatePullJobId,
            });
        }

        let units = self.depth_units.units(request.depth);
        let connector_cap = self.budget.max_units_per_connector_per_day;
        let connector =
            (connector_cap > 0).then_some((&request.connector_id, connector_cap));
        let consume = self.budgets.consume(
            BudgetScope::Pull,
            &request.tenant_id,
            now.day_key(),
            units,
            self.budget.max_units_per_day,
            connector,
        )?;
        let BudgetConsume::Consumed { tenant_remaining } = consume else {
            return Ok(ScheduleOutcome::Declined {
                reason: ScheduleDeclineReason::BudgetExceeded,
            });
        };

        let correlation_id = CorrelationId::new(pull_job_id.as_str());
        let job = PullJob {
            pull_job_id,
            tenant_id: request.tenant_id.clone(),
            account_id: request.account_id.clone(),
            connector_id: request.connector_id.clone(),
            depth: request.depth,
            depth_units: units,
            scheduled_at: now,
            correlation_id,
            budget_remaining: tenant_remaining,
        };

        let entry = LedgerEntry::for_trace(
            job.tenant_id.clone(),
            job.account_id.clone(),
            TraceId::new(job.correlation_id.as_str()),
            LedgerEventType::Schedule,
            now,
            &format!("pull-{}", job.pull_job_id),
            json!({
                "pull_job_id": job.pull_job_id.as_str(),
                "connector_id": job.connector_id.as_str(),
                "depth": job.depth.as_str(),
                "depth_units": job.depth_units,
                "budget_remaining": job.budget_remaining,
            }),
        );
        self.ledger.append(&entry)?;

        Ok(ScheduleOutcome::Scheduled {
            job,
        })
    }
}
