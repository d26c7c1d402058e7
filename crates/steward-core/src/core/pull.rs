// crates/steward-core/src/core/pull.rs
// ============================================================================
// Module: Steward Pull Model
// Description: Pull jobs, depths, budgets, and scheduling outcomes.
// Purpose: Provide the data contracts for at-most-once pull scheduling.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A pull job is a scheduled, idempotent intent to ask a connector for new
//! evidence. Job identifiers derive from the tenant, account, connector,
//! depth, and a cadence-width time bucket so retries within a bucket collapse
//! naturally. Budgets are daily caps consumed through atomic conditional
//! writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AccountId;
use crate::core::identifiers::ConnectorId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::PullJobId;
use crate::core::identifiers::TenantId;
use crate::core::time::MILLIS_PER_HOUR;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Pull Depth
// ============================================================================

/// Pull depth controlling connector effort and budget cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullDepth {
    /// Incremental pull.
    Shallow,
    /// Full-history pull.
    Deep,
}

impl PullDepth {
    /// Returns the stable wire label for the depth.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shallow => "SHALLOW",
            Self::Deep => "DEEP",
        }
    }
}

/// Budget units consumed per pull depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUnits {
    /// Units for a shallow pull.
    pub shallow: u32,
    /// Units for a deep pull.
    pub deep: u32,
}

impl DepthUnits {
    /// Returns the units consumed by a depth.
    #[must_use]
    pub const fn units(self, depth: PullDepth) -> u32 {
        match depth {
            PullDepth::Shallow => self.shallow,
            PullDepth::Deep => self.deep,
        }
    }
}

impl Default for DepthUnits {
    fn default() -> Self {
        Self {
            shallow: 1,
            deep: 3,
        }
    }
}

// ============================================================================
// SECTION: Pull Budgets
// ============================================================================

/// Per-tenant daily pull budget caps.
///
/// # Invariants
/// - A cap of zero disables the corresponding limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PullBudgetConfig {
    /// Tenant-wide daily unit cap (0 disables).
    pub max_units_per_day: u32,
    /// Per-connector daily unit cap (0 disables).
    pub max_units_per_connector_per_day: u32,
}

/// Budget consumption state keyed by (tenant, day, optional connector).
///
/// # Invariants
/// - Mutated only through atomic conditional consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullBudgetState {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// UTC day key of the window.
    pub day_key: i64,
    /// Connector scope, `None` for the tenant-wide row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<ConnectorId>,
    /// Units consumed within the window.
    pub units_consumed: u32,
    /// Number of pulls recorded within the window.
    pub pull_count: u32,
}

// ============================================================================
// SECTION: Pull Jobs
// ============================================================================

/// Scheduled, idempotent pull intent emitted to the connector runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullJob {
    /// Deterministic pull job identifier.
    pub pull_job_id: PullJobId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Connector to poll.
    pub connector_id: ConnectorId,
    /// Pull depth.
    pub depth: PullDepth,
    /// Budget units this job consumed.
    pub depth_units: u32,
    /// Scheduling timestamp.
    pub scheduled_at: Timestamp,
    /// Correlation identifier.
    pub correlation_id: CorrelationId,
    /// Tenant-wide budget units remaining after consumption, when capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<u32>,
}

/// Derives the deterministic pull job id for a cadence bucket.
///
/// The id embeds `floor(now / bucket)` where the bucket width matches the
/// tier cadence, so retries within a bucket produce the same id.
#[must_use]
pub fn derive_pull_job_id(
    tenant_id: &TenantId,
    account_id: &AccountId,
    connector_id: &ConnectorId,
    depth: PullDepth,
    now: Timestamp,
    cadence_hours: u32,
) -> PullJobId {
    let bucket = now.bucket(i64::from(cadence_hours) * MILLIS_PER_HOUR);
    PullJobId::new(format!(
        "pull-{tenant_id}-{account_id}-{connector_id}-{}-{bucket}",
        depth.as_str().to_lowercase()
    ))
}

// ============================================================================
// SECTION: Scheduling Outcomes
// ============================================================================

/// Reason a schedule request was declined.
///
/// # Invariants
/// - Variants are stable for serialization and admin-surface reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleDeclineReason {
    /// Rate-limit eligibility check failed.
    RateLimit,
    /// The pull job id was already reserved.
    DuplicatePullJobId,
    /// Budget consumption would exceed a configured cap.
    BudgetExceeded,
}

/// Structured result of a schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheduled", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// Job was scheduled; the caller invokes the connector.
    #[serde(rename = "true")]
    Scheduled {
        /// The emitted pull job.
        job: PullJob,
    },
    /// Job was declined with a stable reason.
    #[serde(rename = "false")]
    Declined {
        /// Decline reason.
        reason: ScheduleDeclineReason,
    },
}

impl ScheduleOutcome {
    /// Returns true when the job was scheduled.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }
}
