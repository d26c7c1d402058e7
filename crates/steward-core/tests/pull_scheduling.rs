// crates/steward-core/tests/pull_scheduling.rs
// ============================================================================
// Module: Pull Scheduling Tests
// Description: Tests for the four-step pull schedule and its guards.
// ============================================================================
//! ## Overview
//! Validates at-most-once scheduling per pull job id, atomic budget
//! consumption under caps, rate-gate declines, and bucketed job-id
//! derivation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use steward_core::ConnectorId;
use steward_core::DepthUnits;
use steward_core::HeatTier;
use steward_core::PullBudgetConfig;
use steward_core::PullDepth;
use steward_core::ScheduleDeclineReason;
use steward_core::ScheduleOutcome;
use steward_core::TenantId;
use steward_core::TierPolicyTable;
use steward_core::interfaces::BudgetScope;
use steward_core::interfaces::BudgetStore;
use steward_core::runtime::InMemoryBudgetStore;
use steward_core::runtime::InMemoryIdempotencyStore;
use steward_core::runtime::InMemoryLedgerStore;
use steward_core::runtime::OpenRateGate;
use steward_core::runtime::PullOrchestrator;
use steward_core::runtime::PullRequest;
use steward_core::runtime::RateGate;

use common::account;
use common::harness;
use common::tenant;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Gate that always declines, for the rate-limit step.
struct ClosedRateGate;

impl RateGate for ClosedRateGate {
    fn eligible(&self, _tenant_id: &TenantId, _connector_id: &ConnectorId) -> bool {
        false
    }
}

/// Builds an orchestrator with the provided budget caps.
fn orchestrator(
    clock: Arc<steward_core::FixedClock>,
    budgets: Arc<InMemoryBudgetStore>,
    budget: PullBudgetConfig,
) -> PullOrchestrator {
    PullOrchestrator::new(
        Arc::new(OpenRateGate),
        Arc::new(InMemoryIdempotencyStore::new()),
        budgets,
        Arc::new(InMemoryLedgerStore::new()),
        DepthUnits::default(),
        budget,
        TierPolicyTable::default(),
        clock,
    )
}

/// Returns the conventional test request.
fn request() -> PullRequest {
    PullRequest {
        tenant_id: tenant(),
        account_id: account(),
        connector_id: ConnectorId::new("crm"),
        depth: PullDepth::Shallow,
        tier: HeatTier::Warm,
    }
}

// ============================================================================
// SECTION: At-Most-Once Scheduling
// ============================================================================

/// Tests that a second schedule within the bucket declines as duplicate.
#[test]
fn test_duplicate_pull_job_id_declines() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let orchestrator = orchestrator(
        Arc::clone(&harness.clock),
        Arc::clone(&budgets),
        PullBudgetConfig::default(),
    );

    let first = orchestrator.schedule(&request()).unwrap();
    assert!(first.is_scheduled());

    let second = orchestrator.schedule(&request()).unwrap();
    let ScheduleOutcome::Declined { reason } = second else {
        panic!("second schedule in the same bucket must decline");
    };
    assert_eq!(reason, ScheduleDeclineReason::DuplicatePullJobId);

    // The duplicate consumed no budget.
    let consumed = budgets
        .consumed(BudgetScope::Pull, &tenant(), harness.clock.now().day_key())
        .unwrap();
    assert_eq!(consumed, 1);
}

/// Tests that a new cadence bucket yields a fresh job id.
#[test]
fn test_new_bucket_schedules_again() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let orchestrator = orchestrator(
        Arc::clone(&harness.clock),
        Arc::clone(&budgets),
        PullBudgetConfig::default(),
    );

    let first = orchestrator.schedule(&request()).unwrap();
    // WARM cadence is six hours; the next bucket starts after it.
    harness.clock.advance_hours(6);
    let second = orchestrator.schedule(&request()).unwrap();

    let (ScheduleOutcome::Scheduled { job: first_job }, ScheduleOutcome::Scheduled { job }) =
        (first, second)
    else {
        panic!("both buckets must schedule");
    };
    assert_ne!(first_job.pull_job_id, job.pull_job_id);
}

// ============================================================================
// SECTION: Budget Guards
// ============================================================================

/// Tests that a deep pull over the remaining cap declines without consuming.
#[test]
fn test_budget_exceeded_leaves_consumption_unchanged() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let day_key = harness.clock.now().day_key();

    // Pre-consume four of five units.
    for _ in 0..4 {
        budgets.consume(BudgetScope::Pull, &tenant(), day_key, 1, 5, None).unwrap();
    }

    let orchestrator = orchestrator(
        Arc::clone(&harness.clock),
        Arc::clone(&budgets),
        PullBudgetConfig {
            max_units_per_day: 5,
            max_units_per_connector_per_day: 0,
        },
    );
    let deep = PullRequest {
        depth: PullDepth::Deep,
        ..request()
    };
    let outcome = orchestrator.schedule(&deep).unwrap();
    let ScheduleOutcome::Declined { reason } = outcome else {
        panic!("deep pull over cap must decline");
    };
    assert_eq!(reason, ScheduleDeclineReason::BudgetExceeded);
    assert_eq!(budgets.consumed(BudgetScope::Pull, &tenant(), day_key).unwrap(), 4);
}

/// Tests that the per-connector cap constrains before the tenant cap.
#[test]
fn test_connector_cap_constrains_first() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let orchestrator = orchestrator(
        Arc::clone(&harness.clock),
        Arc::clone(&budgets),
        PullBudgetConfig {
            max_units_per_day: 100,
            max_units_per_connector_per_day: 1,
        },
    );

    let first = orchestrator.schedule(&request()).unwrap();
    assert!(first.is_scheduled());

    harness.clock.advance_hours(6);
    let second = orchestrator.schedule(&request()).unwrap();
    let ScheduleOutcome::Declined { reason } = second else {
        panic!("connector cap must decline the second pull");
    };
    assert_eq!(reason, ScheduleDeclineReason::BudgetExceeded);
}

/// Tests that the scheduled job reports the remaining tenant budget.
#[test]
fn test_scheduled_job_reports_remaining_budget() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let orchestrator = orchestrator(
        Arc::clone(&harness.clock),
        budgets,
        PullBudgetConfig {
            max_units_per_day: 10,
            max_units_per_connector_per_day: 0,
        },
    );
    let deep = PullRequest {
        depth: PullDepth::Deep,
        ..request()
    };
    let ScheduleOutcome::Scheduled { job } = orchestrator.schedule(&deep).unwrap() else {
        panic!("pull must schedule");
    };
    assert_eq!(job.depth_units, 3);
    assert_eq!(job.budget_remaining, Some(7));
}

// ============================================================================
// SECTION: Rate Gate
// ============================================================================

/// Tests that the rate gate declines before any reservation.
#[test]
fn test_rate_gate_declines_before_reservation() {
    let harness = harness(86_400_000);
    let budgets = Arc::new(InMemoryBudgetStore::new());
    let orchestrator = PullOrchestrator::new(
        Arc::new(ClosedRateGate),
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::clone(&budgets),
        Arc::new(InMemoryLedgerStore::new()),
        DepthUnits::default(),
        PullBudgetConfig::default(),
        TierPolicyTable::default(),
        Arc::clone(&harness.clock),
    );

    let outcome = orchestrator.schedule(&request()).unwrap();
    let ScheduleOutcome::Declined { reason } = outcome else {
        panic!("closed gate must decline");
    };
    assert_eq!(reason, ScheduleDeclineReason::RateLimit);
    let consumed = budgets
        .consumed(BudgetScope::Pull, &tenant(), harness.clock.now().day_key())
        .unwrap();
    assert_eq!(consumed, 0);
}
