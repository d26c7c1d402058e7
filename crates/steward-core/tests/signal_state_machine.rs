// crates/steward-core/tests/signal_state_machine.rs
// ============================================================================
// Module: Signal State Machine Tests
// Description: Tests for monotonic status transitions and index sync.
// ============================================================================
//! ## Overview
//! Validates the suppression-is-terminal state machine, read-time TTL
//! filtering, and active-index synchronization on status changes.

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

use serde_json::json;
use steward_core::DetectorContext;
use steward_core::DetectorRegistry;
use steward_core::Signal;
use steward_core::SignalStatus;
use steward_core::SignalType;
use steward_core::Timestamp;
use steward_core::TraceId;
use steward_core::interfaces::AccountStateStore;
use steward_core::runtime::SignalFilter;
use steward_core::runtime::SignalReader;
use steward_core::runtime::SignalServiceError;
use steward_core::runtime::SignalWriter;
use steward_core::runtime::run_detector;

use common::Harness;
use common::account;
use common::harness;
use common::store_snapshot;
use common::tenant;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates an active no-engagement signal through the service.
fn create_no_engagement(harness: &Harness, captured_at: Timestamp) -> Signal {
    let (_, reference) = store_snapshot(
        harness,
        "tenant-1",
        "acct-1",
        captured_at,
        json!({"engagements": []}),
    );
    let registry = DetectorRegistry::standard();
    let detector =
        registry.detector(&steward_core::DetectorName::new("engagement")).unwrap();
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-1"),
    };
    let signals =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &reference, &context).unwrap();
    harness.service.create_signal(signals[0].clone()).unwrap().signal().clone()
}

// ============================================================================
// SECTION: Transition Rules
// ============================================================================

/// Tests that a suppressed signal never becomes active or expired again.
#[test]
fn test_suppressed_is_terminal() {
    let harness = harness(86_400_000);
    let signal = create_no_engagement(&harness, Timestamp::from_unix_millis(86_400_000));

    harness
        .service
        .update_status(&tenant(), &signal.signal_id, SignalStatus::Suppressed, Some("test"))
        .unwrap();

    let expire = harness.service.update_status(
        &tenant(),
        &signal.signal_id,
        SignalStatus::Expired,
        None,
    );
    assert!(matches!(expire, Err(SignalServiceError::InvalidTransition { .. })));

    let re_suppress = harness.service.update_status(
        &tenant(),
        &signal.signal_id,
        SignalStatus::Suppressed,
        Some("again"),
    );
    assert!(matches!(re_suppress, Err(SignalServiceError::InvalidTransition { .. })));
}

/// Tests that expiry is rejected while the TTL is still running.
#[test]
fn test_expiry_requires_elapsed_ttl() {
    let harness = harness(86_400_000);
    let signal = create_no_engagement(&harness, Timestamp::from_unix_millis(86_400_000));

    let early = harness.service.update_status(
        &tenant(),
        &signal.signal_id,
        SignalStatus::Expired,
        None,
    );
    assert!(matches!(early, Err(SignalServiceError::NotYetExpired(_))));

    // 31 days later the 30-day TTL has elapsed.
    harness.clock.set(Timestamp::from_unix_millis(86_400_000).plus_days(31));
    harness
        .service
        .update_status(&tenant(), &signal.signal_id, SignalStatus::Expired, None)
        .unwrap();

    // Expired signals may still be suppressed.
    harness
        .service
        .update_status(&tenant(), &signal.signal_id, SignalStatus::Suppressed, Some("late"))
        .unwrap();
}

// ============================================================================
// SECTION: Index Synchronization
// ============================================================================

/// Tests that suppression removes the signal from the active index.
#[test]
fn test_suppression_unindexes_signal() {
    let harness = harness(86_400_000);
    let signal = create_no_engagement(&harness, Timestamp::from_unix_millis(86_400_000));

    let before = harness.perception.load_account(&tenant(), &account()).unwrap().unwrap();
    assert!(before.has_active(SignalType::NoEngagementPresent));

    harness
        .service
        .update_status(&tenant(), &signal.signal_id, SignalStatus::Suppressed, Some("test"))
        .unwrap();

    let after = harness.perception.load_account(&tenant(), &account()).unwrap().unwrap();
    assert!(!after.has_active(SignalType::NoEngagementPresent));

    let stored = harness.service.signal(&tenant(), &signal.signal_id).unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Suppressed);
    assert!(stored.suppression.is_some());
}

// ============================================================================
// SECTION: Read-Time Expiry
// ============================================================================

/// Tests that TTL-elapsed rows drop out of active reads before any sweep.
#[test]
fn test_read_time_ttl_filtering() {
    let harness = harness(86_400_000);
    create_no_engagement(&harness, Timestamp::from_unix_millis(86_400_000));

    let active = harness
        .service
        .signals_for_account(&tenant(), &account(), &SignalFilter::default())
        .unwrap();
    assert_eq!(active.len(), 1);

    harness.clock.set(Timestamp::from_unix_millis(86_400_000).plus_days(31));
    let active_later = harness
        .service
        .signals_for_account(&tenant(), &account(), &SignalFilter::default())
        .unwrap();
    assert!(active_later.is_empty());

    let expired = harness
        .service
        .signals_for_account(
            &tenant(),
            &account(),
            &SignalFilter {
                status: Some(SignalStatus::Expired),
                ..SignalFilter::default()
            },
        )
        .unwrap();
    assert_eq!(expired.len(), 1);
}
