// crates/steward-core/tests/replay.rs
// ============================================================================
// Module: Replay Tests
// Description: Tests for detector replay and evidence integrity.
// ============================================================================
//! ## Overview
//! Validates that replaying a detector over stored evidence reproduces the
//! stored identity, that mismatches ledger a validation entry without
//! mutating state, and that evidence reads fail closed on digest mismatch.

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
use steward_core::EvidenceRef;
use steward_core::HashAlgorithm;
use steward_core::HashDigest;
use steward_core::LedgerEventType;
use steward_core::SignalStatus;
use steward_core::Timestamp;
use steward_core::TraceId;
use steward_core::interfaces::EvidenceStore;
use steward_core::interfaces::EvidenceStoreError;
use steward_core::interfaces::LedgerStore;
use steward_core::interfaces::SignalStore;
use steward_core::runtime::SignalReplayer;
use steward_core::runtime::SignalWriter;
use steward_core::runtime::run_detector;

use common::harness;
use common::store_snapshot;
use common::tenant;

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Tests that replay reproduces the stored dedupe key and confidence.
#[test]
fn test_replay_matches_stored_signal() {
    let harness = harness(86_400_000);
    let (_, reference) = store_snapshot(
        &harness,
        "tenant-1",
        "acct-1",
        Timestamp::from_unix_millis(86_400_000),
        json!({"contracts": [{"contract_id": "c1", "days_to_renewal": 45}]}),
    );
    let registry = DetectorRegistry::standard();
    let detector = registry
        .detector(&steward_core::DetectorName::new("renewal-window"))
        .unwrap();
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-replay"),
    };
    let signals =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &reference, &context).unwrap();
    let created = harness.service.create_signal(signals[0].clone()).unwrap();

    let report = harness
        .service
        .replay(&tenant(), &created.signal().signal_id, detector.as_ref())
        .unwrap();
    assert!(report.matches);
    assert!(report.mismatches.is_empty());

    // The stored signal is untouched.
    let stored = harness
        .perception
        .get_signal(&tenant(), &created.signal().signal_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SignalStatus::Active);
}

/// Tests that a replay against the wrong detector ledgers a validation entry.
#[test]
fn test_replay_mismatch_ledgers_validation() {
    let harness = harness(86_400_000);
    let (_, reference) = store_snapshot(
        &harness,
        "tenant-1",
        "acct-1",
        Timestamp::from_unix_millis(86_400_000),
        json!({"contracts": [{"contract_id": "c1", "days_to_renewal": 45}]}),
    );
    let registry = DetectorRegistry::standard();
    let renewal = registry
        .detector(&steward_core::DetectorName::new("renewal-window"))
        .unwrap();
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-mismatch"),
    };
    let signals =
        run_detector(harness.evidence.as_ref(), renewal.as_ref(), &reference, &context).unwrap();
    let created = harness.service.create_signal(signals[0].clone()).unwrap();

    // The usage detector never emits renewal signals over this evidence.
    let usage = registry
        .detector(&steward_core::DetectorName::new("usage-trend"))
        .unwrap();
    let report = harness
        .service
        .replay(&tenant(), &created.signal().signal_id, usage.as_ref())
        .unwrap();
    assert!(!report.matches);
    assert_eq!(report.mismatches, vec!["signal_absent".to_string()]);

    let entries = harness.ledger.by_trace(&TraceId::new("trace-mismatch")).unwrap();
    assert!(
        entries
            .iter()
            .any(|entry| entry.event_type == LedgerEventType::Validation)
    );
}

// ============================================================================
// SECTION: Evidence Integrity
// ============================================================================

/// Tests that a tampered reference digest fails the read.
#[test]
fn test_tampered_digest_fails_fetch() {
    let harness = harness(86_400_000);
    let (_, reference) = store_snapshot(
        &harness,
        "tenant-1",
        "acct-1",
        Timestamp::from_unix_millis(86_400_000),
        json!({"metrics": []}),
    );

    let tampered = EvidenceRef {
        sha256: HashDigest {
            algorithm: HashAlgorithm::Sha256,
            value: "deadbeef".to_string(),
        },
        ..reference
    };
    let result = harness.evidence.fetch_snapshot(&tampered);
    assert!(matches!(result, Err(EvidenceStoreError::Integrity(_))));
}

/// Tests that synthetic execution refs are never fetchable.
#[test]
fn test_execution_refs_are_not_fetchable() {
    let harness = harness(86_400_000);
    let reference = steward_core::execution_evidence_ref(
        &tenant(),
        &common::account(),
        &steward_core::ActionIntentId::new("intent-1"),
        Timestamp::from_unix_millis(86_400_000),
        "SUCCEEDED",
    )
    .unwrap();
    let result = harness.evidence.fetch_snapshot(&reference);
    assert!(matches!(result, Err(EvidenceStoreError::NotFetchable(_))));
}
