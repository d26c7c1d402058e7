// crates/steward-core/tests/autonomy_audit.rs
// ============================================================================
// Module: Autonomy and Audit Tests
// Description: Tests for the autonomy gate and the audit exporter.
// ============================================================================
//! ## Overview
//! Validates allowlist and budget enforcement for auto-approval, the
//! ACTION_APPROVED emission shape, and hashed audit export artifacts.

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

use serde_json::json;
use steward_core::ActionIntent;
use steward_core::ActionIntentId;
use steward_core::ActionType;
use steward_core::DEFAULT_HASH_ALGORITHM;
use steward_core::EventKind;
use steward_core::ExportJobId;
use steward_core::LedgerEntry;
use steward_core::LedgerEventType;
use steward_core::Timestamp;
use steward_core::TraceId;
use steward_core::hashing::hash_bytes;
use steward_core::interfaces::ArtifactStore;
use steward_core::interfaces::LedgerStore;
use steward_core::runtime::AuditExporter;
use steward_core::runtime::AutonomyDecision;
use steward_core::runtime::AutonomyGate;
use steward_core::runtime::AutonomyPolicy;
use steward_core::runtime::InMemoryArtifactStore;
use steward_core::runtime::InMemoryAuditExportStore;
use steward_core::runtime::InMemoryBudgetStore;

use common::Harness;
use common::account;
use common::harness;
use common::tenant;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds an unapproved intent for the given action type.
fn intent(action_type: &str) -> ActionIntent {
    ActionIntent {
        action_intent_id: ActionIntentId::new("intent-1"),
        tenant_id: tenant(),
        account_id: account(),
        action_type: ActionType::new(action_type),
        parameters: json!({"title": "call"}),
        trace_id: TraceId::new("trace-1"),
        approved: false,
        approval_source: None,
        proposed_at: Timestamp::from_unix_millis(86_400_000),
    }
}

/// Builds an autonomy gate over the harness.
fn gate(harness: &Harness, policy: AutonomyPolicy) -> AutonomyGate {
    AutonomyGate::new(
        policy,
        Arc::new(InMemoryBudgetStore::new()),
        Arc::clone(&harness.bus),
        Arc::clone(&harness.clock),
    )
}

// ============================================================================
// SECTION: Autonomy Gate
// ============================================================================

/// Tests that an allowlisted action auto-approves and emits the event.
#[test]
fn test_allowlisted_action_auto_approves() {
    let harness = harness(86_400_000);
    let gate = gate(
        &harness,
        AutonomyPolicy {
            auto_approve_types: vec![ActionType::new("crm.create_task@v1")],
            max_auto_actions_per_day: 5,
        },
    );

    let decision = gate.evaluate(&intent("crm.create_task@v1")).unwrap();
    assert_eq!(decision, AutonomyDecision::AutoApproved);

    let events = harness.bus.events();
    let approved = events
        .iter()
        .find(|envelope| envelope.kind == EventKind::ActionApproved)
        .expect("approval event must be emitted");
    let data = approved.detail.get("data").unwrap();
    assert_eq!(data.get("approval_source"), Some(&json!("autonomy_policy")));
    assert_eq!(data.get("auto_executed"), Some(&json!(true)));
    assert_eq!(data.get("action_intent_id"), Some(&json!("intent-1")));
}

/// Tests that unlisted actions defer to human approval.
#[test]
fn test_unlisted_action_requires_human() {
    let harness = harness(86_400_000);
    let gate = gate(
        &harness,
        AutonomyPolicy {
            auto_approve_types: vec![ActionType::new("crm.create_task@v1")],
            max_auto_actions_per_day: 5,
        },
    );
    let decision = gate.evaluate(&intent("crm.delete_account@v1")).unwrap();
    assert!(matches!(decision, AutonomyDecision::RequiresHuman { .. }));
    assert!(harness.bus.events().is_empty());
}

/// Tests that the daily autonomy budget caps auto-approvals.
#[test]
fn test_autonomy_budget_caps_approvals() {
    let harness = harness(86_400_000);
    let gate = gate(
        &harness,
        AutonomyPolicy {
            auto_approve_types: vec![ActionType::new("crm.create_task@v1")],
            max_auto_actions_per_day: 2,
        },
    );

    assert_eq!(gate.evaluate(&intent("crm.create_task@v1")).unwrap(), AutonomyDecision::AutoApproved);
    assert_eq!(gate.evaluate(&intent("crm.create_task@v1")).unwrap(), AutonomyDecision::AutoApproved);
    let third = gate.evaluate(&intent("crm.create_task@v1")).unwrap();
    let AutonomyDecision::RequiresHuman { reason } = third else {
        panic!("third approval must exceed the budget");
    };
    assert_eq!(reason, "autonomy_budget_exceeded");
}

// ============================================================================
// SECTION: Audit Export
// ============================================================================

/// Tests that an export collects the range and records a verifiable digest.
#[test]
fn test_export_writes_hashed_artifact() {
    let harness = harness(86_400_000);
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let exports = Arc::new(InMemoryAuditExportStore::new());

    for index in 0..3_i64 {
        let entry = LedgerEntry::for_trace(
            tenant(),
            account(),
            TraceId::new("trace-export"),
            LedgerEventType::Signal,
            Timestamp::from_unix_millis(86_400_000 + index * 1_000),
            &format!("entry-{index}"),
            json!({"index": index}),
        );
        harness.ledger.append(&entry).unwrap();
    }

    let exporter = AuditExporter::new(
        Arc::clone(&harness.ledger),
        Arc::clone(&artifacts),
        Arc::clone(&exports),
        Arc::clone(&harness.clock),
    );
    let record = exporter
        .export(
            &ExportJobId::new("export-1"),
            &tenant(),
            &account(),
            Timestamp::from_unix_millis(86_000_000),
            Timestamp::from_unix_millis(90_000_000),
        )
        .unwrap();
    assert_eq!(record.entry_count, 3);

    // The stored artifact hashes to the recorded digest.
    let bytes = artifacts.get_artifact("export-1/ledger-export.json").unwrap();
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    assert_eq!(digest, record.artifact_sha256);
}
