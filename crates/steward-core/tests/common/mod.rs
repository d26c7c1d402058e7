// crates/steward-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Shared fixtures wiring in-memory stores for integration tests.
// Dependencies: steward-core
// ============================================================================
//! ## Overview
//! Builds a fully wired signal service over the in-memory stores with a
//! fixed clock, plus fixture builders for evidence and signals.

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
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use serde_json::Value;
use steward_core::AccountId;
use steward_core::EntityRef;
use steward_core::EvidenceId;
use steward_core::EvidenceRef;
use steward_core::EvidenceSnapshot;
use steward_core::FixedClock;
use steward_core::TenantId;
use steward_core::Timestamp;
use steward_core::Clock;
use steward_core::interfaces::AccountStateStore;
use steward_core::interfaces::EventBus;
use steward_core::interfaces::EvidenceStore;
use steward_core::interfaces::LedgerStore;
use steward_core::interfaces::SignalStore;
use steward_core::runtime::InMemoryEvidenceStore;
use steward_core::runtime::InMemoryLedgerStore;
use steward_core::runtime::InMemoryPerceptionStore;
use steward_core::runtime::RecordingEventBus;
use steward_core::runtime::SignalService;

/// Fully wired in-memory signal service harness.
pub struct Harness {
    /// Perception store (signals + accounts).
    pub perception: Arc<InMemoryPerceptionStore>,
    /// Append-only ledger.
    pub ledger: Arc<InMemoryLedgerStore>,
    /// Recording bus.
    pub bus: Arc<RecordingEventBus>,
    /// Evidence store.
    pub evidence: Arc<InMemoryEvidenceStore>,
    /// Fixed clock.
    pub clock: Arc<FixedClock>,
    /// Signal service under test.
    pub service: SignalService,
}

/// Builds a harness with the clock fixed at `now_millis`.
pub fn harness(now_millis: i64) -> Harness {
    let perception = Arc::new(InMemoryPerceptionStore::new());
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let bus = Arc::new(RecordingEventBus::new());
    let evidence = Arc::new(InMemoryEvidenceStore::new());
    let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(now_millis)));
    let service = SignalService::new(
        Arc::clone(&perception) as Arc<dyn SignalStore + Send + Sync>,
        Arc::clone(&perception) as Arc<dyn AccountStateStore + Send + Sync>,
        Arc::clone(&ledger) as Arc<dyn LedgerStore + Send + Sync>,
        Arc::clone(&bus) as Arc<dyn EventBus + Send + Sync>,
        Arc::clone(&evidence) as Arc<dyn EvidenceStore + Send + Sync>,
        Arc::clone(&clock) as Arc<dyn Clock + Send + Sync>,
    );
    Harness {
        perception,
        ledger,
        bus,
        evidence,
        clock,
        service,
    }
}

/// Stores an account evidence snapshot and returns it with its reference.
pub fn store_snapshot(
    harness: &Harness,
    tenant: &str,
    account: &str,
    captured_at: Timestamp,
    payload: Value,
) -> (EvidenceSnapshot, EvidenceRef) {
    let snapshot = EvidenceSnapshot {
        evidence_id: EvidenceId::new(format!("e-{account}-{}", captured_at.as_unix_millis())),
        tenant_id: TenantId::new(tenant),
        entity: EntityRef {
            entity_type: "account".to_string(),
            entity_id: account.to_string(),
        },
        schema_version: 1,
        detector_input_version: 1,
        captured_at,
        payload,
    };
    let reference = harness.evidence.store_snapshot(&snapshot).unwrap();
    (snapshot, reference)
}

/// Returns the conventional test tenant.
pub fn tenant() -> TenantId {
    TenantId::new("tenant-1")
}

/// Returns the conventional test account.
pub fn account() -> AccountId {
    AccountId::new("acct-1")
}
