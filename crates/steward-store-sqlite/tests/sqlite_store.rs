// crates/steward-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Tests for conditional writes and transactional coupling.
// ============================================================================
//! ## Overview
//! Validates that the durable store matches the reference semantics: signal
//! writes couple with the read-model, dedupe and idempotency guards hold,
//! budget consumption is atomic, the ledger is append-only with idempotent
//! duplicates, and attempt locks expire into incremented attempts.

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

use serde_json::json;
use steward_core::AccountId;
use steward_core::AccountState;
use steward_core::ActionIntentId;
use steward_core::Confidence;
use steward_core::ConfidenceSource;
use steward_core::ConnectorId;
use steward_core::DetectorName;
use steward_core::EvidenceRef;
use steward_core::HashAlgorithm;
use steward_core::HashDigest;
use steward_core::LedgerEntry;
use steward_core::LedgerEventType;
use steward_core::Severity;
use steward_core::Signal;
use steward_core::SignalStatus;
use steward_core::SignalTtl;
use steward_core::SignalType;
use steward_core::SuppressionMeta;
use steward_core::TenantId;
use steward_core::Timestamp;
use steward_core::ToolInvocationResponse;
use steward_core::TraceId;
use steward_core::derive_dedupe_key;
use steward_core::derive_signal_id;
use steward_core::interfaces::AccountStateStore;
use steward_core::interfaces::AttemptLock;
use steward_core::interfaces::AttemptStore;
use steward_core::interfaces::BudgetConsume;
use steward_core::interfaces::BudgetScope;
use steward_core::interfaces::BudgetStore;
use steward_core::interfaces::DedupeReservation;
use steward_core::interfaces::DedupeStore;
use steward_core::interfaces::IdempotencyStore;
use steward_core::interfaces::LedgerStore;
use steward_core::interfaces::Reservation;
use steward_core::interfaces::SignalStore;
use steward_core::interfaces::SignalWrite;
use steward_store_sqlite::SqliteStewardStore;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns the conventional test tenant.
fn tenant() -> TenantId {
    TenantId::new("tenant-1")
}

/// Builds a signal bound to synthetic evidence.
fn signal(window: &str) -> Signal {
    let account = AccountId::new("acct-1");
    let evidence_hash = HashDigest {
        algorithm: HashAlgorithm::Sha256,
        value: "ab".repeat(32),
    };
    let dedupe_key = derive_dedupe_key(
        &account,
        SignalType::UsageTrendChange,
        window,
        &evidence_hash,
    )
    .unwrap();
    let signal_id = derive_signal_id(&dedupe_key);
    Signal {
        signal_id,
        tenant_id: tenant(),
        account_id: account,
        signal_type: SignalType::UsageTrendChange,
        status: SignalStatus::Active,
        confidence: Confidence::new(0.9, ConfidenceSource::Direct),
        severity: Severity::Medium,
        ttl: SignalTtl::Days(14),
        window_key: window.to_string(),
        dedupe_key,
        evidence: EvidenceRef {
            uri: "s3://bucket/evidence/account/acct-1/e1.json".to_string(),
            sha256: evidence_hash,
            captured_at: Timestamp::from_unix_millis(86_400_000),
            schema_version: 1,
            detector_input_version: 1,
        },
        detector: DetectorName::new("usage-trend"),
        detector_version: 1,
        inference_active: true,
        context: serde_json::Map::new(),
        metadata: serde_json::Map::new(),
        suppression: None,
        trace_id: TraceId::new("trace-1"),
        created_at: Timestamp::from_unix_millis(86_400_000),
    }
}

/// Builds the read-model row indexed with the given signal.
fn state_with(signal: &Signal) -> AccountState {
    let mut state = AccountState::new(signal.tenant_id.clone(), signal.account_id.clone());
    state.index_signal(signal.signal_type, &signal.signal_id);
    state
}

// ============================================================================
// SECTION: Signal Coupling
// ============================================================================

/// Tests that the signal insert couples with the read-model write.
#[test]
fn test_insert_couples_signal_and_state() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let signal = signal("d1");
    let state = state_with(&signal);

    let write = store.insert_signal_with_state(&signal, &state).unwrap();
    assert_eq!(write, SignalWrite::Inserted);

    let loaded_signal = store.get_signal(&tenant(), &signal.signal_id).unwrap().unwrap();
    assert_eq!(loaded_signal, signal);
    let loaded_state =
        store.load_account(&tenant(), &signal.account_id).unwrap().unwrap();
    assert!(loaded_state.has_active(SignalType::UsageTrendChange));
}

/// Tests that duplicate signal ids resolve to the stored row.
#[test]
fn test_duplicate_insert_returns_existing() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let signal = signal("d1");
    let state = state_with(&signal);

    store.insert_signal_with_state(&signal, &state).unwrap();
    let write = store.insert_signal_with_state(&signal, &state).unwrap();
    let SignalWrite::Duplicate(existing) = write else {
        panic!("second insert must report the duplicate");
    };
    assert_eq!(existing.signal_id, signal.signal_id);
}

/// Tests that the dedupe index resolves to the original signal.
#[test]
fn test_dedupe_index_resolves_original() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let signal = signal("d1");
    store.insert_signal_with_state(&signal, &state_with(&signal)).unwrap();

    let found = store.find_by_dedupe_key(&tenant(), &signal.dedupe_key).unwrap().unwrap();
    assert_eq!(found.signal_id, signal.signal_id);
}

/// Tests that status updates persist suppression metadata with the state.
#[test]
fn test_status_update_persists_suppression() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let signal = signal("d1");
    store.insert_signal_with_state(&signal, &state_with(&signal)).unwrap();

    let mut cleared = state_with(&signal);
    cleared.unindex_signal(signal.signal_type, &signal.signal_id);
    store
        .update_status_with_state(
            &tenant(),
            &signal.signal_id,
            SignalStatus::Suppressed,
            Some(&SuppressionMeta {
                reason: "lifecycle_transition:PROSPECT->SUSPECT".to_string(),
                suppressed_at: Timestamp::from_unix_millis(90_000_000),
            }),
            &cleared,
        )
        .unwrap();

    let stored = store.get_signal(&tenant(), &signal.signal_id).unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Suppressed);
    assert!(stored.suppression.is_some());
    let state = store.load_account(&tenant(), &signal.account_id).unwrap().unwrap();
    assert!(!state.has_active(SignalType::UsageTrendChange));
}

// ============================================================================
// SECTION: Budgets
// ============================================================================

/// Tests atomic two-row consumption with the connector row constraining.
#[test]
fn test_budget_two_row_consumption() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let connector = ConnectorId::new("crm");

    let first = store
        .consume(BudgetScope::Pull, &tenant(), 1, 2, 10, Some((&connector, 3)))
        .unwrap();
    assert_eq!(
        first,
        BudgetConsume::Consumed {
            tenant_remaining: Some(8),
        }
    );

    // Two more units exceed the connector cap of three; nothing is consumed.
    let second = store
        .consume(BudgetScope::Pull, &tenant(), 1, 2, 10, Some((&connector, 3)))
        .unwrap();
    assert_eq!(second, BudgetConsume::Exceeded);
    assert_eq!(store.consumed(BudgetScope::Pull, &tenant(), 1).unwrap(), 2);
}

/// Tests that scopes consume from independent windows.
#[test]
fn test_budget_scopes_are_independent() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    store.consume(BudgetScope::Pull, &tenant(), 1, 5, 5, None).unwrap();

    let decision = store.consume(BudgetScope::Decision, &tenant(), 1, 1, 5, None).unwrap();
    assert!(matches!(decision, BudgetConsume::Consumed { .. }));
}

// ============================================================================
// SECTION: Idempotency and Locks
// ============================================================================

/// Tests first-writer-wins reservation with TTL reclaim.
#[test]
fn test_reservation_ttl_reclaim() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let now = Timestamp::from_unix_millis(86_400_000);

    assert_eq!(store.reserve("pull:x", now, 24).unwrap(), Reservation::Reserved);
    assert_eq!(
        store.reserve("pull:x", now.plus_hours(1), 24).unwrap(),
        Reservation::Duplicate
    );
    assert_eq!(
        store.reserve("pull:x", now.plus_hours(25), 24).unwrap(),
        Reservation::Reserved
    );
}

/// Tests that an expired attempt lock re-acquires with a higher count.
#[test]
fn test_attempt_lock_expiry_increments_count() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let intent = ActionIntentId::new("intent-1");
    let now = Timestamp::from_unix_millis(86_400_000);

    let first = store.acquire(&tenant(), &intent, now, now.plus_hours(1)).unwrap();
    let AttemptLock::Acquired(attempt) = first else {
        panic!("first acquire must succeed");
    };
    assert_eq!(attempt.attempt_count, 1);

    let held = store.acquire(&tenant(), &intent, now.plus_hours(0), now.plus_hours(1)).unwrap();
    assert!(matches!(held, AttemptLock::Held(_)));

    let reacquired = store
        .acquire(&tenant(), &intent, now.plus_hours(2), now.plus_hours(3))
        .unwrap();
    let AttemptLock::Acquired(attempt) = reacquired else {
        panic!("expired lock must re-acquire");
    };
    assert_eq!(attempt.attempt_count, 2);
}

/// Tests that recorded writes return the cached response on reservation.
#[test]
fn test_dedupe_returns_cached_response() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let key = HashDigest {
        algorithm: HashAlgorithm::Sha256,
        value: "cd".repeat(32),
    };

    assert!(matches!(
        store.reserve_write(&tenant(), &key).unwrap(),
        DedupeReservation::Reserved
    ));
    let response = ToolInvocationResponse {
        success: true,
        external_object_refs: Vec::new(),
        tool_run_ref: Some("run-9".to_string()),
        payload: None,
        artifact_uri: None,
        error: None,
    };
    store.record_write(&tenant(), &key, &response).unwrap();

    let DedupeReservation::Prior(cached) = store.reserve_write(&tenant(), &key).unwrap() else {
        panic!("recorded write must return the cached response");
    };
    assert_eq!(cached.tool_run_ref, Some("run-9".to_string()));
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Tests that duplicate sort keys return the existing entry unchanged.
#[test]
fn test_ledger_duplicate_returns_existing() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    let entry = LedgerEntry::for_trace(
        tenant(),
        AccountId::new("acct-1"),
        TraceId::new("trace-1"),
        LedgerEventType::Signal,
        Timestamp::from_unix_millis(86_400_000),
        "first",
        json!({"v": 1}),
    );
    store.append(&entry).unwrap();

    let mut altered = entry.clone();
    altered.data = json!({"v": 2});
    let stored = store.append(&altered).unwrap();
    assert_eq!(stored.data, json!({"v": 1}));

    let by_trace = store.by_trace(&TraceId::new("trace-1")).unwrap();
    assert_eq!(by_trace.len(), 1);
}

/// Tests that state survives reopening the database file.
#[test]
fn test_reopen_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = steward_store_sqlite::SqliteStoreConfig {
        path: dir.path().join("steward.db"),
        busy_timeout_ms: 1_000,
        journal_mode: steward_store_sqlite::SqliteJournalMode::Wal,
    };
    let signal = signal("d1");
    {
        let store = SqliteStewardStore::open(&config).unwrap();
        store.insert_signal_with_state(&signal, &state_with(&signal)).unwrap();
    }
    let reopened = SqliteStewardStore::open(&config).unwrap();
    let loaded = reopened.get_signal(&tenant(), &signal.signal_id).unwrap().unwrap();
    assert_eq!(loaded.signal_id, signal.signal_id);
}

/// Tests account time-range queries.
#[test]
fn test_ledger_account_time_range() {
    let store = SqliteStewardStore::open_in_memory().unwrap();
    for index in 0..5_i64 {
        let entry = LedgerEntry::for_trace(
            tenant(),
            AccountId::new("acct-1"),
            TraceId::new(format!("trace-{index}")),
            LedgerEventType::Outcome,
            Timestamp::from_unix_millis(index * 1_000),
            "entry",
            json!({"index": index}),
        );
        store.append(&entry).unwrap();
    }

    let entries = store
        .by_account_time_range(
            &tenant(),
            &AccountId::new("acct-1"),
            Timestamp::from_unix_millis(1_000),
            Timestamp::from_unix_millis(3_000),
        )
        .unwrap();
    assert_eq!(entries.len(), 3);
}
