// crates/steward-connectors/tests/runtime.rs
// ============================================================================
// Module: Connector Runtime Tests
// Description: Tests for pull execution, sync-state atomicity, and events.
// ============================================================================
//! ## Overview
//! Validates content-addressed capture, sync-state advancement only after
//! full emission, poll-failure event emission, and rate-limit refusal.

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

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde_json::json;
use steward_connectors::Connector;
use steward_connectors::ConnectorError;
use steward_connectors::ConnectorRecord;
use steward_connectors::ConnectorRuntime;
use steward_connectors::InMemorySyncStateStore;
use steward_connectors::PollBatch;
use steward_connectors::RuntimeError;
use steward_connectors::SyncMode;
use steward_connectors::SyncState;
use steward_connectors::SyncStateStore;
use steward_core::AccountId;
use steward_core::ConnectorId;
use steward_core::CorrelationId;
use steward_core::EntityRef;
use steward_core::EventKind;
use steward_core::FixedClock;
use steward_core::PullDepth;
use steward_core::PullJob;
use steward_core::PullJobId;
use steward_core::TenantId;
use steward_core::Timestamp;
use steward_core::interfaces::EventBus;
use steward_core::interfaces::EvidenceStore;
use steward_core::runtime::InMemoryEvidenceStore;
use steward_core::runtime::RecordingEventBus;

// ============================================================================
// SECTION: Test Connector
// ============================================================================

/// Connector returning a fixed batch or a scripted failure.
struct FixtureConnector {
    /// Whether poll should fail.
    fail: AtomicBool,
}

impl FixtureConnector {
    /// Creates a connector that succeeds.
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    /// Makes the next poll fail.
    fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl Connector for FixtureConnector {
    fn connector_id(&self) -> ConnectorId {
        ConnectorId::new("crm")
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Timestamp
    }

    fn connect(&self, _tenant_id: &TenantId) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn poll(
        &self,
        _tenant_id: &TenantId,
        account_id: &AccountId,
        _depth: PullDepth,
        state: &SyncState,
    ) -> Result<PollBatch, ConnectorError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ConnectorError::Poll {
                code: "503".to_string(),
                message: "upstream unavailable".to_string(),
                transient: true,
            });
        }
        let since = state.last_sync_at.map_or(0, Timestamp::as_unix_millis);
        Ok(PollBatch {
            records: vec![ConnectorRecord {
                entity: EntityRef {
                    entity_type: "account".to_string(),
                    entity_id: account_id.as_str().to_string(),
                },
                schema_version: 1,
                detector_input_version: 1,
                payload: json!({"since": since, "engagements": []}),
            }],
            next_state: SyncState {
                last_sync_at: Some(Timestamp::from_unix_millis(since + 1_000)),
                cursor: None,
            },
        })
    }

    fn disconnect(&self, _tenant_id: &TenantId) -> Result<(), ConnectorError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Everything a runtime test needs in one place.
struct RuntimeFixture {
    /// Runtime under test.
    runtime: ConnectorRuntime,
    /// Shared connector handle.
    connector: Arc<FixtureConnector>,
    /// Sync state store.
    sync_states: Arc<InMemorySyncStateStore>,
    /// Evidence store.
    evidence: Arc<InMemoryEvidenceStore>,
    /// Recording bus.
    bus: Arc<RecordingEventBus>,
}

/// Wraps the shared connector so the runtime and test observe one instance.
struct SharedConnector {
    /// Shared inner connector.
    inner: Arc<FixtureConnector>,
}

impl Connector for SharedConnector {
    fn connector_id(&self) -> ConnectorId {
        self.inner.connector_id()
    }

    fn sync_mode(&self) -> SyncMode {
        self.inner.sync_mode()
    }

    fn connect(&self, tenant_id: &TenantId) -> Result<(), ConnectorError> {
        self.inner.connect(tenant_id)
    }

    fn poll(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        depth: PullDepth,
        state: &SyncState,
    ) -> Result<PollBatch, ConnectorError> {
        self.inner.poll(tenant_id, account_id, depth, state)
    }

    fn disconnect(&self, tenant_id: &TenantId) -> Result<(), ConnectorError> {
        self.inner.disconnect(tenant_id)
    }
}

/// Builds a runtime fixture with the given rate limit.
fn fixture(requests_per_minute: u32, burst: u32) -> RuntimeFixture {
    let connector = Arc::new(FixtureConnector::new());
    let sync_states = Arc::new(InMemorySyncStateStore::new());
    let evidence = Arc::new(InMemoryEvidenceStore::new());
    let bus = Arc::new(RecordingEventBus::new());
    let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(86_400_000)));
    let runtime = ConnectorRuntime::new(
        Arc::clone(&sync_states) as Arc<dyn SyncStateStore>,
        Arc::clone(&evidence) as Arc<dyn EvidenceStore + Send + Sync>,
        Arc::clone(&bus) as Arc<dyn EventBus + Send + Sync>,
        clock,
    )
    .with_connector(SharedConnector { inner: Arc::clone(&connector) }, requests_per_minute, burst);
    RuntimeFixture {
        runtime,
        connector,
        sync_states,
        evidence,
        bus,
    }
}

/// Returns the conventional pull job.
fn job() -> PullJob {
    PullJob {
        pull_job_id: PullJobId::new("pull-1"),
        tenant_id: TenantId::new("tenant-1"),
        account_id: AccountId::new("acct-1"),
        connector_id: ConnectorId::new("crm"),
        depth: PullDepth::Shallow,
        depth_units: 1,
        scheduled_at: Timestamp::from_unix_millis(86_400_000),
        correlation_id: CorrelationId::new("corr-1"),
        budget_remaining: None,
    }
}

// ============================================================================
// SECTION: Capture and Sync State
// ============================================================================

/// Tests that a pull captures verifiable evidence and advances sync state.
#[test]
fn test_pull_captures_and_advances_state() {
    let fixture = fixture(60, 10);

    let refs = fixture.runtime.run_pull(&job()).unwrap();
    assert_eq!(refs.len(), 1);

    // The stored snapshot verifies against its reference.
    let snapshot = fixture.evidence.fetch_snapshot(&refs[0]).unwrap();
    assert_eq!(snapshot.entity.entity_id, "acct-1");

    let state = fixture
        .sync_states
        .load_sync_state(
            &TenantId::new("tenant-1"),
            &ConnectorId::new("crm"),
            &AccountId::new("acct-1"),
        )
        .unwrap()
        .expect("sync state must advance after full emission");
    assert_eq!(state.last_sync_at, Some(Timestamp::from_unix_millis(1_000)));

    let kinds: Vec<EventKind> =
        fixture.bus.events().iter().map(|envelope| envelope.kind).collect();
    assert_eq!(kinds, vec![EventKind::ConnectorPollCompleted]);
}

/// Tests that a failed poll emits the failure event and keeps sync state.
#[test]
fn test_poll_failure_preserves_sync_state() {
    let fixture = fixture(60, 10);
    fixture.connector.fail_next();

    let result = fixture.runtime.run_pull(&job());
    assert!(matches!(result, Err(RuntimeError::Connector(ConnectorError::Poll { .. }))));

    let state = fixture
        .sync_states
        .load_sync_state(
            &TenantId::new("tenant-1"),
            &ConnectorId::new("crm"),
            &AccountId::new("acct-1"),
        )
        .unwrap();
    assert!(state.is_none());

    let kinds: Vec<EventKind> =
        fixture.bus.events().iter().map(|envelope| envelope.kind).collect();
    assert_eq!(kinds, vec![EventKind::ConnectorPollFailed]);

    // The next pull succeeds and re-reads from the untouched state.
    let refs = fixture.runtime.run_pull(&job()).unwrap();
    assert_eq!(refs.len(), 1);
}

/// Tests that identical payloads capture to the same content address.
#[test]
fn test_capture_is_content_addressed() {
    let fixture = fixture(60, 10);

    let first = fixture.runtime.run_pull(&job()).unwrap();
    // Reset sync state so the connector re-emits the same payload.
    fixture
        .sync_states
        .save_sync_state(
            &TenantId::new("tenant-1"),
            &ConnectorId::new("crm"),
            &AccountId::new("acct-1"),
            &SyncState::default(),
        )
        .unwrap();
    let second = fixture.runtime.run_pull(&job()).unwrap();

    assert_eq!(first[0].sha256, second[0].sha256);
    assert_eq!(first[0].uri, second[0].uri);
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

/// Tests that the token bucket refuses calls past the burst.
#[test]
fn test_rate_limit_refuses_past_burst() {
    let fixture = fixture(1, 1);

    assert!(fixture.runtime.run_pull(&job()).is_ok());
    let second = fixture.runtime.run_pull(&job());
    assert!(matches!(
        second,
        Err(RuntimeError::Connector(ConnectorError::RateLimited(_)))
    ));
}
