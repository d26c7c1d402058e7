// crates/steward-core/tests/execution_pipeline.rs
// ============================================================================
// Module: Execution Pipeline Tests
// Description: Tests for staged execution, retries, dedupe, and compensation.
// ============================================================================
//! ## Overview
//! Validates the stage order outcomes: successful invocation, transient
//! retries, permanent short-circuits, attempt-lock exclusivity, cached
//! external writes, and automatic compensation with observable writes.

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

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;
use steward_core::ActionIntent;
use steward_core::ActionIntentId;
use steward_core::ActionType;
use steward_core::ActionTypeRegistry;
use steward_core::ActionTypeSpec;
use steward_core::ApprovalSource;
use steward_core::Clock;
use steward_core::CompensationStatus;
use steward_core::CompensationStrategy;
use steward_core::ErrorKind;
use steward_core::ExternalObjectRef;
use steward_core::OutcomeStatus;
use steward_core::RetryPolicy;
use steward_core::SignalType;
use steward_core::ToolInvocationResponse;
use steward_core::ToolName;
use steward_core::TraceId;
use steward_core::derive_external_write_key;
use steward_core::interfaces::AttemptStore;
use steward_core::interfaces::DedupeStore;
use steward_core::interfaces::GatewayError;
use steward_core::interfaces::IntentStore;
use steward_core::interfaces::LedgerStore;
use steward_core::interfaces::NoopSleeper;
use steward_core::interfaces::OutcomeStore;
use steward_core::interfaces::ToolGateway;
use steward_core::runtime::ExecutionConfig;
use steward_core::runtime::ExecutionPipeline;
use steward_core::runtime::ExecutionResult;
use steward_core::runtime::ExecutionSignalEmitter;
use steward_core::runtime::InMemoryAttemptStore;
use steward_core::runtime::InMemoryDedupeStore;
use steward_core::runtime::InMemoryIntentStore;
use steward_core::runtime::InMemoryOutcomeStore;
use steward_core::runtime::SignalFilter;
use steward_core::runtime::SignalReader;

use common::Harness;
use common::account;
use common::harness;
use common::tenant;

// ============================================================================
// SECTION: Mock Gateway
// ============================================================================

/// Gateway returning scripted responses in order.
struct ScriptedGateway {
    /// Scripted responses, consumed front to back.
    script: Mutex<VecDeque<Result<ToolInvocationResponse, GatewayError>>>,
    /// Number of invocations observed.
    invocations: AtomicU32,
}

impl ScriptedGateway {
    /// Creates a gateway with the provided script.
    fn new(script: Vec<Result<ToolInvocationResponse, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            invocations: AtomicU32::new(0),
        }
    }

    /// Returns the number of invocations observed.
    fn count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl ToolGateway for ScriptedGateway {
    fn invoke(
        &self,
        _tool: &ToolName,
        _schema_version: u32,
        _params: &Value,
    ) -> Result<ToolInvocationResponse, GatewayError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(GatewayError::Permanent {
                code: "script_exhausted".to_string(),
                message: "no scripted response remains".to_string(),
            })
        })
    }
}

/// Builds a successful invocation response.
fn ok_response() -> ToolInvocationResponse {
    ToolInvocationResponse {
        success: true,
        external_object_refs: vec![ExternalObjectRef {
            system: "CRM".to_string(),
            object_id: "task_1".to_string(),
        }],
        tool_run_ref: Some("run-1".to_string()),
        payload: Some(json!({"ok": true})),
        artifact_uri: None,
        error: None,
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Everything a pipeline test needs in one place.
struct PipelineFixture {
    /// Pipeline under test.
    pipeline: ExecutionPipeline,
    /// Scripted gateway.
    gateway: Arc<ScriptedGateway>,
    /// Attempt store for lock assertions.
    attempts: Arc<InMemoryAttemptStore>,
    /// Dedupe store for cache seeding.
    dedupe: Arc<InMemoryDedupeStore>,
    /// Outcome store.
    outcomes: Arc<InMemoryOutcomeStore>,
}

/// Returns the registry entry for the test action type.
fn registry() -> ActionTypeRegistry {
    let mut registry = ActionTypeRegistry::new();
    registry.register(ActionTypeSpec {
        action_type: ActionType::new("crm.create_task@v1"),
        tool_name: ToolName::new("crm_task_writer"),
        schema_version: 1,
        param_template: json!({"source": "steward"}),
        required_params: vec!["title".to_string()],
        compensation: CompensationStrategy::Automatic,
        compensation_tool: Some(ToolName::new("crm_task_remover")),
    });
    registry
}

/// Builds the pipeline fixture over the harness.
fn fixture(
    harness: &Harness,
    script: Vec<Result<ToolInvocationResponse, GatewayError>>,
) -> PipelineFixture {
    let gateway = Arc::new(ScriptedGateway::new(script));
    let attempts = Arc::new(InMemoryAttemptStore::new());
    let dedupe = Arc::new(InMemoryDedupeStore::new());
    let outcomes = Arc::new(InMemoryOutcomeStore::new());
    let intents = Arc::new(InMemoryIntentStore::new());
    intents.save_intent(&intent()).unwrap();

    let pipeline = ExecutionPipeline::new(
        intents,
        Arc::clone(&attempts) as Arc<dyn AttemptStore + Send + Sync>,
        Arc::clone(&outcomes) as Arc<dyn OutcomeStore + Send + Sync>,
        Arc::clone(&dedupe) as Arc<dyn DedupeStore + Send + Sync>,
        registry(),
        Arc::clone(&gateway) as Arc<dyn ToolGateway + Send + Sync>,
        Arc::clone(&harness.ledger) as Arc<dyn LedgerStore + Send + Sync>,
        ExecutionSignalEmitter::new(Arc::new(harness.service.clone())),
        ExecutionConfig {
            timeout_hours: 1,
            retry: RetryPolicy {
                attempts: 3,
                initial_backoff_millis: 1,
                factor: 2,
            },
        },
        Arc::clone(&harness.clock) as Arc<dyn Clock + Send + Sync>,
        Arc::new(NoopSleeper),
    );
    PipelineFixture {
        pipeline,
        gateway,
        attempts,
        dedupe,
        outcomes,
    }
}

/// Returns the conventional approved intent.
fn intent() -> ActionIntent {
    ActionIntent {
        action_intent_id: ActionIntentId::new("intent-1"),
        tenant_id: tenant(),
        account_id: account(),
        action_type: ActionType::new("crm.create_task@v1"),
        parameters: json!({"title": "follow up"}),
        trace_id: TraceId::new("trace-exec"),
        approved: true,
        approval_source: Some(ApprovalSource::AutonomyPolicy),
        proposed_at: steward_core::Timestamp::from_unix_millis(86_000_000),
    }
}

// ============================================================================
// SECTION: Success Path
// ============================================================================

/// Tests the full success path including the outcome signal.
#[test]
fn test_successful_execution_records_and_emits() {
    let harness = harness(86_400_000);
    let fixture = fixture(&harness, vec![Ok(ok_response())]);

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert_eq!(outcome.attempt_count, 1);
    assert_eq!(fixture.gateway.count(), 1);

    // The outcome signal feeds back into perception.
    let signals = harness
        .service
        .signals_for_account(&tenant(), &account(), &SignalFilter::default())
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, SignalType::ActionExecuted);
    assert!(signals[0].evidence.uri.starts_with("execution://"));

    // The trace carries an outcome ledger entry and the signal entry.
    let entries = harness.ledger.by_trace(&TraceId::new("trace-exec")).unwrap();
    assert!(!entries.is_empty());
}

// ============================================================================
// SECTION: Retry Classification
// ============================================================================

/// Tests that transient failures retry up to the policy and then succeed.
#[test]
fn test_transient_failures_retry_then_succeed() {
    let harness = harness(86_400_000);
    let transient = || {
        Err(GatewayError::Transient {
            code: "503".to_string(),
            message: "upstream unavailable".to_string(),
        })
    };
    let fixture = fixture(&harness, vec![transient(), transient(), Ok(ok_response())]);

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert_eq!(fixture.gateway.count(), 3);
}

/// Tests that exhausted retries record a transient failure outcome.
#[test]
fn test_exhausted_retries_record_failure() {
    let harness = harness(86_400_000);
    let transient = || {
        Err(GatewayError::Transient {
            code: "ETIMEDOUT".to_string(),
            message: "socket timeout".to_string(),
        })
    };
    let fixture = fixture(&harness, vec![transient(), transient(), transient()]);

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::TransientUpstream);
    assert_eq!(fixture.gateway.count(), 3);

    let signals = harness
        .service
        .signals_for_account(&tenant(), &account(), &SignalFilter::default())
        .unwrap();
    assert_eq!(signals[0].signal_type, SignalType::ActionFailed);
}

/// Tests that permanent failures never retry.
#[test]
fn test_permanent_failure_short_circuits() {
    let harness = harness(86_400_000);
    let fixture = fixture(
        &harness,
        vec![Err(GatewayError::Permanent {
            code: "400".to_string(),
            message: "invalid payload".to_string(),
        })],
    );

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::PermanentUpstream);
    assert_eq!(fixture.gateway.count(), 1);
}

// ============================================================================
// SECTION: Attempt Lock
// ============================================================================

/// Tests that a live lock aborts a concurrent execution.
#[test]
fn test_live_lock_aborts_concurrent_execution() {
    let harness = harness(86_400_000);
    let fixture = fixture(&harness, vec![Ok(ok_response())]);

    let now = harness.clock.now();
    fixture
        .attempts
        .acquire(&tenant(), &ActionIntentId::new("intent-1"), now, now.plus_hours(1))
        .unwrap();

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    assert!(matches!(result, ExecutionResult::AlreadyRunning));
    assert_eq!(fixture.gateway.count(), 0);
}

// ============================================================================
// SECTION: External-Write Dedupe
// ============================================================================

/// Tests that a cached prior write skips the gateway entirely.
#[test]
fn test_prior_write_returns_cached_outcome() {
    let harness = harness(86_400_000);
    let fixture = fixture(&harness, vec![Ok(ok_response())]);

    // A prior success exists for this intent's first attempt.
    let key = derive_external_write_key(&ActionIntentId::new("intent-1"), 1).unwrap();
    fixture.dedupe.reserve_write(&tenant(), &key).unwrap();
    fixture.dedupe.record_write(&tenant(), &key, &ok_response()).unwrap();

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert_eq!(fixture.gateway.count(), 0);
}

// ============================================================================
// SECTION: Compensation
// ============================================================================

/// Tests automatic compensation for a failed write with observable refs.
#[test]
fn test_failed_write_with_refs_compensates() {
    let harness = harness(86_400_000);
    let failed_with_refs = ToolInvocationResponse {
        success: false,
        external_object_refs: vec![ExternalObjectRef {
            system: "CRM".to_string(),
            object_id: "task_1".to_string(),
        }],
        tool_run_ref: Some("run-1".to_string()),
        payload: None,
        artifact_uri: None,
        error: Some(steward_core::ToolErrorInfo {
            kind: ErrorKind::PermanentUpstream,
            code: "409".to_string(),
            message: "partial write".to_string(),
        }),
    };
    let compensation_ok = ToolInvocationResponse {
        success: true,
        external_object_refs: Vec::new(),
        tool_run_ref: Some("comp-1".to_string()),
        payload: None,
        artifact_uri: None,
        error: None,
    };
    let fixture = fixture(&harness, vec![Ok(failed_with_refs), Ok(compensation_ok)]);

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.compensation_status, CompensationStatus::Completed);
    assert_eq!(outcome.external_object_refs.len(), 1);
    // One invocation for the write, one for the compensation.
    assert_eq!(fixture.gateway.count(), 2);

    let stored = fixture
        .outcomes
        .load_outcome(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.compensation_status, CompensationStatus::Completed);
}

/// Tests that failures without observable writes skip compensation.
#[test]
fn test_failure_without_refs_skips_compensation() {
    let harness = harness(86_400_000);
    let failed_clean = ToolInvocationResponse {
        success: false,
        external_object_refs: Vec::new(),
        tool_run_ref: None,
        payload: None,
        artifact_uri: None,
        error: Some(steward_core::ToolErrorInfo {
            kind: ErrorKind::PermanentUpstream,
            code: "422".to_string(),
            message: "rejected".to_string(),
        }),
    };
    let fixture = fixture(&harness, vec![Ok(failed_clean)]);

    let result = fixture
        .pipeline
        .execute(&tenant(), &ActionIntentId::new("intent-1"))
        .unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.compensation_status, CompensationStatus::None);
    assert_eq!(fixture.gateway.count(), 1);
}

// ============================================================================
// SECTION: Preflight
// ============================================================================

/// Tests that missing required parameters fail preflight without invoking.
#[test]
fn test_missing_required_param_fails_preflight() {
    let harness = harness(86_400_000);
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(ok_response())]));
    let intents = Arc::new(InMemoryIntentStore::new());
    let mut bare = intent();
    bare.parameters = json!({});
    intents.save_intent(&bare).unwrap();

    let pipeline = ExecutionPipeline::new(
        intents,
        Arc::new(InMemoryAttemptStore::new()),
        Arc::new(InMemoryOutcomeStore::new()),
        Arc::new(InMemoryDedupeStore::new()),
        registry(),
        Arc::clone(&gateway) as Arc<dyn ToolGateway + Send + Sync>,
        Arc::clone(&harness.ledger) as Arc<dyn LedgerStore + Send + Sync>,
        ExecutionSignalEmitter::new(Arc::new(harness.service.clone())),
        ExecutionConfig::default(),
        Arc::clone(&harness.clock) as Arc<dyn Clock + Send + Sync>,
        Arc::new(NoopSleeper),
    );

    let result = pipeline.execute(&tenant(), &ActionIntentId::new("intent-1")).unwrap();
    let ExecutionResult::Completed(outcome) = result else {
        panic!("execution must complete");
    };
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::Validation);
    assert_eq!(gateway.count(), 0);
}
