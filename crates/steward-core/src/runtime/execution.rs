// crates/steward-core/src/runtime/execution.rs
// ============================================================================
// Module: Steward Execution Pipeline
// Description: Staged action execution with locks, retries, and compensation.
// Purpose: Run approved action intents through a deterministic state machine.
// Dependencies: crate::{core, interfaces, runtime::emitter}, serde_json
// ============================================================================

//! ## Overview
//! Execution runs each approved intent through a fixed stage order: acquire
//! the attempt lock, validate preflight, map the action type to a tool,
//! invoke the gateway (with transient retries and external-write dedupe),
//! optionally compensate, and record the terminal outcome. Any stage failure
//! routes to failure recording; an invocation failure with observable
//! external writes and an automatic strategy compensates first. Exactly one
//! execution is in flight per intent within the lock TTL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActionOutcome;
use crate::core::ActionTypeRegistry;
use crate::core::ActionTypeSpec;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::CompensationStatus;
use crate::core::CompensationStrategy;
use crate::core::ErrorKind;
use crate::core::ExecutionAttempt;
use crate::core::ExternalObjectRef;
use crate::hashing::HashError;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::OutcomeStatus;
use crate::core::RetryPolicy;
use crate::core::TenantId;
use crate::core::ToolErrorInfo;
use crate::core::ToolInvocationResponse;
use crate::core::derive_compensation_key;
use crate::core::derive_external_write_key;
use crate::core::execution_evidence_ref;
use crate::interfaces::AttemptLock;
use crate::interfaces::AttemptStore;
use crate::interfaces::DedupeReservation;
use crate::interfaces::DedupeStore;
use crate::interfaces::GatewayError;
use crate::interfaces::IntentStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::OutcomeStore;
use crate::interfaces::Sleeper;
use crate::interfaces::StoreError;
use crate::interfaces::ToolGateway;
use crate::runtime::emitter::EmitterError;
use crate::runtime::emitter::ExecutionSignalEmitter;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Execution pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// State-machine timeout in hours; also the attempt-lock TTL.
    pub timeout_hours: u32,
    /// Transient retry policy for tool invocation.
    pub retry: RetryPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_hours: 1,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Result of an execution request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Execution completed with a terminal outcome.
    Completed(Box<ActionOutcome>),
    /// A live attempt lock is held; this invocation aborted.
    AlreadyRunning,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Execution pipeline errors.
///
/// These surface only when the pipeline cannot even record a failure;
/// tool-level failures become terminal outcomes instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Action intent not found.
    #[error("action intent not found: {0}")]
    IntentNotFound(String),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Outcome signal emission failed.
    #[error(transparent)]
    Emit(#[from] EmitterError),
    /// Hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for ExecutionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::IntentNotFound(_) => ErrorKind::Validation,
            Self::Store(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
            Self::Emit(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Stage Context
// ============================================================================

/// Failure captured by a stage before routing to failure recording.
struct StageFailure {
    /// Taxonomy classification.
    kind: ErrorKind,
    /// Stable error code.
    code: String,
    /// Failure description.
    message: String,
    /// External writes observed before the failure.
    external_refs: Vec<ExternalObjectRef>,
    /// Tool run reference when the gateway was reached.
    tool_run_ref: Option<String>,
}

impl StageFailure {
    /// Builds a failure without observable external writes.
    fn new(kind: ErrorKind, code: &str, message: String) -> Self {
        Self {
            kind,
            code: code.to_string(),
            message,
            external_refs: Vec::new(),
            tool_run_ref: None,
        }
    }
}

// ============================================================================
// SECTION: Execution Pipeline
// ============================================================================

/// Staged execution pipeline for approved action intents.
#[derive(Clone)]
pub struct ExecutionPipeline {
    /// Intent store.
    intents: Arc<dyn IntentStore + Send + Sync>,
    /// Attempt lock store.
    attempts: Arc<dyn AttemptStore + Send + Sync>,
    /// Outcome store.
    outcomes: Arc<dyn OutcomeStore + Send + Sync>,
    /// External-write dedupe store.
    dedupe: Arc<dyn DedupeStore + Send + Sync>,
    /// Action-type registry.
    registry: ActionTypeRegistry,
    /// Tool gateway.
    gateway: Arc<dyn ToolGateway + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Outcome signal emitter.
    emitter: ExecutionSignalEmitter,
    /// Pipeline configuration.
    config: ExecutionConfig,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Backoff sleeper.
    sleeper: Arc<dyn Sleeper + Send + Sync>,
}

impl ExecutionPipeline {
    /// Creates an execution pipeline from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "Construction wires every execution seam once.")]
    pub fn new(
        intents: Arc<dyn IntentStore + Send + Sync>,
        attempts: Arc<dyn AttemptStore + Send + Sync>,
        outcomes: Arc<dyn OutcomeStore + Send + Sync>,
        dedupe: Arc<dyn DedupeStore + Send + Sync>,
        registry: ActionTypeRegistry,
        gateway: Arc<dyn ToolGateway + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        emitter: ExecutionSignalEmitter,
        config: ExecutionConfig,
        clock: Arc<dyn Clock + Send + Sync>,
        sleeper: Arc<dyn Sleeper + Send + Sync>,
    ) -> Self {
        Self {
            intents,
            attempts,
            outcomes,
            dedupe,
            registry,
            gateway,
            ledger,
            emitter,
            config,
            clock,
            sleeper,
        }
    }

    /// Executes an approved intent through the full stage machine.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when infrastructure prevents recording a
    /// terminal outcome; tool failures become outcomes instead.
    pub fn execute(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<ExecutionResult, ExecutionError> {
        let now = self.clock.now();
        let expires_at = now.plus_hours(i64::from(self.config.timeout_hours));
        let attempt = match self.attempts.acquire(tenant_id, action_intent_id, now, expires_at)? {
            AttemptLock::Acquired(attempt) => attempt,
            AttemptLock::Held(_) => return Ok(ExecutionResult::AlreadyRunning),
        };

        let Some(intent) = self.intents.load_intent(tenant_id, action_intent_id)? else {
            self.attempts.release(tenant_id, action_intent_id)?;
            return Err(ExecutionError::IntentNotFound(action_intent_id.to_string()));
        };

        let outcome = self.run_stages(&intent, &attempt)?;
        self.attempts.release(tenant_id, action_intent_id)?;
        Ok(ExecutionResult::Completed(Box::new(outcome)))
    }

    /// Runs the post-lock stages, converting failures into outcomes.
    ///
    /// Stage results merge into `context` (`validation_result`, then
    /// `tool_invocation_response`) so later stages and the outcome ledger
    /// entry preserve the full run context.
    fn run_stages(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
    ) -> Result<ActionOutcome, ExecutionError> {
        let mut context = Map::new();

        match self.validate_preflight(intent) {
            Ok(result) => {
                context.insert("validation_result".to_string(), result);
            }
            Err(failure) => {
                return self.record_failure(intent, attempt, &failure, &context);
            }
        }

        let spec = match self.map_action(intent) {
            Ok(spec) => spec,
            Err(failure) => {
                return self.record_failure(intent, attempt, &failure, &context);
            }
        };
        let params = merge_params(&spec.param_template, &intent.parameters);

        let response = match self.invoke_tool(intent, attempt, &spec, &params) {
            Ok(response) => response,
            Err(failure) => {
                let compensation =
                    self.maybe_compensate(intent, attempt, &spec, &failure.external_refs)?;
                return self.record_failure_with_compensation(
                    intent,
                    attempt,
                    &failure,
                    &context,
                    compensation,
                );
            }
        };
        if let Ok(rendered) = serde_json::to_value(&response) {
            context.insert("tool_invocation_response".to_string(), rendered);
        }

        if response.success {
            self.record_outcome(intent, attempt, &response, CompensationStatus::None, &context)
        } else {
            let compensation = self.maybe_compensate(
                intent,
                attempt,
                &spec,
                &response.external_object_refs,
            )?;
            let failure = StageFailure {
                kind: response
                    .error
                    .as_ref()
                    .map_or(ErrorKind::PermanentUpstream, |error| error.kind),
                code: response
                    .error
                    .as_ref()
                    .map_or_else(|| "tool_reported_failure".to_string(), |error| {
                        error.code.clone()
                    }),
                message: response
                    .error
                    .as_ref()
                    .map_or_else(|| "tool reported failure".to_string(), |error| {
                        error.message.clone()
                    }),
                external_refs: response.external_object_refs.clone(),
                tool_run_ref: response.tool_run_ref.clone(),
            };
            self.record_failure_with_compensation(
                intent,
                attempt,
                &failure,
                &context,
                compensation,
            )
        }
    }

    /// Validates the intent against policy and registry preconditions.
    fn validate_preflight(&self, intent: &ActionIntent) -> Result<Value, StageFailure> {
        if !intent.approved {
            return Err(StageFailure::new(
                ErrorKind::Validation,
                "intent_not_approved",
                format!("intent {} is not in an approved state", intent.action_intent_id),
            ));
        }
        let Some(spec) = self.registry.resolve(&intent.action_type) else {
            return Err(StageFailure::new(
                ErrorKind::Validation,
                "unknown_action_type",
                format!("action type {} is not registered", intent.action_type),
            ));
        };
        let params = intent.parameters.as_object();
        let missing: Vec<&str> = spec
            .required_params
            .iter()
            .map(String::as_str)
            .filter(|key| params.is_none_or(|map| !map.contains_key(*key)))
            .collect();
        if !missing.is_empty() {
            return Err(StageFailure::new(
                ErrorKind::Validation,
                "missing_required_params",
                format!("missing required parameters: {}", missing.join(", ")),
            ));
        }
        Ok(json!({
            "approved": true,
            "approval_source": intent.approval_source,
            "action_type": intent.action_type.as_str(),
            "checked_params": spec.required_params,
        }))
    }

    /// Resolves the registry mapping for the intent. Pure.
    fn map_action(&self, intent: &ActionIntent) -> Result<ActionTypeSpec, StageFailure> {
        self.registry.resolve(&intent.action_type).cloned().ok_or_else(|| {
            StageFailure::new(
                ErrorKind::Validation,
                "unknown_action_type",
                format!("action type {} is not registered", intent.action_type),
            )
        })
    }

    /// Invokes the tool with dedupe and transient retries.
    fn invoke_tool(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
        spec: &ActionTypeSpec,
        params: &Value,
    ) -> Result<ToolInvocationResponse, StageFailure> {
        let write_key = derive_external_write_key(&intent.action_intent_id, attempt.attempt_count)
            .map_err(|err| {
                StageFailure::new(ErrorKind::Internal, "write_key_derivation", err.to_string())
            })?;
        match self.dedupe.reserve_write(&intent.tenant_id, &write_key) {
            Ok(DedupeReservation::Prior(response)) => return Ok(*response),
            Ok(DedupeReservation::Reserved) => {}
            Err(err) => {
                return Err(StageFailure::new(err.kind(), "dedupe_reserve", err.to_string()));
            }
        }

        let deadline = attempt.expires_at;
        let mut last_transient: Option<GatewayError> = None;
        for retry_index in 0..self.config.retry.attempts {
            if self.clock.now() > deadline {
                return Err(StageFailure::new(
                    ErrorKind::Timeout,
                    "deadline_exceeded",
                    "execution deadline elapsed before invocation completed".to_string(),
                ));
            }
            if retry_index > 0 {
                self.sleeper
                    .sleep_millis(self.config.retry.backoff_millis(retry_index - 1));
            }
            match self.gateway.invoke(&spec.tool_name, spec.schema_version, params) {
                Ok(response) => {
                    if response.success {
                        if let Err(err) =
                            self.dedupe.record_write(&intent.tenant_id, &write_key, &response)
                        {
                            return Err(StageFailure::new(
                                err.kind(),
                                "dedupe_record",
                                err.to_string(),
                            ));
                        }
                    }
                    return Ok(response);
                }
                Err(err @ GatewayError::Transient { .. }) => {
                    last_transient = Some(err);
                }
                Err(err) => {
                    return Err(StageFailure::new(
                        err.kind(),
                        "tool_invocation",
                        err.to_string(),
                    ));
                }
            }
        }

        let message = last_transient
            .map_or_else(|| "transient failure".to_string(), |err| err.to_string());
        Err(StageFailure::new(ErrorKind::TransientUpstream, "retries_exhausted", message))
    }

    /// Runs compensation when the registry and observed writes demand it.
    ///
    /// Idempotent per outcome: the compensation run reserves its own dedupe
    /// key, so a retried failure path never compensates twice.
    fn maybe_compensate(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
        spec: &ActionTypeSpec,
        external_refs: &[ExternalObjectRef],
    ) -> Result<CompensationStatus, ExecutionError> {
        if external_refs.is_empty() || spec.compensation != CompensationStrategy::Automatic {
            return Ok(CompensationStatus::None);
        }
        let Some(tool) = spec.compensation_tool.as_ref() else {
            return Ok(CompensationStatus::Failed);
        };

        let key = derive_compensation_key(&intent.action_intent_id, attempt.attempt_count)?;
        match self.dedupe.reserve_write(&intent.tenant_id, &key)? {
            DedupeReservation::Prior(_) => return Ok(CompensationStatus::Completed),
            DedupeReservation::Reserved => {}
        }

        let params = json!({
            "action_intent_id": intent.action_intent_id.as_str(),
            "attempt_count": attempt.attempt_count,
            "external_object_refs": external_refs,
        });
        match self.gateway.invoke(tool, spec.schema_version, &params) {
            Ok(response) if response.success => {
                self.dedupe.record_write(&intent.tenant_id, &key, &response)?;
                Ok(CompensationStatus::Completed)
            }
            Ok(_) | Err(_) => Ok(CompensationStatus::Failed),
        }
    }

    /// Records a successful terminal outcome.
    fn record_outcome(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
        response: &ToolInvocationResponse,
        compensation: CompensationStatus,
        context: &Map<String, Value>,
    ) -> Result<ActionOutcome, ExecutionError> {
        let outcome = ActionOutcome {
            action_intent_id: intent.action_intent_id.clone(),
            tenant_id: intent.tenant_id.clone(),
            account_id: intent.account_id.clone(),
            attempt_count: attempt.attempt_count,
            status: OutcomeStatus::Succeeded,
            external_object_refs: response.external_object_refs.clone(),
            tool_run_ref: response.tool_run_ref.clone(),
            error: None,
            compensation_status: compensation,
            started_at: attempt.started_at,
            completed_at: self.clock.now(),
        };
        self.finalize(intent, &outcome, context)?;
        Ok(outcome)
    }

    /// Records a failed terminal outcome without compensation.
    fn record_failure(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
        failure: &StageFailure,
        context: &Map<String, Value>,
    ) -> Result<ActionOutcome, ExecutionError> {
        self.record_failure_with_compensation(
            intent,
            attempt,
            failure,
            context,
            CompensationStatus::None,
        )
    }

    /// Records a failed terminal outcome with a compensation status.
    fn record_failure_with_compensation(
        &self,
        intent: &ActionIntent,
        attempt: &ExecutionAttempt,
        failure: &StageFailure,
        context: &Map<String, Value>,
        compensation: CompensationStatus,
    ) -> Result<ActionOutcome, ExecutionError> {
        let outcome = ActionOutcome {
            action_intent_id: intent.action_intent_id.clone(),
            tenant_id: intent.tenant_id.clone(),
            account_id: intent.account_id.clone(),
            attempt_count: attempt.attempt_count,
            status: OutcomeStatus::Failed,
            external_object_refs: failure.external_refs.clone(),
            tool_run_ref: failure.tool_run_ref.clone(),
            error: Some(ToolErrorInfo {
                kind: failure.kind,
                code: failure.code.clone(),
                message: failure.message.clone(),
            }),
            compensation_status: compensation,
            started_at: attempt.started_at,
            completed_at: self.clock.now(),
        };
        self.finalize(intent, &outcome, context)?;
        Ok(outcome)
    }

    /// Persists the outcome, ledgers it, and emits the outcome signal.
    fn finalize(
        &self,
        intent: &ActionIntent,
        outcome: &ActionOutcome,
        context: &Map<String, Value>,
    ) -> Result<(), ExecutionError> {
        self.outcomes.save_outcome(outcome)?;

        let evidence = execution_evidence_ref(
            &outcome.tenant_id,
            &outcome.account_id,
            &outcome.action_intent_id,
            outcome.completed_at,
            outcome.status.as_str(),
        )?;
        let entry = LedgerEntry::for_trace(
            outcome.tenant_id.clone(),
            outcome.account_id.clone(),
            intent.trace_id.clone(),
            LedgerEventType::Outcome,
            outcome.completed_at,
            &format!("outcome-{}-{}", outcome.action_intent_id, outcome.attempt_count),
            json!({
                "action_intent_id": outcome.action_intent_id.as_str(),
                "status": outcome.status.as_str(),
                "attempt_count": outcome.attempt_count,
                "compensation_status": outcome.compensation_status,
                "error": outcome.error,
                "context": context,
            }),
        )
        .with_evidence(vec![evidence]);
        self.ledger.append(&entry)?;

        self.emitter.emit_outcome(outcome, &intent.trace_id)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Parameter Merging
// ============================================================================

/// Merges the registry template with intent parameters; intent values win.
#[must_use]
pub fn merge_params(template: &Value, params: &Value) -> Value {
    match (template.as_object(), params.as_object()) {
        (Some(template), Some(params)) => {
            let mut merged: Map<String, Value> = template.clone();
            for (key, value) in params {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (None, Some(params)) => Value::Object(params.clone()),
        (Some(template), None) => Value::Object(template.clone()),
        (None, None) => params.clone(),
    }
}
