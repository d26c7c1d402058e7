// crates/steward-core/src/core/action.rs
// ============================================================================
// Module: Steward Action Model
// Description: Action intents, attempts, outcomes, and the action-type registry.
// Purpose: Provide the data contracts for the staged execution pipeline.
// Dependencies: crate::core::{error, hashing, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Action intents are proposals produced by the decision layer. Execution is
//! single-tracked per intent through an attempt lock, mapped to a concrete
//! tool through the action-type registry, and recorded as a terminal outcome
//! with optional compensation. External-write idempotency keys derive from
//! the intent identity and attempt count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::error::ErrorKind;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::AccountId;
use crate::core::identifiers::ActionIntentId;
use crate::core::identifiers::ActionType;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Action Intents
// ============================================================================

/// Source of the approval that released an intent for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSource {
    /// Auto-approved by the autonomy policy.
    AutonomyPolicy,
    /// Approved by a human operator.
    Human,
}

/// Action proposal produced by the decision layer.
///
/// # Invariants
/// - `parameters` is validated against the registry template at preflight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    /// Intent identifier.
    pub action_intent_id: ActionIntentId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Versioned action type.
    pub action_type: ActionType,
    /// Action parameters.
    pub parameters: Value,
    /// Decision trace correlating ledger entries.
    pub trace_id: TraceId,
    /// Approval status of the intent.
    pub approved: bool,
    /// Source of the approval when approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_source: Option<ApprovalSource>,
    /// Proposal timestamp.
    pub proposed_at: Timestamp,
}

// ============================================================================
// SECTION: Execution Attempts
// ============================================================================

/// Lock row ensuring at-most-one in-flight execution per intent.
///
/// # Invariants
/// - Inserted with a non-exists guard; expiry equals the state-machine timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    /// Intent identifier the lock covers.
    pub action_intent_id: ActionIntentId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Attempt counter, starting at 1.
    pub attempt_count: u32,
    /// Lock acquisition timestamp.
    pub started_at: Timestamp,
    /// Lock expiry timestamp.
    pub expires_at: Timestamp,
}

// ============================================================================
// SECTION: Tool Invocation
// ============================================================================

/// Reference to an object written in an external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalObjectRef {
    /// External system label (`CRM`, `SUPPORT`, etc.).
    pub system: String,
    /// Object identifier within the external system.
    pub object_id: String,
}

/// Response returned by the tool gateway for one invocation.
///
/// # Invariants
/// - Large payloads are stored as artifacts and referenced by `artifact_uri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResponse {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// External objects written by the invocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_object_refs: Vec<ExternalObjectRef>,
    /// Tool run reference in the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_run_ref: Option<String>,
    /// Inline response payload for small responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Artifact reference for large responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_uri: Option<String>,
    /// Error description when the invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,
}

/// Error taxonomy fields attached to failed invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorInfo {
    /// Taxonomy classification.
    pub kind: ErrorKind,
    /// Stable error code from the gateway.
    pub code: String,
    /// Human-readable message (payload-free).
    pub message: String,
}

// ============================================================================
// SECTION: Action Outcomes
// ============================================================================

/// Terminal status of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Action completed successfully.
    Succeeded,
    /// Action failed terminally.
    Failed,
    /// Action was cancelled before invocation.
    Cancelled,
    /// Action is awaiting a scheduled retry.
    Retrying,
}

impl OutcomeStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Retrying => "RETRYING",
        }
    }
}

/// Compensation progress attached to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationStatus {
    /// No compensation applicable.
    #[default]
    None,
    /// Compensation is pending.
    Pending,
    /// Compensation completed.
    Completed,
    /// Compensation failed.
    Failed,
}

/// Terminal record of an execution attempt.
///
/// # Invariants
/// - One outcome row per (intent, attempt); written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Intent identifier.
    pub action_intent_id: ActionIntentId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Attempt counter the outcome belongs to.
    pub attempt_count: u32,
    /// Terminal status.
    pub status: OutcomeStatus,
    /// External objects written during the attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_object_refs: Vec<ExternalObjectRef>,
    /// Tool run reference in the gateway, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_run_ref: Option<String>,
    /// Error taxonomy fields when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,
    /// Compensation progress.
    #[serde(default)]
    pub compensation_status: CompensationStatus,
    /// Execution start timestamp.
    pub started_at: Timestamp,
    /// Completion timestamp.
    pub completed_at: Timestamp,
}

// ============================================================================
// SECTION: Action-Type Registry
// ============================================================================

/// Compensation strategy declared per action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStrategy {
    /// No compensation; failed writes are left for operators.
    #[default]
    Manual,
    /// Compensation runs automatically after failed writes.
    Automatic,
}

/// Registry row mapping a versioned action type to a tool invocation.
///
/// # Invariants
/// - Mapping is pure: no network, no credentials, deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTypeSpec {
    /// Versioned action type.
    pub action_type: ActionType,
    /// Gateway tool to invoke.
    pub tool_name: ToolName,
    /// Tool schema version.
    pub schema_version: u32,
    /// Parameter template merged with intent parameters.
    pub param_template: Value,
    /// Parameter keys that must be present on the intent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_params: Vec<String>,
    /// Compensation strategy.
    #[serde(default)]
    pub compensation: CompensationStrategy,
    /// Compensating tool invoked when strategy is automatic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_tool: Option<ToolName>,
}

/// Registry of action-type mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionTypeRegistry {
    /// Registry rows keyed by action type.
    entries: BTreeMap<ActionType, ActionTypeSpec>,
}

impl ActionTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action-type spec, replacing any previous entry.
    pub fn register(&mut self, spec: ActionTypeSpec) {
        self.entries.insert(spec.action_type.clone(), spec);
    }

    /// Returns the spec for an action type, if registered.
    #[must_use]
    pub fn resolve(&self, action_type: &ActionType) -> Option<&ActionTypeSpec> {
        self.entries.get(action_type)
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Transient retry policy applied inside the tool invocation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub attempts: u32,
    /// Initial backoff in milliseconds.
    pub initial_backoff_millis: u64,
    /// Multiplicative backoff factor.
    pub factor: u32,
}

impl RetryPolicy {
    /// Returns the backoff before retry `retry_index` (zero-based).
    #[must_use]
    pub const fn backoff_millis(&self, retry_index: u32) -> u64 {
        self.initial_backoff_millis.saturating_mul((self.factor as u64).saturating_pow(retry_index))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_millis: 2_000,
            factor: 2,
        }
    }
}

// ============================================================================
// SECTION: External-Write Dedupe
// ============================================================================

/// Derives the external-write idempotency key for an attempt.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn derive_external_write_key(
    action_intent_id: &ActionIntentId,
    attempt_count: u32,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "action_intent_id": action_intent_id.as_str(),
            "attempt_count": attempt_count,
        }),
    )
}

/// Derives the idempotency key for a compensation run.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn derive_compensation_key(
    action_intent_id: &ActionIntentId,
    attempt_count: u32,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "action_intent_id": action_intent_id.as_str(),
            "attempt_count": attempt_count,
            "step": "compensation",
        }),
    )
}
