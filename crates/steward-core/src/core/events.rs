// crates/steward-core/src/core/events.rs
// ============================================================================
// Module: Steward Bus Events
// Description: Named event kinds and envelopes for the event bus.
// Purpose: Define the inbound and outbound event contracts of the core.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! Components communicate through named events with JSON detail payloads.
//! Inbound kinds trigger core handlers (heat recompute, decision evaluation,
//! suppression, execution start); outbound kinds notify collaborators of
//! signal creation and connector poll results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::CorrelationId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Named event kinds carried by the bus.
///
/// # Invariants
/// - Variants are stable for serialization and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A signal was detected; triggers heat recompute and decision evaluation.
    SignalDetected,
    /// A signal row was created.
    SignalCreated,
    /// Lifecycle state changed; triggers decision evaluation and suppression.
    LifecycleStateChanged,
    /// Decision run requested (cost-gate entry point).
    RunDecision,
    /// Decision run re-queued with a scheduler delay.
    RunDecisionDeferred,
    /// An action intent was approved; starts execution.
    ActionApproved,
    /// Audit export requested.
    AuditExportRequested,
    /// Connector poll completed.
    ConnectorPollCompleted,
    /// Connector poll failed.
    ConnectorPollFailed,
}

impl EventKind {
    /// Returns the stable wire label for the event kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignalDetected => "SIGNAL_DETECTED",
            Self::SignalCreated => "SIGNAL_CREATED",
            Self::LifecycleStateChanged => "LIFECYCLE_STATE_CHANGED",
            Self::RunDecision => "RUN_DECISION",
            Self::RunDecisionDeferred => "RUN_DECISION_DEFERRED",
            Self::ActionApproved => "ACTION_APPROVED",
            Self::AuditExportRequested => "AUDIT_EXPORT_REQUESTED",
            Self::ConnectorPollCompleted => "CONNECTOR_POLL_COMPLETED",
            Self::ConnectorPollFailed => "CONNECTOR_POLL_FAILED",
        }
    }
}

// ============================================================================
// SECTION: Event Envelope
// ============================================================================

/// Event envelope carried by the bus.
///
/// # Invariants
/// - `detail` is a JSON object specific to the event kind; the bus does not
///   interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event kind.
    pub kind: EventKind,
    /// Emission timestamp.
    pub emitted_at: Timestamp,
    /// Event detail payload.
    pub detail: Value,
    /// Optional correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl EventEnvelope {
    /// Creates an envelope without correlation.
    #[must_use]
    pub const fn new(kind: EventKind, emitted_at: Timestamp, detail: Value) -> Self {
        Self {
            kind,
            emitted_at,
            detail,
            correlation_id: None,
        }
    }

    /// Attaches a correlation identifier to the envelope.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
