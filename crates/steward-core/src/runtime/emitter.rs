// crates/steward-core/src/runtime/emitter.rs
// ============================================================================
// Module: Steward Execution Signal Emitter
// Description: Converts terminal outcomes into perception signals.
// Purpose: Feed execution results back into the signal loop.
// Dependencies: crate::{core, runtime::signals}, serde_json
// ============================================================================

//! ## Overview
//! Every terminal outcome emits an ACTION_EXECUTED or ACTION_FAILED signal
//! bound to a synthetic `execution://` evidence ref whose digest covers the
//! outcome identity. Outcome signals bypass the lifecycle coupling and write
//! only the signal row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::json;
use thiserror::Error;

use crate::core::ActionOutcome;
use crate::core::Classified;
use crate::core::Confidence;
use crate::core::ConfidenceSource;
use crate::core::DetectorName;
use crate::core::ErrorKind;
use crate::hashing::HashError;
use crate::core::OutcomeStatus;
use crate::core::Severity;
use crate::core::Signal;
use crate::core::SignalStatus;
use crate::core::SignalType;
use crate::core::TraceId;
use crate::core::derive_dedupe_key;
use crate::core::derive_signal_id;
use crate::core::execution_evidence_ref;
use crate::runtime::signals::CreateSignalResult;
use crate::runtime::signals::ExecutionSignalWriter;
use crate::runtime::signals::SignalServiceError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Emitter errors.
#[derive(Debug, Error)]
pub enum EmitterError {
    /// Signal write failed.
    #[error(transparent)]
    Signal(#[from] SignalServiceError),
    /// Evidence ref derivation failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for EmitterError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Signal(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Emitter
// ============================================================================

/// Emits outcome signals for terminal executions.
#[derive(Clone)]
pub struct ExecutionSignalEmitter {
    /// Execution signal write path.
    writer: Arc<dyn ExecutionSignalWriter + Send + Sync>,
}

impl ExecutionSignalEmitter {
    /// Creates an emitter over the execution signal write path.
    #[must_use]
    pub fn new(writer: Arc<dyn ExecutionSignalWriter + Send + Sync>) -> Self {
        Self {
            writer,
        }
    }

    /// Emits the outcome signal for a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError`] when derivation or the signal write fails.
    pub fn emit_outcome(
        &self,
        outcome: &ActionOutcome,
        trace_id: &TraceId,
    ) -> Result<CreateSignalResult, EmitterError> {
        let succeeded = outcome.status == OutcomeStatus::Succeeded;
        let signal_type =
            if succeeded { SignalType::ActionExecuted } else { SignalType::ActionFailed };
        let severity = if succeeded { Severity::Low } else { Severity::Medium };

        let evidence = execution_evidence_ref(
            &outcome.tenant_id,
            &outcome.account_id,
            &outcome.action_intent_id,
            outcome.completed_at,
            outcome.status.as_str(),
        )?;
        let window_key =
            format!("exec-{}-{}", outcome.action_intent_id, outcome.attempt_count);
        let dedupe_key = derive_dedupe_key(
            &outcome.account_id,
            signal_type,
            &window_key,
            &evidence.sha256,
        )?;
        let signal_id = derive_signal_id(&dedupe_key);

        let mut context = Map::new();
        context.insert(
            "action_intent_id".to_string(),
            json!(outcome.action_intent_id.as_str()),
        );
        context.insert("status".to_string(), json!(outcome.status.as_str()));
        context.insert("attempt_count".to_string(), json!(outcome.attempt_count));
        if let Some(error) = &outcome.error {
            context.insert("error_code".to_string(), json!(error.code));
            context.insert("error_kind".to_string(), json!(error.kind));
        }

        let signal = Signal {
            signal_id,
            tenant_id: outcome.tenant_id.clone(),
            account_id: outcome.account_id.clone(),
            signal_type,
            status: SignalStatus::Active,
            confidence: Confidence::new(1.0, ConfidenceSource::Direct),
            severity,
            ttl: signal_type.default_ttl(),
            window_key,
            dedupe_key,
            evidence,
            detector: DetectorName::new("execution-outcome"),
            detector_version: 1,
            inference_active: false,
            context,
            metadata: Map::new(),
            suppression: None,
            trace_id: trace_id.clone(),
            created_at: outcome.completed_at,
        };
        Ok(self.writer.create_execution_signal(signal)?)
    }
}
