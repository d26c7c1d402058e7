// crates/steward-bus/src/sink/mod.rs
// ============================================================================
// Module: Steward Bus Sinks
// Description: Sink implementations for event delivery.
// Purpose: Deliver event envelopes to channels, logs, and callbacks.
// Dependencies: steward-core, serde_json
// ============================================================================

//! ## Overview
//! Sinks receive event envelopes from the composite bus. The channel sink
//! forwards into an `std::sync::mpsc` channel for in-process consumers, the
//! log sink writes one JSON record per event, and the callback sink invokes
//! a closure for embedded handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::sync::mpsc::SyncSender;

use serde_json::json;
use steward_core::EventEnvelope;
use thiserror::Error;

// ============================================================================
// SECTION: Sink Contract
// ============================================================================

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Delivery failed.
    #[error("sink delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Event sink receiving envelopes from the composite bus.
pub trait Sink: Send + Sync {
    /// Delivers one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::DeliveryFailed`] when delivery fails.
    fn deliver(&self, envelope: &EventEnvelope) -> Result<(), SinkError>;
}

// ============================================================================
// SECTION: Channel Sink
// ============================================================================

/// Channel-based event sink.
///
/// # Invariants
/// - Each successful delivery enqueues exactly one envelope.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    /// Sender used to enqueue envelopes.
    sender: SyncSender<EventEnvelope>,
}

impl ChannelSink {
    /// Creates a channel sink over a bounded sender.
    #[must_use]
    pub const fn new(sender: SyncSender<EventEnvelope>) -> Self {
        Self {
            sender,
        }
    }
}

impl Sink for ChannelSink {
    fn deliver(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        self.sender
            .try_send(envelope.clone())
            .map_err(|err| SinkError::DeliveryFailed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Log Sink
// ============================================================================

/// Log-only event sink writing one JSON record per event.
pub struct LogSink<W: Write + Send> {
    /// Output writer for log records.
    writer: Mutex<W>,
}

impl<W: Write + Send> LogSink<W> {
    /// Creates a log sink over a writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> Sink for LogSink<W> {
    fn deliver(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        let record = json!({
            "kind": envelope.kind.as_str(),
            "emitted_at": envelope.emitted_at.as_unix_millis(),
            "correlation_id": envelope.correlation_id,
            "detail": envelope.detail,
        });
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| SinkError::DeliveryFailed("log sink mutex poisoned".to_string()))?;
        writeln!(guard, "{record}").map_err(|err| SinkError::DeliveryFailed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Callback Sink
// ============================================================================

/// Callback-based event sink for embedded handlers.
pub struct CallbackSink {
    /// Handler invoked per envelope.
    handler: Box<dyn Fn(&EventEnvelope) -> Result<(), SinkError> + Send + Sync>,
}

impl CallbackSink {
    /// Creates a callback sink over a handler.
    #[must_use]
    pub fn new(
        handler: impl Fn(&EventEnvelope) -> Result<(), SinkError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl Sink for CallbackSink {
    fn deliver(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        (self.handler)(envelope)
    }
}
