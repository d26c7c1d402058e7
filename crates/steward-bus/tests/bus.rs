// crates/steward-bus/tests/bus.rs
// ============================================================================
// Module: Composite Bus Tests
// Description: Tests for sink routing and delivery semantics.
// ============================================================================
//! ## Overview
//! Validates route filtering, channel delivery, callback invocation, and the
//! empty-builder rejection.

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
use std::sync::Mutex;
use std::sync::mpsc::sync_channel;

use serde_json::json;
use steward_bus::CallbackSink;
use steward_bus::ChannelSink;
use steward_bus::CompositeBus;
use steward_bus::CompositeBusError;
use steward_core::EventEnvelope;
use steward_core::EventKind;
use steward_core::Timestamp;
use steward_core::interfaces::EventBus;

/// Builds an envelope with the given kind.
fn envelope(kind: EventKind) -> EventEnvelope {
    EventEnvelope::new(kind, Timestamp::from_unix_millis(1_000), json!({"x": 1}))
}

/// Tests that an unfiltered sink receives every kind.
#[test]
fn test_unfiltered_sink_receives_everything() {
    let (sender, receiver) = sync_channel(8);
    let bus = CompositeBus::builder().sink(ChannelSink::new(sender)).build().unwrap();

    bus.emit(&envelope(EventKind::SignalDetected)).unwrap();
    bus.emit(&envelope(EventKind::RunDecision)).unwrap();

    assert_eq!(receiver.recv().unwrap().kind, EventKind::SignalDetected);
    assert_eq!(receiver.recv().unwrap().kind, EventKind::RunDecision);
}

/// Tests that a kind filter delivers only matching events.
#[test]
fn test_route_filters_by_kind() {
    let (sender, receiver) = sync_channel(8);
    let bus = CompositeBus::builder()
        .route(vec![EventKind::ActionApproved], ChannelSink::new(sender))
        .build()
        .unwrap();

    bus.emit(&envelope(EventKind::SignalDetected)).unwrap();
    bus.emit(&envelope(EventKind::ActionApproved)).unwrap();

    let only = receiver.try_recv().unwrap();
    assert_eq!(only.kind, EventKind::ActionApproved);
    assert!(receiver.try_recv().is_err());
}

/// Tests that callback sinks observe the envelope.
#[test]
fn test_callback_sink_invoked() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    let bus = CompositeBus::builder()
        .sink(CallbackSink::new(move |envelope: &EventEnvelope| {
            captured.lock().unwrap().push(envelope.kind);
            Ok(())
        }))
        .build()
        .unwrap();

    bus.emit(&envelope(EventKind::ConnectorPollCompleted)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::ConnectorPollCompleted]);
}

/// Tests that building without sinks is rejected.
#[test]
fn test_empty_builder_rejected() {
    let result = CompositeBus::builder().build();
    assert!(matches!(result, Err(CompositeBusError::NoSinks)));
}
