// crates/steward-bus/src/lib.rs
// ============================================================================
// Module: Steward Bus Library
// Description: Reference sinks and composite bus for Steward events.
// Purpose: Deliver core events to channels, logs, and callbacks.
// Dependencies: steward-core, serde_json
// ============================================================================

//! ## Overview
//! Steward Bus provides ready-made sink implementations plus a composite bus
//! that wires them together behind the core event-bus seam.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bus;
pub mod sink;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bus::CompositeBus;
pub use bus::CompositeBusBuilder;
pub use bus::CompositeBusError;
pub use sink::CallbackSink;
pub use sink::ChannelSink;
pub use sink::LogSink;
pub use sink::Sink;
pub use sink::SinkError;
