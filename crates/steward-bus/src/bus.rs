// crates/steward-bus/src/bus.rs
// ============================================================================
// Module: Steward Composite Bus
// Description: Composite event bus routing envelopes to configured sinks.
// Purpose: Implement the core event-bus seam over pluggable sinks.
// Dependencies: steward-core
// ============================================================================

//! ## Overview
//! The composite bus implements the core `EventBus` seam by delivering each
//! envelope to every route whose kind filter matches. Routes with an empty
//! filter receive everything. Delivery is fail-fast: the first sink failure
//! surfaces to the emitter so the event-delivery policy can retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use steward_core::EventBus;
use steward_core::EventEnvelope;
use steward_core::EventKind;
use steward_core::interfaces::BusError;
use thiserror::Error;

use crate::sink::Sink;
use crate::sink::SinkError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Composite bus errors.
#[derive(Debug, Error)]
pub enum CompositeBusError {
    /// No sinks are configured.
    #[error("bus has no sinks configured")]
    NoSinks,
}

// ============================================================================
// SECTION: Routes
// ============================================================================

/// One sink route with an optional kind filter.
struct Route {
    /// Kinds this route accepts; empty accepts all.
    kinds: Vec<EventKind>,
    /// Destination sink.
    sink: Arc<dyn Sink>,
}

impl Route {
    /// Returns true when the route accepts the kind.
    fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

// ============================================================================
// SECTION: Composite Bus
// ============================================================================

/// Builder for a composite bus.
#[derive(Default)]
pub struct CompositeBusBuilder {
    /// Configured routes.
    routes: Vec<Route>,
}

impl CompositeBusBuilder {
    /// Registers a sink receiving every event kind.
    #[must_use]
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.routes.push(Route {
            kinds: Vec::new(),
            sink: Arc::new(sink),
        });
        self
    }

    /// Registers a sink receiving only the listed kinds.
    #[must_use]
    pub fn route(mut self, kinds: Vec<EventKind>, sink: impl Sink + 'static) -> Self {
        self.routes.push(Route {
            kinds,
            sink: Arc::new(sink),
        });
        self
    }

    /// Builds the composite bus.
    ///
    /// # Errors
    ///
    /// Returns [`CompositeBusError::NoSinks`] when no routes are configured.
    pub fn build(self) -> Result<CompositeBus, CompositeBusError> {
        if self.routes.is_empty() {
            return Err(CompositeBusError::NoSinks);
        }
        Ok(CompositeBus {
            routes: self.routes,
        })
    }
}

/// Composite event bus delivering envelopes to matching routes.
pub struct CompositeBus {
    /// Configured routes.
    routes: Vec<Route>,
}

impl CompositeBus {
    /// Returns a builder for the composite bus.
    #[must_use]
    pub fn builder() -> CompositeBusBuilder {
        CompositeBusBuilder::default()
    }

    /// Delivers an envelope to every matching route.
    fn deliver(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        for route in &self.routes {
            if route.accepts(envelope.kind) {
                route.sink.deliver(envelope)?;
            }
        }
        Ok(())
    }
}

impl EventBus for CompositeBus {
    fn emit(&self, envelope: &EventEnvelope) -> Result<(), BusError> {
        self.deliver(envelope).map_err(|err| BusError::EmitFailed(err.to_string()))
    }
}
