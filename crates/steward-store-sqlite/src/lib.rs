// crates/steward-store-sqlite/src/lib.rs
// ============================================================================
// Module: Steward SQLite Store Library
// Description: Durable SQLite-backed implementation of the Steward store seams.
// Purpose: Persist perception, scheduling, execution, and ledger state.
// Dependencies: steward-core, rusqlite
// ============================================================================

//! ## Overview
//! One SQLite database implements every Steward persistence seam with the
//! same conditional-write semantics as the in-memory reference stores: WAL
//! journal, non-exists guards via `ON CONFLICT DO NOTHING`, transactional
//! coupling of signal and read-model writes, and atomic two-row budget
//! consumption.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteStewardStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
