// crates/steward-core/src/core/error.rs
// ============================================================================
// Module: Steward Error Taxonomy
// Description: Workspace-wide error classification for admin surfaces and retries.
// Purpose: Tag every public error with a stable taxonomy kind.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every public error in Steward maps to one of the taxonomy kinds below via
//! a `kind()` accessor. The taxonomy drives retry policy (transient vs
//! permanent), admin-surface tagging, and ledger validation entries. Expected
//! lost races on conditional writes are `ConditionalConflict` and translate
//! to structured results rather than caller-visible failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Taxonomy
// ============================================================================

/// Stable error classification used across all Steward components.
///
/// # Invariants
/// - Variants are stable for serialization and admin-surface tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Configuration is missing, malformed, or fails validation.
    Config,
    /// Input failed validation against a contract.
    Validation,
    /// Expected lost race on a conditional write.
    ConditionalConflict,
    /// Retryable upstream failure (network, 5xx, 429).
    TransientUpstream,
    /// Non-retryable upstream failure (4xx except 429).
    PermanentUpstream,
    /// Authentication or authorization failure.
    Auth,
    /// Rate limit exceeded.
    RateLimit,
    /// Deadline or timeout elapsed.
    Timeout,
    /// Invariant violation (hash mismatch, state-machine violation, unknown ruleset).
    Invariant,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns true when the error should be retried by delivery policy.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::TransientUpstream)
    }

    /// Returns a stable label for ledger entries and admin responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Validation => "VALIDATION",
            Self::ConditionalConflict => "CONDITIONAL_CONFLICT",
            Self::TransientUpstream => "TRANSIENT_UPSTREAM",
            Self::PermanentUpstream => "PERMANENT_UPSTREAM",
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::Invariant => "INVARIANT",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Accessor implemented by public error enums to expose their taxonomy kind.
pub trait Classified {
    /// Returns the taxonomy kind for this error.
    fn kind(&self) -> ErrorKind;
}
