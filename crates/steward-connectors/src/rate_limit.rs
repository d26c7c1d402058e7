// crates/steward-connectors/src/rate_limit.rs
// ============================================================================
// Module: Steward Connector Rate Limiter
// Description: Clock-injected token bucket for outward calls.
// Purpose: Bound connector call rates with burst capacity.
// Dependencies: steward-core
// ============================================================================

//! ## Overview
//! The token bucket refills at a per-minute rate up to a burst capacity and
//! is consulted before every outward connector call. Time is injected, so
//! rate behavior is precise in tests and replay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use steward_core::Timestamp;

// ============================================================================
// SECTION: Token Bucket
// ============================================================================

/// Token bucket state.
#[derive(Debug, Clone, Copy)]
struct BucketState {
    /// Available tokens.
    tokens: f64,
    /// Last refill timestamp.
    refilled_at: Timestamp,
}

/// Clock-injected token bucket limiter.
///
/// # Invariants
/// - Tokens never exceed the burst capacity.
#[derive(Debug)]
pub struct TokenBucket {
    /// Refill rate in requests per minute.
    requests_per_minute: f64,
    /// Maximum burst capacity.
    burst: f64,
    /// Mutable bucket state.
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket with the given rate and burst capacity.
    #[must_use]
    pub fn new(requests_per_minute: u32, burst: u32, now: Timestamp) -> Self {
        Self {
            requests_per_minute: f64::from(requests_per_minute),
            burst: f64::from(burst.max(1)),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst.max(1)),
                refilled_at: now,
            }),
        }
    }

    /// Attempts to take one token at `now`.
    #[must_use]
    pub fn try_acquire(&self, now: Timestamp) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let elapsed_minutes = now.millis_since(state.refilled_at).max(0) as f64 / 60_000.0;
        state.tokens = (state.tokens + elapsed_minutes * self.requests_per_minute).min(self.burst);
        state.refilled_at = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;

    /// Tests that the burst drains and refills over time.
    #[test]
    fn test_burst_drains_and_refills() {
        let start = Timestamp::from_unix_millis(0);
        let bucket = TokenBucket::new(60, 2, start);

        assert!(bucket.try_acquire(start));
        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start));

        // One request per second at 60 rpm; one second refills one token.
        let later = Timestamp::from_unix_millis(1_000);
        assert!(bucket.try_acquire(later));
        assert!(!bucket.try_acquire(later));
    }

    /// Tests that refill never exceeds the burst capacity.
    #[test]
    fn test_refill_caps_at_burst() {
        let start = Timestamp::from_unix_millis(0);
        let bucket = TokenBucket::new(60, 2, start);
        let much_later = Timestamp::from_unix_millis(600_000);

        assert!(bucket.try_acquire(much_later));
        assert!(bucket.try_acquire(much_later));
        assert!(!bucket.try_acquire(much_later));
    }
}
