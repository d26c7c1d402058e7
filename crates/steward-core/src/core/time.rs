// crates/steward-core/src/core/time.rs
// ============================================================================
// Module: Steward Time Model
// Description: Canonical timestamps and injectable clocks.
// Purpose: Provide deterministic, replayable time values across Steward records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Steward uses explicit unix-millisecond timestamps embedded in records to
//! keep replay deterministic. The core runtimes never read wall-clock time
//! directly; every time-sensitive contract (TTL expiry, tier hysteresis,
//! engagement windows, renewal boundaries) takes a [`Clock`] so property
//! tests can be time-precise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1_000;
/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Steward records and ledger entries.
///
/// # Invariants
/// - Values are unix epoch milliseconds, explicitly provided by callers.
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by a number of hours.
    #[must_use]
    pub const fn plus_hours(self, hours: i64) -> Self {
        Self(self.0 + hours * MILLIS_PER_HOUR)
    }

    /// Returns this timestamp advanced by a number of days.
    #[must_use]
    pub const fn plus_days(self, days: i64) -> Self {
        Self(self.0 + days * MILLIS_PER_DAY)
    }

    /// Returns this timestamp moved back by a number of days.
    #[must_use]
    pub const fn minus_days(self, days: i64) -> Self {
        Self(self.0 - days * MILLIS_PER_DAY)
    }

    /// Returns the signed number of milliseconds from `earlier` to `self`.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0 - earlier.0
    }

    /// Returns the whole number of hours from `earlier` to `self`.
    #[must_use]
    pub const fn hours_since(self, earlier: Self) -> i64 {
        self.millis_since(earlier) / MILLIS_PER_HOUR
    }

    /// Returns the whole number of days from `earlier` to `self`.
    #[must_use]
    pub const fn days_since(self, earlier: Self) -> i64 {
        self.millis_since(earlier) / MILLIS_PER_DAY
    }

    /// Returns the bucket index for this timestamp given a bucket width.
    ///
    /// Bucket width zero collapses to a single bucket so degenerate cadence
    /// configuration cannot divide by zero.
    #[must_use]
    pub const fn bucket(self, width_millis: i64) -> i64 {
        if width_millis <= 0 {
            return 0;
        }
        self.0.div_euclid(width_millis)
    }

    /// Returns the UTC day key (`days since epoch`) for budget windows.
    #[must_use]
    pub const fn day_key(self) -> i64 {
        self.0.div_euclid(MILLIS_PER_DAY)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Injectable clock abstraction for time-sensitive contracts.
pub trait Clock {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed implementation for hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
        Timestamp::from_unix_millis(millis)
    }
}

/// Settable clock for tests and replay harnesses.
#[derive(Debug, Default)]
pub struct FixedClock {
    /// Current time, mutable to advance test scenarios.
    now: Mutex<Timestamp>,
}

impl FixedClock {
    /// Creates a fixed clock at the provided timestamp.
    #[must_use]
    pub fn at(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Replaces the current time.
    pub fn set(&self, now: Timestamp) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Advances the current time by hours.
    pub fn advance_hours(&self, hours: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = guard.plus_hours(hours);
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now.lock().map_or(Timestamp::default(), |guard| *guard)
    }
}
