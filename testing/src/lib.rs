//! # Tripflow Testing
//!
//! Testing utilities for tripflow reducers.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for effects
//! - [`ScriptedTravelApi`], an in-memory travel backend
//!
//! ## Example
//!
//! ```ignore
//! use tripflow_testing::{test_clock, ReducerTest, SequentialIdGenerator};
//!
//! ReducerTest::new(InitiatorReducer)
//!     .with_env(test_environment())
//!     .given_state(InitiatorState::default())
//!     .when_action(InitiatorAction::Submit { .. })
//!     .then_state(|s| assert!(s.is_in_flight()))
//!     .run();
//! ```

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tripflow_core::environment::{Clock, IdGenerator};
use uuid::Uuid;

/// Ergonomic Given-When-Then harness for reducers
pub mod reducer_test;

/// Scripted in-memory travel backend
pub mod scripted;

pub use reducer_test::{ReducerTest, assertions};
pub use scripted::{ApiCall, ScriptedTravelApi};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{AtomicU64, Clock, DateTime, IdGenerator, Ordering, Utc, Uuid};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making age calculations reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tripflow_testing::mocks::FixedClock;
    /// use tripflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Predictable ids: `00000000-0000-0000-0000-000000000001`, `...0002`, and so on
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// The id that the `n`th call (1-based) will return
        #[must_use]
        pub const fn nth(n: u128) -> Uuid {
            Uuid::from_u128(n)
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> Uuid {
            let n = u128::from(self.next.fetch_add(1, Ordering::Relaxed)) + 1;
            Uuid::from_u128(n)
        }
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default(),
    )
}

/// Date helper for test fixtures; out-of-range input falls back to the epoch
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

pub use mocks::{FixedClock, SequentialIdGenerator};
