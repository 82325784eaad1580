//! # Huddle Testing
//!
//! Testing utilities for the huddle engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`TestClock`])
//! - A given/when/then harness for reducers ([`ReducerTest`])
//! - [`InMemoryStore`]: a `TransactionalStore` serializable by construction
//! - [`World`]: a fixture builder for organizations, activities and sessions
//! - A recording event publisher
//!
//! ## Example
//!
//! ```ignore
//! use huddle_testing::World;
//!
//! #[tokio::test]
//! async fn test_join() {
//!     let world = World::new().await;
//!     let session = world.published_session(2, 1).await;
//!     let alice = world.member("alice").await;
//!
//!     let participation = world.service.join(&alice, session.id, Default::default()).await;
//!     assert!(participation.is_ok());
//! }
//! ```

pub mod store;
pub mod world;

use chrono::{DateTime, Utc};
use huddle_core::environment::Clock;

/// Mock implementations of environment traits and collaborators.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use huddle_core::events::{DomainEvent, EventPublisher};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use huddle_testing::mocks::FixedClock;
    /// use huddle_core::environment::Clock;
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

    /// Clock that moves one second forward on every reading.
    ///
    /// Successive joins get strictly increasing `joined_at` values, so
    /// waitlist order in tests follows call order.
    #[derive(Debug)]
    pub struct TestClock {
        time: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl TestClock {
        /// Create a ticking clock starting at `start`
        #[must_use]
        pub fn starting_at(start: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(start),
                step: Duration::seconds(1),
            }
        }

        /// Jump forward without reading
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.lock() {
                Ok(mut time) => {
                    *time += self.step;
                    *time
                }
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Publisher that keeps every published event for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<DomainEvent>>,
    }

    impl RecordingPublisher {
        /// Creates an empty recorder
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Everything published so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<DomainEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        /// Forget recorded events
        pub fn clear(&self) {
            if let Ok(mut events) = self.events.lock() {
                events.clear();
            }
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, events: &[DomainEvent]) {
            if let Ok(mut recorded) = self.events.lock() {
                recorded.extend_from_slice(events);
            }
        }
    }
}

/// Property-based testing strategies for domain types
pub mod properties {
    use huddle_core::types::{CapacityLimits, ParticipationStatus};
    use proptest::prelude::*;

    /// Any participation status
    pub fn participation_status() -> impl Strategy<Value = ParticipationStatus> {
        prop_oneof![
            Just(ParticipationStatus::Pending),
            Just(ParticipationStatus::Waitlisted),
            Just(ParticipationStatus::Joined),
            Just(ParticipationStatus::Cancelled),
        ]
    }

    /// Small but valid capacity limits
    pub fn capacity_limits() -> impl Strategy<Value = CapacityLimits> {
        (1u32..8, 0u32..5).prop_map(|(max_capacity, max_waitlist)| CapacityLimits {
            max_capacity,
            max_waitlist,
        })
    }
}

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{epoch, test_clock, FixedClock, RecordingPublisher, TestClock};
pub use reducer_test::ReducerTest;
pub use store::{InMemoryStore, Invite};
pub use world::World;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_ticking_clock_is_strictly_increasing() {
        let clock = TestClock::starting_at(epoch());
        let first = clock.now();
        let second = clock.now();
        assert!(second > first);

        clock.advance(Duration::hours(1));
        assert!(clock.now() - second > Duration::minutes(59));
    }
}
