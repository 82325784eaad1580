//! # Huddle Core
//!
//! Session and participation lifecycle engine.
//!
//! Organizations publish sessions nested under activities; members join them
//! subject to capacity, waitlisting and multi-level approval rules. This crate
//! holds the parts with real invariants:
//!
//! - **Access gate** ([`access`]): organization → activity → session join rules
//! - **Admission** ([`admission`]): joined / waitlisted / pending / rejected
//! - **Waitlist promotion** ([`waitlist`]): FIFO promotion when a seat frees
//! - **Session lifecycle** ([`lifecycle`]): draft → published → completed | cancelled
//! - **Participation state machine** ([`participation`])
//! - **Transactional boundary** ([`store`]) and the operations callers use ([`service`])
//!
//! ## Architecture
//!
//! ```text
//! join ──► AccessGate ──► ParticipationReducer (AdmissionEngine) ──► store ──► commit ──► EventPublisher
//! cancel ─────────────────► ParticipationReducer (WaitlistPromoter) ─► store ──► commit ──► EventPublisher
//! ```
//!
//! Reducers are pure functions `(State, Action, Environment) → Result<Events>`.
//! The service loads state inside a locked transaction, reduces, persists the
//! touched rows, commits, and only then publishes the resulting events.

pub mod access;
pub mod admission;
pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod forms;
pub mod lifecycle;
pub mod participation;
pub mod service;
pub mod store;
pub mod types;
pub mod waitlist;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{EngineError, ErrorKind, Result};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<Events>`.
/// They validate the action against the state, update the state in place and
/// describe what happened as events. A reducer that returns an error must
/// leave the state untouched.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SessionReducer {
    ///     type State = Session;
    ///     type Action = SessionAction;
    ///     type Environment = SessionEnvironment;
    ///     type Event = SessionEvent;
    ///     type Error = EngineError;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Session,
    ///         action: SessionAction,
    ///         env: &SessionEnvironment,
    ///     ) -> Result<SmallVec<[SessionEvent; 4]>, EngineError> {
    ///         // Business logic here
    ///         Ok(SmallVec::new())
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Facts produced by a successful reduction
        type Event;

        /// Rejection reason
        type Error;

        /// Reduce an action into state changes and events
        ///
        /// # Errors
        ///
        /// Returns the rejection reason when the action is not valid for the
        /// current state; the state is left unchanged in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Event; 4]>, Self::Error>;
    }
}

/// Environment module - dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
