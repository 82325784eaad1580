//! Application state for Axum handlers.

use huddle_core::service::ParticipationService;
use huddle_core::store::TransactionalStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Generic over the store so the same router serves PostgreSQL in
/// production and the in-memory store in tests.
pub struct AppState<S> {
    /// The session and participation engine
    pub service: Arc<ParticipationService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: TransactionalStore> AppState<S> {
    /// Create a new application state.
    #[must_use]
    pub fn new(service: ParticipationService<S>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires cloneable state
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState<huddle_postgres::PostgresStore>>();
    }
}
