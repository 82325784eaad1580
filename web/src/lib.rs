//! HTTP surface for the huddle session engine.
//!
//! Thin Axum shell over [`huddle_core::service::ParticipationService`]:
//! handlers extract the caller and the request body, call exactly one
//! service operation, and map the result (or the [`huddle_core::EngineError`])
//! to a response.
//!
//! # Request Flow
//!
//! 1. **Correlation ID** assigned by [`middleware::correlation_id_layer`]
//! 2. **Caller** extracted from gateway headers ([`extractors::CallerIdentity`])
//! 3. **Operation** runs in one store transaction
//! 4. **Result** serialized as JSON, errors through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use huddle_web::{router, AppState};
//!
//! let service = ParticipationService::new(Arc::new(store), Arc::new(SystemClock));
//! let app = router(AppState::new(service));
//! axum::serve(listener, app).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use extractors::CallerIdentity;
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};
pub use state::AppState;

use axum::{
    routing::{get, patch, post},
    Router,
};
use handlers::{health, participations, sessions};
use huddle_core::store::TransactionalStore;
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the complete Axum router.
///
/// Every route except `/health` and `/ready` requires the caller headers
/// described in [`extractors`].
pub fn router<S: TransactionalStore>(state: AppState<S>) -> Router {
    let session_routes = Router::new()
        .route("/", post(sessions::create_session::<S>))
        .route(
            "/:id",
            patch(sessions::update_session::<S>).delete(sessions::delete_session::<S>),
        )
        .route("/:id/status", post(sessions::update_session_status::<S>))
        .route("/:id/summary", get(sessions::session_summary::<S>))
        .route(
            "/:id/participants",
            get(sessions::list_participants::<S>).post(participations::admin_add::<S>),
        )
        .route("/:id/join", post(participations::join_session::<S>))
        .route("/:id/attendance", post(sessions::bulk_update_attendance::<S>))
        .route("/:id/payment", post(sessions::bulk_update_payment::<S>));

    let participation_routes = Router::new()
        .route("/:id/cancel", post(participations::cancel::<S>))
        .route("/:id/approve", post(participations::approve::<S>))
        .route("/:id/reject", post(participations::reject::<S>))
        .route("/:id/remove", post(participations::remove::<S>))
        .route("/:id/move", post(participations::move_participation::<S>));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check::<S>))
        .nest("/sessions", session_routes)
        .nest("/participations", participation_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
