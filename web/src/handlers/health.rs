//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use huddle_core::store::TransactionalStore;
use serde::{Deserialize, Serialize};

/// Simple health check endpoint (for basic liveness).
///
/// Does NOT check the database.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report
#[derive(Debug, Serialize, Deserialize)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: String,
    /// Failure detail when unavailable
    pub message: Option<String>,
}

/// Readiness check: opens (and rolls back) a store transaction.
///
/// # Status Codes
///
/// - 200 OK: the store accepts transactions
/// - 503 Service Unavailable: it does not
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness_check<S: TransactionalStore>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<Readiness>) {
    match state.service.store().begin().await {
        Ok(_tx) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready".to_string(),
                message: None,
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "unavailable".to_string(),
                    message: Some(err.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
