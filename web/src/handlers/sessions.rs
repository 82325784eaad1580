//! Session endpoints.
//!
//! - `POST   /sessions` create a draft session (admin)
//! - `PATCH  /sessions/:id` update fields (admin)
//! - `DELETE /sessions/:id` soft delete (admin)
//! - `POST   /sessions/:id/status` lifecycle transition (admin)
//! - `GET    /sessions/:id/summary` occupancy overview
//! - `GET    /sessions/:id/participants` participant list
//! - `POST   /sessions/:id/attendance` bulk attendance (admin)
//! - `POST   /sessions/:id/payment` bulk payment (admin)

use crate::error::AppError;
use crate::extractors::CallerIdentity;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use huddle_core::lifecycle::{NewSession, SessionUpdate};
use huddle_core::service::{AttendanceUpdate, ParticipantView, PaymentUpdate, SessionSummary};
use huddle_core::store::TransactionalStore;
use huddle_core::types::{Session, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to move a session through its lifecycle.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    /// Target status
    pub status: SessionStatus,
}

/// Batch of attendance changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttendanceBatch {
    /// Rows to update
    pub updates: Vec<AttendanceUpdate>,
}

/// Batch of payment changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentBatch {
    /// Rows to update
    pub updates: Vec<PaymentUpdate>,
}

/// Result of a bulk update.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    /// Rows whose value actually changed
    pub updated: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a session in `draft`.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/sessions \
///   -H "X-User-Id: <uuid>" -H "X-Organization-Id: <uuid>" -H "X-Organization-Role: admin" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "activity_id": "<uuid>",
///     "title": "Tuesday run",
///     "date_time": "2026-06-01T18:00:00Z",
///     "join_mode": "open",
///     "max_capacity": 12,
///     "max_waitlist": 4
///   }'
/// ```
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn create_session<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state.service.create_session(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Update session fields.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn update_session<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(update): Json<SessionUpdate>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .service
        .update_session(&caller, SessionId::from_uuid(id), update)
        .await?;
    Ok(Json(session))
}

/// Soft-delete a session.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn delete_session<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .delete_session(&caller, SessionId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the lifecycle status of a session.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn update_session_status<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .service
        .update_session_status(&caller, SessionId::from_uuid(id), request.status)
        .await?;
    Ok(Json(session))
}

/// Occupancy overview and the caller's own status.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn session_summary<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = state
        .service
        .session_summary(&caller, SessionId::from_uuid(id))
        .await?;
    Ok(Json(summary))
}

/// Participants of a session, contact details redacted for non-admins.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn list_participants<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantView>>, AppError> {
    let participants = state
        .service
        .list_participants(&caller, SessionId::from_uuid(id))
        .await?;
    Ok(Json(participants))
}

/// Record attendance for a batch of participations.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn bulk_update_attendance<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(batch): Json<AttendanceBatch>,
) -> Result<Json<BulkUpdateResponse>, AppError> {
    let updated = state
        .service
        .bulk_update_attendance(&caller, SessionId::from_uuid(id), batch.updates)
        .await?;
    Ok(Json(BulkUpdateResponse { updated }))
}

/// Record payment for a batch of participations.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn bulk_update_payment<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(batch): Json<PaymentBatch>,
) -> Result<Json<BulkUpdateResponse>, AppError> {
    let updated = state
        .service
        .bulk_update_payment(&caller, SessionId::from_uuid(id), batch.updates)
        .await?;
    Ok(Json(BulkUpdateResponse { updated }))
}
