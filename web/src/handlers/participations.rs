//! Participation endpoints.
//!
//! - `POST /sessions/:id/join` self-service join
//! - `POST /sessions/:id/participants` admin add
//! - `POST /participations/:id/cancel` cancel own (or any, as admin)
//! - `POST /participations/:id/approve` approve pending (admin)
//! - `POST /participations/:id/reject` reject (admin)
//! - `POST /participations/:id/remove` remove participant (admin)
//! - `POST /participations/:id/move` move to another session (admin)

use crate::error::AppError;
use crate::extractors::CallerIdentity;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use huddle_core::service::JoinRequest;
use huddle_core::store::TransactionalStore;
use huddle_core::types::{Participation, ParticipationId, SessionId, UserIdentifier};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to add a user to a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminAddRequest {
    /// User to add, by id or email
    pub user: UserIdentifier,
}

/// Request to move a participation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Destination session
    pub target_session_id: SessionId,
}

/// Join a session as the caller.
///
/// The body is optional; without one the join carries no form answers,
/// overrides or invite token.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/sessions/<uuid>/join \
///   -H "X-User-Id: <uuid>" -H "X-Organization-Id: <uuid>" -H "X-Organization-Role: member" \
///   -H "Content-Type: application/json" \
///   -d '{"form_answers": {"shirt": {"type": "text", "value": "M"}}}'
/// ```
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn join_session<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    request: Option<Json<JoinRequest>>,
) -> Result<(StatusCode, Json<Participation>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let participation = state
        .service
        .join(&caller, SessionId::from_uuid(id), request)
        .await?;
    Ok((StatusCode::CREATED, Json(participation)))
}

/// Add a user to a session (admin).
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn admin_add<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<AdminAddRequest>,
) -> Result<(StatusCode, Json<Participation>), AppError> {
    let participation = state
        .service
        .admin_add(&caller, SessionId::from_uuid(id), &request.user)
        .await?;
    Ok((StatusCode::CREATED, Json(participation)))
}

/// Cancel a participation.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn cancel<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Participation>, AppError> {
    let participation = state
        .service
        .cancel(&caller, ParticipationId::from_uuid(id))
        .await?;
    Ok(Json(participation))
}

/// Approve a pending participation.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn approve<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Participation>, AppError> {
    let participation = state
        .service
        .approve_pending(&caller, ParticipationId::from_uuid(id))
        .await?;
    Ok(Json(participation))
}

/// Reject a participation request.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn reject<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Participation>, AppError> {
    let participation = state
        .service
        .reject_pending(&caller, ParticipationId::from_uuid(id))
        .await?;
    Ok(Json(participation))
}

/// Remove a participant.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn remove<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Participation>, AppError> {
    let participation = state
        .service
        .remove_participant(&caller, ParticipationId::from_uuid(id))
        .await?;
    Ok(Json(participation))
}

/// Move a participation to another session.
///
/// Responds with the participation in the target session.
///
/// # Errors
///
/// Engine errors mapped by [`AppError`].
pub async fn move_participation<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Participation>, AppError> {
    let participation = state
        .service
        .move_participation(&caller, ParticipationId::from_uuid(id), request.target_session_id)
        .await?;
    Ok(Json(participation))
}
