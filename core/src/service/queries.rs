//! Read models: participant lists and session summaries.

use super::{rejected, ParticipationService};
use crate::admission::Occupancy;
use crate::error::Result;
use crate::forms::{AttributeOverrides, FormAnswers};
use crate::store::{StoreTransaction, TransactionalStore};
use crate::types::{
    AttendanceStatus, CapacityLimits, Caller, Participation, ParticipationId, ParticipationStatus,
    PaymentStatus, SessionId, SessionJoinMode, SessionStatus, UserId, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participation as shown in a participant list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantView {
    /// Participation
    pub participation_id: ParticipationId,
    /// Participant
    pub user_id: UserId,
    /// Display name (empty when the identity collaborator has no profile)
    pub display_name: String,
    /// Contact email, redacted for other participants
    pub email: Option<String>,
    /// Contact phone, redacted for other participants
    pub phone: Option<String>,
    /// Admission status
    pub status: ParticipationStatus,
    /// Attendance
    pub attendance: AttendanceStatus,
    /// Payment
    pub payment: PaymentStatus,
    /// Waitlist order key
    pub joined_at: DateTime<Utc>,
    /// Join-form answers
    pub form_answers: Option<FormAnswers>,
    /// Attribute overrides
    pub attribute_overrides: Option<AttributeOverrides>,
}

impl ParticipantView {
    fn new(participation: Participation, profile: Option<&UserProfile>, show_contact: bool) -> Self {
        let contact = profile.filter(|_| show_contact);
        Self {
            participation_id: participation.id,
            user_id: participation.user_id,
            display_name: profile.map(|p| p.display_name.clone()).unwrap_or_default(),
            email: contact.and_then(|p| p.email.clone()),
            phone: contact.and_then(|p| p.phone.clone()),
            status: participation.status,
            attendance: participation.attendance,
            payment: participation.payment,
            joined_at: participation.joined_at,
            form_answers: participation.form_answers,
            attribute_overrides: participation.attribute_overrides,
        }
    }
}

/// Occupancy overview of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session
    pub session_id: SessionId,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Admission policy
    pub join_mode: SessionJoinMode,
    /// Limits in force
    pub limits: CapacityLimits,
    /// Live counts
    pub occupancy: Occupancy,
    /// Free seats
    pub seats_left: u32,
    /// Free waitlist places
    pub waitlist_left: u32,
    /// The caller's own active participation, if any
    pub my_participation: Option<ParticipationId>,
    /// Status of that participation
    pub my_status: Option<ParticipationStatus>,
}

const fn status_rank(status: ParticipationStatus) -> u8 {
    match status {
        ParticipationStatus::Joined => 0,
        ParticipationStatus::Waitlisted => 1,
        ParticipationStatus::Pending => 2,
        ParticipationStatus::Cancelled => 3,
    }
}

impl<S: TransactionalStore> ParticipationService<S> {
    /// Participants of a session ordered by status, then waitlist position.
    ///
    /// Members see active participations with other participants' email and
    /// phone removed. Admins see every row, cancelled ones included, with
    /// contact details.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::SessionNotFound`], store failures.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn list_participants(
        &self,
        caller: &Caller,
        session_id: SessionId,
    ) -> Result<Vec<ParticipantView>> {
        self.list_in_tx(caller, session_id)
            .await
            .inspect_err(|e| rejected("list_participants", e))
    }

    async fn list_in_tx(&self, caller: &Caller, session_id: SessionId) -> Result<Vec<ParticipantView>> {
        let is_admin = self.is_admin(caller);

        let mut tx = self.store.begin().await?;
        let session = tx.session(caller.organization_id, session_id).await?;
        let mut rows: Vec<Participation> = tx
            .load_roster(session.id)
            .await?
            .into_iter()
            .filter(|p| is_admin || p.status.is_active())
            .collect();
        rows.sort_by_key(|p| (status_rank(p.status), p.joined_at, p.id));

        let user_ids: Vec<UserId> = rows.iter().map(|p| p.user_id).collect();
        let profiles: HashMap<UserId, UserProfile> = tx
            .user_profiles(&user_ids)
            .await?
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect();
        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|participation| {
                let show_contact = is_admin || participation.user_id == caller.user_id;
                let profile = profiles.get(&participation.user_id);
                ParticipantView::new(participation, profile, show_contact)
            })
            .collect())
    }

    /// Occupancy, limits and the caller's own status for a session.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::SessionNotFound`], store failures.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn session_summary(&self, caller: &Caller, session_id: SessionId) -> Result<SessionSummary> {
        self.summary_in_tx(caller, session_id)
            .await
            .inspect_err(|e| rejected("session_summary", e))
    }

    async fn summary_in_tx(&self, caller: &Caller, session_id: SessionId) -> Result<SessionSummary> {
        let mut tx = self.store.begin().await?;
        let session = tx.session(caller.organization_id, session_id).await?;
        let rows = tx.load_roster(session.id).await?;
        tx.commit().await?;

        let limits = session.limits();
        let occupancy = Occupancy::count(&rows);
        let mine = rows
            .iter()
            .find(|p| p.user_id == caller.user_id && p.status.is_active());

        Ok(SessionSummary {
            session_id: session.id,
            status: session.status,
            join_mode: session.join_mode,
            limits,
            occupancy,
            seats_left: occupancy.seats_left(limits),
            waitlist_left: occupancy.waitlist_left(limits),
            my_participation: mine.map(|p| p.id),
            my_status: mine.map(|p| p.status),
        })
    }
}
