//! Session creation, updates, status changes and soft delete.

use super::{rejected, ParticipationService};
use crate::error::Result;
use crate::events::SessionEvent;
use crate::lifecycle::{NewSession, SessionAction, SessionReducer, SessionUpdate};
use crate::participation::{ParticipationAction, ParticipationReducer, SessionRoster};
use crate::reducer::Reducer;
use crate::store::{StoreTransaction, TransactionalStore};
use crate::types::{Caller, Session, SessionId, SessionStatus};

impl<S: TransactionalStore> ParticipationService<S> {
    /// Creates a `draft` session under an activity of the caller's
    /// organization (admin).
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::AdminRequired`],
    /// [`crate::EngineError::ActivityNotFound`],
    /// [`crate::EngineError::InvalidField`].
    #[tracing::instrument(skip(self, caller, new), fields(user_id = %caller.user_id, activity_id = %new.activity_id))]
    pub async fn create_session(&self, caller: &Caller, new: NewSession) -> Result<Session> {
        self.create_in_tx(caller, new)
            .await
            .inspect_err(|e| rejected("create_session", e))
    }

    async fn create_in_tx(&self, caller: &Caller, new: NewSession) -> Result<Session> {
        self.require_admin(caller)?;

        let mut tx = self.store.begin().await?;
        let activity = tx.activity(caller.organization_id, new.activity_id).await?;
        let session = new.into_session(caller.organization_id, self.clock.now())?;
        tx.insert_session(&session).await?;
        tx.commit().await?;

        tracing::info!(session_id = %session.id, "Session created");
        self.publish([SessionEvent::SessionCreated {
            session_id: session.id,
            activity_id: activity.id,
        }]);

        Ok(session)
    }

    /// Updates session fields (admin). Blocked once the session is completed
    /// or cancelled.
    ///
    /// Lowering the capacity never evicts anyone. Raising it promotes the
    /// waitlist into the new seats in the same transaction.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::AdminRequired`],
    /// [`crate::EngineError::SessionNotFound`],
    /// [`crate::EngineError::SessionFrozen`],
    /// [`crate::EngineError::InvalidField`].
    #[tracing::instrument(skip(self, caller, update), fields(user_id = %caller.user_id))]
    pub async fn update_session(
        &self,
        caller: &Caller,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> Result<Session> {
        self.update_in_tx(caller, session_id, update)
            .await
            .inspect_err(|e| rejected("update_session", e))
    }

    async fn update_in_tx(
        &self,
        caller: &Caller,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> Result<Session> {
        self.require_admin(caller)?;

        let mut tx = self.store.begin().await?;
        let mut session = tx.lock_session(caller.organization_id, session_id).await?;
        let previous_capacity = session.max_capacity;

        let events = SessionReducer.reduce(
            &mut session,
            SessionAction::Update(update),
            &self.session_env(),
        )?;
        if events.is_empty() {
            return Ok(session);
        }
        tx.save_session(&session).await?;

        let mut promotions = Vec::new();
        if session.max_capacity > previous_capacity {
            let rows = tx.load_roster(session.id).await?;
            let mut roster = SessionRoster::new(session.clone(), rows);
            promotions.extend(ParticipationReducer.reduce(
                &mut roster,
                ParticipationAction::FillOpenSeats,
                &self.participation_env(),
            )?);
            tx.save_participations(&roster.take_dirty()).await?;
        }
        tx.commit().await?;

        tracing::info!(%session_id, promoted = promotions.len(), "Session updated");
        self.publish(events);
        self.publish(promotions);

        Ok(session)
    }

    /// Changes the lifecycle status of a session (admin).
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::AdminRequired`],
    /// [`crate::EngineError::SessionNotFound`],
    /// [`crate::EngineError::InvalidSessionTransition`].
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn update_session_status(
        &self,
        caller: &Caller,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<Session> {
        self.apply_session_action(caller, session_id, SessionAction::ChangeStatus(status))
            .await
            .inspect_err(|e| rejected("update_session_status", e))
    }

    /// Soft-deletes a session (admin). Every later lookup reports it as not
    /// found; participation rows are kept.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::AdminRequired`],
    /// [`crate::EngineError::SessionNotFound`].
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete_session(&self, caller: &Caller, session_id: SessionId) -> Result<()> {
        self.apply_session_action(caller, session_id, SessionAction::Delete)
            .await
            .map(|_| ())
            .inspect_err(|e| rejected("delete_session", e))
    }

    async fn apply_session_action(
        &self,
        caller: &Caller,
        session_id: SessionId,
        action: SessionAction,
    ) -> Result<Session> {
        self.require_admin(caller)?;

        let mut tx = self.store.begin().await?;
        let mut session = tx.lock_session(caller.organization_id, session_id).await?;
        let events = SessionReducer.reduce(&mut session, action, &self.session_env())?;
        tx.save_session(&session).await?;
        tx.commit().await?;

        tracing::info!(%session_id, status = %session.status, deleted = session.is_deleted(), "Session changed");
        self.publish(events);

        Ok(session)
    }
}
