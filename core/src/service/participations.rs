//! Join, cancel, approval, admin add, move and bulk updates.

use super::{rejected, AttendanceUpdate, JoinRequest, ParticipationService, PaymentUpdate};
use crate::access::{AccessGate, JoinContext};
use crate::error::{EngineError, Result};
use crate::events::{AdmissionSource, ParticipationEvent};
use crate::participation::{ParticipationAction, ParticipationReducer, SessionRoster};
use crate::reducer::Reducer;
use crate::store::{StoreTransaction, TransactionalStore};
use crate::types::{Caller, Participation, ParticipationId, SessionId, UserIdentifier};
use smallvec::SmallVec;

impl<S: TransactionalStore> ParticipationService<S> {
    /// Self-service join of `session_id` by the caller.
    ///
    /// Runs the access gate, validates the join form and admits the caller as
    /// `joined`, `waitlisted` or `pending`. The activity membership of an open
    /// activity and any invite redemption are written in the same transaction.
    ///
    /// # Errors
    ///
    /// Gate, form and capacity failures (see [`AccessGate::evaluate`]),
    /// [`EngineError::AlreadyParticipating`], store failures.
    #[tracing::instrument(
        skip(self, caller, request),
        fields(user_id = %caller.user_id, organization_id = %caller.organization_id)
    )]
    pub async fn join(
        &self,
        caller: &Caller,
        session_id: SessionId,
        request: JoinRequest,
    ) -> Result<Participation> {
        self.join_in_tx(caller, session_id, request)
            .await
            .inspect_err(|e| rejected("join", e))
    }

    async fn join_in_tx(
        &self,
        caller: &Caller,
        session_id: SessionId,
        request: JoinRequest,
    ) -> Result<Participation> {
        let organization_id = caller.organization_id;
        let user_id = caller.user_id;

        let mut tx = self.store.begin().await?;
        let session = tx.lock_session(organization_id, session_id).await?;
        let organization = tx.organization(organization_id).await?;
        let activity = tx.activity(organization_id, session.activity_id).await?;
        let activity_membership = tx.activity_membership(activity.id, user_id).await?;

        let gate = AccessGate::new(self.capability.as_ref());
        let evaluate = |invite_redeemed| {
            gate.evaluate(&JoinContext {
                organization: &organization,
                organization_membership: caller.membership.as_ref(),
                activity: &activity,
                activity_membership: activity_membership.as_ref(),
                session: &session,
                invite_redeemed,
            })
        };

        // Spend the token only when the organization gate blocks the caller.
        // Any later failure rolls the redemption back with `tx`.
        let decision = match (evaluate(false), request.invite_token.as_deref()) {
            (
                Err(
                    err @ (EngineError::OrganizationApprovalRequired
                    | EngineError::InviteRequired {
                        scope: "organization",
                    }),
                ),
                Some(token),
            ) if caller.membership.is_none() => {
                if !tx.redeem_invite(organization_id, user_id, token).await? {
                    return Err(err);
                }
                tracing::debug!("Invite token redeemed");
                evaluate(true)?
            }
            (decision, _) => decision?,
        };

        let rows = tx.load_roster(session.id).await?;
        let mut roster = SessionRoster::new(session, rows);
        let events = ParticipationReducer.reduce(
            &mut roster,
            ParticipationAction::Admit {
                user_id,
                mode: decision.admission_mode,
                form_answers: request.form_answers,
                attribute_overrides: request.attribute_overrides,
                source: AdmissionSource::Join,
            },
            &self.participation_env(),
        )?;

        let now = self.clock.now();
        if let Some(membership) = decision.membership_action.apply(
            activity_membership.as_ref(),
            &activity,
            user_id,
            now,
        ) {
            tracing::debug!(activity_id = %activity.id, "Activating activity membership");
            tx.save_activity_membership(&membership).await?;
        }
        tx.save_participations(&roster.take_dirty()).await?;
        tx.commit().await?;

        let participation = roster
            .active_for(user_id)
            .cloned()
            .ok_or(EngineError::ParticipationNotFound)?;
        tracing::info!(
            participation_id = %participation.id,
            status = %participation.status,
            "Participant admitted"
        );
        self.publish(events);

        Ok(participation)
    }

    /// Cancels a participation. Participants cancel their own; admins any.
    ///
    /// Cancelling a `joined` participation promotes the earliest waitlisted
    /// participant in the same transaction.
    ///
    /// # Errors
    ///
    /// [`EngineError::ParticipationNotFound`] for unknown or already cancelled
    /// participations, [`EngineError::AdminRequired`] for someone else's,
    /// [`EngineError::SessionFrozen`] on terminal sessions.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn cancel(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
    ) -> Result<Participation> {
        self.withdraw(caller, participation_id, false, |participation_id| {
            ParticipationAction::Cancel { participation_id }
        })
        .await
        .inspect_err(|e| rejected("cancel", e))
    }

    /// Rejects a participation request (admin). Rejecting a `joined`
    /// participant frees the seat and promotes the waitlist.
    ///
    /// # Errors
    ///
    /// [`EngineError::AdminRequired`], [`EngineError::ParticipationNotFound`],
    /// [`EngineError::SessionFrozen`].
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn reject_pending(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
    ) -> Result<Participation> {
        self.withdraw(caller, participation_id, true, |participation_id| {
            ParticipationAction::Reject { participation_id }
        })
        .await
        .inspect_err(|e| rejected("reject_pending", e))
    }

    /// Removes a participant (admin), promoting the waitlist if a seat frees.
    ///
    /// # Errors
    ///
    /// [`EngineError::AdminRequired`], [`EngineError::ParticipationNotFound`],
    /// [`EngineError::SessionFrozen`].
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn remove_participant(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
    ) -> Result<Participation> {
        self.withdraw(caller, participation_id, true, |participation_id| {
            ParticipationAction::Remove { participation_id }
        })
        .await
        .inspect_err(|e| rejected("remove_participant", e))
    }

    async fn withdraw(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
        admin_only: bool,
        action: impl FnOnce(ParticipationId) -> ParticipationAction + Send,
    ) -> Result<Participation> {
        if admin_only {
            self.require_admin(caller)?;
        }

        let mut tx = self.store.begin().await?;
        let participation = tx
            .find_participation(caller.organization_id, participation_id)
            .await?;
        if participation.user_id != caller.user_id {
            self.require_admin(caller)?;
        }

        let (roster, events) = self
            .reduce_locked(&mut tx, caller, participation.session_id, action(participation_id))
            .await?;
        tx.commit().await?;

        let participation = roster
            .get(participation_id)
            .cloned()
            .ok_or(EngineError::ParticipationNotFound)?;
        tracing::info!(%participation_id, status = %participation.status, "Participation withdrawn");
        self.publish(events);

        Ok(participation)
    }

    /// Approves a `pending` participation (admin).
    ///
    /// Re-runs the capacity decision: the participant lands on the waitlist
    /// when the seats filled up while the request was pending.
    ///
    /// # Errors
    ///
    /// [`EngineError::AdminRequired`], [`EngineError::ParticipationNotFound`],
    /// [`EngineError::InvalidParticipationTransition`] when not pending,
    /// [`EngineError::SessionFull`] when the waitlist is full as well.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn approve_pending(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
    ) -> Result<Participation> {
        self.approve_in_tx(caller, participation_id)
            .await
            .inspect_err(|e| rejected("approve_pending", e))
    }

    async fn approve_in_tx(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
    ) -> Result<Participation> {
        self.require_admin(caller)?;

        let mut tx = self.store.begin().await?;
        let participation = tx
            .find_participation(caller.organization_id, participation_id)
            .await?;
        let (roster, events) = self
            .reduce_locked(
                &mut tx,
                caller,
                participation.session_id,
                ParticipationAction::Approve { participation_id },
            )
            .await?;
        tx.commit().await?;

        let participation = roster
            .get(participation_id)
            .cloned()
            .ok_or(EngineError::ParticipationNotFound)?;
        tracing::info!(%participation_id, status = %participation.status, "Request approved");
        self.publish(events);

        Ok(participation)
    }

    /// Adds a user to a session (admin).
    ///
    /// Skips the membership gates and the capacity check; the participant is
    /// always `joined`. Allowed on draft and published sessions. Only members
    /// of the caller's organization can be added.
    ///
    /// # Errors
    ///
    /// [`EngineError::AdminRequired`], [`EngineError::UserNotFound`] (also for
    /// users outside the organization),
    /// [`EngineError::AlreadyParticipating`], [`EngineError::SessionFrozen`].
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn admin_add(
        &self,
        caller: &Caller,
        session_id: SessionId,
        user: &UserIdentifier,
    ) -> Result<Participation> {
        self.admin_add_in_tx(caller, session_id, user)
            .await
            .inspect_err(|e| rejected("admin_add", e))
    }

    async fn admin_add_in_tx(
        &self,
        caller: &Caller,
        session_id: SessionId,
        user: &UserIdentifier,
    ) -> Result<Participation> {
        self.require_admin(caller)?;

        let mut tx = self.store.begin().await?;
        let session = tx.lock_session(caller.organization_id, session_id).await?;
        let profile = tx.find_user(user).await?;
        if tx
            .organization_membership(caller.organization_id, profile.id)
            .await?
            .is_none()
        {
            return Err(EngineError::UserNotFound);
        }

        let rows = tx.load_roster(session.id).await?;
        let mut roster = SessionRoster::new(session, rows);
        let events = ParticipationReducer.reduce(
            &mut roster,
            ParticipationAction::AdminAdd {
                user_id: profile.id,
            },
            &self.participation_env(),
        )?;
        tx.save_participations(&roster.take_dirty()).await?;
        tx.commit().await?;

        let participation = roster
            .active_for(profile.id)
            .cloned()
            .ok_or(EngineError::ParticipationNotFound)?;
        tracing::info!(participation_id = %participation.id, added = %profile.id, "Participant added by admin");
        self.publish(events);

        Ok(participation)
    }

    /// Moves a participation to another session of the same organization
    /// (admin).
    ///
    /// Cancels the source (promoting its waitlist) and admits the participant
    /// to the target through a fresh gate and admission pass, all in one
    /// transaction. Form answers and attribute overrides are carried over.
    /// Returns the participation in the target session.
    ///
    /// # Errors
    ///
    /// [`EngineError::SameSession`], [`EngineError::SessionNotFound`] for a
    /// target outside the organization, any gate or admission failure of the
    /// target. Nothing changes on failure.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn move_participation(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
        target_session_id: SessionId,
    ) -> Result<Participation> {
        self.move_in_tx(caller, participation_id, target_session_id)
            .await
            .inspect_err(|e| rejected("move", e))
    }

    async fn move_in_tx(
        &self,
        caller: &Caller,
        participation_id: ParticipationId,
        target_session_id: SessionId,
    ) -> Result<Participation> {
        self.require_admin(caller)?;
        let organization_id = caller.organization_id;

        let mut tx = self.store.begin().await?;
        let moving = tx.find_participation(organization_id, participation_id).await?;
        if moving.session_id == target_session_id {
            return Err(EngineError::SameSession);
        }

        // Lock both sessions in id order so concurrent moves cannot deadlock.
        let (source, target) = if moving.session_id < target_session_id {
            let source = tx.lock_session(organization_id, moving.session_id).await?;
            let target = tx.lock_session(organization_id, target_session_id).await?;
            (source, target)
        } else {
            let target = tx.lock_session(organization_id, target_session_id).await?;
            let source = tx.lock_session(organization_id, moving.session_id).await?;
            (source, target)
        };

        let user_id = moving.user_id;
        let organization = tx.organization(organization_id).await?;
        let membership = tx.organization_membership(organization_id, user_id).await?;
        let activity = tx.activity(organization_id, target.activity_id).await?;
        let activity_membership = tx.activity_membership(activity.id, user_id).await?;

        let decision = AccessGate::new(self.capability.as_ref()).evaluate(&JoinContext {
            organization: &organization,
            organization_membership: membership.as_ref(),
            activity: &activity,
            activity_membership: activity_membership.as_ref(),
            session: &target,
            invite_redeemed: false,
        })?;

        let env = self.participation_env();

        let rows = tx.load_roster(source.id).await?;
        let mut source_roster = SessionRoster::new(source, rows);
        let mut events = ParticipationReducer.reduce(
            &mut source_roster,
            ParticipationAction::MoveOut { participation_id },
            &env,
        )?;

        let rows = tx.load_roster(target.id).await?;
        let mut target_roster = SessionRoster::new(target, rows);
        events.extend(ParticipationReducer.reduce(
            &mut target_roster,
            ParticipationAction::Admit {
                user_id,
                mode: decision.admission_mode,
                form_answers: moving.form_answers,
                attribute_overrides: moving.attribute_overrides,
                source: AdmissionSource::Move,
            },
            &env,
        )?);

        if let Some(row) =
            decision
                .membership_action
                .apply(activity_membership.as_ref(), &activity, user_id, self.clock.now())
        {
            tx.save_activity_membership(&row).await?;
        }
        tx.save_participations(&source_roster.take_dirty()).await?;
        tx.save_participations(&target_roster.take_dirty()).await?;
        tx.commit().await?;

        let moved = target_roster
            .active_for(user_id)
            .cloned()
            .ok_or(EngineError::ParticipationNotFound)?;
        tracing::info!(
            from = %participation_id,
            to = %moved.id,
            %target_session_id,
            status = %moved.status,
            "Participation moved"
        );
        self.publish(events);

        Ok(moved)
    }

    /// Records attendance for a batch of participations of one session
    /// (admin). All rows commit or none do. Returns the number of rows that
    /// changed.
    ///
    /// # Errors
    ///
    /// [`EngineError::AdminRequired`], [`EngineError::InvalidField`] for an
    /// oversized batch, [`EngineError::ParticipationNotFound`] when any id is
    /// not a participation of the session.
    #[tracing::instrument(skip(self, caller, updates), fields(user_id = %caller.user_id, count = updates.len()))]
    pub async fn bulk_update_attendance(
        &self,
        caller: &Caller,
        session_id: SessionId,
        updates: Vec<AttendanceUpdate>,
    ) -> Result<usize> {
        let action = ParticipationAction::SetAttendance(
            updates
                .into_iter()
                .map(|u| (u.participation_id, u.attendance))
                .collect(),
        );
        self.bulk_update(caller, session_id, action)
            .await
            .inspect_err(|e| rejected("bulk_update_attendance", e))
    }

    /// Records payment for a batch of participations of one session (admin).
    /// All rows commit or none do. Returns the number of rows that changed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::bulk_update_attendance`].
    #[tracing::instrument(skip(self, caller, updates), fields(user_id = %caller.user_id, count = updates.len()))]
    pub async fn bulk_update_payment(
        &self,
        caller: &Caller,
        session_id: SessionId,
        updates: Vec<PaymentUpdate>,
    ) -> Result<usize> {
        let action = ParticipationAction::SetPayment(
            updates
                .into_iter()
                .map(|u| (u.participation_id, u.payment))
                .collect(),
        );
        self.bulk_update(caller, session_id, action)
            .await
            .inspect_err(|e| rejected("bulk_update_payment", e))
    }

    async fn bulk_update(
        &self,
        caller: &Caller,
        session_id: SessionId,
        action: ParticipationAction,
    ) -> Result<usize> {
        self.require_admin(caller)?;

        let size = match &action {
            ParticipationAction::SetAttendance(updates) => updates.len(),
            ParticipationAction::SetPayment(updates) => updates.len(),
            _ => 0,
        };
        if size > self.config.bulk_update_limit {
            return Err(EngineError::InvalidField {
                field: "updates",
                reason: format!(
                    "batch of {size} exceeds the limit of {}",
                    self.config.bulk_update_limit
                ),
            });
        }

        let mut tx = self.store.begin().await?;
        let (_, events) = self.reduce_locked(&mut tx, caller, session_id, action).await?;
        tx.commit().await?;

        let changed = events.len();
        tracing::info!(%session_id, requested = size, changed, "Bulk update applied");
        self.publish(events);

        Ok(changed)
    }

    /// Locks the session, applies `action` to its roster and writes the
    /// changed rows. The caller commits.
    async fn reduce_locked(
        &self,
        tx: &mut S::Transaction,
        caller: &Caller,
        session_id: SessionId,
        action: ParticipationAction,
    ) -> Result<(SessionRoster, SmallVec<[ParticipationEvent; 4]>)> {
        let session = tx.lock_session(caller.organization_id, session_id).await?;
        let rows = tx.load_roster(session.id).await?;
        let mut roster = SessionRoster::new(session, rows);

        let events = ParticipationReducer.reduce(&mut roster, action, &self.participation_env())?;
        tx.save_participations(&roster.take_dirty()).await?;

        Ok((roster, events))
    }
}

