//! Participation state machine.
//!
//! ```text
//! pending ───► joined ◄─── waitlisted
//!    │  └────► waitlisted ◄──┘ (approval when full)
//!    ▼            │
//! cancelled ◄─────┴──── joined
//! ```
//!
//! A `joined → cancelled` transition frees a seat and promotes the waitlist
//! inside the same reduction. A cancelled record is reused when the user joins
//! the same session again, so rows are never deleted.
//!
//! [`ParticipationReducer`] operates on a [`SessionRoster`]: the locked session
//! plus all of its participation rows. The service persists the rows the
//! reducer marked dirty and commits before events are published.

use crate::admission::{self, AdmissionMode, Occupancy};
use crate::environment::Clock;
use crate::error::{EngineError, Result};
use crate::events::{AdmissionSource, ChangeReason, ParticipationEvent};
use crate::forms::{self, AttributeOverrides, FormAnswers};
use crate::lifecycle::ensure_mutable;
use crate::reducer::Reducer;
use crate::types::{
    AttendanceStatus, Participation, ParticipationId, ParticipationStatus, PaymentStatus, Session,
    UserId,
};
use crate::waitlist;
use chrono::{DateTime, Utc};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Whether `from → to` is a legal participation status transition.
///
/// `cancelled → *` is the re-join path that reuses a cancelled record.
#[must_use]
pub const fn can_transition(from: ParticipationStatus, to: ParticipationStatus) -> bool {
    use ParticipationStatus::{Cancelled, Joined, Pending, Waitlisted};

    matches!(
        (from, to),
        (Pending, Joined | Waitlisted | Cancelled)
            | (Waitlisted, Joined | Cancelled)
            | (Joined, Cancelled)
            | (Cancelled, Pending | Waitlisted | Joined)
    )
}

/// Validates a participation status transition.
///
/// # Errors
///
/// Returns [`EngineError::InvalidParticipationTransition`] when not allowed.
pub const fn ensure_transition(from: ParticipationStatus, to: ParticipationStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidParticipationTransition { from, to })
    }
}

// ============================================================================
// State
// ============================================================================

/// A session together with every participation row it owns
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRoster {
    /// The (locked) session
    pub session: Session,
    /// All participation rows of the session, cancelled ones included
    pub participations: Vec<Participation>,
    dirty: BTreeSet<ParticipationId>,
}

impl SessionRoster {
    /// Wraps a session and its rows
    #[must_use]
    pub const fn new(session: Session, participations: Vec<Participation>) -> Self {
        Self {
            session,
            participations,
            dirty: BTreeSet::new(),
        }
    }

    /// Live occupancy derived from the rows
    #[must_use]
    pub fn occupancy(&self) -> Occupancy {
        Occupancy::count(&self.participations)
    }

    /// Looks up a row by id
    #[must_use]
    pub fn get(&self, id: ParticipationId) -> Option<&Participation> {
        self.participations.iter().find(|p| p.id == id)
    }

    /// The user's active (non-cancelled) participation, if any
    #[must_use]
    pub fn active_for(&self, user_id: UserId) -> Option<&Participation> {
        self.participations
            .iter()
            .find(|p| p.user_id == user_id && p.status.is_active())
    }

    /// Rows modified since the last call, in roster order.
    pub fn take_dirty(&mut self) -> Vec<Participation> {
        let dirty = std::mem::take(&mut self.dirty);
        self.participations
            .iter()
            .filter(|p| dirty.contains(&p.id))
            .cloned()
            .collect()
    }

    /// Whether any row was modified
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn index_of(&self, id: ParticipationId) -> Result<usize> {
        self.participations
            .iter()
            .position(|p| p.id == id)
            .ok_or(EngineError::ParticipationNotFound)
    }

    fn latest_cancelled_for(&self, user_id: UserId) -> Option<usize> {
        self.participations
            .iter()
            .enumerate()
            .filter(|(_, p)| p.user_id == user_id && p.status == ParticipationStatus::Cancelled)
            .max_by_key(|(_, p)| (p.updated_at, p.id))
            .map(|(index, _)| index)
    }

    fn mark(&mut self, id: ParticipationId) {
        self.dirty.insert(id);
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Mutations of a session's participations
#[derive(Clone, Debug, PartialEq)]
pub enum ParticipationAction {
    /// Admit a user through the admission engine (self join or move-in)
    Admit {
        /// User being admitted
        user_id: UserId,
        /// Mode decided by the access gate
        mode: AdmissionMode,
        /// Join-form answers
        form_answers: Option<FormAnswers>,
        /// Attribute overrides
        attribute_overrides: Option<AttributeOverrides>,
        /// `Join` validates the form; `Move` carries answers over unchecked
        source: AdmissionSource,
    },

    /// Admin add: always `joined`, capacity is not checked
    AdminAdd {
        /// User being added
        user_id: UserId,
    },

    /// Participant cancels
    Cancel {
        /// Participation to cancel
        participation_id: ParticipationId,
    },

    /// Admin approves a pending request
    Approve {
        /// Participation to approve
        participation_id: ParticipationId,
    },

    /// Admin rejects a request
    Reject {
        /// Participation to reject
        participation_id: ParticipationId,
    },

    /// Admin removes a participant
    Remove {
        /// Participation to remove
        participation_id: ParticipationId,
    },

    /// Source half of a move
    MoveOut {
        /// Participation being moved away
        participation_id: ParticipationId,
    },

    /// Record attendance for a batch (all or nothing)
    SetAttendance(Vec<(ParticipationId, AttendanceStatus)>),

    /// Record payment for a batch (all or nothing)
    SetPayment(Vec<(ParticipationId, PaymentStatus)>),

    /// Promote the waitlist into every free seat (after a capacity increase)
    FillOpenSeats,
}

/// Dependencies of [`ParticipationReducer`]
#[derive(Clone)]
pub struct ParticipationEnvironment {
    /// Time source for `joined_at` / `updated_at`
    pub clock: Arc<dyn Clock>,
}

impl ParticipationEnvironment {
    /// Creates an environment around a clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Applies [`ParticipationAction`]s to a [`SessionRoster`]
#[derive(Clone, Copy, Debug, Default)]
pub struct ParticipationReducer;

type Events = SmallVec<[ParticipationEvent; 4]>;

impl Reducer for ParticipationReducer {
    type State = SessionRoster;
    type Action = ParticipationAction;
    type Environment = ParticipationEnvironment;
    type Event = ParticipationEvent;
    type Error = EngineError;

    fn reduce(
        &self,
        state: &mut SessionRoster,
        action: ParticipationAction,
        env: &ParticipationEnvironment,
    ) -> Result<Events> {
        let now = env.clock.now();

        match action {
            ParticipationAction::Admit {
                user_id,
                mode,
                form_answers,
                attribute_overrides,
                source,
            } => {
                ensure_mutable(&state.session)?;
                if state.active_for(user_id).is_some() {
                    return Err(EngineError::AlreadyParticipating);
                }
                if source == AdmissionSource::Join {
                    forms::validate_required(&state.session.join_form, form_answers.as_ref())?;
                }

                let admission =
                    admission::decide(mode, state.occupancy(), state.session.limits())?;

                Ok(smallvec![Self::admit(
                    state,
                    user_id,
                    admission.status(),
                    form_answers,
                    attribute_overrides,
                    source,
                    now,
                )])
            }

            ParticipationAction::AdminAdd { user_id } => {
                ensure_mutable(&state.session)?;
                if state.active_for(user_id).is_some() {
                    return Err(EngineError::AlreadyParticipating);
                }

                Ok(smallvec![Self::admit(
                    state,
                    user_id,
                    ParticipationStatus::Joined,
                    None,
                    None,
                    AdmissionSource::AdminAdd,
                    now,
                )])
            }

            ParticipationAction::Cancel { participation_id } => {
                Self::withdraw(state, participation_id, ChangeReason::SelfCancelled, now)
            }
            ParticipationAction::Reject { participation_id } => {
                Self::withdraw(state, participation_id, ChangeReason::Rejected, now)
            }
            ParticipationAction::Remove { participation_id } => {
                Self::withdraw(state, participation_id, ChangeReason::Removed, now)
            }
            ParticipationAction::MoveOut { participation_id } => {
                Self::withdraw(state, participation_id, ChangeReason::MovedOut, now)
            }

            ParticipationAction::Approve { participation_id } => {
                let index = state.index_of(participation_id)?;
                let from = state.participations[index].status;
                if from != ParticipationStatus::Pending {
                    return Err(EngineError::InvalidParticipationTransition {
                        from,
                        to: ParticipationStatus::Joined,
                    });
                }
                ensure_mutable(&state.session)?;

                // Same decision as an open join, against current occupancy.
                let to = admission::decide(
                    AdmissionMode::Capacity,
                    state.occupancy(),
                    state.session.limits(),
                )?
                .status();

                let participation = &mut state.participations[index];
                participation.status = to;
                participation.updated_at = now;
                let event = ParticipationEvent::ParticipantStatusChanged {
                    participation_id,
                    session_id: participation.session_id,
                    user_id: participation.user_id,
                    from,
                    to,
                    reason: ChangeReason::Approved,
                };
                state.mark(participation_id);

                Ok(smallvec![event])
            }

            ParticipationAction::SetAttendance(updates) => {
                Self::bulk_set(state, updates, now, |p, attendance| {
                    (p.attendance != attendance).then(|| {
                        p.attendance = attendance;
                        ParticipationEvent::AttendanceMarked {
                            participation_id: p.id,
                            session_id: p.session_id,
                            attendance,
                        }
                    })
                })
            }

            ParticipationAction::SetPayment(updates) => {
                Self::bulk_set(state, updates, now, |p, payment| {
                    (p.payment != payment).then(|| {
                        p.payment = payment;
                        ParticipationEvent::PaymentMarked {
                            participation_id: p.id,
                            session_id: p.session_id,
                            payment,
                        }
                    })
                })
            }

            ParticipationAction::FillOpenSeats => {
                ensure_mutable(&state.session)?;
                Ok(Self::promote(state, u32::MAX, now))
            }
        }
    }
}

impl ParticipationReducer {
    /// Creates a participation, or reuses the user's latest cancelled one.
    fn admit(
        state: &mut SessionRoster,
        user_id: UserId,
        status: ParticipationStatus,
        form_answers: Option<FormAnswers>,
        attribute_overrides: Option<AttributeOverrides>,
        source: AdmissionSource,
        now: DateTime<Utc>,
    ) -> ParticipationEvent {
        let session_id = state.session.id;

        let (participation_id, reused) = match state.latest_cancelled_for(user_id) {
            Some(index) => {
                let participation = &mut state.participations[index];
                participation.status = status;
                participation.joined_at = now;
                participation.attendance = AttendanceStatus::Pending;
                participation.form_answers = form_answers;
                if attribute_overrides.is_some() {
                    participation.attribute_overrides = attribute_overrides;
                }
                participation.updated_at = now;
                (participation.id, true)
            }
            None => {
                let participation = Participation {
                    id: ParticipationId::new(),
                    session_id,
                    user_id,
                    status,
                    attendance: AttendanceStatus::Pending,
                    payment: PaymentStatus::Unpaid,
                    joined_at: now,
                    form_answers,
                    attribute_overrides,
                    created_at: now,
                    updated_at: now,
                };
                let id = participation.id;
                state.participations.push(participation);
                (id, false)
            }
        };
        state.mark(participation_id);

        ParticipationEvent::ParticipantAdmitted {
            participation_id,
            session_id,
            user_id,
            status,
            source,
            reused,
        }
    }

    /// Moves an active participation to `cancelled`, promoting the waitlist
    /// when a seat was freed.
    fn withdraw(
        state: &mut SessionRoster,
        participation_id: ParticipationId,
        reason: ChangeReason,
        now: DateTime<Utc>,
    ) -> Result<Events> {
        let index = state.index_of(participation_id)?;
        let from = state.participations[index].status;
        // Cancelling twice reports the row as gone and never promotes again.
        if !from.is_active() {
            return Err(EngineError::ParticipationNotFound);
        }
        ensure_mutable(&state.session)?;
        ensure_transition(from, ParticipationStatus::Cancelled)?;

        let participation = &mut state.participations[index];
        participation.status = ParticipationStatus::Cancelled;
        participation.updated_at = now;
        let mut events: Events = smallvec![ParticipationEvent::ParticipantStatusChanged {
            participation_id,
            session_id: participation.session_id,
            user_id: participation.user_id,
            from,
            to: ParticipationStatus::Cancelled,
            reason,
        }];
        state.mark(participation_id);

        if from == ParticipationStatus::Joined {
            events.extend(Self::promote(state, 1, now));
        }
        Ok(events)
    }

    fn promote(state: &mut SessionRoster, freed: u32, now: DateTime<Utc>) -> Events {
        let limits = state.session.limits();
        let promoted = waitlist::promote(&mut state.participations, limits, freed, now);

        promoted
            .into_iter()
            .filter_map(|id| {
                state.mark(id);
                state.get(id).map(|p| ParticipationEvent::ParticipantPromoted {
                    participation_id: p.id,
                    session_id: p.session_id,
                    user_id: p.user_id,
                })
            })
            .collect()
    }

    /// Validates every id before touching any row.
    fn bulk_set<V: Copy>(
        state: &mut SessionRoster,
        updates: Vec<(ParticipationId, V)>,
        now: DateTime<Utc>,
        mut set: impl FnMut(&mut Participation, V) -> Option<ParticipationEvent>,
    ) -> Result<Events> {
        let indexed = updates
            .into_iter()
            .map(|(id, value)| state.index_of(id).map(|index| (index, value)))
            .collect::<Result<Vec<_>>>()?;

        let mut events = Events::new();
        for (index, value) in indexed {
            let participation = &mut state.participations[index];
            if let Some(event) = set(participation, value) {
                participation.updated_at = now;
                let id = participation.id;
                events.push(event);
                state.mark(id);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::{ActivityId, OrganizationId, SessionId, SessionJoinMode, SessionStatus};

    fn roster(max_capacity: u32, max_waitlist: u32) -> SessionRoster {
        let now = Utc::now();
        SessionRoster::new(
            Session {
                id: SessionId::new(),
                organization_id: OrganizationId::new(),
                activity_id: ActivityId::new(),
                title: "Tuesday run".into(),
                description: None,
                location: None,
                date_time: now,
                join_mode: SessionJoinMode::Open,
                max_capacity,
                max_waitlist,
                status: SessionStatus::Published,
                join_form: Vec::new(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
            Vec::new(),
        )
    }

    fn env() -> ParticipationEnvironment {
        ParticipationEnvironment::new(Arc::new(SystemClock))
    }

    fn join(state: &mut SessionRoster, user_id: UserId) -> Result<Events> {
        ParticipationReducer.reduce(
            state,
            ParticipationAction::Admit {
                user_id,
                mode: AdmissionMode::Capacity,
                form_answers: None,
                attribute_overrides: None,
                source: AdmissionSource::Join,
            },
            &env(),
        )
    }

    #[test]
    fn test_state_machine() {
        use ParticipationStatus::{Cancelled, Joined, Pending, Waitlisted};

        assert!(can_transition(Pending, Waitlisted));
        assert!(can_transition(Waitlisted, Joined));
        assert!(can_transition(Joined, Cancelled));
        assert!(!can_transition(Joined, Waitlisted));
        assert!(!can_transition(Joined, Pending));
        assert!(!can_transition(Waitlisted, Pending));
        assert!(!can_transition(Cancelled, Cancelled));
    }

    #[test]
    fn test_duplicate_join_is_rejected() {
        let mut state = roster(2, 0);
        let user = UserId::new();
        assert!(join(&mut state, user).is_ok());
        assert_eq!(join(&mut state, user), Err(EngineError::AlreadyParticipating));
        assert_eq!(state.participations.len(), 1);
    }

    #[test]
    fn test_full_session_leaves_state_untouched() {
        let mut state = roster(1, 0);
        assert!(join(&mut state, UserId::new()).is_ok());
        let before = state.clone();

        assert_eq!(join(&mut state, UserId::new()), Err(EngineError::SessionFull));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejoin_reuses_cancelled_record() {
        let mut state = roster(2, 0);
        let user = UserId::new();
        assert!(join(&mut state, user).is_ok());
        let id = state.participations[0].id;
        state.participations[0].payment = PaymentStatus::Paid;
        state.participations[0].attendance = AttendanceStatus::Show;

        let cancel = ParticipationAction::Cancel { participation_id: id };
        assert!(ParticipationReducer.reduce(&mut state, cancel, &env()).is_ok());
        let events = join(&mut state, user);

        assert!(events.is_ok_and(|e| matches!(
            e.as_slice(),
            [ParticipationEvent::ParticipantAdmitted { reused: true, .. }]
        )));
        assert_eq!(state.participations.len(), 1);
        assert_eq!(state.participations[0].payment, PaymentStatus::Paid);
        assert_eq!(state.participations[0].attendance, AttendanceStatus::Pending);
    }

    #[test]
    fn test_dirty_rows_are_drained() {
        let mut state = roster(2, 0);
        assert!(join(&mut state, UserId::new()).is_ok());
        assert!(state.is_dirty());
        assert_eq!(state.take_dirty().len(), 1);
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_bulk_update_with_unknown_id_changes_nothing() {
        let mut state = roster(2, 0);
        assert!(join(&mut state, UserId::new()).is_ok());
        let known = state.participations[0].id;
        let before = state.participations.clone();

        let result = ParticipationReducer.reduce(
            &mut state,
            ParticipationAction::SetAttendance(vec![
                (known, AttendanceStatus::Show),
                (ParticipationId::new(), AttendanceStatus::NoShow),
            ]),
            &env(),
        );

        assert_eq!(result, Err(EngineError::ParticipationNotFound));
        assert_eq!(state.participations, before);
    }

    #[test]
    fn test_attendance_allowed_on_completed_session() {
        let mut state = roster(2, 0);
        assert!(join(&mut state, UserId::new()).is_ok());
        let id = state.participations[0].id;
        state.session.status = SessionStatus::Completed;

        let result = ParticipationReducer.reduce(
            &mut state,
            ParticipationAction::SetPayment(vec![(id, PaymentStatus::Paid)]),
            &env(),
        );

        assert!(result.is_ok_and(|e| e.len() == 1));
        assert_eq!(state.participations[0].payment, PaymentStatus::Paid);
    }

    #[test]
    fn test_cancel_on_completed_session_is_frozen() {
        let mut state = roster(2, 0);
        assert!(join(&mut state, UserId::new()).is_ok());
        let id = state.participations[0].id;
        state.session.status = SessionStatus::Completed;

        let result = ParticipationReducer.reduce(
            &mut state,
            ParticipationAction::Cancel { participation_id: id },
            &env(),
        );

        assert_eq!(
            result,
            Err(EngineError::SessionFrozen {
                status: SessionStatus::Completed
            })
        );
    }
}
