//! Session lifecycle.
//!
//! ```text
//! draft ──► published ──► completed
//!                    └──► cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal and freeze the record: no further
//! status change and no field update. Capacity reductions below the current
//! occupancy are accepted; admission simply stops until occupancy drops.

use crate::environment::Clock;
use crate::error::{EngineError, Result};
use crate::events::SessionEvent;
use crate::forms::FormField;
use crate::reducer::Reducer;
use crate::types::{ActivityId, OrganizationId, Session, SessionId, SessionJoinMode, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Whether `from → to` is a legal session status transition.
#[must_use]
pub const fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    matches!(
        (from, to),
        (SessionStatus::Draft, SessionStatus::Published)
            | (SessionStatus::Published, SessionStatus::Completed | SessionStatus::Cancelled)
    )
}

/// Validates a session status transition.
///
/// # Errors
///
/// Returns [`EngineError::InvalidSessionTransition`] for anything outside the
/// lifecycle graph, including same-status requests.
pub const fn ensure_transition(from: SessionStatus, to: SessionStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidSessionTransition { from, to })
    }
}

/// Rejects writes against a completed or cancelled session.
///
/// # Errors
///
/// Returns [`EngineError::SessionFrozen`] when the session is terminal.
pub const fn ensure_mutable(session: &Session) -> Result<()> {
    if session.status.is_terminal() {
        Err(EngineError::SessionFrozen {
            status: session.status,
        })
    } else {
        Ok(())
    }
}

fn validate_limits(max_capacity: u32) -> Result<()> {
    if max_capacity == 0 {
        return Err(EngineError::InvalidField {
            field: "max_capacity",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(EngineError::InvalidField {
            field: "title",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Creation and updates
// ============================================================================

/// Fields of a session to create (always created as `draft`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    /// Parent activity
    pub activity_id: ActivityId,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Location
    #[serde(default)]
    pub location: Option<String>,
    /// When the session takes place
    pub date_time: DateTime<Utc>,
    /// Admission policy
    pub join_mode: SessionJoinMode,
    /// Maximum joined participants
    pub max_capacity: u32,
    /// Maximum waitlisted participants
    #[serde(default)]
    pub max_waitlist: u32,
    /// Join-form schema
    #[serde(default)]
    pub join_form: Vec<FormField>,
}

impl NewSession {
    /// Validates the fields and builds the draft session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidField`] for an empty title or a zero capacity.
    pub fn into_session(self, organization_id: OrganizationId, now: DateTime<Utc>) -> Result<Session> {
        validate_title(&self.title)?;
        validate_limits(self.max_capacity)?;

        Ok(Session {
            id: SessionId::new(),
            organization_id,
            activity_id: self.activity_id,
            title: self.title,
            description: self.description,
            location: self.location,
            date_time: self.date_time,
            join_mode: self.join_mode,
            max_capacity: self.max_capacity,
            max_waitlist: self.max_waitlist,
            status: SessionStatus::Draft,
            join_form: self.join_form,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Partial update of session fields; `None` leaves a field untouched
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionUpdate {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New location
    pub location: Option<String>,
    /// New date and time
    pub date_time: Option<DateTime<Utc>>,
    /// New admission policy
    pub join_mode: Option<SessionJoinMode>,
    /// New seat limit
    pub max_capacity: Option<u32>,
    /// New waitlist limit
    pub max_waitlist: Option<u32>,
    /// New join-form schema
    pub join_form: Option<Vec<FormField>>,
}

impl SessionUpdate {
    fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(max_capacity) = self.max_capacity {
            validate_limits(max_capacity)?;
        }
        Ok(())
    }

    /// Applies the update, returning the names of the fields that changed.
    fn apply(self, session: &mut Session) -> Vec<String> {
        let mut changed = Vec::new();

        macro_rules! assign {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    if session.$field != value {
                        session.$field = value;
                        changed.push(stringify!($field).to_string());
                    }
                }
            };
            ($field:ident, optional) => {
                if let Some(value) = self.$field {
                    if session.$field.as_deref() != Some(value.as_str()) {
                        session.$field = Some(value);
                        changed.push(stringify!($field).to_string());
                    }
                }
            };
        }

        assign!(title);
        assign!(description, optional);
        assign!(location, optional);
        assign!(date_time);
        assign!(join_mode);
        assign!(max_capacity);
        assign!(max_waitlist);
        assign!(join_form);

        changed
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Mutations of an existing session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionAction {
    /// Update fields (blocked on terminal sessions)
    Update(SessionUpdate),
    /// Change lifecycle status
    ChangeStatus(SessionStatus),
    /// Soft delete
    Delete,
}

/// Dependencies of [`SessionReducer`]
#[derive(Clone)]
pub struct SessionEnvironment {
    /// Time source for `updated_at` / `deleted_at`
    pub clock: Arc<dyn Clock>,
}

impl SessionEnvironment {
    /// Creates an environment around a clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Applies [`SessionAction`]s to a [`Session`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionReducer;

impl Reducer for SessionReducer {
    type State = Session;
    type Action = SessionAction;
    type Environment = SessionEnvironment;
    type Event = SessionEvent;
    type Error = EngineError;

    fn reduce(
        &self,
        state: &mut Session,
        action: SessionAction,
        env: &SessionEnvironment,
    ) -> Result<SmallVec<[SessionEvent; 4]>> {
        if state.is_deleted() {
            return Err(EngineError::SessionNotFound);
        }

        match action {
            SessionAction::Update(update) => {
                ensure_mutable(state)?;
                update.validate()?;

                let fields = update.apply(state);
                if fields.is_empty() {
                    return Ok(SmallVec::new());
                }
                state.updated_at = env.clock.now();

                Ok(smallvec![SessionEvent::SessionUpdated {
                    session_id: state.id,
                    fields,
                }])
            }

            SessionAction::ChangeStatus(to) => {
                let from = state.status;
                ensure_transition(from, to)?;

                state.status = to;
                state.updated_at = env.clock.now();

                Ok(smallvec![SessionEvent::SessionStatusChanged {
                    session_id: state.id,
                    from,
                    to,
                }])
            }

            SessionAction::Delete => {
                let now = env.clock.now();
                state.deleted_at = Some(now);
                state.updated_at = now;

                Ok(smallvec![SessionEvent::SessionDeleted { session_id: state.id }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_graph() {
        use SessionStatus::{Cancelled, Completed, Draft, Published};

        let allowed = [(Draft, Published), (Published, Completed), (Published, Cancelled)];
        for from in [Draft, Published, Completed, Cancelled] {
            for to in [Draft, Published, Completed, Cancelled] {
                assert_eq!(
                    can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_completed_cannot_be_republished() {
        assert_eq!(
            ensure_transition(SessionStatus::Completed, SessionStatus::Published),
            Err(EngineError::InvalidSessionTransition {
                from: SessionStatus::Completed,
                to: SessionStatus::Published,
            })
        );
    }

    #[test]
    fn test_draft_cannot_complete() {
        assert!(ensure_transition(SessionStatus::Draft, SessionStatus::Completed).is_err());
    }

    #[test]
    fn test_new_session_requires_capacity() {
        let new = NewSession {
            activity_id: ActivityId::new(),
            title: "Tuesday run".into(),
            description: None,
            location: None,
            date_time: Utc::now(),
            join_mode: SessionJoinMode::Open,
            max_capacity: 0,
            max_waitlist: 0,
            join_form: Vec::new(),
        };
        assert!(matches!(
            new.into_session(OrganizationId::new(), Utc::now()),
            Err(EngineError::InvalidField { field: "max_capacity", .. })
        ));
    }

    #[test]
    fn test_new_session_starts_as_draft() {
        let new = NewSession {
            activity_id: ActivityId::new(),
            title: "Tuesday run".into(),
            description: None,
            location: Some("Park".into()),
            date_time: Utc::now(),
            join_mode: SessionJoinMode::Open,
            max_capacity: 10,
            max_waitlist: 2,
            join_form: Vec::new(),
        };
        let session = new.into_session(OrganizationId::new(), Utc::now());
        assert!(session.is_ok_and(|s| s.status == SessionStatus::Draft && s.deleted_at.is_none()));
    }
}
