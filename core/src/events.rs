//! Domain events and the publisher boundary.
//!
//! Events are handed to the [`EventPublisher`] only after the transaction that
//! produced them committed. Notification delivery lives behind that trait.

use crate::types::{
    ActivityId, AttendanceStatus, ParticipationId, ParticipationStatus, PaymentStatus, SessionId,
    SessionStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// How a participation came to be admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionSource {
    /// Self-service join
    Join,
    /// Administrative add (capacity bypass)
    AdminAdd,
    /// Moved in from another session
    Move,
}

/// Why a participation changed status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Admin approved a pending request
    Approved,
    /// Admin rejected a pending request
    Rejected,
    /// Participant cancelled
    SelfCancelled,
    /// Admin removed the participant
    Removed,
    /// Participant was moved to another session
    MovedOut,
}

/// Facts about participations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParticipationEvent {
    /// A participation was created or re-activated
    ParticipantAdmitted {
        /// Participation
        participation_id: ParticipationId,
        /// Session
        session_id: SessionId,
        /// Participant
        user_id: UserId,
        /// Resulting status
        status: ParticipationStatus,
        /// Path that admitted it
        source: AdmissionSource,
        /// Whether a cancelled record was reused
        reused: bool,
    },

    /// A participation changed status
    ParticipantStatusChanged {
        /// Participation
        participation_id: ParticipationId,
        /// Session
        session_id: SessionId,
        /// Participant
        user_id: UserId,
        /// Previous status
        from: ParticipationStatus,
        /// New status
        to: ParticipationStatus,
        /// Cause
        reason: ChangeReason,
    },

    /// A waitlisted participation took a freed seat
    ParticipantPromoted {
        /// Participation
        participation_id: ParticipationId,
        /// Session
        session_id: SessionId,
        /// Participant
        user_id: UserId,
    },

    /// Attendance was recorded
    AttendanceMarked {
        /// Participation
        participation_id: ParticipationId,
        /// Session
        session_id: SessionId,
        /// Recorded attendance
        attendance: AttendanceStatus,
    },

    /// Payment was recorded
    PaymentMarked {
        /// Participation
        participation_id: ParticipationId,
        /// Session
        session_id: SessionId,
        /// Recorded payment
        payment: PaymentStatus,
    },
}

/// Facts about sessions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A draft session was created
    SessionCreated {
        /// Session
        session_id: SessionId,
        /// Parent activity
        activity_id: ActivityId,
    },

    /// Session fields were updated
    SessionUpdated {
        /// Session
        session_id: SessionId,
        /// Names of the fields that changed
        fields: Vec<String>,
    },

    /// Session status changed
    SessionStatusChanged {
        /// Session
        session_id: SessionId,
        /// Previous status
        from: SessionStatus,
        /// New status
        to: SessionStatus,
    },

    /// Session was soft-deleted
    SessionDeleted {
        /// Session
        session_id: SessionId,
    },
}

/// Any committed domain event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aggregate", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Participation event
    Participation(ParticipationEvent),
    /// Session event
    Session(SessionEvent),
}

impl From<ParticipationEvent> for DomainEvent {
    fn from(event: ParticipationEvent) -> Self {
        Self::Participation(event)
    }
}

impl From<SessionEvent> for DomainEvent {
    fn from(event: SessionEvent) -> Self {
        Self::Session(event)
    }
}

/// Receives committed events (notification collaborator boundary).
///
/// Publishing is fire-and-forget: the transaction already committed, so a
/// delivery failure must never undo or fail the operation.
pub trait EventPublisher: Send + Sync {
    /// Deliver a batch of committed events, in order.
    fn publish(&self, events: &[DomainEvent]);
}

/// Publisher that writes every event to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            match event {
                DomainEvent::Participation(ParticipationEvent::ParticipantPromoted {
                    participation_id,
                    session_id,
                    user_id,
                }) => tracing::info!(
                    %participation_id,
                    %session_id,
                    %user_id,
                    "Participant promoted from waitlist"
                ),
                other => tracing::info!(event = ?other, "Domain event"),
            }
        }
    }
}
