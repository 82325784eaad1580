//! Error taxonomy for the session and participation engine.
//!
//! Every failure is request-scoped. Validation happens before any write, so a
//! returned error always means nothing was persisted.

use crate::types::{ParticipationStatus, SessionStatus};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse classification used by transports to pick a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Entity absent or outside the caller's organization
    NotFound,
    /// Request is invalid in the current state
    BadRequest,
    /// Caller is not allowed to perform the request
    Forbidden,
    /// Lost a race with a concurrent transaction; the caller may retry
    Conflict,
    /// Infrastructure failure
    Internal,
}

/// Errors produced by the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Not found (also used for cross-organization references)
    // ═══════════════════════════════════════════════════════════
    /// Session does not exist, is soft-deleted, or belongs to another organization.
    #[error("Session not found")]
    SessionNotFound,

    /// Participation does not exist, is already cancelled, or is out of scope.
    #[error("Participation not found")]
    ParticipationNotFound,

    /// Activity does not exist or belongs to another organization.
    #[error("Activity not found")]
    ActivityNotFound,

    /// Organization does not exist.
    #[error("Organization not found")]
    OrganizationNotFound,

    /// User could not be resolved.
    #[error("User not found")]
    UserNotFound,

    // ═══════════════════════════════════════════════════════════
    // Bad request
    // ═══════════════════════════════════════════════════════════
    /// Session status transition is not allowed.
    #[error("Cannot change session status from {from} to {to}")]
    InvalidSessionTransition {
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// Participation status transition is not allowed.
    #[error("Cannot change participation status from {from} to {to}")]
    InvalidParticipationTransition {
        /// Current status
        from: ParticipationStatus,
        /// Requested status
        to: ParticipationStatus,
    },

    /// No seat and no waitlist room left.
    #[error("Session is full")]
    SessionFull,

    /// Session is completed or cancelled and can no longer change.
    #[error("Session is {status} and can no longer be modified")]
    SessionFrozen {
        /// Terminal status of the session
        status: SessionStatus,
    },

    /// Session is not published.
    #[error("Session is not open for registration")]
    SessionNotOpen,

    /// Required join-form questions were left unanswered.
    #[error("Missing answers for required fields: {}", fields.join(", "))]
    MissingFormAnswers {
        /// Labels of the unanswered required fields
        fields: Vec<String>,
    },

    /// The activity requires an approved membership first.
    #[error("Join the activity first")]
    ActivityMembershipRequired,

    /// User already has an active participation in the session.
    #[error("Already registered for this session")]
    AlreadyParticipating,

    /// Source and target of a move are the same session.
    #[error("Participation is already in the target session")]
    SameSession,

    /// A field value failed validation.
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Forbidden
    // ═══════════════════════════════════════════════════════════
    /// Invite-only barrier at organization, activity or session scope.
    #[error("An invitation is required to join this {scope}")]
    InviteRequired {
        /// Scope that requires the invitation
        scope: &'static str,
    },

    /// Organization membership requires an approved join request.
    #[error("Organization membership requires approval")]
    OrganizationApprovalRequired,

    /// Operation is reserved to organization owners and admins.
    #[error("Administrator privileges required")]
    AdminRequired,

    // ═══════════════════════════════════════════════════════════
    // Concurrency and infrastructure
    // ═══════════════════════════════════════════════════════════
    /// Concurrent modification detected; retry the request.
    #[error("Concurrent update conflict, please retry")]
    Conflict,

    /// Persistence failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl EngineError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound
            | Self::ParticipationNotFound
            | Self::ActivityNotFound
            | Self::OrganizationNotFound
            | Self::UserNotFound => ErrorKind::NotFound,
            Self::InvalidSessionTransition { .. }
            | Self::InvalidParticipationTransition { .. }
            | Self::SessionFull
            | Self::SessionFrozen { .. }
            | Self::SessionNotOpen
            | Self::MissingFormAnswers { .. }
            | Self::ActivityMembershipRequired
            | Self::AlreadyParticipating
            | Self::SameSession
            | Self::InvalidField { .. } => ErrorKind::BadRequest,
            Self::InviteRequired { .. }
            | Self::OrganizationApprovalRequired
            | Self::AdminRequired => ErrorKind::Forbidden,
            Self::Conflict => ErrorKind::Conflict,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    /// Short machine-readable label, used for metrics and error codes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::ParticipationNotFound => "participation_not_found",
            Self::ActivityNotFound => "activity_not_found",
            Self::OrganizationNotFound => "organization_not_found",
            Self::UserNotFound => "user_not_found",
            Self::InvalidSessionTransition { .. } => "invalid_session_transition",
            Self::InvalidParticipationTransition { .. } => "invalid_participation_transition",
            Self::SessionFull => "session_full",
            Self::SessionFrozen { .. } => "session_frozen",
            Self::SessionNotOpen => "session_not_open",
            Self::MissingFormAnswers { .. } => "missing_form_answers",
            Self::ActivityMembershipRequired => "activity_membership_required",
            Self::AlreadyParticipating => "already_participating",
            Self::SameSession => "same_session",
            Self::InvalidField { .. } => "invalid_field",
            Self::InviteRequired { .. } => "invite_required",
            Self::OrganizationApprovalRequired => "organization_approval_required",
            Self::AdminRequired => "admin_required",
            Self::Conflict => "conflict",
            Self::Database(_) => "database",
        }
    }

    /// Returns `true` for errors the caller can fix by retrying unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(EngineError::SessionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::SessionFull.kind(), ErrorKind::BadRequest);
        assert_eq!(
            EngineError::InviteRequired { scope: "activity" }.kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(EngineError::Conflict.kind(), ErrorKind::Conflict);
        assert_eq!(EngineError::Database("boom".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_missing_answers_message_lists_fields() {
        let err = EngineError::MissingFormAnswers {
            fields: vec!["Shirt size".into(), "Dietary needs".into()],
        };
        assert_eq!(
            err.to_string(),
            "Missing answers for required fields: Shirt size, Dietary needs"
        );
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(EngineError::Conflict.is_retryable());
        assert!(!EngineError::SessionFull.is_retryable());
    }
}
