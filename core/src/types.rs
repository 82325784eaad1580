//! Domain types for the session and participation engine.
//!
//! This module contains identifiers, the join-mode and status enums of every
//! scope, and the entity records persisted by the store: organizations,
//! activities, activity memberships, sessions and participations.

use crate::error::{EngineError, Result};
use crate::forms::{AttributeOverrides, FormAnswers, FormField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an organization (tenant)
    OrganizationId
);
define_id!(
    /// Unique identifier for an activity within an organization
    ActivityId
);
define_id!(
    /// Unique identifier for a session
    SessionId
);
define_id!(
    /// Unique identifier for a participation record
    ParticipationId
);
define_id!(
    /// Unique identifier for a user
    UserId
);

// ============================================================================
// String-backed enums
// ============================================================================

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Database and wire representation
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(EngineError::InvalidField {
                        field: stringify!($name),
                        reason: format!("unknown value '{other}'"),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// How non-members obtain membership of an organization
    OrgJoinMode {
        /// Anyone may take part
        Open => "open",
        /// Requires a redeemed invite link
        Invite => "invite",
        /// Requires an approved organization join request
        Approval => "approval",
    }
);

string_enum!(
    /// How users obtain membership of an activity
    ActivityJoinMode {
        /// Joining a session auto-creates an active membership
        Open => "open",
        /// Membership must be approved before joining sessions
        RequireApproval => "require_approval",
        /// Only admins can grant membership
        Invite => "invite",
    }
);

string_enum!(
    /// How a session admits participants
    SessionJoinMode {
        /// Capacity-based admission
        Open => "open",
        /// Every request lands in `pending` until an admin decides
        ApprovalRequired => "approval_required",
        /// Only reachable through admin add
        InviteOnly => "invite_only",
    }
);

string_enum!(
    /// Status of an activity membership
    MembershipStatus {
        /// Awaiting approval
        Pending => "pending",
        /// Member in good standing
        Active => "active",
        /// Request was rejected
        Rejected => "rejected",
    }
);

string_enum!(
    /// Lifecycle status of a session
    SessionStatus {
        /// Being prepared, not yet admitting
        Draft => "draft",
        /// Open for admission
        Published => "published",
        /// Took place (terminal)
        Completed => "completed",
        /// Called off (terminal)
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Status of a participation
    ParticipationStatus {
        /// Awaiting admin approval
        Pending => "pending",
        /// In the overflow queue
        Waitlisted => "waitlisted",
        /// Holds a seat
        Joined => "joined",
        /// No longer taking part
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Attendance recorded by admins
    AttendanceStatus {
        /// Not yet recorded
        Pending => "pending",
        /// Attended
        Show => "show",
        /// Did not attend
        NoShow => "no_show",
    }
);

string_enum!(
    /// Payment recorded by admins
    PaymentStatus {
        /// Not paid
        Unpaid => "unpaid",
        /// Paid
        Paid => "paid",
    }
);

string_enum!(
    /// Role of a user inside an organization
    Role {
        /// Organization owner
        Owner => "owner",
        /// Organization administrator
        Admin => "admin",
        /// Regular member
        Member => "member",
    }
);

impl SessionStatus {
    /// `completed` and `cancelled` have no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl ParticipationStatus {
    /// Every status except `cancelled` counts as an active participation.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Top-level tenant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization ID
    pub id: OrganizationId,
    /// Display name
    pub name: String,
    /// Policy applied to users who are not yet members
    pub default_join_mode: OrgJoinMode,
}

/// A user's membership of an organization, owned by the identity collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    /// Organization
    pub organization_id: OrganizationId,
    /// Member
    pub user_id: UserId,
    /// Role inside the organization
    pub role: Role,
}

/// A sub-community of an organization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity ID
    pub id: ActivityId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Display name
    pub name: String,
    /// Membership policy
    pub join_mode: ActivityJoinMode,
}

/// Membership of a user in an activity, unique per (activity, user)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMembership {
    /// Activity
    pub activity_id: ActivityId,
    /// Member
    pub user_id: UserId,
    /// Current status
    pub status: MembershipStatus,
    /// When the membership record was created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl ActivityMembership {
    /// Whether the membership grants access to the activity's sessions
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Seat and waitlist limits of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimits {
    /// Maximum number of `joined` participations (>= 1)
    pub max_capacity: u32,
    /// Maximum number of `waitlisted` participations (>= 0)
    pub max_waitlist: u32,
}

/// A scheduled occurrence participants can join
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID
    pub id: SessionId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Parent activity
    pub activity_id: ActivityId,
    /// Title
    pub title: String,
    /// Free-form description
    pub description: Option<String>,
    /// Location
    pub location: Option<String>,
    /// When the session takes place
    pub date_time: DateTime<Utc>,
    /// Admission policy
    pub join_mode: SessionJoinMode,
    /// Maximum joined participants
    pub max_capacity: u32,
    /// Maximum waitlisted participants
    pub max_waitlist: u32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Join-form schema declared for this session
    pub join_form: Vec<FormField>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Capacity limits currently in force
    #[must_use]
    pub const fn limits(&self) -> CapacityLimits {
        CapacityLimits {
            max_capacity: self.max_capacity,
            max_waitlist: self.max_waitlist,
        }
    }

    /// Whether the session has been soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A user's participation in a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    /// Participation ID
    pub id: ParticipationId,
    /// Session
    pub session_id: SessionId,
    /// Participant
    pub user_id: UserId,
    /// Admission status
    pub status: ParticipationStatus,
    /// Attendance (admin-managed)
    pub attendance: AttendanceStatus,
    /// Payment (admin-managed)
    pub payment: PaymentStatus,
    /// FIFO key for waitlist promotion
    pub joined_at: DateTime<Utc>,
    /// Answers to the session's join form
    pub form_answers: Option<FormAnswers>,
    /// Per-participation attribute overrides
    pub attribute_overrides: Option<AttributeOverrides>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
}

/// Public profile of a user as supplied by the identity collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID
    pub id: UserId,
    /// Name shown to other participants
    pub display_name: String,
    /// Contact email (redacted for non-admin readers)
    pub email: Option<String>,
    /// Contact phone (redacted for non-admin readers)
    pub phone: Option<String>,
}

/// How an admin refers to the user being added
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UserIdentifier {
    /// By user ID
    Id(UserId),
    /// By email address (case-insensitive)
    Email(String),
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

/// The authenticated, organization-scoped caller of an operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Calling user
    pub user_id: UserId,
    /// Organization the request is scoped to
    pub organization_id: OrganizationId,
    /// Membership of the caller in that organization, if any
    pub membership: Option<OrganizationMembership>,
}

impl Caller {
    /// Caller that belongs to the organization with the given role
    #[must_use]
    pub const fn member(user_id: UserId, organization_id: OrganizationId, role: Role) -> Self {
        Self {
            user_id,
            organization_id,
            membership: Some(OrganizationMembership {
                organization_id,
                user_id,
                role,
            }),
        }
    }

    /// Caller that is not (yet) a member of the organization
    #[must_use]
    pub const fn guest(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
            membership: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_str() {
        assert_eq!(
            "approval_required".parse::<SessionJoinMode>().ok(),
            Some(SessionJoinMode::ApprovalRequired)
        );
        assert_eq!(ParticipationStatus::Waitlisted.as_str(), "waitlisted");
        assert_eq!(AttendanceStatus::NoShow.to_string(), "no_show");
    }

    #[test]
    fn test_unknown_enum_value_is_rejected() {
        let err = "maybe".parse::<PaymentStatus>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidField { field: "PaymentStatus", .. }));
    }

    #[test]
    fn test_terminal_session_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Draft.is_terminal());
        assert!(!SessionStatus::Published.is_terminal());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ActivityJoinMode::RequireApproval).unwrap_or_default();
        assert_eq!(json, "\"require_approval\"");
    }
}
