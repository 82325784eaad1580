//! Access gate for self-service joins.
//!
//! Evaluates three nested scopes in order:
//!
//! 1. **Organization**: members pass; otherwise `default_join_mode` decides
//!    (`open` passes, `approval` needs an approved join request, `invite`
//!    needs a redeemed invite token).
//! 2. **Activity**: an `active` membership passes; otherwise `join_mode`
//!    decides (`open` activates a membership in the same transaction,
//!    `require_approval` fails, `invite` is forbidden).
//! 3. **Session**: `join_mode` yields the [`AdmissionMode`]; `invite_only`
//!    sessions are only reachable through an admin add.
//!
//! Owners and admins skip the first two scopes. The gate is pure: it reports
//! the membership write it needs through [`MembershipAction`] and leaves the
//! write to the caller's transaction.

use crate::admission::AdmissionMode;
use crate::capability::Capability;
use crate::error::{EngineError, Result};
use crate::types::{
    Activity, ActivityJoinMode, ActivityMembership, MembershipStatus, OrgJoinMode, Organization,
    OrganizationMembership, Session, SessionJoinMode, SessionStatus, UserId,
};
use chrono::{DateTime, Utc};

/// Everything the gate needs to know about one join attempt
#[derive(Clone, Copy, Debug)]
pub struct JoinContext<'a> {
    /// Organization the session belongs to
    pub organization: &'a Organization,
    /// Joining user's organization membership
    pub organization_membership: Option<&'a OrganizationMembership>,
    /// Parent activity of the session
    pub activity: &'a Activity,
    /// Joining user's activity membership
    pub activity_membership: Option<&'a ActivityMembership>,
    /// Target session
    pub session: &'a Session,
    /// Whether an invite token was successfully redeemed for this request
    pub invite_redeemed: bool,
}

/// Activity-membership write required by a passed gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipAction {
    /// Membership is already active, or the caller is an admin
    None,
    /// Create or reactivate an `active` membership (open activity)
    Activate,
}

impl MembershipAction {
    /// Builds the membership row to persist, if any.
    ///
    /// Reactivation keeps the original `created_at`.
    #[must_use]
    pub fn apply(
        self,
        existing: Option<&ActivityMembership>,
        activity: &Activity,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Option<ActivityMembership> {
        match self {
            Self::None => None,
            Self::Activate => Some(ActivityMembership {
                activity_id: activity.id,
                user_id,
                status: MembershipStatus::Active,
                created_at: existing.map_or(now, |m| m.created_at),
                updated_at: now,
            }),
        }
    }
}

/// Outcome of a passed gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessDecision {
    /// Mode the admission engine runs in
    pub admission_mode: AdmissionMode,
    /// Membership write to perform in the same transaction
    pub membership_action: MembershipAction,
    /// Whether the joining user administers the organization
    pub is_admin: bool,
}

/// Cascading organization → activity → session join check
pub struct AccessGate<'a> {
    capability: &'a dyn Capability,
}

impl<'a> AccessGate<'a> {
    /// Creates a gate that recognises admins through `capability`
    #[must_use]
    pub const fn new(capability: &'a dyn Capability) -> Self {
        Self { capability }
    }

    /// Evaluates a self-service join attempt.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SessionNotFound`]: session deleted or outside the organization
    /// - [`EngineError::SessionFrozen`] / [`EngineError::SessionNotOpen`]: session not published
    /// - [`EngineError::OrganizationApprovalRequired`]: organization requires approval
    /// - [`EngineError::InviteRequired`]: invite barrier at any scope
    /// - [`EngineError::ActivityMembershipRequired`]: activity requires approval
    pub fn evaluate(&self, ctx: &JoinContext<'_>) -> Result<AccessDecision> {
        let session = ctx.session;
        if session.is_deleted()
            || session.organization_id != ctx.organization.id
            || session.activity_id != ctx.activity.id
        {
            return Err(EngineError::SessionNotFound);
        }
        match session.status {
            SessionStatus::Published => {}
            SessionStatus::Draft => return Err(EngineError::SessionNotOpen),
            status @ (SessionStatus::Completed | SessionStatus::Cancelled) => {
                return Err(EngineError::SessionFrozen { status });
            }
        }

        let is_admin = self.capability.can_administer(ctx.organization_membership);

        let membership_action = if is_admin {
            tracing::debug!(session_id = %session.id, "Admin bypasses membership gates");
            MembershipAction::None
        } else {
            Self::organization_gate(ctx)?;
            Self::activity_gate(ctx)?
        };

        let admission_mode = match session.join_mode {
            SessionJoinMode::Open => AdmissionMode::Capacity,
            SessionJoinMode::ApprovalRequired => AdmissionMode::Approval,
            SessionJoinMode::InviteOnly => {
                return Err(EngineError::InviteRequired { scope: "session" });
            }
        };

        tracing::debug!(
            session_id = %session.id,
            ?admission_mode,
            ?membership_action,
            is_admin,
            "Access gate passed"
        );

        Ok(AccessDecision {
            admission_mode,
            membership_action,
            is_admin,
        })
    }

    fn organization_gate(ctx: &JoinContext<'_>) -> Result<()> {
        if ctx.organization_membership.is_some() || ctx.invite_redeemed {
            return Ok(());
        }
        match ctx.organization.default_join_mode {
            OrgJoinMode::Open => Ok(()),
            OrgJoinMode::Approval => Err(EngineError::OrganizationApprovalRequired),
            OrgJoinMode::Invite => Err(EngineError::InviteRequired {
                scope: "organization",
            }),
        }
    }

    fn activity_gate(ctx: &JoinContext<'_>) -> Result<MembershipAction> {
        if ctx.activity_membership.is_some_and(ActivityMembership::is_active) {
            return Ok(MembershipAction::None);
        }
        match ctx.activity.join_mode {
            ActivityJoinMode::Open => Ok(MembershipAction::Activate),
            ActivityJoinMode::RequireApproval => Err(EngineError::ActivityMembershipRequired),
            ActivityJoinMode::Invite => Err(EngineError::InviteRequired { scope: "activity" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RoleCapability;
    use crate::types::{ActivityId, OrganizationId, Role, SessionId};

    struct Fixture {
        organization: Organization,
        activity: Activity,
        session: Session,
        user_id: UserId,
    }

    impl Fixture {
        fn new(org_mode: OrgJoinMode, activity_mode: ActivityJoinMode, session_mode: SessionJoinMode) -> Self {
            let now = Utc::now();
            let organization = Organization {
                id: OrganizationId::new(),
                name: "Club".into(),
                default_join_mode: org_mode,
            };
            let activity = Activity {
                id: ActivityId::new(),
                organization_id: organization.id,
                name: "Running".into(),
                join_mode: activity_mode,
            };
            let session = Session {
                id: SessionId::new(),
                organization_id: organization.id,
                activity_id: activity.id,
                title: "Tuesday run".into(),
                description: None,
                location: None,
                date_time: now,
                join_mode: session_mode,
                max_capacity: 10,
                max_waitlist: 0,
                status: SessionStatus::Published,
                join_form: Vec::new(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            Self {
                organization,
                activity,
                session,
                user_id: UserId::new(),
            }
        }

        fn membership(&self, role: Role) -> OrganizationMembership {
            OrganizationMembership {
                organization_id: self.organization.id,
                user_id: self.user_id,
                role,
            }
        }

        fn activity_membership(&self, status: MembershipStatus) -> ActivityMembership {
            let now = Utc::now();
            ActivityMembership {
                activity_id: self.activity.id,
                user_id: self.user_id,
                status,
                created_at: now,
                updated_at: now,
            }
        }

        fn evaluate(
            &self,
            membership: Option<&OrganizationMembership>,
            activity_membership: Option<&ActivityMembership>,
        ) -> Result<AccessDecision> {
            AccessGate::new(&RoleCapability).evaluate(&JoinContext {
                organization: &self.organization,
                organization_membership: membership,
                activity: &self.activity,
                activity_membership,
                session: &self.session,
                invite_redeemed: false,
            })
        }
    }

    #[test]
    fn test_member_with_active_membership_passes() {
        let f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::RequireApproval, SessionJoinMode::Open);
        let member = f.membership(Role::Member);
        let active = f.activity_membership(MembershipStatus::Active);

        let decision = f.evaluate(Some(&member), Some(&active));

        assert_eq!(
            decision,
            Ok(AccessDecision {
                admission_mode: AdmissionMode::Capacity,
                membership_action: MembershipAction::None,
                is_admin: false,
            })
        );
    }

    #[test]
    fn test_open_activity_activates_membership() {
        let f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::Open);
        let member = f.membership(Role::Member);
        let rejected = f.activity_membership(MembershipStatus::Rejected);

        let decision = f.evaluate(Some(&member), Some(&rejected));

        assert!(decision.is_ok_and(|d| d.membership_action == MembershipAction::Activate));
    }

    #[test]
    fn test_require_approval_activity_is_bad_request() {
        let f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::RequireApproval, SessionJoinMode::Open);
        let member = f.membership(Role::Member);
        let pending = f.activity_membership(MembershipStatus::Pending);

        assert_eq!(
            f.evaluate(Some(&member), Some(&pending)),
            Err(EngineError::ActivityMembershipRequired)
        );
    }

    #[test]
    fn test_invite_activity_forbids_non_members() {
        let f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Invite, SessionJoinMode::Open);
        let member = f.membership(Role::Member);

        let err = f.evaluate(Some(&member), None);

        assert_eq!(err, Err(EngineError::InviteRequired { scope: "activity" }));
    }

    #[test]
    fn test_admin_bypasses_membership_gates() {
        let f = Fixture::new(OrgJoinMode::Invite, ActivityJoinMode::Invite, SessionJoinMode::Open);
        let admin = f.membership(Role::Admin);

        let decision = f.evaluate(Some(&admin), None);

        assert!(decision.is_ok_and(|d| d.is_admin && d.membership_action == MembershipAction::None));
    }

    #[test]
    fn test_organization_modes_for_non_members() {
        let open = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::Open);
        assert!(open.evaluate(None, None).is_ok());

        let approval = Fixture::new(OrgJoinMode::Approval, ActivityJoinMode::Open, SessionJoinMode::Open);
        assert_eq!(
            approval.evaluate(None, None),
            Err(EngineError::OrganizationApprovalRequired)
        );

        let invite = Fixture::new(OrgJoinMode::Invite, ActivityJoinMode::Open, SessionJoinMode::Open);
        assert_eq!(
            invite.evaluate(None, None),
            Err(EngineError::InviteRequired {
                scope: "organization"
            })
        );
    }

    #[test]
    fn test_redeemed_invite_passes_organization_gate() {
        let f = Fixture::new(OrgJoinMode::Invite, ActivityJoinMode::Open, SessionJoinMode::Open);
        let decision = AccessGate::new(&RoleCapability).evaluate(&JoinContext {
            organization: &f.organization,
            organization_membership: None,
            activity: &f.activity,
            activity_membership: None,
            session: &f.session,
            invite_redeemed: true,
        });
        assert!(decision.is_ok());
    }

    #[test]
    fn test_session_join_modes() {
        let approval = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::ApprovalRequired);
        assert!(approval
            .evaluate(None, None)
            .is_ok_and(|d| d.admission_mode == AdmissionMode::Approval));

        let invite_only = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::InviteOnly);
        let admin = invite_only.membership(Role::Owner);
        assert_eq!(
            invite_only.evaluate(Some(&admin), None),
            Err(EngineError::InviteRequired { scope: "session" })
        );
    }

    #[test]
    fn test_session_must_be_published() {
        let mut f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::Open);
        f.session.status = SessionStatus::Draft;
        assert_eq!(f.evaluate(None, None), Err(EngineError::SessionNotOpen));

        f.session.status = SessionStatus::Completed;
        assert_eq!(
            f.evaluate(None, None),
            Err(EngineError::SessionFrozen {
                status: SessionStatus::Completed
            })
        );
    }

    #[test]
    fn test_deleted_session_is_not_found() {
        let mut f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::Open);
        f.session.deleted_at = Some(Utc::now());
        assert_eq!(f.evaluate(None, None), Err(EngineError::SessionNotFound));
    }

    #[test]
    fn test_reactivation_keeps_created_at() {
        let f = Fixture::new(OrgJoinMode::Open, ActivityJoinMode::Open, SessionJoinMode::Open);
        let rejected = f.activity_membership(MembershipStatus::Rejected);
        let later = rejected.created_at + chrono::Duration::days(3);

        let row = MembershipAction::Activate.apply(Some(&rejected), &f.activity, f.user_id, later);

        assert!(row.is_some_and(|m| m.is_active() && m.created_at == rejected.created_at && m.updated_at == later));
    }
}
