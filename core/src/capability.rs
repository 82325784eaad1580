//! Role-based capability check injected into every operation.

use crate::types::{OrganizationMembership, Role};

/// Decides whether an organization membership may administer the organization.
pub trait Capability: Send + Sync {
    /// `true` if the membership grants administrative rights.
    fn can_administer(&self, membership: Option<&OrganizationMembership>) -> bool;
}

/// Owners and admins administer; members and non-members do not.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoleCapability;

impl Capability for RoleCapability {
    fn can_administer(&self, membership: Option<&OrganizationMembership>) -> bool {
        membership.is_some_and(|m| matches!(m.role, Role::Owner | Role::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrganizationId, UserId};

    fn membership(role: Role) -> OrganizationMembership {
        OrganizationMembership {
            organization_id: OrganizationId::new(),
            user_id: UserId::new(),
            role,
        }
    }

    #[test]
    fn test_owner_and_admin_administer() {
        assert!(RoleCapability.can_administer(Some(&membership(Role::Owner))));
        assert!(RoleCapability.can_administer(Some(&membership(Role::Admin))));
    }

    #[test]
    fn test_member_and_guest_do_not() {
        assert!(!RoleCapability.can_administer(Some(&membership(Role::Member))));
        assert!(!RoleCapability.can_administer(None));
    }
}
