//! Fixture builder for service-level tests.

use crate::mocks::{epoch, RecordingPublisher, TestClock};
use crate::store::InMemoryStore;
use huddle_core::service::ParticipationService;
use huddle_core::types::{
    Activity, ActivityId, ActivityJoinMode, ActivityMembership, Caller, MembershipStatus,
    OrgJoinMode, Organization, OrganizationId, Participation, ParticipationStatus, Role,
    Session, SessionId, SessionJoinMode, SessionStatus, UserId, UserProfile,
};
use std::sync::Arc;

/// An organization with one activity, an owner, and a service wired to an
/// [`InMemoryStore`], a ticking clock and a recording publisher.
pub struct World {
    /// Backing store
    pub store: Arc<InMemoryStore>,
    /// Clock shared with the service
    pub clock: Arc<TestClock>,
    /// Records every published event
    pub publisher: Arc<RecordingPublisher>,
    /// Service under test
    pub service: ParticipationService<InMemoryStore>,
    /// The organization
    pub organization: Organization,
    /// Default activity of the organization
    pub activity: Activity,
    /// Owner of the organization
    pub admin: Caller,
}

impl World {
    /// Open organization with an open activity
    pub async fn new() -> Self {
        Self::with_modes(OrgJoinMode::Open, ActivityJoinMode::Open).await
    }

    /// Organization and default activity with the given join modes
    pub async fn with_modes(org_mode: OrgJoinMode, activity_mode: ActivityJoinMode) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(TestClock::starting_at(epoch()));
        let publisher = RecordingPublisher::new();
        let service = ParticipationService::new(Arc::clone(&store), clock.clone())
            .with_publisher(publisher.clone());

        let organization = Organization {
            id: OrganizationId::new(),
            name: "Riverside Club".into(),
            default_join_mode: org_mode,
        };
        store.insert_organization(organization.clone()).await;

        let activity = Activity {
            id: ActivityId::new(),
            organization_id: organization.id,
            name: "Running".into(),
            join_mode: activity_mode,
        };
        store.insert_activity(activity.clone()).await;

        let mut world = Self {
            store,
            clock,
            publisher,
            service,
            admin: Caller::guest(UserId::new(), organization.id),
            organization,
            activity,
        };
        world.admin = world.caller_with_role("owner", Role::Owner).await;
        world
    }

    /// Registers a user profile without any membership
    pub async fn user(&self, name: &str) -> UserProfile {
        let profile = UserProfile {
            id: UserId::new(),
            display_name: name.to_string(),
            email: Some(format!("{name}@example.com")),
            phone: Some("+1 555 0100".into()),
        };
        self.store.insert_user(profile.clone()).await;
        profile
    }

    /// A user who is a regular member of the organization
    pub async fn member(&self, name: &str) -> Caller {
        self.caller_with_role(name, Role::Member).await
    }

    /// A user with the given role in the organization
    pub async fn caller_with_role(&self, name: &str, role: Role) -> Caller {
        let profile = self.user(name).await;
        let caller = Caller::member(profile.id, self.organization.id, role);
        if let Some(membership) = caller.membership.clone() {
            self.store.insert_membership(membership).await;
        }
        caller
    }

    /// A registered user who is not a member of the organization
    pub async fn guest(&self, name: &str) -> Caller {
        let profile = self.user(name).await;
        Caller::guest(profile.id, self.organization.id)
    }

    /// Gives `caller` an activity membership with `status`
    pub async fn activity_membership(&self, activity: &Activity, caller: &Caller, status: MembershipStatus) {
        self.store
            .insert_activity_membership(ActivityMembership {
                activity_id: activity.id,
                user_id: caller.user_id,
                status,
                created_at: epoch(),
                updated_at: epoch(),
            })
            .await;
    }

    /// Adds another activity to the organization
    pub async fn activity(&self, join_mode: ActivityJoinMode) -> Activity {
        let activity = Activity {
            id: ActivityId::new(),
            organization_id: self.organization.id,
            name: format!("{join_mode} activity"),
            join_mode,
        };
        self.store.insert_activity(activity.clone()).await;
        activity
    }

    /// A published, open session in the default activity
    pub async fn published_session(&self, max_capacity: u32, max_waitlist: u32) -> Session {
        self.session_with(|s| {
            s.max_capacity = max_capacity;
            s.max_waitlist = max_waitlist;
        })
        .await
    }

    /// A session in the default activity, customised by `configure`
    ///
    /// Starts from a published, open session with ten seats and no waitlist.
    pub async fn session_with(&self, configure: impl FnOnce(&mut Session)) -> Session {
        let mut session = Session {
            id: SessionId::new(),
            organization_id: self.organization.id,
            activity_id: self.activity.id,
            title: "Tuesday run".into(),
            description: None,
            location: Some("Riverside park".into()),
            date_time: epoch() + chrono::Duration::days(7),
            join_mode: SessionJoinMode::Open,
            max_capacity: 10,
            max_waitlist: 0,
            status: SessionStatus::Published,
            join_form: Vec::new(),
            created_at: epoch(),
            updated_at: epoch(),
            deleted_at: None,
        };
        configure(&mut session);
        self.store.insert_session(session.clone()).await;
        session
    }

    /// A published session belonging to a different organization
    pub async fn foreign_session(&self) -> Session {
        let organization = Organization {
            id: OrganizationId::new(),
            name: "Elsewhere".into(),
            default_join_mode: OrgJoinMode::Open,
        };
        self.store.insert_organization(organization.clone()).await;
        let activity = Activity {
            id: ActivityId::new(),
            organization_id: organization.id,
            name: "Cycling".into(),
            join_mode: ActivityJoinMode::Open,
        };
        self.store.insert_activity(activity.clone()).await;

        self.session_with(|s| {
            s.organization_id = organization.id;
            s.activity_id = activity.id;
        })
        .await
    }

    /// Committed rows of a session
    pub async fn roster(&self, session_id: SessionId) -> Vec<Participation> {
        self.store.participations_of(session_id).await
    }

    /// Users holding a seat in the session
    pub async fn joined_users(&self, session_id: SessionId) -> Vec<UserId> {
        self.roster(session_id)
            .await
            .into_iter()
            .filter(|p| p.status == ParticipationStatus::Joined)
            .map(|p| p.user_id)
            .collect()
    }
}
