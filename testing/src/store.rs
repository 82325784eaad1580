//! In-memory `TransactionalStore`.
//!
//! One async mutex guards all tables. A transaction holds the lock from
//! `begin` until it is committed or dropped, and works on a private copy that
//! `commit` writes back, so transactions are serializable by construction and
//! a dropped transaction leaves no trace.

use chrono::{DateTime, Utc};
use huddle_core::error::{EngineError, Result};
use huddle_core::store::{StoreTransaction, TransactionalStore};
use huddle_core::types::{
    Activity, ActivityId, ActivityMembership, Organization, OrganizationId,
    OrganizationMembership, Participation, ParticipationId, Role, Session, SessionId, UserId,
    UserIdentifier, UserProfile,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every table of the store
#[derive(Clone, Debug, Default)]
pub struct Tables {
    /// Organizations
    pub organizations: HashMap<OrganizationId, Organization>,
    /// Organization memberships
    pub memberships: HashMap<(OrganizationId, UserId), OrganizationMembership>,
    /// User profiles
    pub users: HashMap<UserId, UserProfile>,
    /// Activities
    pub activities: HashMap<ActivityId, Activity>,
    /// Activity memberships
    pub activity_memberships: HashMap<(ActivityId, UserId), ActivityMembership>,
    /// Sessions, soft-deleted ones included
    pub sessions: HashMap<SessionId, Session>,
    /// Participations
    pub participations: HashMap<ParticipationId, Participation>,
    /// Invite links by token
    pub invites: HashMap<String, Invite>,
}

/// Invite link of an organization
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invite {
    /// Organization the link admits to
    pub organization_id: OrganizationId,
    /// Redemptions allowed, unlimited when `None`
    pub max_uses: Option<u32>,
    /// Redemptions so far
    pub uses: u32,
    /// Expiry, never when `None`
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invite {
    /// Unlimited, non-expiring link
    #[must_use]
    pub const fn new(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            max_uses: None,
            uses: 0,
            expires_at: None,
        }
    }

    /// Limits the number of redemptions
    #[must_use]
    pub const fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    fn accepts(&self, organization_id: OrganizationId, now: DateTime<Utc>) -> bool {
        self.organization_id == organization_id
            && self.expires_at.is_none_or(|at| at > now)
            && self.max_uses.is_none_or(|max| self.uses < max)
    }
}

impl Tables {
    fn visible_session(&self, organization_id: OrganizationId, id: SessionId) -> Result<&Session> {
        self.sessions
            .get(&id)
            .filter(|s| s.organization_id == organization_id && !s.is_deleted())
            .ok_or(EngineError::SessionNotFound)
    }

    /// Rows of a session, oldest first
    #[must_use]
    pub fn participations_of(&self, session_id: SessionId) -> Vec<Participation> {
        let mut rows: Vec<Participation> = self
            .participations
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.created_at, p.id));
        rows
    }

    /// Mirrors the partial unique index on active participations.
    fn check_unique_active(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in self.participations.values().filter(|p| p.status.is_active()) {
            if !seen.insert((p.session_id, p.user_id)) {
                return Err(EngineError::Conflict);
            }
        }
        Ok(())
    }
}

/// In-memory store for tests
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every table
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    /// Rows of a session as currently committed
    pub async fn participations_of(&self, session_id: SessionId) -> Vec<Participation> {
        self.tables.lock().await.participations_of(session_id)
    }

    /// Seeds an organization
    pub async fn insert_organization(&self, organization: Organization) {
        self.tables
            .lock()
            .await
            .organizations
            .insert(organization.id, organization);
    }

    /// Seeds an organization membership
    pub async fn insert_membership(&self, membership: OrganizationMembership) {
        self.tables
            .lock()
            .await
            .memberships
            .insert((membership.organization_id, membership.user_id), membership);
    }

    /// Seeds a user profile
    pub async fn insert_user(&self, profile: UserProfile) {
        self.tables.lock().await.users.insert(profile.id, profile);
    }

    /// Seeds an activity
    pub async fn insert_activity(&self, activity: Activity) {
        self.tables
            .lock()
            .await
            .activities
            .insert(activity.id, activity);
    }

    /// Seeds an activity membership
    pub async fn insert_activity_membership(&self, membership: ActivityMembership) {
        self.tables
            .lock()
            .await
            .activity_memberships
            .insert((membership.activity_id, membership.user_id), membership);
    }

    /// Seeds a session
    pub async fn insert_session(&self, session: Session) {
        self.tables.lock().await.sessions.insert(session.id, session);
    }

    /// Seeds an invite link
    pub async fn insert_invite(&self, token: impl Into<String>, invite: Invite) {
        self.tables.lock().await.invites.insert(token.into(), invite);
    }

    /// Seeds a participation
    pub async fn insert_participation(&self, participation: Participation) {
        self.tables
            .lock()
            .await
            .participations
            .insert(participation.id, participation);
    }
}

impl TransactionalStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// Transaction over [`InMemoryStore`]; holds the store lock until dropped
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl StoreTransaction for InMemoryTransaction {
    async fn organization(&mut self, id: OrganizationId) -> Result<Organization> {
        self.working
            .organizations
            .get(&id)
            .cloned()
            .ok_or(EngineError::OrganizationNotFound)
    }

    async fn organization_membership(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<OrganizationMembership>> {
        Ok(self
            .working
            .memberships
            .get(&(organization_id, user_id))
            .cloned())
    }

    async fn redeem_invite(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
        token: &str,
    ) -> Result<bool> {
        let now = Utc::now();
        let Some(invite) = self
            .working
            .invites
            .get_mut(token)
            .filter(|invite| invite.accepts(organization_id, now))
        else {
            return Ok(false);
        };
        invite.uses += 1;
        self.working
            .memberships
            .entry((organization_id, user_id))
            .or_insert(OrganizationMembership {
                organization_id,
                user_id,
                role: Role::Member,
            });
        Ok(true)
    }

    async fn find_user(&mut self, identifier: &UserIdentifier) -> Result<UserProfile> {
        let found = match identifier {
            UserIdentifier::Id(id) => self.working.users.get(id),
            UserIdentifier::Email(email) => self.working.users.values().find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
            }),
        };
        found.cloned().ok_or(EngineError::UserNotFound)
    }

    async fn user_profiles(&mut self, user_ids: &[UserId]) -> Result<Vec<UserProfile>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.working.users.get(id).cloned())
            .collect())
    }

    async fn activity(
        &mut self,
        organization_id: OrganizationId,
        id: ActivityId,
    ) -> Result<Activity> {
        self.working
            .activities
            .get(&id)
            .filter(|a| a.organization_id == organization_id)
            .cloned()
            .ok_or(EngineError::ActivityNotFound)
    }

    async fn activity_membership(
        &mut self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<Option<ActivityMembership>> {
        Ok(self
            .working
            .activity_memberships
            .get(&(activity_id, user_id))
            .cloned())
    }

    async fn save_activity_membership(&mut self, membership: &ActivityMembership) -> Result<()> {
        self.working
            .activity_memberships
            .insert((membership.activity_id, membership.user_id), membership.clone());
        Ok(())
    }

    async fn session(&mut self, organization_id: OrganizationId, id: SessionId) -> Result<Session> {
        self.working.visible_session(organization_id, id).cloned()
    }

    async fn lock_session(
        &mut self,
        organization_id: OrganizationId,
        id: SessionId,
    ) -> Result<Session> {
        // The whole store is already locked by this transaction.
        self.working.visible_session(organization_id, id).cloned()
    }

    async fn insert_session(&mut self, session: &Session) -> Result<()> {
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn save_session(&mut self, session: &Session) -> Result<()> {
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_participation(
        &mut self,
        organization_id: OrganizationId,
        id: ParticipationId,
    ) -> Result<Participation> {
        let participation = self
            .working
            .participations
            .get(&id)
            .ok_or(EngineError::ParticipationNotFound)?;
        self.working
            .visible_session(organization_id, participation.session_id)
            .map_err(|_| EngineError::ParticipationNotFound)?;
        Ok(participation.clone())
    }

    async fn load_roster(&mut self, session_id: SessionId) -> Result<Vec<Participation>> {
        Ok(self.working.participations_of(session_id))
    }

    async fn save_participations(&mut self, participations: &[Participation]) -> Result<()> {
        for participation in participations {
            self.working
                .participations
                .insert(participation.id, participation.clone());
        }
        self.working.check_unique_active()
    }

    async fn commit(self) -> Result<()> {
        let Self { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
