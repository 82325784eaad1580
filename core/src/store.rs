//! Transactional persistence boundary.
//!
//! Every operation of the service opens one [`StoreTransaction`], reads the
//! state it needs, writes the rows a reducer changed, and commits. Dropping a
//! transaction without calling [`StoreTransaction::commit`] rolls it back.
//!
//! # Locking
//!
//! [`StoreTransaction::lock_session`] takes an exclusive lock on the session
//! row that lasts until commit or rollback. The participation set of a session
//! is only ever read and written under that lock, so two concurrent admissions
//! to the same session serialize and both see the other's write. Operations
//! that touch two sessions lock them in ascending id order.
//!
//! Implementations: `huddle_postgres::PostgresStore` (row locks) and
//! `huddle_testing::InMemoryStore` (one global lock).

use crate::error::Result;
use crate::types::{
    Activity, ActivityId, ActivityMembership, Organization, OrganizationId,
    OrganizationMembership, Participation, ParticipationId, Session, SessionId, UserId,
    UserIdentifier, UserProfile,
};
use std::future::Future;

/// Opens transactions
pub trait TransactionalStore: Send + Sync + 'static {
    /// Transaction handle
    type Transaction: StoreTransaction;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::Database`] when no connection is available.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// Reads and writes inside one transaction.
///
/// Lookups scoped by organization return the matching `NotFound` error for
/// rows of other organizations, so cross-tenant ids are indistinguishable
/// from missing ones.
pub trait StoreTransaction: Send {
    /// Organization by id.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::OrganizationNotFound`] if absent.
    fn organization(
        &mut self,
        id: OrganizationId,
    ) -> impl Future<Output = Result<Organization>> + Send;

    /// A user's organization membership, if any.
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn organization_membership(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<OrganizationMembership>>> + Send;

    /// Spends one use of an invite token and makes the user a member.
    ///
    /// Returns `false` for unknown, expired or exhausted tokens and for tokens
    /// of another organization. Both writes roll back with the transaction.
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn redeem_invite(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
        token: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Resolves a user by id or (case-insensitive) email.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::UserNotFound`] if no user matches.
    fn find_user(
        &mut self,
        identifier: &UserIdentifier,
    ) -> impl Future<Output = Result<UserProfile>> + Send;

    /// Profiles of the given users (unknown ids are skipped).
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn user_profiles(
        &mut self,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<Vec<UserProfile>>> + Send;

    /// Activity of the organization.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ActivityNotFound`] if absent or in another organization.
    fn activity(
        &mut self,
        organization_id: OrganizationId,
        id: ActivityId,
    ) -> impl Future<Output = Result<Activity>> + Send;

    /// A user's activity membership, if any.
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn activity_membership(
        &mut self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<ActivityMembership>>> + Send;

    /// Inserts or updates an activity membership (unique per activity and user).
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn save_activity_membership(
        &mut self,
        membership: &ActivityMembership,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Session of the organization, without locking (reads only).
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::SessionNotFound`] if absent, soft-deleted or in
    /// another organization.
    fn session(
        &mut self,
        organization_id: OrganizationId,
        id: SessionId,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Session of the organization, locked until the transaction ends.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::SessionNotFound`] if absent, soft-deleted or in
    /// another organization.
    fn lock_session(
        &mut self,
        organization_id: OrganizationId,
        id: SessionId,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Inserts a new session.
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn insert_session(&mut self, session: &Session) -> impl Future<Output = Result<()>> + Send;

    /// Persists a locked session.
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn save_session(&mut self, session: &Session) -> impl Future<Output = Result<()>> + Send;

    /// Participation whose session belongs to the organization and is not deleted.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ParticipationNotFound`] otherwise.
    fn find_participation(
        &mut self,
        organization_id: OrganizationId,
        id: ParticipationId,
    ) -> impl Future<Output = Result<Participation>> + Send;

    /// All participation rows of a session. Call after [`Self::lock_session`].
    ///
    /// # Errors
    ///
    /// Database failures only.
    fn load_roster(
        &mut self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Participation>>> + Send;

    /// Inserts or updates participation rows.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::Conflict`] when the one-active-participation rule
    /// is violated by a concurrent writer.
    fn save_participations(
        &mut self,
        participations: &[Participation],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Commits every write of the transaction.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::Conflict`] on serialization failure.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
