//! `PostgreSQL` store for the huddle session engine.
//!
//! [`PostgresStore`] implements [`TransactionalStore`] on a sqlx connection
//! pool. Each [`PgTransaction`] wraps one database transaction at the default
//! `READ COMMITTED` isolation level; admissions serialize on an explicit
//! `SELECT ... FOR UPDATE` lock of the session row, and the partial unique
//! index on active participations backs the one-active-participation rule.
//!
//! # Example
//!
//! ```no_run
//! use huddle_core::service::ParticipationService;
//! use huddle_core::environment::SystemClock;
//! use huddle_postgres::PostgresStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::connect("postgres://localhost/huddle", 10).await?;
//! store.migrate().await?;
//! let service = ParticipationService::new(Arc::new(store), Arc::new(SystemClock));
//! # Ok(())
//! # }
//! ```

mod rows;

use huddle_core::error::{EngineError, Result};
use huddle_core::store::{StoreTransaction, TransactionalStore};
use huddle_core::types::{
    Activity, ActivityId, ActivityMembership, Organization, OrganizationId,
    OrganizationMembership, Participation, ParticipationId, Role, Session, SessionId, UserId,
    UserIdentifier, UserProfile,
};
use rows::{PARTICIPATION_COLUMNS, SESSION_COLUMNS, to_db_count};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Postgres;
use uuid::Uuid;

/// Maps a sqlx error onto the engine taxonomy.
///
/// Serialization failures, deadlocks and unique violations (the active
/// participation index) are reported as [`EngineError::Conflict`] so callers
/// can retry.
pub(crate) fn db_error(error: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db) = &error {
        let code = db.code();
        if matches!(code.as_deref(), Some("40001" | "40P01")) || db.is_unique_violation() {
            tracing::debug!(code = ?code, "Database conflict");
            return EngineError::Conflict;
        }
    }
    EngineError::Database(error.to_string())
}

/// `TransactionalStore` backed by a `PostgreSQL` pool
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

impl TransactionalStore for PostgresStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(PgTransaction { tx })
    }
}

/// One database transaction; rolled back when dropped uncommitted
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    async fn fetch_session(
        &mut self,
        organization_id: OrganizationId,
        id: SessionId,
        lock: bool,
    ) -> Result<Session> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(organization_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
            .ok_or(EngineError::SessionNotFound)?;
        rows::session(&row)
    }

    async fn write_session(&mut self, session: &Session, insert: bool) -> Result<()> {
        let sql = if insert {
            "INSERT INTO sessions (id, organization_id, activity_id, title, description, location, \
             date_time, join_mode, max_capacity, max_waitlist, status, join_form, created_at, \
             updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        } else {
            "UPDATE sessions SET organization_id = $2, activity_id = $3, title = $4, \
             description = $5, location = $6, date_time = $7, join_mode = $8, \
             max_capacity = $9, max_waitlist = $10, status = $11, join_form = $12, \
             created_at = $13, updated_at = $14, deleted_at = $15 \
             WHERE id = $1"
        };
        let result = sqlx::query(sql)
            .bind(session.id.as_uuid())
            .bind(session.organization_id.as_uuid())
            .bind(session.activity_id.as_uuid())
            .bind(&session.title)
            .bind(&session.description)
            .bind(&session.location)
            .bind(session.date_time)
            .bind(session.join_mode.as_str())
            .bind(to_db_count(session.max_capacity, "max_capacity")?)
            .bind(to_db_count(session.max_waitlist, "max_waitlist")?)
            .bind(session.status.as_str())
            .bind(Json(&session.join_form))
            .bind(session.created_at)
            .bind(session.updated_at)
            .bind(session.deleted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(EngineError::SessionNotFound);
        }
        Ok(())
    }
}

impl StoreTransaction for PgTransaction {
    async fn organization(&mut self, id: OrganizationId) -> Result<Organization> {
        let row = sqlx::query("SELECT id, name, default_join_mode FROM organizations WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
            .ok_or(EngineError::OrganizationNotFound)?;
        rows::organization(&row)
    }

    async fn organization_membership(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<OrganizationMembership>> {
        sqlx::query(
            r"
            SELECT organization_id, user_id, role
            FROM organization_memberships
            WHERE organization_id = $1 AND user_id = $2
            ",
        )
        .bind(organization_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(rows::organization_membership)
        .transpose()
    }

    async fn redeem_invite(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
        token: &str,
    ) -> Result<bool> {
        let redeemed = sqlx::query(
            r"
            UPDATE organization_invites
            SET uses = uses + 1
            WHERE token = $1
              AND organization_id = $2
              AND (expires_at IS NULL OR expires_at > now())
              AND (max_uses IS NULL OR uses < max_uses)
            ",
        )
        .bind(token)
        .bind(organization_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?
        .rows_affected()
            == 1;

        if !redeemed {
            tracing::debug!(%organization_id, "Invite token rejected");
            return Ok(false);
        }

        sqlx::query(
            r"
            INSERT INTO organization_memberships (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, user_id) DO NOTHING
            ",
        )
        .bind(organization_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(Role::Member.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        tracing::debug!(%organization_id, %user_id, "Invite redeemed");
        Ok(true)
    }

    async fn find_user(&mut self, identifier: &UserIdentifier) -> Result<UserProfile> {
        let query = match identifier {
            UserIdentifier::Id(id) => {
                sqlx::query("SELECT id, display_name, email, phone FROM users WHERE id = $1")
                    .bind(*id.as_uuid())
            }
            UserIdentifier::Email(email) => sqlx::query(
                "SELECT id, display_name, email, phone FROM users WHERE lower(email) = lower($1)",
            )
            .bind(email.trim().to_string()),
        };
        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
            .ok_or(EngineError::UserNotFound)?;
        rows::user_profile(&row)
    }

    async fn user_profiles(&mut self, user_ids: &[UserId]) -> Result<Vec<UserProfile>> {
        let ids: Vec<Uuid> = user_ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query("SELECT id, display_name, email, phone FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)?
            .iter()
            .map(rows::user_profile)
            .collect()
    }

    async fn activity(
        &mut self,
        organization_id: OrganizationId,
        id: ActivityId,
    ) -> Result<Activity> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, join_mode FROM activities \
             WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or(EngineError::ActivityNotFound)?;
        rows::activity(&row)
    }

    async fn activity_membership(
        &mut self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<Option<ActivityMembership>> {
        sqlx::query(
            r"
            SELECT activity_id, user_id, status, created_at, updated_at
            FROM activity_memberships
            WHERE activity_id = $1 AND user_id = $2
            ",
        )
        .bind(activity_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(rows::activity_membership)
        .transpose()
    }

    async fn save_activity_membership(&mut self, membership: &ActivityMembership) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO activity_memberships (activity_id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (activity_id, user_id)
            DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(membership.activity_id.as_uuid())
        .bind(membership.user_id.as_uuid())
        .bind(membership.status.as_str())
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn session(&mut self, organization_id: OrganizationId, id: SessionId) -> Result<Session> {
        self.fetch_session(organization_id, id, false).await
    }

    async fn lock_session(
        &mut self,
        organization_id: OrganizationId,
        id: SessionId,
    ) -> Result<Session> {
        self.fetch_session(organization_id, id, true).await
    }

    async fn insert_session(&mut self, session: &Session) -> Result<()> {
        self.write_session(session, true).await
    }

    async fn save_session(&mut self, session: &Session) -> Result<()> {
        self.write_session(session, false).await
    }

    async fn find_participation(
        &mut self,
        organization_id: OrganizationId,
        id: ParticipationId,
    ) -> Result<Participation> {
        let sql = format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM participations p \
             JOIN sessions s ON s.id = p.session_id \
             WHERE p.id = $1 AND s.organization_id = $2 AND s.deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(organization_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
            .ok_or(EngineError::ParticipationNotFound)?;
        rows::participation(&row)
    }

    async fn load_roster(&mut self, session_id: SessionId) -> Result<Vec<Participation>> {
        let sql = format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM participations p \
             WHERE p.session_id = $1 ORDER BY p.created_at, p.id"
        );
        sqlx::query(&sql)
            .bind(session_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)?
            .iter()
            .map(rows::participation)
            .collect()
    }

    async fn save_participations(&mut self, participations: &[Participation]) -> Result<()> {
        for p in participations {
            sqlx::query(
                r"
                INSERT INTO participations (
                    id, session_id, user_id, status, attendance, payment, joined_at,
                    form_answers, attribute_overrides, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO UPDATE SET
                    session_id = EXCLUDED.session_id,
                    status = EXCLUDED.status,
                    attendance = EXCLUDED.attendance,
                    payment = EXCLUDED.payment,
                    joined_at = EXCLUDED.joined_at,
                    form_answers = EXCLUDED.form_answers,
                    attribute_overrides = EXCLUDED.attribute_overrides,
                    updated_at = EXCLUDED.updated_at
                ",
            )
            .bind(p.id.as_uuid())
            .bind(p.session_id.as_uuid())
            .bind(p.user_id.as_uuid())
            .bind(p.status.as_str())
            .bind(p.attendance.as_str())
            .bind(p.payment.as_str())
            .bind(p.joined_at)
            .bind(p.form_answers.as_ref().map(Json))
            .bind(p.attribute_overrides.as_ref().map(Json))
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        }
        metrics::counter!("huddle_participation_writes_total").increment(participations.len() as u64);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_internal() {
        let error = db_error(sqlx::Error::RowNotFound);
        assert!(matches!(error, EngineError::Database(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_oversized_limit_is_rejected() {
        assert_eq!(to_db_count(7, "max_capacity"), Ok(7));
        assert!(matches!(
            to_db_count(u32::MAX, "max_capacity"),
            Err(EngineError::InvalidField { field: "max_capacity", .. })
        ));
    }
}
