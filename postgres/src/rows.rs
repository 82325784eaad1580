//! Column lists and row decoding.

use crate::db_error;
use huddle_core::error::{EngineError, Result};
use huddle_core::forms::{AttributeOverrides, FormAnswers, FormField};
use huddle_core::types::{
    Activity, ActivityId, ActivityMembership, Organization, OrganizationId,
    OrganizationMembership, Participation, ParticipationId, Session, SessionId, UserId,
    UserProfile,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use std::str::FromStr;

pub(crate) const SESSION_COLUMNS: &str = "id, organization_id, activity_id, title, description, \
     location, date_time, join_mode, max_capacity, max_waitlist, status, join_form, \
     created_at, updated_at, deleted_at";

pub(crate) const PARTICIPATION_COLUMNS: &str = "p.id, p.session_id, p.user_id, p.status, \
     p.attendance, p.payment, p.joined_at, p.form_answers, p.attribute_overrides, \
     p.created_at, p.updated_at";

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(db_error)
}

fn parse<T: FromStr<Err = EngineError>>(row: &PgRow, column: &str) -> Result<T> {
    get::<&str>(row, column)?.parse()
}

fn count(row: &PgRow, column: &'static str) -> Result<u32> {
    let value: i32 = get(row, column)?;
    u32::try_from(value).map_err(|_| EngineError::Database(format!("negative {column}: {value}")))
}

/// `u32` limit as an `INTEGER` bind parameter.
pub(crate) fn to_db_count(value: u32, field: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| EngineError::InvalidField {
        field,
        reason: format!("{value} is too large"),
    })
}

pub(crate) fn organization(row: &PgRow) -> Result<Organization> {
    Ok(Organization {
        id: OrganizationId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        default_join_mode: parse(row, "default_join_mode")?,
    })
}

pub(crate) fn organization_membership(row: &PgRow) -> Result<OrganizationMembership> {
    Ok(OrganizationMembership {
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        role: parse(row, "role")?,
    })
}

pub(crate) fn user_profile(row: &PgRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: UserId::from_uuid(get(row, "id")?),
        display_name: get(row, "display_name")?,
        email: get(row, "email")?,
        phone: get(row, "phone")?,
    })
}

pub(crate) fn activity(row: &PgRow) -> Result<Activity> {
    Ok(Activity {
        id: ActivityId::from_uuid(get(row, "id")?),
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        name: get(row, "name")?,
        join_mode: parse(row, "join_mode")?,
    })
}

pub(crate) fn activity_membership(row: &PgRow) -> Result<ActivityMembership> {
    Ok(ActivityMembership {
        activity_id: ActivityId::from_uuid(get(row, "activity_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        status: parse(row, "status")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn session(row: &PgRow) -> Result<Session> {
    let Json(join_form): Json<Vec<FormField>> = get(row, "join_form")?;
    Ok(Session {
        id: SessionId::from_uuid(get(row, "id")?),
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        activity_id: ActivityId::from_uuid(get(row, "activity_id")?),
        title: get(row, "title")?,
        description: get(row, "description")?,
        location: get(row, "location")?,
        date_time: get(row, "date_time")?,
        join_mode: parse(row, "join_mode")?,
        max_capacity: count(row, "max_capacity")?,
        max_waitlist: count(row, "max_waitlist")?,
        status: parse(row, "status")?,
        join_form,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        deleted_at: get(row, "deleted_at")?,
    })
}

pub(crate) fn participation(row: &PgRow) -> Result<Participation> {
    let form_answers: Option<Json<FormAnswers>> = get(row, "form_answers")?;
    let attribute_overrides: Option<Json<AttributeOverrides>> = get(row, "attribute_overrides")?;
    Ok(Participation {
        id: ParticipationId::from_uuid(get(row, "id")?),
        session_id: SessionId::from_uuid(get(row, "session_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        status: parse(row, "status")?,
        attendance: parse(row, "attendance")?,
        payment: parse(row, "payment")?,
        joined_at: get(row, "joined_at")?,
        form_answers: form_answers.map(|Json(answers)| answers),
        attribute_overrides: attribute_overrides.map(|Json(overrides)| overrides),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}
