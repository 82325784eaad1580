//! Custom Axum extractors.
//!
//! Authentication happens upstream. The gateway in front of this service
//! forwards the authenticated user and the organization the request is
//! scoped to as headers; [`CallerIdentity`] turns them into a [`Caller`].
//!
//! | Header                | Required | Meaning                                  |
//! |-----------------------|----------|------------------------------------------|
//! | `X-User-Id`           | yes      | Authenticated user (UUID)                |
//! | `X-Organization-Id`   | yes      | Organization scope (UUID)                |
//! | `X-Organization-Role` | no       | `owner`, `admin` or `member`; absent for non-members |

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use huddle_core::types::{Caller, OrganizationId, Role, UserId};
use uuid::Uuid;

/// Header carrying the authenticated user.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying the organization scope.
pub const ORGANIZATION_ID_HEADER: &str = "X-Organization-Id";
/// Header carrying the caller's role in that organization.
pub const ORGANIZATION_ROLE_HEADER: &str = "X-Organization-Role";

/// The organization-scoped caller of a request.
///
/// # Example
///
/// ```ignore
/// async fn handler(CallerIdentity(caller): CallerIdentity) -> String {
///     format!("{} in {}", caller.user_id, caller.organization_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Self)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let user_id = UserId::from_uuid(required_uuid(headers, USER_ID_HEADER)?);
    let organization_id = OrganizationId::from_uuid(required_uuid(headers, ORGANIZATION_ID_HEADER)?);

    let Some(role) = header_str(headers, ORGANIZATION_ROLE_HEADER)? else {
        return Ok(Caller::guest(user_id, organization_id));
    };
    let role: Role = role
        .parse()
        .map_err(|_| AppError::bad_request(format!("{ORGANIZATION_ROLE_HEADER} is not a known role")))?;

    Ok(Caller::member(user_id, organization_id, role))
}

fn required_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, AppError> {
    let value = header_str(headers, name)?
        .ok_or_else(|| AppError::unauthorized(format!("missing {name} header")))?;
    Uuid::parse_str(value).map_err(|_| AppError::bad_request(format!("{name} is not a valid UUID")))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| AppError::bad_request(format!("{name} is not valid text")))
        })
        .transpose()
}
