//! Caller identity taken from headers set by the authenticating proxy.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Requester, Role, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extracts the [`Requester`] of a request.
///
/// A missing role header means a customer.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Requester);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {USER_ID_HEADER} header")))?
            .parse::<UserId>()
            .map_err(|e| ApiError::Unauthenticated(format!("Invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(value) => value
                .parse::<Role>()
                .map_err(|e| ApiError::Unauthenticated(e.to_string()))?,
            None => Role::Customer,
        };

        Ok(Identity(Requester { user_id, role }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::Unauthenticated(format!("Invalid {name} header")))
        })
        .transpose()
}
