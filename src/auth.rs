//! Identity extraction for requests proxied through the upstream SSO layer.
//!
//! The storefront sits behind an identity-aware proxy that authenticates the
//! session and injects `x-user-id` and `x-user-role` headers. The core trusts
//! these headers and does not re-authenticate.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, as asserted by the upstream identity provider.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
}

fn identity_from_parts(parts: &Parts) -> Result<AuthenticatedUser, ServiceError> {
    let user_id = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing identity header".to_string()))?;
    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| ServiceError::Unauthorized("malformed user id".to_string()))?;

    let role = parts
        .headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .ok_or_else(|| ServiceError::Unauthorized("missing or unknown role".to_string()))?;

    Ok(AuthenticatedUser { user_id, role })
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts)
    }
}

/// Extractor that additionally requires the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = identity_from_parts(parts)?;
        if user.role != Role::Admin {
            return Err(ServiceError::Forbidden(
                "admin role required".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}
