//! Caller identity forwarded by the gateway.
//!
//! Authentication happens upstream. The gateway forwards the user id in
//! `X-User-Id` and a comma separated role list in `X-User-Roles`; roles may
//! carry a `ROLE_` prefix. Service-to-service calls send only
//! `X-User-Roles: INTERNAL`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const ROLES_HEADER: &str = "X-User-Roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Internal,
}

impl Role {
    /// Parses `USER`, `ROLE_USER`, `admin`, ...; unknown roles are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.trim();
        let name = name.strip_prefix("ROLE_").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            "INTERNAL" => Some(Role::Internal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Internal => "INTERNAL",
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: Option<UserId>,
    roles: Vec<Role>,
}

impl Caller {
    /// Reads the identity headers. Fails with 401 when neither is present
    /// or the user id is malformed.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = match header(headers, USER_ID_HEADER) {
            Some(raw) => Some(raw.parse::<UserId>().map_err(|_| {
                ApiError::Unauthorized(format!("Malformed {USER_ID_HEADER} header"))
            })?),
            None => None,
        };
        let roles: Vec<Role> = header(headers, ROLES_HEADER)
            .map(|raw| raw.split(',').filter_map(Role::parse).collect())
            .unwrap_or_default();

        if user_id.is_none() && roles.is_empty() {
            return Err(ApiError::Unauthorized(
                "Authentication required".to_string(),
            ));
        }
        Ok(Self { user_id, roles })
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Fails with 403 unless the caller holds one of `roles`.
    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.iter().any(|role| self.has_role(*role)) {
            return Ok(());
        }
        let wanted: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(ApiError::Forbidden(format!(
            "Requires one of the roles: {}",
            wanted.join(", ")
        )))
    }

    /// The caller's user id. Fails with 401 for callers without one.
    pub fn user_id(&self) -> Result<UserId, ApiError> {
        self.user_id
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse(" ROLE_ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("internal"), Some(Role::Internal));
        assert_eq!(Role::parse("ROLE_GUEST"), None);
    }

    #[test]
    fn test_user_with_roles() {
        let caller = Caller::from_headers(&headers(&[
            ("x-user-id", "42"),
            ("x-user-roles", "ROLE_USER,ROLE_ADMIN"),
        ]))
        .unwrap();

        assert_eq!(caller.user_id().unwrap(), UserId::new(42));
        assert!(caller.has_role(Role::User));
        assert!(caller.has_role(Role::Admin));
        assert!(caller.require_any(&[Role::Admin]).is_ok());
        assert!(matches!(
            caller.require_any(&[Role::Internal]),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_internal_caller_has_no_user_id() {
        let caller = Caller::from_headers(&headers(&[("x-user-roles", "INTERNAL")])).unwrap();
        assert!(caller.require_any(&[Role::Internal]).is_ok());
        assert!(matches!(caller.user_id(), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_missing_identity_is_unauthorized() {
        assert!(matches!(
            Caller::from_headers(&HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            Caller::from_headers(&headers(&[("x-user-id", "not-a-number")])),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
