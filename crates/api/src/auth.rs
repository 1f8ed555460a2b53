//! Identity forwarded by the upstream authentication layer.
//!
//! Handlers declare what they need by extractor: [`CurrentUser`] for any
//! signed-in caller, [`AdminUser`] for admins, [`CartIdentity`] for a user or
//! an anonymous session.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use common::UserId;
use domain::CartOwner;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

/// A signed-in caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

/// A signed-in admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub UserId);

/// The owner of the cart a request works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartIdentity(pub CartOwner);

/// The anonymous session id, when one was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub Option<String>);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn user_from_parts(parts: &Parts) -> Result<Option<CurrentUser>, ApiError> {
    let Some(raw) = header(parts, USER_ID_HEADER) else {
        return Ok(None);
    };
    let id = raw
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized(format!("Invalid {USER_ID_HEADER} header")))?;
    let role = match header(parts, USER_ROLE_HEADER) {
        Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
        _ => Role::Customer,
    };
    Ok(Some(CurrentUser { id, role }))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_parts(parts)?
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}

/// Identity is optional on public endpoints, but a malformed one is still
/// rejected.
impl<S: Send + Sync> OptionalFromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        user_from_parts(parts)
    }
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = <CurrentUser as FromRequestParts<S>>::from_request_parts(parts, state).await?;
        match user.role {
            Role::Admin => Ok(AdminUser(user.id)),
            Role::Customer => Err(ApiError::Forbidden("Admin access required".to_string())),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionId(header(parts, SESSION_ID_HEADER).map(str::to_string)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CartIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = user_from_parts(parts)? {
            return Ok(CartIdentity(CartOwner::User(user.id)));
        }
        header(parts, SESSION_ID_HEADER)
            .map(|session| CartIdentity(CartOwner::Session(session.to_string())))
            .ok_or_else(|| {
                ApiError::Unauthorized(format!(
                    "Either {USER_ID_HEADER} or {SESSION_ID_HEADER} is required"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let mut parts = parts(&[]);
        let err = <CurrentUser as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let optional =
            <CurrentUser as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &())
                .await
                .unwrap();
        assert!(optional.is_none());
    }

    #[tokio::test]
    async fn customer_is_not_admin() {
        let id = UserId::new().to_string();
        let mut parts = parts(&[(USER_ID_HEADER, &id), (USER_ROLE_HEADER, "customer")]);
        let err = AdminUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_role_is_case_insensitive() {
        let id = UserId::new();
        let raw = id.to_string();
        let mut parts = parts(&[(USER_ID_HEADER, &raw), (USER_ROLE_HEADER, "Admin")]);
        let admin = AdminUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(admin, AdminUser(id));
    }

    #[tokio::test]
    async fn cart_prefers_user_over_session() {
        let id = UserId::new();
        let raw = id.to_string();
        let mut both = parts(&[(USER_ID_HEADER, &raw), (SESSION_ID_HEADER, "sess-1")]);
        let identity = CartIdentity::from_request_parts(&mut both, &()).await.unwrap();
        assert_eq!(identity, CartIdentity(CartOwner::User(id)));

        let mut session = parts(&[(SESSION_ID_HEADER, "sess-1")]);
        let identity = CartIdentity::from_request_parts(&mut session, &()).await.unwrap();
        assert_eq!(identity, CartIdentity(CartOwner::Session("sess-1".into())));
    }

    #[tokio::test]
    async fn malformed_user_id_is_unauthorized() {
        let mut parts = parts(&[(USER_ID_HEADER, "not-a-uuid")]);
        let err = CartIdentity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
