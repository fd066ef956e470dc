//! Request extractors for authenticated routes.
//!
//! Handlers take [`AuthenticatedUser`] or [`AdminUser`] as an argument. Both
//! reject before the handler body runs, so no database work happens for an
//! anonymous or under-privileged caller.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::enums::UserRole;
use crate::core::shared::state::AppState;
use crate::security::jwt::{extract_bearer_token, Claims};

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owner or admin. Rows whose owner was deleted are admin-only.
    pub fn can_access(&self, owner_id: impl Into<Option<Uuid>>) -> bool {
        owner_id.into() == Some(self.user_id) || self.is_admin()
    }

    fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".into()))?;
        Ok(Self {
            user_id,
            email: claims.email.clone().unwrap_or_default(),
            name: claims.name.clone().unwrap_or_default(),
            role: claims.role.unwrap_or_default(),
            claims,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Missing authentication token".into()))?;

        let claims = state.jwt.validate_access_token(token).await.map_err(|e| {
            debug!("Rejected bearer token: {e}");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;

        Self::from_claims(claims)
    }
}

/// Authenticated user that also carries the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin role required".into()));
        }
        Ok(Self(user))
    }
}

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
