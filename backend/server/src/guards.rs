//! Request guards. Each one is an extractor that rejects the request before the
//! handler runs.
//!
//! | guard         | needs                                |
//! |---------------|--------------------------------------|
//! | `CurrentUser` | valid, unrevoked access token        |
//! | `ActiveUser`  | the above and the account not disabled |
//! | `Moderator`   | active, role moderator or admin      |
//! | `Admin`       | active, role admin                   |
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    auth::{Claims, TokenKind},
    database::users,
    error::AppError,
    models::User,
    state::State,
    utils::bearer_token,
};

pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
}

impl FromRequestParts<Arc<State>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers).ok_or(AppError::Unauthorized("Not authenticated"))?;
        let claims = state.tokens.verify(token, TokenKind::Access)?;

        if state.sessions.is_revoked(&claims.jti).await? {
            return Err(AppError::Unauthorized("Token has been revoked"));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Could not validate credentials"))?;
        let user = state
            .database
            .read(|connection| users::find_by_id(connection, user_id))?
            .ok_or(AppError::NotFound("User"))?;

        Ok(CurrentUser { user, claims })
    }
}

pub struct ActiveUser(pub User);

impl FromRequestParts<Arc<State>> for ActiveUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, .. } = CurrentUser::from_request_parts(parts, state).await?;

        if user.disabled {
            return Err(AppError::Forbidden("Inactive user"));
        }

        Ok(ActiveUser(user))
    }
}

pub struct Moderator(pub User);

impl FromRequestParts<Arc<State>> for Moderator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let ActiveUser(user) = ActiveUser::from_request_parts(parts, state).await?;

        if !user.is_staff() {
            return Err(AppError::Forbidden("Moderator or admin role required"));
        }

        Ok(Moderator(user))
    }
}

pub struct Admin(pub User);

impl FromRequestParts<Arc<State>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let ActiveUser(user) = ActiveUser::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin role required"));
        }

        Ok(Admin(user))
    }
}
