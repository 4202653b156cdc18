use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use time::OffsetDateTime;
use tracing::{error, info};

use super::claims::TokenKind;
use super::repo_types::User;
use crate::{error::AppError, state::AppState};

/// Same body for every gate rejection, whichever check failed.
const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Authenticated caller, resolved from a verified session token to a stored user.
pub struct CurrentUser(pub User);

/// Caller identity on routes that also serve anonymous requests. A missing, invalid
/// or expired token reads as anonymous.
pub struct OptionalUser(pub Option<User>);

/// Bearer token from `Authorization`, falling back to the session cookie.
pub(crate) fn token_from_parts<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value)
}

async fn resolve_user(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state
        .keys
        .verify_kind(token, TokenKind::Session, OffsetDateTime::now_utc())
        .map_err(|e| {
            info!(error = %e, "session token rejected");
            AppError::Unauthenticated(NOT_AUTHENTICATED.into())
        })?;

    match state.users.find_by_id(claims.sub).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            info!(user_id = %claims.sub, "token for unknown user");
            Err(AppError::Unauthenticated(NOT_AUTHENTICATED.into()))
        }
        Err(e) => {
            error!(error = %e, user_id = %claims.sub, "user lookup failed");
            Err(AppError::Internal(e))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts, &state.config.auth.cookie_name)
            .ok_or_else(|| AppError::Unauthenticated(NOT_AUTHENTICATED.into()))?;
        resolve_user(state, token).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = token_from_parts(parts, &state.config.auth.cookie_name) else {
            return Ok(OptionalUser(None));
        };
        Ok(OptionalUser(resolve_user(state, token).await.ok()))
    }
}
