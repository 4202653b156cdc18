use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::{
    claims::TokenKind,
    jwt::JwtKeys,
    password::{
        hash_password_blocking, validate_password, verify_dummy, verify_password_blocking,
    },
    repo_types::{NewUser, PublicUser, User},
};
use crate::{
    db::StoreError,
    error::{AppError, AppResult},
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// A freshly issued session for `user`.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    if !is_valid_email(email) {
        return Err(AppError::Validation("Please enter a valid email".into()));
    }
    Ok(())
}

fn start_session(keys: &JwtKeys, user: User) -> AppResult<Session> {
    let token = keys.issue(user.id, TokenKind::Session)?;
    Ok(Session {
        token,
        user: user.into(),
    })
}

pub async fn register(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> AppResult<Session> {
    let name = name.trim();
    let email = normalize_email(email);

    if name.is_empty() {
        return Err(AppError::Validation("Please add a name".into()));
    }
    validate_email(&email)?;
    validate_password(password)?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password_blocking(password.to_string()).await?;
    let user = state
        .users
        .create(NewUser {
            name: name.to_string(),
            email,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            StoreError::DuplicateEmail => AppError::Conflict("User already exists".into()),
            other => other.into(),
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    start_session(&state.keys, user)
}

pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<Session> {
    let email = normalize_email(email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        verify_dummy(password.to_string()).await;
        warn!(email = %email, "login unknown email");
        return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
    };

    let ok = verify_password_blocking(password.to_string(), user.password_hash.clone())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "verify_password failed");
            AppError::Internal(e)
        })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
    }

    info!(user_id = %user.id, "user logged in");
    start_session(&state.keys, user)
}

/// Issues a reset token, records it on the user and hands it to the notifier.
/// The token is returned so a demo deployment can echo it; production keeps it
/// out of the response.
pub async fn forgot_password(state: &AppState, email: &str) -> AppResult<String> {
    let email = normalize_email(email);
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("No user with that email".into()))?;

    let keys = &state.keys;
    let now = OffsetDateTime::now_utc();
    let token = keys.issue_at(user.id, TokenKind::Reset, now)?;
    let expiry = keys.expiry_from(TokenKind::Reset, now);

    if !state.users.set_reset_token(user.id, &token, expiry).await? {
        return Err(AppError::NotFound("No user with that email".into()));
    }
    state.notifier.send_reset(&user, &token).await?;

    info!(user_id = %user.id, expires_at = %expiry, "password reset requested");
    Ok(token)
}

/// Consumes a reset token exactly once and logs the user in with a fresh session.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> AppResult<Session> {
    validate_password(new_password)?;

    let keys = &state.keys;
    let now = OffsetDateTime::now_utc();
    let claims = keys
        .verify_kind(token, TokenKind::Reset, now)
        .map_err(|e| {
            info!(error = %e, "reset token rejected");
            AppError::InvalidOrExpiredToken
        })?;

    // The stored copy carries its own expiry; both it and the embedded one must hold.
    if state
        .users
        .find_by_reset_token(claims.sub, token, now)
        .await?
        .is_none()
    {
        info!(user_id = %claims.sub, "reset token not pending for user");
        return Err(AppError::InvalidOrExpiredToken);
    }

    let password_hash = hash_password_blocking(new_password.to_string()).await?;
    let user = state
        .users
        .complete_reset(claims.sub, token, &password_hash, now)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    info!(user_id = %user.id, "password reset completed");
    start_session(keys, user)
}

pub async fn change_password(
    state: &AppState,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> AppResult<()> {
    let ok = verify_password_blocking(current_password.to_string(), user.password_hash.clone())
        .await?;
    if !ok {
        warn!(user_id = %user.id, "change password with wrong current password");
        return Err(AppError::Unauthenticated(
            "Current password is incorrect".into(),
        ));
    }
    validate_password(new_password)?;

    let password_hash = hash_password_blocking(new_password.to_string()).await?;
    if !state.users.set_password(user.id, &password_hash).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %user.id, "password changed");
    Ok(())
}
