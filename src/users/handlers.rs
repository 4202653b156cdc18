use axum::{extract::State, routing::put, Json, Router};
use tracing::{info, instrument};

use super::dto::UpdateProfileRequest;
use crate::{
    auth::{
        extractors::CurrentUser,
        repo_types::PublicUser,
        services::{normalize_email, validate_email},
    },
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/profile", put(update_profile))
}

#[instrument(skip(state, user, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    let name = payload.name().unwrap_or(&user.name).to_string();
    let email = match payload.email() {
        Some(raw) => {
            let email = normalize_email(raw);
            validate_email(&email)?;
            email
        }
        None => user.email.clone(),
    };

    let updated = state
        .users
        .update_profile(user.id, &name, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(PublicUser::from(updated)))
}
