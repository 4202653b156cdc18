use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{CreateTaskRequest, FilterQuery, UpdateTaskRequest},
    repo_types::{Task, TaskFilter},
};
use crate::{
    auth::{dto::MessageResponse, extractors::CurrentUser, ownership::assert_owner},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/filter", get(filter_tasks))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/toggle", put(toggle_task))
}

fn not_found() -> AppError {
    AppError::NotFound("Task not found".into())
}

/// Loads a task and confirms the caller owns it.
async fn load_owned(state: &AppState, id: Uuid, user_id: Uuid) -> AppResult<Task> {
    let task = state.tasks.find_by_id(id).await?.ok_or_else(not_found)?;
    assert_owner(&task, user_id)?;
    Ok(task)
}

async fn save(state: &AppState, task: &Task) -> AppResult<Task> {
    state.tasks.update(task).await?.ok_or_else(not_found)
}

#[instrument(skip(state, user))]
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = state.tasks.list(user.id, &TaskFilter::default()).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, user))]
pub async fn filter_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(query): AppQuery<FilterQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let filter = query.into_filter()?;
    let tasks = state.tasks.list(user.id, &filter).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, user, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = payload
        .into_new_task()?
        .into_task(user.id, OffsetDateTime::now_utc());
    let task = state.tasks.create(task).await?;
    info!(user_id = %user.id, task_id = %task.id, priority = %task.priority, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user))]
pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Task>> {
    Ok(Json(load_owned(&state, id, user.id).await?))
}

#[instrument(skip(state, user, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateTaskRequest>,
) -> AppResult<Json<Task>> {
    let mut task = load_owned(&state, id, user.id).await?;
    payload.apply(&mut task);
    Ok(Json(save(&state, &task).await?))
}

#[instrument(skip(state, user))]
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    load_owned(&state, id, user.id).await?;
    if !state.tasks.delete(id, user.id).await? {
        return Err(not_found());
    }
    info!(user_id = %user.id, task_id = %id, "task deleted");
    Ok(Json(MessageResponse::new("Task removed")))
}

#[instrument(skip(state, user))]
pub async fn toggle_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Task>> {
    let mut task = load_owned(&state, id, user.id).await?;
    task.completed = !task.completed;
    Ok(Json(save(&state, &task).await?))
}
