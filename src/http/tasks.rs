//! Team tasks (kanban) and dashboard

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::middleware::AuthenticatedUser;
use super::AppError;
use crate::app::AppState;
use crate::store::tasks::{NewTask, Task, TaskDashboard, TaskFilter, TaskUpdate};
use crate::util::time::today;

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(state.tasks.list(&filter).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(new): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state.tasks.create(new, Some(auth.user_id)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.tasks.update(id, update).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    assignee_id: Option<Uuid>,
    /// Shortcut for the caller's own tasks
    #[serde(default)]
    mine: bool,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<TaskDashboard>, AppError> {
    let assignee = if query.mine {
        Some(auth.user_id)
    } else {
        query.assignee_id
    };
    Ok(Json(state.tasks.dashboard(assignee, today()).await?))
}
