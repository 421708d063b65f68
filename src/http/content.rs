//! Content calendar (escaleta)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::AppError;
use crate::app::AppState;
use crate::rules::{Platform, PostFormat};
use crate::store::content_calendar::{ContentPost, NewPost, PostFilter, PostUpdate};

pub async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> Result<Json<Vec<ContentPost>>, AppError> {
    Ok(Json(state.content.list(&filter).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(new): Json<NewPost>,
) -> Result<(StatusCode, Json<ContentPost>), AppError> {
    let post = state.content.create(new).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<PostUpdate>,
) -> Result<Json<ContentPost>, AppError> {
    Ok(Json(state.content.update(id, update).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.content.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct PlatformFormats {
    platform: Platform,
    formats: &'static [PostFormat],
}

/// Which formats the calendar offers per platform
pub async fn platform_formats() -> Json<Vec<PlatformFormats>> {
    Json(
        Platform::ALL
            .iter()
            .map(|&platform| PlatformFormats {
                platform,
                formats: platform.allowed_formats(),
            })
            .collect(),
    )
}
