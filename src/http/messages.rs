//! Message hub

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::middleware::AuthenticatedUser;
use super::AppError;
use crate::app::AppState;
use crate::store::messages::{Message, MessageQuery, NewMessage};

/// Poll: pass the newest `created_at` seen as `since`
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.messages.list(auth.user_id, &query).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(new): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    if let Some(recipient) = new.recipient_id {
        state
            .users
            .get(recipient)
            .await?
            .ok_or_else(|| AppError::BadRequest("recipient does not exist".to_string()))?;
    }
    let message = state.messages.send(auth.user_id, new).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    Ok(Json(state.messages.mark_read(auth.user_id, id).await?))
}

#[derive(Serialize)]
pub struct UnreadCount {
    count: i64,
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<UnreadCount>, AppError> {
    let count = state.messages.unread_count(auth.user_id).await?;
    Ok(Json(UnreadCount { count }))
}
