//! Content and task approvals

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
use crate::store::approvals::{Approval, Decision, NewApproval};

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    customer_id: Option<Uuid>,
}

pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<Approval>>, AppError> {
    Ok(Json(state.approvals.list_pending(query.customer_id).await?))
}

pub async fn request_approval(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(new): Json<NewApproval>,
) -> Result<(StatusCode, Json<Approval>), AppError> {
    let approval = state.approvals.request(new, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(approval)))
}

pub async fn decide(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(decision): Json<Decision>,
) -> Result<Json<Approval>, AppError> {
    Ok(Json(state.approvals.decide(id, decision, auth.user_id).await?))
}
