//! Phone inventory and IMEI assignment

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppError;
use crate::app::AppState;
use crate::store::inventory::{
    ImeiCheck, InventoryItem, InventoryUpdate, ItemStatus, NewInventoryItem,
};

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    status: Option<ItemStatus>,
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<Vec<InventoryItem>>, AppError> {
    Ok(Json(state.inventory.list(query.status).await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(new): Json<NewInventoryItem>,
) -> Result<(StatusCode, Json<InventoryItem>), AppError> {
    let item = state.inventory.create(new).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<InventoryUpdate>,
) -> Result<Json<InventoryItem>, AppError> {
    Ok(Json(state.inventory.update(id, update).await?))
}

#[derive(Debug, Deserialize)]
pub struct ImeiRequest {
    imei: String,
}

/// Always 200; the body says whether the IMEI is usable
pub async fn validate_imei(
    State(state): State<AppState>,
    Json(req): Json<ImeiRequest>,
) -> Result<Json<ImeiCheck>, AppError> {
    Ok(Json(state.inventory.check_imei(&req.imei).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    customer_id: Uuid,
}

pub async fn assign_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<InventoryItem>, AppError> {
    state.customers.require(req.customer_id).await?;
    Ok(Json(state.inventory.assign(id, req.customer_id).await?))
}

pub async fn release_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InventoryItem>, AppError> {
    Ok(Json(state.inventory.release(id).await?))
}
