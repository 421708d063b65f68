//! Customer directory and profile tabs

use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use super::middleware::AuthenticatedUser;
use super::AppError;
use crate::app::AppState;
use crate::store::content_calendar::ContentPost;
use crate::store::customers::{Customer, CustomerFilter, CustomerUpdate, NewCustomer};
use crate::store::files::{CustomerFile, FileCategory, Upload};
use crate::store::income::{Invoice, InvoiceFilter};
use crate::util::time::today;

pub async fn list_customers(
    State(state): State<AppState>,
    Query(filter): Query<CustomerFilter>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(state.customers.list(&filter).await?))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(new): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let customer = state.customers.create(new).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.customers.require(id).await?))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<CustomerUpdate>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.customers.update(id, update).await?))
}

pub async fn customer_posts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ContentPost>>, AppError> {
    state.customers.require(id).await?;
    Ok(Json(state.content.list_for_customer(id).await?))
}

pub async fn customer_invoices(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    state.customers.require(id).await?;
    state.income.refresh_overdue(today()).await?;

    let filter = InvoiceFilter {
        customer_id: Some(id),
        status: None,
    };
    Ok(Json(state.income.list_invoices(&filter).await?))
}

// ============================================================================
// Files
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    category: Option<FileCategory>,
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<FileQuery>,
) -> Result<Json<Vec<CustomerFile>>, AppError> {
    state.customers.require(id).await?;
    Ok(Json(state.files.list(id, query.category).await?))
}

/// Multipart upload: a `category` text field and a `file` part
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CustomerFile>), AppError> {
    state.customers.require(id).await?;

    let mut category: Option<FileCategory> = None;
    let mut file: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("category") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                category = Some(raw.parse::<FileCategory>()?);
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("file").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                file = Some((name, content_type, data));
            }
            _ => {}
        }
    }

    let category =
        category.ok_or_else(|| AppError::BadRequest("category field is required".to_string()))?;
    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::BadRequest("file field is required".to_string()))?;

    let saved = state
        .files
        .save(Upload {
            customer_id: id,
            category,
            file_name,
            content_type,
            data,
            uploaded_by: Some(auth.user_id),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(saved)))
}
