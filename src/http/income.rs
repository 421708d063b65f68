//! Subscriptions, invoices, payment reminders and the income report

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::middleware::AuthenticatedUser;
use super::AppError;
use crate::app::AppState;
use crate::rules::reminder::{payment_reminder, ReminderDetails};
use crate::store::income::{
    GenerationSummary, IncomeReport, Invoice, InvoiceFilter, InvoiceStatus, NewInvoice,
    NewSubscription, Subscription, SubscriptionUpdate,
};
use crate::store::messages::Message;
use crate::store::StoreError;
use crate::util::time::today;
use crate::whatsapp::WhatsAppError;

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    customer_id: Option<Uuid>,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    Ok(Json(state.income.list_subscriptions(query.customer_id).await?))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(new): Json<NewSubscription>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    state.customers.require(new.customer_id).await?;
    let sub = state.income.create_subscription(new).await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<Subscription>, AppError> {
    Ok(Json(state.income.update_subscription(id, update).await?))
}

// ============================================================================
// Invoices
// ============================================================================

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    state.income.refresh_overdue(today()).await?;
    Ok(Json(state.income.list_invoices(&filter).await?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(new): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    state.customers.require(new.customer_id).await?;
    let invoice = state.income.create_invoice(new).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// `YYYY-MM`; the current month when absent
    #[serde(default)]
    period: Option<String>,
}

pub async fn generate_invoices(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationSummary>, AppError> {
    let period = req
        .period
        .unwrap_or_else(|| today().format("%Y-%m").to_string());
    Ok(Json(state.income.generate_monthly(&period).await?))
}

pub async fn pay_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.income.mark_paid(id).await?))
}

// ============================================================================
// Payment reminders
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Reminder {
    invoice_id: Uuid,
    invoice_number: String,
    customer_id: Uuid,
    phone: Option<String>,
    message: String,
}

async fn build_reminder(state: &AppState, id: Uuid) -> Result<Reminder, AppError> {
    let invoice = state
        .income
        .get_invoice(id)
        .await?
        .ok_or(StoreError::NotFound("Invoice"))?;

    if matches!(invoice.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
        return Err(AppError::Conflict(format!(
            "Invoice {} needs no reminder",
            invoice.number
        )));
    }

    let customer = state.customers.require(invoice.customer_id).await?;
    let message = payment_reminder(
        &ReminderDetails {
            contact_name: customer.contact_name.as_deref(),
            business_name: &customer.business_name,
            invoice_number: &invoice.number,
            amounts: invoice.amounts(),
            due_date: invoice.due_date,
        },
        today(),
    );

    Ok(Reminder {
        invoice_id: invoice.id,
        invoice_number: invoice.number,
        customer_id: customer.id,
        phone: customer.phone,
        message,
    })
}

pub async fn reminder_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reminder>, AppError> {
    Ok(Json(build_reminder(&state, id).await?))
}

/// Send the reminder over WhatsApp and log it in the message hub
pub async fn send_reminder(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let whatsapp = state.whatsapp.as_ref().ok_or(WhatsAppError::NotConfigured)?;
    let reminder = build_reminder(&state, id).await?;
    let phone = reminder
        .phone
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Customer has no phone number".to_string()))?;

    let external_id = whatsapp.send_text(phone, &reminder.message).await?;

    let message = state
        .messages
        .record_outbound_whatsapp(
            auth.user_id,
            Some(reminder.customer_id),
            phone,
            &reminder.message,
            Some(external_id),
        )
        .await?;

    info!(invoice = %reminder.invoice_number, "Payment reminder sent");
    Ok(Json(message))
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    year: Option<i32>,
}

pub async fn report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<IncomeReport>, AppError> {
    let year = query.year.unwrap_or_else(|| today().year());
    state.income.refresh_overdue(today()).await?;
    Ok(Json(state.income.report(year).await?))
}
