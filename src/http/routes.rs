//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::error;

use super::middleware::require_auth;
use super::{approvals, content, customers, income, inventory, messages, tasks};
use crate::app::AppState;
use crate::store::{db, StoreError};
use crate::util::time::uptime_secs;
use crate::whatsapp::{webhook, WhatsAppError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/webhooks/whatsapp",
            get(webhook::verify_handler).post(webhook::inbound_handler),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // customers
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer).put(customers::update_customer),
        )
        .route("/customers/:id/posts", get(customers::customer_posts))
        .route("/customers/:id/invoices", get(customers::customer_invoices))
        .route(
            "/customers/:id/files",
            get(customers::list_files).post(customers::upload_file),
        )
        // content calendar
        .route(
            "/content-calendar",
            get(content::list_posts).post(content::create_post),
        )
        .route("/content-calendar/formats", get(content::platform_formats))
        .route(
            "/content-calendar/:id",
            put(content::update_post).delete(content::delete_post),
        )
        // tasks and approvals
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/dashboard", get(tasks::dashboard))
        .route("/tasks/:id", put(tasks::update_task))
        .route("/api/approvals", post(approvals::request_approval))
        .route("/api/approvals/pending", get(approvals::list_pending))
        .route("/api/approvals/:id/decision", post(approvals::decide))
        // inventory
        .route(
            "/inventory-items",
            get(inventory::list_items).post(inventory::create_item),
        )
        .route("/inventory-items/validate-imei", post(inventory::validate_imei))
        .route("/inventory-items/:id", put(inventory::update_item))
        .route("/inventory-items/:id/assign", post(inventory::assign_item))
        .route("/inventory-items/:id/release", post(inventory::release_item))
        // income
        .route(
            "/api/income/subscriptions",
            get(income::list_subscriptions).post(income::create_subscription),
        )
        .route(
            "/api/income/subscriptions/:id",
            put(income::update_subscription),
        )
        .route(
            "/api/income/invoices",
            get(income::list_invoices).post(income::create_invoice),
        )
        .route("/api/income/invoices/generate", post(income::generate_invoices))
        .route("/api/income/invoices/:id/pay", post(income::pay_invoice))
        .route("/api/income/invoices/:id/reminder", get(income::reminder_text))
        .route(
            "/api/income/invoices/:id/reminder/send",
            post(income::send_reminder),
        )
        .route("/api/income/report", get(income::report))
        // message hub
        .route(
            "/api/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/:id/read", put(messages::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let max_body = state.config.max_upload_bytes;

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    database: bool,
    whatsapp: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = db::ping(&state.pool).await;

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        uptime_secs: uptime_secs(),
        database,
        whatsapp: state.whatsapp.is_some(),
    })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Invalid(msg) => AppError::BadRequest(msg),
            other => {
                error!(error = %other, "Store failure");
                AppError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<WhatsAppError> for AppError {
    fn from(e: WhatsAppError) -> Self {
        match e {
            WhatsAppError::NotConfigured => AppError::Unavailable(e.to_string()),
            WhatsAppError::InvalidPhone(_) => AppError::BadRequest(e.to_string()),
            WhatsAppError::RateLimited => AppError::TooManyRequests(e.to_string()),
            other => {
                error!(error = %other, "WhatsApp send failed");
                AppError::BadGateway(other.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
