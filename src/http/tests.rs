//! Router tests driven through `oneshot` against an in-memory database

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

use super::build_router;
use super::middleware::{sign_jwt, JwtClaims};
use crate::app::AppState;
use crate::config::{Config, WhatsAppConfig};
use crate::store::customers::seed_customer;
use crate::store::db::test_pool;
use crate::store::users::{Role, User};

struct TestApp {
    router: Router,
    state: AppState,
    user: User,
    token: String,
    _uploads: TempDir,
}

async fn setup_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let mut config = Config::for_tests(uploads.path().to_path_buf());
    configure(&mut config);

    let state = AppState::new(config, test_pool().await);
    let user = state
        .users
        .create("ana@agency.mx", "Ana", Role::Manager)
        .await
        .unwrap();
    let token = token_for(&user);

    TestApp {
        router: build_router(state.clone()),
        state,
        user,
        token,
        _uploads: uploads,
    }
}

async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

fn token_for(user: &User) -> String {
    sign_jwt(&JwtClaims::for_user(user, Duration::hours(1)), "test-secret").unwrap()
}

impl TestApp {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn send_as(
        &self,
        token: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.call(request).await
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(&self.token, method, uri, body).await
    }
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn health_needs_no_auth() {
    let app = setup().await;
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = app.call(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["whatsapp"], false);
}

#[tokio::test]
async fn protected_routes_require_a_known_user() {
    let app = setup().await;

    let request = Request::get("/customers").body(Body::empty()).unwrap();
    let (status, _) = app.call(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send_as("not-a-token", "GET", "/customers", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let ghost = User {
        id: uuid::Uuid::new_v4(),
        ..app.user.clone()
    };
    let (status, body) = app
        .send_as(&token_for(&ghost), "GET", "/customers", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unknown user");

    let (status, _) = app.send("GET", "/customers", None).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Customers
// =============================================================================

#[tokio::test]
async fn customer_crud() {
    let app = setup().await;

    let (status, created) = app
        .send(
            "POST",
            "/customers",
            Some(json!({
                "business_name": "Café Luna",
                "contact_name": "Ana López",
                "monthly_fee": 4500.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["monthly_fee"], 4500.0);
    assert_eq!(created["status"], "active");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = app
        .send(
            "PUT",
            &format!("/customers/{id}"),
            Some(json!({ "status": "paused" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "paused");
    assert_eq!(updated["business_name"], "Café Luna");

    let (status, list) = app.send("GET", "/customers?status=paused", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("POST", "/customers", Some(json!({ "business_name": "  " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, body) = app.send("GET", &format!("/customers/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Customer not found");
}

#[tokio::test]
async fn uploads_customer_file_via_multipart() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\nbranding\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"logo.png\"\r\n\
         Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::post(format!("/customers/{}/files", customer.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, saved) = app.call(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["category"], "branding");
    assert_eq!(saved["original_name"], "logo.png");
    assert_eq!(saved["size_bytes"], 7);
    assert!(saved.get("stored_path").is_none());

    let (status, files) = app
        .send(
            "GET",
            &format!("/customers/{}/files?category=branding", customer.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files.as_array().unwrap().len(), 1);
}

// =============================================================================
// Content calendar
// =============================================================================

#[tokio::test]
async fn content_calendar_enforces_platform_formats() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (status, body) = app
        .send(
            "POST",
            "/content-calendar",
            Some(json!({
                "customer_id": customer.id,
                "platform": "tiktok",
                "format": "carousel",
                "scheduled_date": "2025-03-10",
                "title": "Promo de marzo"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "format 'carousel' is not available on tiktok");

    let (status, post) = app
        .send(
            "POST",
            "/content-calendar",
            Some(json!({
                "customer_id": customer.id,
                "platform": "instagram",
                "format": "reel",
                "scheduled_date": "2025-03-10",
                "title": "Promo de marzo"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, march) = app
        .send("GET", "/content-calendar?month=2025-03", None)
        .await;
    assert_eq!(march.as_array().unwrap().len(), 1);
    let (_, april) = app
        .send("GET", "/content-calendar?month=2025-04", None)
        .await;
    assert!(april.as_array().unwrap().is_empty());

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/content-calendar/{}", post["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, formats) = app.send("GET", "/content-calendar/formats", None).await;
    assert_eq!(status, StatusCode::OK);
    let tiktok = formats
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["platform"] == "tiktok")
        .unwrap();
    assert_eq!(tiktok["formats"], json!(["video", "story"]));
}

// =============================================================================
// Tasks and approvals
// =============================================================================

#[tokio::test]
async fn task_moves_show_on_dashboard() {
    let app = setup().await;

    let (status, task) = app
        .send(
            "POST",
            "/tasks",
            Some(json!({ "title": "Diseñar carrusel", "assignee_id": app.user.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "todo");

    let (status, moved) = app
        .send(
            "PUT",
            &format!("/tasks/{}", task["id"].as_str().unwrap()),
            Some(json!({ "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["status"], "in_progress");

    let (status, dashboard) = app.send("GET", "/tasks/dashboard?mine=true", None).await;
    assert_eq!(status, StatusCode::OK);
    let in_progress = dashboard["by_status"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["status"] == "in_progress")
        .unwrap();
    assert_eq!(in_progress["count"], 1);
}

#[tokio::test]
async fn approval_can_be_decided_once() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (status, approval) = app
        .send(
            "POST",
            "/api/approvals",
            Some(json!({ "customer_id": customer.id, "title": "Escaleta de abril" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = approval["id"].as_str().unwrap().to_string();

    let (_, pending) = app.send("GET", "/api/approvals/pending", None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let uri = format!("/api/approvals/{id}/decision");
    let (status, decided) = app
        .send("POST", &uri, Some(json!({ "status": "approved" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["status"], "approved");

    let (status, _) = app
        .send("POST", &uri, Some(json!({ "status": "rejected" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.send("GET", "/api/approvals/pending", None).await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_references_are_rejected_as_bad_requests() {
    let app = setup().await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = app
        .send(
            "POST",
            "/content-calendar",
            Some(json!({
                "customer_id": missing,
                "platform": "instagram",
                "format": "reel",
                "scheduled_date": "2025-03-10",
                "title": "Promo de marzo"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "referenced record does not exist");

    let (status, _) = app
        .send(
            "POST",
            "/api/approvals",
            Some(json!({ "customer_id": missing, "title": "Escaleta de abril" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/tasks",
            Some(json!({ "title": "Diseñar carrusel", "assignee_id": missing })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/api/messages",
            Some(json!({ "customer_id": missing, "body": "hola" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Inventory
// =============================================================================

#[tokio::test]
async fn inventory_validates_imei_and_rejects_duplicates() {
    let app = setup().await;
    let phone = |imei: &str| {
        json!({ "imei": imei, "brand": "Samsung", "model": "A54", "price": 7999.0 })
    };

    let (status, body) = app
        .send("POST", "/inventory-items", Some(phone("123456789012345")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "IMEI failed the Luhn checksum");

    let (status, item) = app
        .send("POST", "/inventory-items", Some(phone("490154203237518")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["status"], "in_stock");

    let (status, _) = app
        .send("POST", "/inventory-items", Some(phone("49 015420 323751 8")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, check) = app
        .send(
            "POST",
            "/inventory-items/validate-imei",
            Some(json!({ "imei": "490154203237518" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["valid"], true);
    assert_eq!(check["duplicate"], true);
    assert_eq!(check["existing_item_id"], item["id"]);
}

#[tokio::test]
async fn assigns_and_releases_items() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (_, item) = app
        .send(
            "POST",
            "/inventory-items",
            Some(json!({ "imei": "490154203237518", "brand": "Apple", "model": "iPhone 13" })),
        )
        .await;
    let id = item["id"].as_str().unwrap().to_string();

    let (status, assigned) = app
        .send(
            "POST",
            &format!("/inventory-items/{id}/assign"),
            Some(json!({ "customer_id": customer.id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["status"], "assigned");

    let (status, _) = app
        .send(
            "POST",
            &format!("/inventory-items/{id}/assign"),
            Some(json!({ "customer_id": customer.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, released) = app
        .send("POST", &format!("/inventory-items/{id}/release"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["status"], "in_stock");
}

#[tokio::test]
async fn plain_update_cannot_assign_an_item() {
    let app = setup().await;
    let (_, item) = app
        .send(
            "POST",
            "/inventory-items",
            Some(json!({ "imei": "490154203237518", "brand": "Apple", "model": "iPhone 13" })),
        )
        .await;
    let uri = format!("/inventory-items/{}", item["id"].as_str().unwrap());

    let (status, _) = app
        .send("PUT", &uri, Some(json!({ "status": "assigned" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .send("PUT", &uri, Some(json!({ "price": 8999.0 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_stock");
    assert_eq!(updated["assigned_customer_id"], Value::Null);
}

// =============================================================================
// Income
// =============================================================================

#[tokio::test]
async fn invoice_carries_iva_and_reminder_quotes_total() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (status, invoice) = app
        .send(
            "POST",
            "/api/income/invoices",
            Some(json!({
                "customer_id": customer.id,
                "concept": "Gestión de redes marzo",
                "subtotal": 4500.0,
                "issue_date": "2099-03-01"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["subtotal"], 4500.0);
    assert_eq!(invoice["tax"], 720.0);
    assert_eq!(invoice["total"], 5220.0);
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, reminder) = app
        .send("GET", &format!("/api/income/invoices/{id}/reminder"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let text = reminder["message"].as_str().unwrap();
    assert!(text.contains("$5,220.00 MXN"), "{text}");
    assert!(text.contains(invoice["number"].as_str().unwrap()));

    let (status, _) = app
        .send("POST", &format!("/api/income/invoices/{id}/reminder/send"), None)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, paid) = app
        .send("POST", &format!("/api/income/invoices/{id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    let (status, _) = app
        .send("GET", &format!("/api/income/invoices/{id}/reminder"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, report) = app.send("GET", "/api/income/report?year=2099", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["totals"]["collected"], 5220.0);
    assert_eq!(report["months"][2]["total"], 5220.0);
}

#[tokio::test]
async fn monthly_generation_is_idempotent() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (status, _) = app
        .send(
            "POST",
            "/api/income/subscriptions",
            Some(json!({
                "customer_id": customer.id,
                "plan": "Premium",
                "amount": 4500.0,
                "billing_day": 5,
                "started_on": "2025-01-01"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Some(json!({ "period": "2025-03" }));
    let (status, first) = app
        .send("POST", "/api/income/invoices/generate", request.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created"].as_array().unwrap().len(), 1);

    let (_, second) = app
        .send("POST", "/api/income/invoices/generate", request)
        .await;
    assert!(second["created"].as_array().unwrap().is_empty());
    assert_eq!(second["skipped"], 1);
}

#[tokio::test]
async fn absurd_amounts_are_refused() {
    let app = setup().await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let (status, _) = app
        .send(
            "POST",
            "/api/income/invoices",
            Some(json!({
                "customer_id": customer.id,
                "concept": "Error de captura",
                "subtotal": 1e17,
                "issue_date": "2099-03-01"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, invoices) = app.send("GET", "/api/income/invoices", None).await;
    assert!(invoices.as_array().unwrap().is_empty());
}

// =============================================================================
// Messages and the WhatsApp webhook
// =============================================================================

#[tokio::test]
async fn message_hub_polls_and_counts_unread() {
    let app = setup().await;
    let luis = app
        .state
        .users
        .create("luis@agency.mx", "Luis", Role::Member)
        .await
        .unwrap();
    let luis_token = token_for(&luis);

    let (status, sent) = app
        .send(
            "POST",
            "/api/messages",
            Some(json!({ "recipient_id": luis.id, "body": "¿Listo el reel?" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, unread) = app
        .send_as(&luis_token, "GET", "/api/messages/unread-count", None)
        .await;
    assert_eq!(unread["count"], 1);

    let (_, inbox) = app.send_as(&luis_token, "GET", "/api/messages", None).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let (status, _) = app
        .send_as(
            &luis_token,
            "PUT",
            &format!("/api/messages/{}/read", sent["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, unread) = app
        .send_as(&luis_token, "GET", "/api/messages/unread-count", None)
        .await;
    assert_eq!(unread["count"], 0);

    // a private message is not Eva's to mark
    let eva = app
        .state
        .users
        .create("eva@agency.mx", "Eva", Role::Member)
        .await
        .unwrap();
    let (status, _) = app
        .send_as(
            &token_for(&eva),
            "PUT",
            &format!("/api/messages/{}/read", sent["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            "/api/messages",
            Some(json!({ "recipient_id": uuid::Uuid::new_v4(), "body": "hola" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_is_hidden_when_not_configured() {
    let app = setup().await;
    let request = Request::get(
        "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=x&hub.challenge=1",
    )
    .body(Body::empty())
    .unwrap();
    let (status, _) = app.call(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_stores_signed_inbound_messages() {
    let app = setup_with(|config| {
        config.whatsapp = Some(WhatsAppConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            phone_number_id: "123".to_string(),
            access_token: "token".to_string(),
            app_secret: "app-secret".to_string(),
            verify_token: "verify-me".to_string(),
        });
    })
    .await;
    let customer = seed_customer(&app.state.pool, "Café Luna").await;

    let handshake = Request::get(
        "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=4242",
    )
    .body(Body::empty())
    .unwrap();
    let response = app.router.clone().oneshot(handshake).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"4242");

    let payload = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "changes": [{ "field": "messages", "value": {
            "messages": [{
                "from": "5215512345678",
                "id": "wamid.XYZ",
                "timestamp": "1700000000",
                "type": "text",
                "text": { "body": "¿Ya está mi factura?" }
            }]
        }}]}]
    })
    .to_string();

    let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
    mac.update(payload.as_bytes());
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let post = |signature: &str| {
        Request::post("/webhooks/whatsapp")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Hub-Signature-256", signature)
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let (status, _) = app.call(post("sha256=00")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(post(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    // redelivery
    let (status, _) = app.call(post(&signature)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, messages) = app
        .send(
            "GET",
            &format!("/api/messages?channel=whatsapp&customer_id={}", customer.id),
            None,
        )
        .await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["direction"], "inbound");
    assert_eq!(messages[0]["body"], "¿Ya está mi factura?");
}
