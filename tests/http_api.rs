use actix_web::{http::StatusCode, test, App};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;

use gym_billing::config::{AppConfig, Config, Environment, GatewayConfig};
use gym_billing::error::BillingError;
use gym_billing::handlers;
use gym_billing::models::principal::{Principal, Role};
use gym_billing::services::auth::TokenAuthenticator;
use gym_billing::services::gateway::{GatewayInvoice, InvoiceRequest, PaymentGateway};
use gym_billing::services::memory_store::MemoryStore;
use gym_billing::services::store::BillingStore;
use gym_billing::services::BillingServices;

const SECRET: &str = "whsec_integration";
const HEADER: &str = "X-Gateway-Signature";

struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<GatewayInvoice, BillingError> {
        Ok(GatewayInvoice {
            url: Some(format!("https://pay.example/checkout/{}", request.payment_id)),
            token: Some(format!("inv_{}", request.payment_id)),
        })
    }
}

fn config() -> Config {
    Config {
        database_url: "memory://".to_string(),
        port: 0,
        gateway: GatewayConfig {
            base_url: "https://gateway.invalid".to_string(),
            api_key: "key".to_string(),
            webhook_secret: SECRET.to_string(),
            ..GatewayConfig::default()
        },
        app: AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        },
        auth_tokens: String::new(),
    }
}

fn services(store: Arc<MemoryStore>) -> BillingServices {
    let auth = TokenAuthenticator::default()
        .with_principal(
            "admin-token",
            Principal {
                user_id: "root".to_string(),
                role: Role::SystemAdmin,
                gym_id: None,
                email: None,
                name: None,
            },
        )
        .with_principal(
            "member-token",
            Principal {
                user_id: "owner".to_string(),
                role: Role::Member,
                gym_id: Some("gym_1".to_string()),
                email: Some("owner@gym.example".to_string()),
                name: Some("Owner".to_string()),
            },
        );
    BillingServices::build(&config(), store, Arc::new(StubGateway), Arc::new(auth))
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

macro_rules! app {
    ($store:expr) => {{
        let services = services($store);
        test::init_service(App::new().configure(move |cfg| handlers::configure(cfg, &services))).await
    }};
}

#[actix_web::test]
async fn test_checkout_then_webhook_activates_gym() {
    let store = Arc::new(MemoryStore::new());
    let app = app!(store.clone());

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/provision")
        .insert_header(("Authorization", "Bearer admin-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/v1/checkout")
        .insert_header(("Authorization", "Bearer member-token"))
        .set_json(json!({ "subscription_id": "monthly_gym_1", "gym_id": "gym_1" }))
        .to_request();
    let checkout: Value = test::call_and_read_body_json(&app, req).await;
    let payment_id = checkout["payment_id"].as_str().unwrap().to_string();
    assert!(checkout["checkout_url"].as_str().unwrap().starts_with("https://"));

    let payment = store.find_payment(&payment_id).await.unwrap().unwrap();
    let body = json!({
        "data": {
            "status": "completed",
            "token": format!("inv_{}", payment_id),
            "custom_data": {
                "gym_id": "gym_1",
                "subscription_id": payment.subscription_id.to_string(),
                "billing_cycle": "monthly",
                "payment_id": payment_id,
                "amount": "25000"
            }
        }
    })
    .to_string();

    for expected in ["applied", "duplicate"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/webhooks/payments")
            .insert_header((HEADER, sign(body.as_bytes())))
            .insert_header(("Content-Type", "application/json"))
            .set_payload(body.clone())
            .to_request();
        let ack: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ack["success"], true);
        assert_eq!(ack["paymentId"], payment_id.as_str());
        assert_eq!(ack["gymId"], "gym_1");
        assert_eq!(ack["outcome"], expected);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/tenants/gym_1/entitlement")
        .insert_header(("Authorization", "Bearer member-token"))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["entitled"], true);
    assert_eq!(status["subscription_active"], true);
}

#[actix_web::test]
async fn test_bad_signature_is_rejected_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let app = app!(store.clone());

    let req = test::TestRequest::post()
        .uri("/api/v1/webhooks/payments")
        .insert_header((HEADER, "00ff"))
        .set_payload(r#"{"data":{"status":"completed","token":"t"}}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid signature");
    assert_eq!(store.write_count(), 0);
}

#[actix_web::test]
async fn test_webhook_missing_fields_are_listed() {
    let app = app!(Arc::new(MemoryStore::new()));

    let body = json!({ "data": { "status": "completed", "token": "t", "custom_data": { "gym_id": "gym_1" } } })
        .to_string();
    let req = test::TestRequest::post()
        .uri("/api/v1/webhooks/payments")
        .insert_header((HEADER, sign(body.as_bytes())))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["details"], "subscription_id, billing_cycle, amount");
}

#[actix_web::test]
async fn test_admin_routes_require_admin_role() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/activate")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/activate")
        .insert_header(("Authorization", "Bearer member-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/activate")
        .insert_header(("Authorization", "Bearer admin-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_admin_activate_deactivate_and_extend_trial() {
    let app = app!(Arc::new(MemoryStore::new()));
    let admin = ("Authorization", "Bearer admin-token");

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/provision")
        .insert_header(admin)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/activate")
        .insert_header(admin)
        .to_request();
    let tenant: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(tenant["subscription_active"], true);
    assert_eq!(tenant["trial_used"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/deactivate")
        .insert_header(admin)
        .to_request();
    let tenant: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(tenant["subscription_active"], false);
    assert!(tenant["current_subscription_id"].is_null());

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/extend-trial")
        .insert_header(admin)
        .set_json(json!({ "days": 0 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/tenants/gym_1/extend-trial")
        .insert_header(admin)
        .set_json(json!({ "days": 10 }))
        .to_request();
    let tenant: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(tenant["trial_used"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/tenants/gym_1")
        .insert_header(admin)
        .to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["entitled"], true);
    assert_eq!(snapshot["payments"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_checkout_body_errors() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/checkout")
        .insert_header(("Authorization", "Bearer member-token"))
        .set_json(json!({ "gym_id": "gym_1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["details"], "subscription_id");

    let req = test::TestRequest::post()
        .uri("/api/v1/checkout")
        .insert_header(("Authorization", "Bearer member-token"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid JSON body");

    let req = test::TestRequest::post()
        .uri("/api/v1/checkout")
        .insert_header(("Authorization", "Bearer member-token"))
        .set_json(json!({ "gym_id": "gym_1", "subscription_id": "monthly_gym_1" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health() {
    let app = app!(Arc::new(MemoryStore::new()));
    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}
