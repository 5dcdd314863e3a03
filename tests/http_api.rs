mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

use common::*;
use payment_ledger_server::db::CreditStore;
use payment_ledger_server::models::Claims;
use payment_ledger_server::routes;
use payment_ledger_server::utils::signature::{creem_signature, stripe_signature_header};

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.settings.clone()))
                .app_data($harness.state.clone())
                .configure(routes::configure_app),
        )
        .await
    };
}

fn bearer(user_id: Uuid) -> (&'static str, String) {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + 600) as usize,
        iat: now as usize,
        email: Some("buyer@example.com".to_string()),
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap();
    ("Authorization", format!("Bearer {}", token))
}

fn stripe_body(object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_http_1",
        "type": "checkout.session.completed",
        "data": { "object": object }
    }))
    .unwrap()
}

fn signed_stripe_request(body: Vec<u8>, secret: &str) -> test::TestRequest {
    let header = stripe_signature_header(&body, secret, Utc::now().timestamp()).unwrap();
    test::TestRequest::post()
        .uri("/webhooks/stripe")
        .insert_header(("Stripe-Signature", header))
        .set_payload(body)
}

#[actix_web::test]
async fn health_check_reports_wired_providers() {
    let mut settings = settings();
    settings.creem = None;
    let h = Harness::with_settings(settings);
    let app = app!(h);

    let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;

    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["providers"], json!({ "stripe": true, "creem": false }));
}

#[actix_web::test]
async fn signed_stripe_webhook_is_processed() {
    let h = Harness::new();
    let app = app!(h);

    let req = signed_stripe_request(stripe_body(one_time_checkout(USER)), STRIPE_WEBHOOK_SECRET).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "received": true }));
    let usage = h.credits.get_usage(USER).await.unwrap().unwrap();
    assert_eq!(usage.one_time_credits_balance, 500);
}

#[actix_web::test]
async fn stripe_webhook_with_wrong_secret_is_rejected() {
    let h = Harness::new();
    let app = app!(h);

    let req = signed_stripe_request(stripe_body(one_time_checkout(USER)), "whsec_other").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.orders.all().is_empty());
}

#[actix_web::test]
async fn stripe_webhook_without_signature_header_is_rejected() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .set_payload(stripe_body(one_time_checkout(USER)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn stripe_webhook_with_stale_timestamp_is_rejected() {
    let h = Harness::new();
    let app = app!(h);
    let body = stripe_body(one_time_checkout(USER));
    let header = stripe_signature_header(&body, STRIPE_WEBHOOK_SECRET, Utc::now().timestamp() - 3_600).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .insert_header(("Stripe-Signature", header))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn failed_processing_asks_for_redelivery() {
    let h = Harness::new();
    let app = app!(h);
    let body = serde_json::to_vec(&json!({
        "id": "evt_http_2",
        "type": "invoice.paid",
        "data": { "object": subscription_invoice("in_1", "sub_missing", "subscription_create", 1000) }
    }))
    .unwrap();

    let resp = test::call_service(&app, signed_stripe_request(body, STRIPE_WEBHOOK_SECRET).to_request()).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn unconfigured_provider_webhook_is_a_server_error() {
    let mut settings = settings();
    settings.stripe = None;
    let h = Harness::with_settings(settings);
    let app = app!(h);

    let req = signed_stripe_request(stripe_body(one_time_checkout(USER)), STRIPE_WEBHOOK_SECRET).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn signed_creem_webhook_is_processed() {
    let h = Harness::new();
    let app = app!(h);
    let body = serde_json::to_vec(&json!({
        "id": "evt_creem_1",
        "eventType": "subscription.update",
        "object": {
            "id": "csub_9",
            "product": { "id": "creem_prod_3", "billing_type": "recurring" },
            "customer": "cust_1",
            "status": "active",
            "metadata": { "userId": USER.to_string() }
        }
    }))
    .unwrap();
    h.creem.put_subscription(json!({
        "id": "csub_9",
        "product": { "id": "creem_prod_3", "billing_type": "recurring" },
        "customer": "cust_1",
        "status": "active",
        "metadata": { "userId": USER.to_string() }
    }));
    let signature = creem_signature(&body, CREEM_WEBHOOK_SECRET).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhooks/creem")
        .insert_header(("creem-signature", signature))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn creem_webhook_with_bad_signature_is_rejected() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/webhooks/creem")
        .insert_header(("creem-signature", "deadbeef"))
        .set_payload(r#"{"id":"evt","eventType":"checkout.completed","object":{}}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn verify_success_requires_a_token() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=stripe&session_id=cs_test_1")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn verify_success_confirms_recorded_stripe_order() {
    let h = Harness::new();
    let app = app!(h);
    h.stripe.put_session(one_time_checkout(USER));
    let webhook = signed_stripe_request(stripe_body(one_time_checkout(USER)), STRIPE_WEBHOOK_SECRET).to_request();
    assert_eq!(test::call_service(&app, webhook).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=stripe&session_id=cs_test_1")
        .insert_header(bearer(USER))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("paid"));
    assert_eq!(body["planId"], json!(ONE_TIME_PLAN.to_string()));
}

#[actix_web::test]
async fn verify_success_is_pending_before_the_webhook() {
    let h = Harness::new();
    let app = app!(h);
    h.stripe.put_session(one_time_checkout(USER));

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=stripe&session_id=cs_test_1")
        .insert_header(bearer(USER))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], json!("pending"));
}

#[actix_web::test]
async fn verify_success_rejects_another_users_session() {
    let h = Harness::new();
    let app = app!(h);
    h.stripe.put_session(one_time_checkout(USER));

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=stripe&session_id=cs_test_1")
        .insert_header(bearer(OTHER_USER))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn verify_success_reports_unknown_session() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=stripe&session_id=cs_missing")
        .insert_header(bearer(USER))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn verify_success_validates_query_parameters() {
    let h = Harness::new();
    let app = app!(h);

    for uri in [
        "/api/payment/verify-success?session_id=cs_test_1",
        "/api/payment/verify-success?provider=paypal&session_id=cs_test_1",
        "/api/payment/verify-success?provider=creem",
    ] {
        let req = test::TestRequest::get().uri(uri).insert_header(bearer(USER)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[actix_web::test]
async fn verify_success_confirms_active_creem_subscription() {
    let h = Harness::new();
    let app = app!(h);
    let subscription = json!({
        "id": "csub_2",
        "product": { "id": "creem_prod_3", "billing_type": "recurring" },
        "customer": "cust_1",
        "status": "active",
        "metadata": { "userId": USER.to_string() }
    });
    h.creem.put_subscription(subscription);
    h.creem.put_checkout(json!({
        "id": "chk_sub",
        "status": "completed",
        "product": "creem_prod_3",
        "customer": "cust_1",
        "subscription": "csub_2",
        "order": { "id": "ord_sub", "currency": "USD", "type": "recurring", "amount_paid": 1000 },
        "metadata": { "userId": USER.to_string(), "planId": MONTHLY_PLAN.to_string() }
    }));

    let req = test::TestRequest::get()
        .uri("/api/payment/verify-success?provider=creem&checkout_id=chk_sub")
        .insert_header(bearer(USER))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], json!("active"));
    assert_eq!(body["subscriptionStatus"], json!("active"));
    assert_eq!(body["planId"], json!(MONTHLY_PLAN.to_string()));
}
