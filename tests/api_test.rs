//! HTTP-level tests: routing, status codes, envelopes and authentication.

mod common;

use axum::http::{Method, StatusCode};
use common::{json_decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

// ==================== Health & auth ====================

#[tokio::test]
async fn health_and_status_need_no_token() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = response_json(health).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["checks"]["database"], "healthy");

    let status = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status.status(), StatusCode::OK);
    let body = response_json(status).await;
    assert_eq!(body["data"]["service"], "tiketloka-api");
    assert_eq!(body["data"]["checkout_flow"], "require_confirmation");
}

#[tokio::test]
async fn protected_routes_reject_missing_and_forged_tokens() {
    let app = TestApp::new().await;

    let missing = app.request(Method::GET, "/api/v1/orders/mine", None, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(missing).await;
    assert_eq!(body["error"], "Unauthorized");
    assert!(body["timestamp"].is_string());

    let forged = app
        .request(Method::GET, "/api/v1/cart", None, Some("not.a.jwt"))
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_id_is_echoed_on_errors() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(
            Method::GET,
            "/api/v1/orders/mine",
            &[("x-request-id", "req-test-42")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-test-42"
    );
    let body = response_json(response).await;
    assert_eq!(body["request_id"], "req-test-42");
}

// ==================== Cart → checkout → payment ====================

#[tokio::test]
async fn cart_checkout_and_payment_round_trip() {
    let app = TestApp::new().await;
    let alice = &app.users.alice;

    let added = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/cart",
            Some(json!({
                "destination_id": app.destinations.borobudur.id,
                "quantity": 2,
                "visit_date": "2026-03-10"
            })),
        )
        .await;
    assert_eq!(added.status(), StatusCode::CREATED);
    let first_id = response_json(added).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let added = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/cart",
            Some(json!({
                "destination_id": app.destinations.prambanan.id,
                "quantity": 1,
                "visit_date": "2026-03-11"
            })),
        )
        .await;
    let second_id = response_json(added).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let cart = response_json(app.request_as(alice, Method::GET, "/api/v1/cart", None).await).await;
    assert_eq!(cart["data"].as_array().unwrap().len(), 2);

    let checkout = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "payment_method": "bca_va",
                "cart_ids": [first_id, second_id]
            })),
        )
        .await;
    assert_eq!(checkout.status(), StatusCode::CREATED);
    let body = response_json(checkout).await;
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(json_decimal(&data["grand_total"]), dec!(1150000));
    assert_eq!(data["payment_instructions"]["payment_type"], "virtual_account");
    assert_eq!(data["payment_instructions"]["va_number"], "800181298765432");
    assert_eq!(data["order"]["status"], "pending");
    let code = data["reference_code"].as_str().unwrap().to_string();

    let cart = response_json(app.request_as(alice, Method::GET, "/api/v1/cart", None).await).await;
    assert!(cart["data"].as_array().unwrap().is_empty());

    let mine = response_json(
        app.request_as(alice, Method::GET, "/api/v1/orders/mine", None)
            .await,
    )
    .await;
    assert_eq!(mine["data"][0]["reference_code"], code.as_str());

    let detail = app
        .request_as(alice, Method::GET, &format!("/api/v1/orders/{}", code), None)
        .await;
    assert_eq!(detail.status(), StatusCode::OK);
    let detail = response_json(detail).await;
    assert_eq!(detail["data"]["owner"]["email"], "alice@example.com");
    assert_eq!(detail["data"]["lines"].as_array().unwrap().len(), 2);

    let snoop = app
        .request_as(&app.users.bob, Method::GET, &format!("/api/v1/orders/{}", code), None)
        .await;
    assert_eq!(snoop.status(), StatusCode::FORBIDDEN);

    let confirm_body = json!({ "reference_code": code });
    let foreign = app
        .request_as(
            &app.users.bob,
            Method::POST,
            "/api/v1/payments/confirm",
            Some(confirm_body.clone()),
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let paid = app
        .request_as(alice, Method::POST, "/api/v1/payments/confirm", Some(confirm_body.clone()))
        .await;
    assert_eq!(paid.status(), StatusCode::OK);
    let paid = response_json(paid).await;
    assert_eq!(paid["data"]["status"], "success");
    assert!(paid["data"]["paid_at"].is_string());

    let again = app
        .request_as(alice, Method::POST, "/api/v1/payments/confirm", Some(confirm_body))
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/payments/confirm",
            Some(json!({ "reference_code": "TLZZZZZZ" })),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_rejects_bad_payloads() {
    let app = TestApp::new().await;
    let alice = &app.users.alice;
    let line = app.seed_cart_line(alice, &app.destinations.ijen, 1).await;

    let bad_method = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "payment_method": "gopay", "cart_ids": [line.id] })),
        )
        .await;
    assert_eq!(bad_method.status(), StatusCode::BAD_REQUEST);

    let empty = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "payment_method": "qris", "cart_ids": [] })),
        )
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let malformed = app
        .request_as(
            alice,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "payment_method": "qris" })),
        )
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(malformed).await["error"], "Bad Request");

    let foreign = app
        .request_as(
            &app.users.bob,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "payment_method": "qris", "cart_ids": [line.id] })),
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.cart_line_ids(alice).await, vec![line.id]);
}

#[tokio::test]
async fn buy_now_over_http() {
    let app = TestApp::new().await;
    let bob = &app.users.bob;

    let created = app
        .request_as(
            bob,
            Method::POST,
            "/api/v1/buy-now",
            Some(json!({
                "destination_id": app.destinations.ijen.id,
                "quantity": 3,
                "visit_date": "2026-03-10",
                "payment_method": "qris"
            })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(json_decimal(&body["data"]["grand_total"]), dec!(600000));
    assert_eq!(body["data"]["payment_instructions"]["payment_type"], "qris");

    let missing = app
        .request_as(
            bob,
            Method::POST,
            "/api/v1/buy-now",
            Some(json!({
                "destination_id": Uuid::new_v4(),
                "quantity": 1,
                "visit_date": "2026-03-10",
                "payment_method": "qris"
            })),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let zero = app
        .request_as(
            bob,
            Method::POST,
            "/api/v1/buy-now",
            Some(json!({
                "destination_id": app.destinations.ijen.id,
                "quantity": 0,
                "visit_date": "2026-03-10",
                "payment_method": "qris"
            })),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let past = app
        .request_as(
            bob,
            Method::POST,
            "/api/v1/buy-now",
            Some(json!({
                "destination_id": app.destinations.ijen.id,
                "quantity": 1,
                "visit_date": "2026-02-01",
                "payment_method": "qris"
            })),
        )
        .await;
    assert_eq!(past.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_line_removal_is_owner_scoped() {
    let app = TestApp::new().await;
    let line = app
        .seed_cart_line(&app.users.alice, &app.destinations.prambanan, 1)
        .await;
    let uri = format!("/api/v1/cart/{}", line.id);

    let foreign = app
        .request_as(&app.users.bob, Method::DELETE, &uri, None)
        .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let removed = app
        .request_as(&app.users.alice, Method::DELETE, &uri, None)
        .await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let again = app
        .request_as(&app.users.alice, Method::DELETE, &uri, None)
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

// ==================== Admin ====================

#[tokio::test]
async fn admin_listing_is_admin_only_and_validates_filters() {
    let app = TestApp::new().await;
    let line = app
        .seed_cart_line(&app.users.alice, &app.destinations.ijen, 1)
        .await;
    app.request_as(
        &app.users.alice,
        Method::POST,
        "/api/v1/checkout",
        Some(json!({ "payment_method": "qris", "cart_ids": [line.id] })),
    )
    .await;

    let customer = app
        .request_as(&app.users.alice, Method::GET, "/api/v1/admin/orders", None)
        .await;
    assert_eq!(customer.status(), StatusCode::FORBIDDEN);

    let admin = &app.users.admin;
    let all = app
        .request_as(admin, Method::GET, "/api/v1/admin/orders", None)
        .await;
    assert_eq!(all.status(), StatusCode::OK);
    let body = response_json(all).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["owner"]["name"], "Alice");

    let pending = response_json(
        app.request_as(
            admin,
            Method::GET,
            "/api/v1/admin/orders?status=pending&start_date=2026-03-01&end_date=2026-03-01",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(pending["data"].as_array().unwrap().len(), 1);

    let paid = response_json(
        app.request_as(admin, Method::GET, "/api/v1/admin/orders?status=success", None)
            .await,
    )
    .await;
    assert!(paid["data"].as_array().unwrap().is_empty());

    let bad_status = app
        .request_as(admin, Method::GET, "/api/v1/admin/orders?status=refunded", None)
        .await;
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    let inverted = app
        .request_as(
            admin,
            Method::GET,
            "/api/v1/admin/orders?start_date=2026-03-05&end_date=2026-03-01",
            None,
        )
        .await;
    assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"]["/api/v1/checkout"].is_object());
}
