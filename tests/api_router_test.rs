mod common;

use axum::http::{Method, StatusCode};
use common::{signed_charge_event, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use stateset_commerce::{gateway::to_minor_units, webhooks};
use uuid::Uuid;

fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("decimal")
}

fn checkout_body() -> Value {
    json!({
        "billing": {
            "name": "Ada Obi",
            "email": "ada@example.com",
            "phone": "+2348000000000",
            "address": "12 Marina Road",
            "city": "Lagos",
            "state": "Lagos",
            "country": "NG"
        },
        "shipping_same_as_billing": true,
        "payment_method": "card"
    })
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn cart_requires_an_identity() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/cart", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("x-session-id"));

    let (status, _) = app
        .request(Method::GET, "/cart", &[("x-user-id", "not-a-uuid")], None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guest_purchase_flow_over_http() {
    let app = TestApp::new().await;
    let product = app.seed_product("SKU-HTTP", dec!(1250), 5).await;
    let guest = [("x-session-id", "sess-http")];

    let (status, cart) = app
        .request(
            Method::POST,
            "/cart/items",
            &guest,
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 2);
    assert_eq!(money(&cart["subtotal"]), dec!(2500));

    let (status, order) = app
        .request(Method::POST, "/checkout", &guest, Some(checkout_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(money(&order["total"]), dec!(2500));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, cart) = app.request(Method::GET, "/cart", &guest, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 0);

    let (status, payment) = app
        .request(
            Method::POST,
            &format!("/orders/{}/payments", order_id),
            &guest,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["data"]["status"], "processing");
    let reference = payment["data"]["reference"].as_str().unwrap().to_string();

    let (body, signature) = signed_charge_event(
        webhooks::CHARGE_SUCCESS,
        &reference,
        to_minor_units(dec!(2500)).unwrap(),
    );
    let (status, ack) = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "confirmed");

    let (status, order) = app
        .request(Method::GET, &format!("/orders/{}", order_id), &guest, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["data"]["status"], "confirmed");
    assert_eq!(order["data"]["payment_status"], "paid");
}

#[tokio::test]
async fn checkout_reports_stock_issues_as_unprocessable() {
    let app = TestApp::new().await;
    let product = app.seed_product("SKU-HTTP-LOW", dec!(100), 3).await;
    let user = Uuid::new_v4().to_string();
    let headers = [("x-user-id", user.as_str())];

    let (status, _) = app
        .request(
            Method::POST,
            "/cart/items",
            &headers,
            Some(json!({ "product_id": product.id, "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.services()
        .products
        .update_product(
            product.id,
            stateset_commerce::services::commerce::UpdateProductInput {
                stock: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, body) = app
        .request(Method::POST, "/checkout", &headers, Some(checkout_body()))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["kind"], "out_of_stock");
    assert_eq!(body["details"][0]["available"], 1);
}

#[tokio::test]
async fn other_users_orders_are_hidden() {
    let app = TestApp::new().await;
    let product = app.seed_product("SKU-HTTP-PRIV", dec!(100), 3).await;
    let owner = Uuid::new_v4().to_string();
    let stranger = Uuid::new_v4().to_string();
    let owner_headers = [("x-user-id", owner.as_str())];

    app.request(
        Method::POST,
        "/cart/items",
        &owner_headers,
        Some(json!({ "product_id": product.id, "quantity": 1 })),
    )
    .await;
    let (status, order) = app
        .request(Method::POST, "/checkout", &owner_headers, Some(checkout_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = app
        .request(Method::GET, &uri, &[("x-user-id", stranger.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request(Method::GET, &uri, &owner_headers, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, list) = app.request(Method::GET, "/orders", &owner_headers, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_quantity_is_rejected_before_the_service() {
    let app = TestApp::new().await;
    let product = app.seed_product("SKU-HTTP-QTY", dec!(100), 3).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/cart/items",
            &[("x-session-id", "sess-qty")],
            Some(json!({ "product_id": product.id, "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_webhook_is_unauthorized() {
    let app = TestApp::new().await;
    let (status, body) = app.post_webhook(br#"{"event":"charge.success"}"#, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}
