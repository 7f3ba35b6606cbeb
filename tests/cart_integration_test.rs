mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{decimal, expect_data, TestApp};

const SESSION: (&str, &str) = ("x-cart-session", "guest-session-1");

async fn stocked_product(app: &TestApp, sku: &str, units: i32) -> Uuid {
    let product = app.create_product(sku, dec!(10.00)).await;
    let warehouse = app.create_warehouse(&format!("WH-{}", sku)).await;
    app.add_stock(product.id, warehouse.id, units, None, None).await;
    product.id
}

#[tokio::test]
async fn guests_build_a_cart_with_the_session_header() {
    let app = TestApp::new().await;
    let product_id = stocked_product(&app, "MUG", 5).await;

    let cart = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product_id, "quantity": 2 })),
            None,
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["session_id"], SESSION.1);
    assert!(cart["customer_id"].is_null());
    assert_eq!(decimal(&cart["subtotal"]), dec!(20.00));

    // Adding the same product grows the existing line.
    let cart = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product_id, "quantity": 1 })),
            None,
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(decimal(&cart["total"]), dec!(30.00));

    let too_many = app
        .send(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product_id, "quantity": 3 })),
            None,
            &[SESSION],
        )
        .await;
    assert_eq!(too_many.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn anonymous_requests_without_session_are_rejected() {
    let app = TestApp::new().await;

    let response = app.send(Method::GET, "/api/v1/cart", None, None, &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn line_quantities_can_be_changed_and_removed() {
    let app = TestApp::new().await;
    let product_id = stocked_product(&app, "PLATE", 10).await;
    let cart = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product_id, "quantity": 1 })),
            None,
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let item_id = cart["items"][0]["id"].as_str().unwrap().to_string();

    let cart = expect_data(
        app.send(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", item_id),
            Some(json!({ "quantity": 4 })),
            None,
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["items"][0]["quantity"], 4);
    assert_eq!(decimal(&cart["subtotal"]), dec!(40.00));

    let cart = expect_data(
        app.send(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", item_id),
            Some(json!({ "quantity": 0 })),
            None,
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert!(cart["items"].as_array().unwrap().is_empty());
    assert_eq!(decimal(&cart["total"]), dec!(0));

    let missing = app
        .send(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", item_id),
            None,
            None,
            &[SESSION],
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guest_cart_merges_into_the_customer_cart() {
    let app = TestApp::new().await;
    let product_id = stocked_product(&app, "BOWL", 3).await;
    app.create_customer("merge@example.com").await;
    let token = app.customer_token("merge@example.com").await;

    // The customer already holds two units; the guest adds two more.
    app.send(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": product_id, "quantity": 2 })),
        Some(&token),
        &[],
    )
    .await;
    app.send(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": product_id, "quantity": 2 })),
        None,
        &[SESSION],
    )
    .await;

    let merged = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/merge",
            None,
            Some(&token),
            &[SESSION],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let items = merged["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    // capped at the three units in stock
    assert_eq!(items[0]["quantity"], 3);

    let guest = expect_data(
        app.send(Method::GET, "/api/v1/cart", None, None, &[SESSION])
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(guest["items"].as_array().unwrap().is_empty());
    assert_ne!(guest["id"], merged["id"]);
}

#[tokio::test]
async fn merge_requires_a_customer_token() {
    let app = TestApp::new().await;

    let response = app
        .send(Method::POST, "/api/v1/cart/merge", None, None, &[SESSION])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_turns_the_cart_into_an_order() {
    let app = TestApp::new().await;
    let product_id = stocked_product(&app, "VASE", 4).await;
    let customer = app.create_customer("checkout@example.com").await;
    let token = app.customer_token("checkout@example.com").await;

    let empty = app
        .send(
            Method::POST,
            "/api/v1/cart/checkout",
            Some(json!({})),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    app.send(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": product_id, "quantity": 2 })),
        Some(&token),
        &[],
    )
    .await;

    let order = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/checkout",
            Some(json!({ "notes": "gift wrap" })),
            Some(&token),
            &[],
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(order["customer_id"], customer.id.to_string());
    assert_eq!(order["status"], "pending");
    assert_eq!(order["notes"], "gift wrap");
    assert_eq!(decimal(&order["total"]), dec!(20.00));
    assert_eq!(order["allocations"].as_array().unwrap().len(), 1);

    let fresh = expect_data(
        app.send(Method::GET, "/api/v1/cart", None, Some(&token), &[])
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(fresh["items"].as_array().unwrap().is_empty());
    assert_eq!(fresh["status"], "active");
}

#[tokio::test]
async fn cart_routes_are_rate_limited() {
    let app = TestApp::with_config(|cfg| cfg.cart_rate_limit_requests = 2).await;

    for _ in 0..2 {
        let response = app
            .send(Method::GET, "/api/v1/cart", None, None, &[SESSION])
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = app
        .send(Method::GET, "/api/v1/cart", None, None, &[SESSION])
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn cart_lines_stop_at_the_order_line_limit() {
    let app = TestApp::with_config(|cfg| cfg.cart_rate_limit_requests = 100).await;
    let product_id = stocked_product(&app, "NAIL", 20_000).await;
    app.create_customer("bulk@example.com").await;
    let token = app.customer_token("bulk@example.com").await;

    for _ in 0..10 {
        expect_data(
            app.send(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({ "product_id": product_id, "quantity": 1000 })),
                Some(&token),
                &[],
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }

    let over = app
        .send(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product_id, "quantity": 1000 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(over.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The capped cart still converts into an order.
    let order = expect_data(
        app.send(
            Method::POST,
            "/api/v1/cart/checkout",
            Some(json!({})),
            Some(&token),
            &[],
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(order["items"][0]["quantity"], 10_000);
}
