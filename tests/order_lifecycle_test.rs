mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{decimal, expect_data, TestApp};

struct Fixture {
    app: TestApp,
    customer_id: Uuid,
    product_id: Uuid,
    stock_id: Uuid,
}

/// One customer, one active product at 19.99 and ten units in stock.
async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    let customer = app.create_customer("buyer@example.com").await;
    let product = app.create_product("TEE-001", dec!(19.99)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    let stock = app
        .add_stock(product.id, warehouse.id, 10, None, None)
        .await;
    Fixture {
        app,
        customer_id: customer.id,
        product_id: product.id,
        stock_id: stock.id,
    }
}

async fn place(fx: &Fixture, quantity: i32) -> axum::response::Response {
    fx.app
        .admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": fx.customer_id,
                "items": [{ "product_id": fx.product_id, "quantity": quantity }],
                "notes": "leave at the door"
            })),
        )
        .await
}

async fn set_status(fx: &Fixture, order_id: &str, status: &str) -> axum::response::Response {
    fx.app
        .admin(
            Method::PUT,
            &format!("/api/v1/order/{}/status", order_id),
            Some(json!({ "status": status })),
        )
        .await
}

async fn reserved(fx: &Fixture) -> i32 {
    fx.app
        .state
        .repos
        .inventory
        .find_by_id(fx.stock_id)
        .await
        .unwrap()
        .reserved_quantity
}

fn id_of(order: &Value) -> String {
    order["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn placing_an_order_prices_lines_and_reserves_stock() {
    let fx = fixture().await;

    let order = expect_data(place(&fx, 3).await, StatusCode::CREATED).await;

    assert_eq!(order["status"], "pending");
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(decimal(&order["subtotal"]), dec!(59.97));
    assert_eq!(decimal(&order["total"]), dec!(59.97));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    let allocations = order["allocations"].as_array().unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0]["quantity"], 3);
    assert_eq!(allocations[0]["inventory_stock_id"], fx.stock_id.to_string());
    assert_eq!(reserved(&fx).await, 3);
}

#[tokio::test]
async fn order_walks_the_status_table() {
    let fx = fixture().await;
    let order = expect_data(place(&fx, 1).await, StatusCode::CREATED).await;
    let id = id_of(&order);

    for next in ["processing", "shipped", "delivered"] {
        let updated = expect_data(set_status(&fx, &id, next).await, StatusCode::OK).await;
        assert_eq!(updated["status"], next);
    }

    let response = fx
        .app
        .admin(Method::POST, &format!("/api/v1/order/{}/cancel", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn skipping_a_status_is_rejected() {
    let fx = fixture().await;
    let order = expect_data(place(&fx, 1).await, StatusCode::CREATED).await;

    let response = set_status(&fx, &id_of(&order), "delivered").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let current = expect_data(
        fx.app
            .admin(Method::GET, &format!("/api/v1/order/{}", id_of(&order)), None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(current["status"], "pending");
}

#[tokio::test]
async fn cancelling_releases_reserved_stock() {
    let fx = fixture().await;
    let order = expect_data(place(&fx, 4).await, StatusCode::CREATED).await;
    let id = id_of(&order);
    assert_eq!(reserved(&fx).await, 4);

    let cancelled = expect_data(
        fx.app
            .admin(Method::POST, &format!("/api/v1/order/{}/cancel", id), None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(reserved(&fx).await, 0);

    let allocations = expect_data(
        fx.app
            .admin(
                Method::GET,
                &format!("/api/v1/inventory/allocations/{}", id),
                None,
            )
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(allocations[0]["status"], "released");
}

#[tokio::test]
async fn shortage_rejects_the_whole_order() {
    let fx = fixture().await;

    let response = place(&fx, 11).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let page = expect_data(
        fx.app.admin(Method::GET, "/api/v1/order", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 0);
    assert_eq!(reserved(&fx).await, 0);
}

#[tokio::test]
async fn archived_products_cannot_be_ordered() {
    let fx = fixture().await;
    let response = fx
        .app
        .admin(
            Method::PUT,
            &format!("/api/v1/product/{}", fx.product_id),
            Some(json!({ "status": "archived" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = place(&fx, 1).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_orders_fail_validation() {
    let fx = fixture().await;

    let response = fx
        .app
        .admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({ "customer_id": fx.customer_id, "items": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn only_closed_orders_can_be_deleted_and_restored() {
    let fx = fixture().await;
    let order = expect_data(place(&fx, 1).await, StatusCode::CREATED).await;
    let id = id_of(&order);

    let response = fx
        .app
        .admin(Method::DELETE, &format!("/api/v1/order/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    fx.app
        .admin(Method::POST, &format!("/api/v1/order/{}/cancel", id), None)
        .await;
    let response = fx
        .app
        .admin(Method::DELETE, &format!("/api/v1/order/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = fx
        .app
        .admin(Method::GET, &format!("/api/v1/order/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let restored = expect_data(
        fx.app
            .admin(Method::POST, &format!("/api/v1/order/{}/restore", id), None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(restored["deleted_at"].is_null());
}

#[tokio::test]
async fn orders_filter_by_status_and_customer() {
    let fx = fixture().await;
    let first = expect_data(place(&fx, 1).await, StatusCode::CREATED).await;
    expect_data(place(&fx, 1).await, StatusCode::CREATED).await;
    set_status(&fx, &id_of(&first), "processing").await;

    let page = expect_data(
        fx.app
            .admin(Method::GET, "/api/v1/order?status=processing", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], first["id"]);

    let page = expect_data(
        fx.app
            .admin(
                Method::GET,
                &format!("/api/v1/customer/{}/orders", fx.customer_id),
                None,
            )
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 2);
}

#[tokio::test]
async fn concurrent_cancels_release_stock_once() {
    let fx = fixture().await;
    let order = expect_data(place(&fx, 4).await, StatusCode::CREATED).await;
    let id: Uuid = id_of(&order).parse().unwrap();
    let orders = &fx.app.state.repos.orders;

    let (first, second) = tokio::join!(orders.cancel(id, None), orders.cancel(id, None));
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    assert_eq!(reserved(&fx).await, 0);

    let logs = expect_data(
        fx.app
            .admin(
                Method::GET,
                &format!("/api/v1/inventory/logs?product_id={}", fx.product_id),
                None,
            )
            .await,
        StatusCode::OK,
    )
    .await;
    let releases = logs["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| entry["reason"] == "release")
        .count();
    assert_eq!(releases, 1);
}
