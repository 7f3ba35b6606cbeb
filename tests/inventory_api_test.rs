mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use commerce_admin_api::entities::inventory_stock;
use common::{decimal, expect_data, TestApp};

#[tokio::test]
async fn transfer_moves_earliest_expiring_batches_first() {
    let app = TestApp::new().await;
    let product = app.create_product("MILK-1L", dec!(1.49)).await;
    let north = app.create_warehouse("NORTH").await;
    let south = app.create_warehouse("SOUTH").await;
    let now = Utc::now();
    app.add_stock(product.id, north.id, 5, Some("LATE"), Some(now + Duration::days(60)))
        .await;
    app.add_stock(product.id, north.id, 5, Some("SOON"), Some(now + Duration::days(10)))
        .await;

    let result = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": product.id,
                "from_warehouse_id": north.id,
                "to_warehouse_id": south.id,
                "quantity": 7
            })),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    let lines = result["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["batch_number"], "SOON");
    assert_eq!(lines[0]["quantity"], 5);
    assert_eq!(lines[1]["batch_number"], "LATE");
    assert_eq!(lines[1]["quantity"], 2);

    let page = expect_data(
        app.admin(
            Method::GET,
            &format!("/api/v1/inventory?warehouse_id={}", south.id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let moved: i64 = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["quantity"].as_i64().unwrap())
        .sum();
    assert_eq!(moved, 7);
    assert_eq!(page["total"], 2);
}

#[tokio::test]
async fn transfer_needs_two_distinct_warehouses_and_enough_stock() {
    let app = TestApp::new().await;
    let product = app.create_product("BOLT-M6", dec!(0.10)).await;
    let north = app.create_warehouse("NORTH").await;
    let south = app.create_warehouse("SOUTH").await;
    app.add_stock(product.id, north.id, 3, None, None).await;

    let same = app
        .admin(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": product.id,
                "from_warehouse_id": north.id,
                "to_warehouse_id": north.id,
                "quantity": 1
            })),
        )
        .await;
    assert_eq!(same.status(), StatusCode::BAD_REQUEST);

    let too_many = app
        .admin(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": product.id,
                "from_warehouse_id": north.id,
                "to_warehouse_id": south.id,
                "quantity": 4
            })),
        )
        .await;
    assert_eq!(too_many.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn adjustment_cannot_dip_below_reserved_units() {
    let app = TestApp::new().await;
    let customer = app.create_customer("reserve@example.com").await;
    let product = app.create_product("LAMP-01", dec!(35.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    let stock = app.add_stock(product.id, warehouse.id, 5, None, None).await;

    expect_data(
        app.admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer.id,
                "items": [{ "product_id": product.id, "quantity": 4 }]
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", stock.id),
            Some(json!({ "change": -2, "reason": "damaged" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let adjusted = expect_data(
        app.admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", stock.id),
            Some(json!({ "change": -1, "reason": "damaged" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(adjusted["quantity"], 4);
    assert_eq!(adjusted["reserved_quantity"], 4);

    let zero = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", stock.id),
            Some(json!({ "change": 0 })),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let reserved_delete = app
        .admin(Method::DELETE, &format!("/api/v1/inventory/{}", stock.id), None)
        .await;
    assert_eq!(reserved_delete.status(), StatusCode::BAD_REQUEST);

    let logs = expect_data(
        app.admin(
            Method::GET,
            &format!("/api/v1/inventory/logs?product_id={}", product.id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    // initial stock, the allocation and the successful adjustment
    assert_eq!(logs["total"], 3);
}

#[tokio::test]
async fn duplicate_stock_rows_conflict() {
    let app = TestApp::new().await;
    let product = app.create_product("CUP-01", dec!(4.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    app.add_stock(product.id, warehouse.id, 1, Some("B1"), None).await;

    let response = app
        .admin(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "product_id": product.id,
                "warehouse_id": warehouse.id,
                "batch_number": "B1",
                "quantity": 9
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn auto_restock_tops_up_rows_at_their_reorder_point() {
    let app = TestApp::new().await;
    let product = app.create_product("PEN-BLK", dec!(1.20)).await;
    let warehouse = app.create_warehouse("MAIN").await;

    let created = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "product_id": product.id,
                "warehouse_id": warehouse.id,
                "quantity": 3,
                "reorder_point": 5,
                "reorder_quantity": 20,
                "auto_restock": true
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let low = expect_data(
        app.admin(Method::GET, "/api/v1/inventory/low-stock", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(low.as_array().unwrap().len(), 1);

    let restocked = expect_data(
        app.admin(Method::POST, "/api/v1/inventory/auto-restock", None)
            .await,
        StatusCode::OK,
    )
    .await;
    let rows = restocked.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], created["id"]);
    assert_eq!(rows[0]["quantity"], 23);

    let again = expect_data(
        app.admin(Method::POST, "/api/v1/inventory/auto-restock", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(again.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn expiry_reports_split_expiring_from_expired() {
    let app = TestApp::new().await;
    let product = app.create_product("YOGURT", dec!(0.99)).await;
    let warehouse = app.create_warehouse("COLD").await;
    let now = Utc::now();
    let soon = app
        .add_stock(product.id, warehouse.id, 3, Some("B1"), Some(now + Duration::days(5)))
        .await;
    let gone = app
        .add_stock(product.id, warehouse.id, 2, Some("B0"), Some(now - Duration::days(1)))
        .await;
    app.add_stock(product.id, warehouse.id, 4, Some("B2"), Some(now + Duration::days(40)))
        .await;

    let expiring = expect_data(
        app.admin(Method::GET, "/api/v1/inventory/expiring?days=30", None)
            .await,
        StatusCode::OK,
    )
    .await;
    let expiring = expiring.as_array().unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0]["id"], soon.id.to_string());

    let expired = expect_data(
        app.admin(Method::GET, "/api/v1/inventory/expired", None).await,
        StatusCode::OK,
    )
    .await;
    let expired = expired.as_array().unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0]["id"], gone.id.to_string());

    let out_of_range = app
        .admin(Method::GET, "/api/v1/inventory/expiring?days=0", None)
        .await;
    assert_eq!(out_of_range.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn expired_batches_are_never_allocated() {
    let app = TestApp::new().await;
    let customer = app.create_customer("late@example.com").await;
    let product = app.create_product("BREAD", dec!(2.50)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    app.add_stock(
        product.id,
        warehouse.id,
        10,
        Some("OLD"),
        Some(Utc::now() - Duration::days(2)),
    )
    .await;

    let response = app
        .admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer.id,
                "items": [{ "product_id": product.id, "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn forecast_projects_recent_sales() {
    let app = TestApp::new().await;
    let customer = app.create_customer("steady@example.com").await;
    let product = app.create_product("COFFEE", dec!(12.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    app.add_stock(product.id, warehouse.id, 20, None, None).await;

    expect_data(
        app.admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer.id,
                "items": [{ "product_id": product.id, "quantity": 6 }]
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let forecast = expect_data(
        app.admin(
            Method::GET,
            &format!(
                "/api/v1/inventory/forecast/{}?window_days=30&horizon_days=30",
                product.id
            ),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(forecast["units_sold"], 6);
    assert_eq!(forecast["projected_demand"], 6);
    assert_eq!(forecast["available"], 14);
    assert_eq!(decimal(&forecast["average_daily_demand"]), dec!(0.2));
    assert_eq!(forecast["reorder_recommended"], false);

    let bad = app
        .admin(
            Method::GET,
            &format!("/api/v1/inventory/forecast/{}?window_days=0", product.id),
            None,
        )
        .await;
    assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn inactive_warehouses_do_not_count_as_sellable() {
    let app = TestApp::new().await;
    let customer = app.create_customer("globe@example.com").await;
    let product = app.create_product("GLOBE", dec!(25.00)).await;
    let warehouse = app.create_warehouse("OLD").await;
    app.add_stock(product.id, warehouse.id, 8, None, None).await;

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/v1/inventory/warehouses/{}", warehouse.id),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let summary = expect_data(
        app.admin(
            Method::GET,
            &format!("/api/v1/product/{}/stock", product.id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(summary["on_hand"], 8);

    let response = app
        .admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer.id,
                "items": [{ "product_id": product.id, "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

async fn place_order(app: &TestApp, customer_id: Uuid, product_id: Uuid, quantity: i32) -> String {
    let order = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer_id,
                "items": [{ "product_id": product_id, "quantity": quantity }]
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    order["id"].as_str().unwrap().to_string()
}

async fn stock_row(app: &TestApp, id: Uuid) -> inventory_stock::Model {
    app.state.repos.inventory.find_by_id(id).await.unwrap()
}

#[tokio::test]
async fn release_and_reallocate_follow_expiry_order() {
    let app = TestApp::new().await;
    let customer = app.create_customer("fefo@example.com").await;
    let product = app.create_product("YOGURT", dec!(0.99)).await;
    let warehouse = app.create_warehouse("COLD").await;
    let now = Utc::now();
    let late = app
        .add_stock(product.id, warehouse.id, 5, Some("LATE"), Some(now + Duration::days(60)))
        .await;
    let soon = app
        .add_stock(product.id, warehouse.id, 3, Some("SOON"), Some(now + Duration::days(10)))
        .await;
    let order_id = place_order(&app, customer.id, product.id, 4).await;

    let released = expect_data(
        app.admin(
            Method::POST,
            &format!("/api/v1/inventory/release/{}", order_id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(released["released_units"], 4);
    assert_eq!(stock_row(&app, soon.id).await.reserved_quantity, 0);
    assert_eq!(stock_row(&app, late.id).await.reserved_quantity, 0);

    let allocated = expect_data(
        app.admin(
            Method::POST,
            &format!("/api/v1/inventory/allocate/{}", order_id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let rows = allocated.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["inventory_stock_id"], soon.id.to_string());
    assert_eq!(rows[0]["quantity"], 3);
    assert_eq!(rows[1]["inventory_stock_id"], late.id.to_string());
    assert_eq!(rows[1]["quantity"], 1);

    // A second allocation hands back the same reservations.
    let again = expect_data(
        app.admin(
            Method::POST,
            &format!("/api/v1/inventory/allocate/{}", order_id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let ids = |value: &serde_json::Value| {
        let mut ids: Vec<String> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&again), ids(&allocated));
    assert_eq!(stock_row(&app, soon.id).await.reserved_quantity, 3);
    assert_eq!(stock_row(&app, late.id).await.reserved_quantity, 1);
}

#[tokio::test]
async fn shipping_consumes_reserved_units() {
    let app = TestApp::new().await;
    let customer = app.create_customer("ship@example.com").await;
    let product = app.create_product("KETTLE", dec!(29.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    let stock = app.add_stock(product.id, warehouse.id, 10, None, None).await;
    let order_id = place_order(&app, customer.id, product.id, 4).await;

    for status in ["processing", "shipped"] {
        expect_data(
            app.admin(
                Method::PUT,
                &format!("/api/v1/order/{}/status", order_id),
                Some(json!({ "status": status })),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }

    let row = stock_row(&app, stock.id).await;
    assert_eq!(row.quantity, 6);
    assert_eq!(row.reserved_quantity, 0);

    let allocations = expect_data(
        app.admin(
            Method::GET,
            &format!("/api/v1/inventory/allocations/{}", order_id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(allocations[0]["status"], "consumed");

    let logs = expect_data(
        app.admin(
            Method::GET,
            &format!("/api/v1/inventory/logs?product_id={}", product.id),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(logs["items"][0]["reason"], "shipment");
    assert_eq!(logs["items"][0]["change"], -4);
    assert_eq!(logs["items"][0]["quantity_after"], 6);

    // Shipped units can be neither released nor reserved again.
    for action in ["release", "allocate"] {
        let response = app
            .admin(
                Method::POST,
                &format!("/api/v1/inventory/{}/{}", action, order_id),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    expect_data(
        app.admin(
            Method::PUT,
            &format!("/api/v1/order/{}/status", order_id),
            Some(json!({ "status": "delivered" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/release/{}", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stock_row(&app, stock.id).await.available(), 6);

    let response = app
        .admin(Method::DELETE, &format!("/api/v1/inventory/{}", stock.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
