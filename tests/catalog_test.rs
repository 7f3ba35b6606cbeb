mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{decimal, expect_data, TestApp};

#[tokio::test]
async fn category_listing_reflects_writes() {
    let app = TestApp::new().await;

    // Prime the cache with the empty list.
    let listed = expect_data(
        app.admin(Method::GET, "/api/v1/category", None).await,
        StatusCode::OK,
    )
    .await;
    assert!(listed.as_array().unwrap().is_empty());

    let shoes = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/category",
            Some(json!({ "name": "Summer Shoes" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(shoes["slug"], "summer-shoes");
    assert_eq!(shoes["is_active"], true);

    let listed = expect_data(
        app.admin(Method::GET, "/api/v1/category", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/category",
            Some(json!({ "name": "Summer shoes!" })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let id = shoes["id"].as_str().unwrap();
    let own_parent = app
        .admin(
            Method::PUT,
            &format!("/api/v1/category/{}", id),
            Some(json!({ "parent_id": id })),
        )
        .await;
    assert_eq!(own_parent.status(), StatusCode::BAD_REQUEST);

    let response = app
        .admin(Method::DELETE, &format!("/api/v1/category/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let listed = expect_data(
        app.admin(Method::GET, "/api/v1/category", None).await,
        StatusCode::OK,
    )
    .await;
    assert!(listed.as_array().unwrap().is_empty());

    expect_data(
        app.admin(Method::POST, &format!("/api/v1/category/{}/restore", id), None)
            .await,
        StatusCode::OK,
    )
    .await;
    let listed = expect_data(
        app.admin(Method::GET, "/api/v1/category", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn categories_with_products_cannot_be_deleted() {
    let app = TestApp::new().await;
    let category = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/category",
            Some(json!({ "name": "Lighting" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    expect_data(
        app.admin(
            Method::POST,
            "/api/v1/product",
            Some(json!({
                "name": "Desk Lamp",
                "sku": "LAMP-DESK",
                "price": "24.50",
                "category_id": category["id"]
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let response = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/category/{}", category["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn products_are_created_filtered_and_soft_deleted() {
    let app = TestApp::new().await;

    let draft = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/product",
            Some(json!({ "name": "Walnut Shelf", "sku": "SHELF-W", "price": "89.00" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(draft["status"], "draft");
    assert_eq!(draft["slug"], "walnut-shelf");
    assert_eq!(decimal(&draft["price"]), dec!(89.00));

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/product",
            Some(json!({ "name": "Other Shelf", "sku": "SHELF-W", "price": "10" })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let discount_above_price = app
        .admin(
            Method::POST,
            "/api/v1/product",
            Some(json!({
                "name": "Oak Shelf",
                "sku": "SHELF-O",
                "price": "50",
                "discount_price": "60"
            })),
        )
        .await;
    assert_eq!(
        discount_above_price.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    app.create_product("STOOL", dec!(35.00)).await;

    let active = expect_data(
        app.admin(Method::GET, "/api/v1/product?status=active", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(active["total"], 1);
    assert_eq!(active["items"][0]["sku"], "STOOL");

    let bad_filter = app
        .admin(Method::GET, "/api/v1/product?status=sold", None)
        .await;
    assert_eq!(bad_filter.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let uri = format!("/api/v1/product/{}", draft["id"].as_str().unwrap());
    let response = app.admin(Method::DELETE, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.admin(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let restored = expect_data(
        app.admin(Method::POST, &format!("{}/restore", uri), None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(restored["deleted_at"].is_null());
    let all = expect_data(
        app.admin(Method::GET, "/api/v1/product", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(all["total"], 2);
}

#[tokio::test]
async fn customer_emails_are_unique_and_passwords_hidden() {
    let app = TestApp::new().await;

    let created = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/customer",
            Some(json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "Ada@Example.com",
                "password": "analytical-engine"
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(created["email"], "ada@example.com");
    assert!(created.get("password_hash").is_none());

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/customer",
            Some(json!({
                "first_name": "Ada",
                "last_name": "Again",
                "email": "ada@example.com"
            })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let invalid = app
        .admin(
            Method::POST,
            "/api/v1/customer",
            Some(json!({ "first_name": "No", "last_name": "Mail", "email": "nope" })),
        )
        .await;
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let orders = expect_data(
        app.admin(
            Method::GET,
            &format!(
                "/api/v1/customer/{}/orders",
                created["id"].as_str().unwrap()
            ),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(orders["total"], 0);
}

#[tokio::test]
async fn supplier_stock_summary_counts_linked_rows() {
    let app = TestApp::new().await;
    let supplier = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/supplier",
            Some(json!({ "name": "Acme Timber", "email": "sales@acme.test" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let product = app.create_product("PLANK", dec!(3.00)).await;
    let warehouse = app.create_warehouse("YARD").await;

    expect_data(
        app.admin(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "product_id": product.id,
                "warehouse_id": warehouse.id,
                "supplier_id": supplier["id"],
                "quantity": 40
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let summary = expect_data(
        app.admin(
            Method::GET,
            &format!(
                "/api/v1/supplier/{}/stock",
                supplier["id"].as_str().unwrap()
            ),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(summary["stock_rows"], 1);
    assert_eq!(summary["units_on_hand"], 40);
    assert_eq!(summary["distinct_products"], 1);
}
