mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{expect_data, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};

#[tokio::test]
async fn staff_writes_and_logins_are_audited() {
    let app = TestApp::new().await;

    expect_data(
        app.send(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            None,
            &[("user-agent", "audit-test")],
        )
        .await,
        StatusCode::OK,
    )
    .await;

    expect_data(
        app.admin(
            Method::POST,
            "/api/v1/category",
            Some(json!({ "name": "Garden" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    // Reads and failed writes leave no trace.
    app.admin(Method::GET, "/api/v1/category", None).await;
    let rejected = app
        .admin(Method::POST, "/api/v1/category", Some(json!({ "name": "" })))
        .await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let created = expect_data(
        app.admin(
            Method::GET,
            "/api/v1/user_activity?action=category.create",
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(created["total"], 1);
    let row = &created["items"][0];
    assert_eq!(row["user_id"], app.admin_id.to_string());
    assert_eq!(row["method"], "POST");
    assert_eq!(row["path"], "/api/v1/category");
    assert_eq!(row["status_code"], 201);

    let logins = expect_data(
        app.admin(Method::GET, "/api/v1/user_activity?action=auth.login", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(logins["total"], 1);
    assert_eq!(logins["items"][0]["user_agent"], "audit-test");

    let single = expect_data(
        app.admin(
            Method::GET,
            &format!(
                "/api/v1/user_activity/{}",
                row["id"].as_str().unwrap()
            ),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(single["action"], "category.create");
}

#[tokio::test]
async fn customer_cart_writes_are_not_audited() {
    let app = TestApp::new().await;
    app.create_customer("quiet@example.com").await;
    let token = app.customer_token("quiet@example.com").await;

    let response = app
        .send(Method::DELETE, "/api/v1/cart", None, Some(&token), &[])
        .await;
    assert!(response.status().is_success());

    let all = expect_data(
        app.admin(Method::GET, "/api/v1/user_activity", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(all["total"], 0);
}

#[tokio::test]
async fn pruning_validates_the_window() {
    let app = TestApp::new().await;
    app.admin(
        Method::POST,
        "/api/v1/category",
        Some(json!({ "name": "Tools" })),
    )
    .await;

    let response = app
        .admin(Method::DELETE, "/api/v1/user_activity/prune?days=0", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let pruned = expect_data(
        app.admin(Method::DELETE, "/api/v1/user_activity/prune?days=30", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(pruned["deleted"], 0);

    // The successful prune is itself recorded next to the category write.
    let all = expect_data(
        app.admin(Method::GET, "/api/v1/user_activity", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(all["total"], 2);
}
