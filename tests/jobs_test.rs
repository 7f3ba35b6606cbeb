mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce_admin_api::{
    jobs::{run_job, JobKind},
    repositories::{email_repository::DraftEmail, user_repository::CreateUser},
};
use common::{expect_data, TestApp};

#[tokio::test]
async fn stale_orders_are_escalated_once() {
    let app = TestApp::new().await;
    let customer = app.create_customer("patient@example.com").await;
    let product = app.create_product("DESK", dec!(199.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    app.add_stock(product.id, warehouse.id, 2, None, None).await;
    let order = expect_data(
        app.admin(
            Method::POST,
            "/api/v1/order",
            Some(json!({
                "customer_id": customer.id,
                "items": [{ "product_id": product.id, "quantity": 1 }]
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    // Nothing is late yet.
    let now = Utc::now();
    assert_eq!(
        run_job(&app.jobs(), JobKind::EscalateDelayedOrders, now)
            .await
            .unwrap(),
        0
    );

    let later = now + Duration::hours(72);
    assert_eq!(
        run_job(&app.jobs(), JobKind::EscalateDelayedOrders, later)
            .await
            .unwrap(),
        1
    );
    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ops@example.com");
    assert!(sent[0]
        .subject
        .contains(order["order_number"].as_str().unwrap()));

    let escalated = expect_data(
        app.admin(Method::GET, "/api/v1/order?escalated=true", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(escalated["total"], 1);

    assert_eq!(
        run_job(&app.jobs(), JobKind::EscalateDelayedOrders, later)
            .await
            .unwrap(),
        0
    );
    assert_eq!(app.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn deactivated_staff_lose_their_sessions() {
    let app = TestApp::new().await;
    let viewer = app.state.repos.roles.find_by_name("viewer").await.unwrap();
    let created = app
        .state
        .repos
        .users
        .create(CreateUser {
            name: "Temp".to_string(),
            email: "temp@example.com".to_string(),
            password: "temp-password".to_string(),
            is_active: Some(true),
            role_ids: vec![viewer.id],
        })
        .await
        .unwrap();
    let (_, tokens) = app
        .state
        .auth
        .login("temp@example.com", "temp-password")
        .await
        .unwrap();

    app.state
        .repos
        .users
        .set_active(created.user.id, false)
        .await
        .unwrap();

    let revoked = run_job(&app.jobs(), JobKind::LogoutDeactivatedUsers, Utc::now())
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let response = app
        .send(
            Method::GET,
            "/api/v1/product",
            None,
            Some(&tokens.access_token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Already handled users are not picked up again; the admin is untouched.
    assert_eq!(
        run_job(&app.jobs(), JobKind::LogoutDeactivatedUsers, Utc::now())
            .await
            .unwrap(),
        0
    );
    let response = app.admin(Method::GET, "/api/v1/product", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn trash_is_purged_after_the_retention_window() {
    let app = TestApp::new().await;
    let emails = &app.state.repos.emails;
    let draft = emails
        .draft(
            app.admin_id,
            common::ADMIN_EMAIL,
            DraftEmail {
                to: "someone@example.com".to_string(),
                subject: "Old news".to_string(),
                body: "Nothing to see".to_string(),
            },
        )
        .await
        .unwrap();
    emails.trash(app.admin_id, draft.id).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        run_job(&app.jobs(), JobKind::AutoDeleteTrashedEmails, now)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        run_job(
            &app.jobs(),
            JobKind::AutoDeleteTrashedEmails,
            now + Duration::days(31)
        )
        .await
        .unwrap(),
        1
    );

    let response = app
        .admin(Method::GET, &format!("/api/v1/email/{}", draft.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idle_customer_carts_get_one_reminder() {
    let app = TestApp::new().await;
    let product = app.create_product("SOFA", dec!(499.00)).await;
    let warehouse = app.create_warehouse("MAIN").await;
    app.add_stock(product.id, warehouse.id, 3, None, None).await;
    app.create_customer("idle@example.com").await;
    let token = app.customer_token("idle@example.com").await;

    app.send(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": product.id, "quantity": 1 })),
        Some(&token),
        &[],
    )
    .await;
    // Guest carts never get reminders.
    app.send(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": product.id, "quantity": 1 })),
        None,
        &[("x-cart-session", "anonymous")],
    )
    .await;

    let later = Utc::now() + Duration::hours(25);
    assert_eq!(
        run_job(&app.jobs(), JobKind::CartAbandonmentReminder, later)
            .await
            .unwrap(),
        1
    );
    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "idle@example.com");

    assert_eq!(
        run_job(&app.jobs(), JobKind::CartAbandonmentReminder, later)
            .await
            .unwrap(),
        0
    );

    // Coming back revives the cart with its lines.
    let cart = expect_data(
        app.send(Method::GET, "/api/v1/cart", None, Some(&token), &[])
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["status"], "active");
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}
