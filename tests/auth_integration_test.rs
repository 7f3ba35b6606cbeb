mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use commerce_admin_api::repositories::user_repository::CreateUser;
use common::{body_json, expect_data, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};

#[tokio::test]
async fn login_returns_token_pair() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            None,
            &[],
        )
        .await;
    let data = expect_data(response, StatusCode::OK).await;

    assert_eq!(data["email"], ADMIN_EMAIL);
    assert_eq!(data["token_type"], "Bearer");
    assert!(data["access_token"].as_str().unwrap().len() > 20);
    assert!(data["refresh_token"].is_string());
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": "not-the-password" })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID_CREDENTIALS");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    let response = app
        .send(Method::GET, "/api/v1/product", None, None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(Method::GET, "/api/v1/product", None, Some("garbage"), &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_describes_the_caller() {
    let app = TestApp::new().await;

    let data = expect_data(
        app.admin(Method::GET, "/api/v1/auth/me", None).await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(data["user_id"], app.admin_id.to_string());
    assert_eq!(data["guard"], "api");
    let roles = data["roles"].as_array().unwrap();
    assert!(roles.iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let app = TestApp::new().await;
    let (_, tokens) = app
        .state
        .auth
        .login(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();
    let token = tokens.access_token.as_str();

    let response = app
        .send(Method::POST, "/api/v1/auth/logout", None, Some(token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send(Method::GET, "/api/v1/auth/me", None, Some(token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_REVOKED_TOKEN");

    // Other sessions of the same user are unaffected.
    let response = app.admin(Method::GET, "/api/v1/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = TestApp::new().await;
    let (_, tokens) = app
        .state
        .auth
        .login(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();

    let data = expect_data(
        app.send(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": tokens.refresh_token })),
            None,
            &[],
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let fresh_access = data["access_token"].as_str().unwrap().to_string();

    let response = app
        .send(
            Method::GET,
            "/api/v1/auth/me",
            None,
            Some(&fresh_access),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let replay = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": tokens.refresh_token })),
            None,
            &[],
        )
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_cannot_be_used_to_refresh() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": app.token() })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_are_kept_out_of_staff_routes() {
    let app = TestApp::new().await;
    app.create_customer("shopper@example.com").await;
    let token = app.customer_token("shopper@example.com").await;

    let response = app
        .send(Method::GET, "/api/v1/product", None, Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let data = expect_data(
        app.send(Method::GET, "/api/v1/auth/me", None, Some(&token), &[])
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(data["guard"], "customer");
}

#[tokio::test]
async fn viewer_role_can_read_but_not_write() {
    let app = TestApp::new().await;
    let viewer = app.state.repos.roles.find_by_name("viewer").await.unwrap();
    app.state
        .repos
        .users
        .create(CreateUser {
            name: "Read Only".to_string(),
            email: "viewer@example.com".to_string(),
            password: "viewer-password".to_string(),
            is_active: Some(true),
            role_ids: vec![viewer.id],
        })
        .await
        .unwrap();
    let (_, tokens) = app
        .state
        .auth
        .login("viewer@example.com", "viewer-password")
        .await
        .unwrap();
    let token = tokens.access_token.as_str();

    let response = app
        .send(Method::GET, "/api/v1/product", None, Some(token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            Method::POST,
            "/api/v1/category",
            Some(json!({ "name": "Shoes" })),
            Some(token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn deactivated_user_cannot_log_in() {
    let app = TestApp::new().await;
    let created = app
        .state
        .repos
        .users
        .create(CreateUser {
            name: "Leaver".to_string(),
            email: "leaver@example.com".to_string(),
            password: "leaver-password".to_string(),
            is_active: Some(true),
            role_ids: vec![],
        })
        .await
        .unwrap();

    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/user/{}/deactivate", created.user.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "leaver@example.com", "password": "leaver-password" })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admins_cannot_deactivate_themselves() {
    let app = TestApp::new().await;

    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/user/{}/deactivate", app.admin_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
