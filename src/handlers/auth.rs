use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{bearer_token, AuthError, AuthUser, TokenPair},
    rate_limiter::client_ip,
    repositories::user_activity_repository::NewActivity,
    ApiResponse, AppState,
};

/// Login request payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

async fn record_session_event(
    state: &AppState,
    user_id: Uuid,
    action: &str,
    path: &str,
    headers: &HeaderMap,
) {
    let entry = NewActivity {
        user_id,
        action: action.to_string(),
        method: "POST".to_string(),
        path: path.to_string(),
        status_code: StatusCode::OK.as_u16(),
        ip_address: client_ip(headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(255).collect()),
    };
    if let Err(e) = state.repos.activities.record(entry).await {
        warn!(error = %e, user_id = %user_id, "failed to record {}", action);
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    summary = "Back-office login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials or disabled account"),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AuthError> {
    if payload.validate().is_err() {
        return Err(AuthError::InvalidCredentials);
    }
    let (user, tokens) = state.auth.login(&payload.email, &payload.password).await?;
    record_session_event(&state, user.id, "auth.login", "/api/v1/auth/login", &headers).await;

    Ok(Json(ApiResponse::success(LoginResponse {
        user_id: user.id,
        name: user.name,
        email: user.email,
        tokens,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/customer/login",
    summary = "Customer login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Customer token pair issued", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials or disabled account"),
    ),
    tag = "auth"
)]
pub async fn customer_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AuthError> {
    if payload.validate().is_err() {
        return Err(AuthError::InvalidCredentials);
    }
    let (customer, tokens) = state
        .auth
        .customer_login(&payload.email, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        user_id: customer.id,
        name: customer.full_name(),
        email: customer.email,
        tokens,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    summary = "Exchange a refresh token",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenPair>),
        (status = 401, description = "Invalid, expired or revoked refresh token"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AuthError> {
    let tokens = state.auth.refresh_token(&payload.refresh_token).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    summary = "Revoke the presented access token",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
) -> Result<StatusCode, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingAuth)?;
    state.auth.revoke_token(token).await?;
    if !auth_user.is_customer() {
        record_session_event(
            &state,
            auth_user.user_id,
            "auth.logout",
            "/api/v1/auth/logout",
            &headers,
        )
        .await;
    }
    info!(subject = %auth_user.user_id, "logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    summary = "Current caller",
    responses(
        (status = 200, description = "Claims of the caller", body = ApiResponse<AuthUser>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn me(auth_user: AuthUser) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::success(auth_user))
}
