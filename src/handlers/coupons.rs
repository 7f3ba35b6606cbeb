use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    entities::coupon,
    errors::ServiceError,
    repositories::{
        coupon_repository::{CouponValidation, CreateCoupon, UpdateCoupon},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CouponListQuery {
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ValidateQuery {
    /// Order amount the coupon would apply to
    #[param(value_type = String, example = "120.00")]
    pub amount: Decimal,
}

#[utoipa::path(
    get,
    path = "/api/v1/gift",
    summary = "List coupons",
    params(CouponListQuery),
    responses((status = 200, description = "Paginated coupons, newest first")),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<CouponListQuery>,
) -> ApiResult<PaginatedResponse<coupon::Model>> {
    let page = state
        .repos
        .coupons
        .list(query.is_active, Pagination::new(query.page, query.limit))
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/gift/{id}",
    summary = "Get coupon",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<coupon::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.coupons.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/gift/validate/{code}",
    summary = "Check a coupon against an amount",
    description = "Reports why a code is unusable instead of failing",
    params(("code" = String, Path, description = "Coupon code"), ValidateQuery),
    responses(
        (status = 200, description = "Validation outcome", body = ApiResponse<CouponValidation>),
        (status = 400, description = "Missing or malformed amount", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<CouponValidation> {
    let outcome = state
        .repos
        .coupons
        .validate_code(&code, query.amount, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/gift",
    summary = "Create coupon",
    request_body = CreateCoupon,
    responses(
        (status = 201, description = "Coupon created"),
        (status = 409, description = "Code taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CreateCoupon>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.coupons.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/gift/{id}",
    summary = "Update coupon",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCoupon,
    responses(
        (status = 200, description = "Coupon updated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCoupon>,
) -> ApiResult<coupon::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.coupons.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/gift/{id}",
    summary = "Delete coupon",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
