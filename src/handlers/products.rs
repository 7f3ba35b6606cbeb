use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    entities::product,
    errors::ServiceError,
    repositories::product_repository::{
        CreateProduct, ProductQuery, ProductStockSummary, UpdateProduct,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

/// Unknown query keys are ignored; malformed values of known keys are 422.
#[utoipa::path(
    get,
    path = "/api/v1/product",
    summary = "List products",
    params(
        ("category_id" = Option<Uuid>, Query, description = "Filter by category"),
        ("status" = Option<String>, Query, description = "draft, active or archived"),
        ("brand" = Option<String>, Query, description = "Exact brand"),
        ("is_featured" = Option<bool>, Query, description = "Featured flag"),
        ("min_price" = Option<String>, Query, description = "Lowest price, inclusive"),
        ("max_price" = Option<String>, Query, description = "Highest price, inclusive"),
        ("search" = Option<String>, Query, description = "Name or SKU contains"),
        ("sort_by" = Option<String>, Query, description = "name, price, created_at or sku"),
        ("sort_order" = Option<String>, Query, description = "asc or desc (default desc)"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Paginated products"),
        (status = 422, description = "Malformed filter value", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    let query = ProductQuery::from_params(&params)?;
    Ok(Json(ApiResponse::success(
        state.repos.products.list(&query).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/product/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.products.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/product/{id}/stock",
    summary = "Stock across warehouses",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "On-hand, reserved and available units", body = ApiResponse<ProductStockSummary>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn product_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductStockSummary> {
    Ok(Json(ApiResponse::success(
        state.repos.products.stock_summary(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/product",
    summary = "Create product",
    request_body = CreateProduct,
    responses(
        (status = 201, description = "Product created"),
        (status = 409, description = "SKU or slug taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProduct>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.products.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/product/{id}",
    summary = "Update product",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProduct,
    responses(
        (status = 200, description = "Product updated"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount price above price", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProduct>,
) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.products.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/product/{id}",
    summary = "Soft delete product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/product/{id}/restore",
    summary = "Restore product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product restored"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn restore_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.products.restore(id).await?,
    )))
}
