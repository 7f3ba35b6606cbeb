use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{inventory_allocation, inventory_log, inventory_stock, warehouse},
    errors::ServiceError,
    repositories::{
        inventory_repository::{
            AdjustStock, CreateStock, CreateWarehouse, DemandForecast, TransferResult,
            TransferStock, UpdateStock, UpdateWarehouse,
        },
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

const DEFAULT_EXPIRY_HORIZON_DAYS: u32 = 30;
const DEFAULT_FORECAST_DAYS: u32 = 30;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockListQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExpiringQuery {
    /// Look-ahead in days (default 30, max 365)
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ForecastQuery {
    /// Days of sales history to average (default 30)
    pub window_days: Option<u32>,
    /// Days to project (default 30)
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleaseResponse {
    pub order_id: Uuid,
    pub released_units: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    summary = "List stock rows",
    params(StockListQuery),
    responses((status = 200, description = "Paginated stock rows")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_stock(
    State(state): State<AppState>,
    Query(query): Query<StockListQuery>,
) -> ApiResult<PaginatedResponse<inventory_stock::Model>> {
    let page = state
        .repos
        .inventory
        .list(
            query.product_id,
            query.warehouse_id,
            query.supplier_id,
            Pagination::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    summary = "Get stock row",
    params(("id" = Uuid, Path, description = "Stock row ID")),
    responses(
        (status = 200, description = "Stock row"),
        (status = 404, description = "Stock row not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_stock::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    summary = "Create stock row",
    request_body = CreateStock,
    responses(
        (status = 201, description = "Stock row created"),
        (status = 404, description = "Product, warehouse or supplier not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Row exists for product, warehouse and batch", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn create_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateStock>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .repos
        .inventory
        .create(payload, Some(auth_user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{id}",
    summary = "Update stock row attributes",
    description = "Quantities change only through adjust, transfer and allocation",
    params(("id" = Uuid, Path, description = "Stock row ID")),
    request_body = UpdateStock,
    responses(
        (status = 200, description = "Stock row updated"),
        (status = 404, description = "Stock row not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStock>,
) -> ApiResult<inventory_stock::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/inventory/{id}",
    summary = "Delete stock row",
    params(("id" = Uuid, Path, description = "Stock row ID")),
    responses(
        (status = 204, description = "Stock row deleted"),
        (status = 400, description = "Row holds reserved units", body = crate::errors::ErrorResponse),
        (status = 404, description = "Stock row not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn delete_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.inventory.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/warehouses",
    summary = "List warehouses",
    responses((status = 200, description = "Warehouses ordered by code")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_warehouses(State(state): State<AppState>) -> ApiResult<Vec<warehouse::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.list_warehouses().await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/warehouses",
    summary = "Create warehouse",
    request_body = CreateWarehouse,
    responses(
        (status = 201, description = "Warehouse created"),
        (status = 409, description = "Code taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(payload): Json<CreateWarehouse>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.inventory.create_warehouse(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/warehouses/{id}",
    summary = "Update warehouse",
    params(("id" = Uuid, Path, description = "Warehouse ID")),
    request_body = UpdateWarehouse,
    responses(
        (status = 200, description = "Warehouse updated"),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn update_warehouse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWarehouse>,
) -> ApiResult<warehouse::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.update_warehouse(id, payload).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/adjust",
    summary = "Adjust on-hand quantity",
    params(("id" = Uuid, Path, description = "Stock row ID")),
    request_body = AdjustStock,
    responses(
        (status = 200, description = "Stock adjusted"),
        (status = 404, description = "Stock row not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Would fall below reserved units", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStock>,
) -> ApiResult<inventory_stock::Model> {
    let adjusted = state
        .repos
        .inventory
        .adjust(id, payload, Some(auth_user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(adjusted)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfer",
    summary = "Move stock between warehouses",
    description = "Takes available units from the source in FEFO order; all or nothing",
    request_body = TransferStock,
    responses(
        (status = 200, description = "Transfer completed", body = ApiResponse<TransferResult>),
        (status = 400, description = "Same warehouse or inactive warehouse", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough available units", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn transfer_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<TransferStock>,
) -> ApiResult<TransferResult> {
    let result = state
        .repos
        .inventory
        .transfer(payload, Some(auth_user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/allocate/{order_id}",
    summary = "Reserve stock for an order",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Allocations of the order"),
        (status = 400, description = "Order is no longer open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough available units", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn allocate_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<inventory_allocation::Model>> {
    Ok(Json(ApiResponse::success(
        state
            .repos
            .inventory
            .allocate(order_id, Some(auth_user.user_id))
            .await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/release/{order_id}",
    summary = "Release an order's reserved stock",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Units released", body = ApiResponse<ReleaseResponse>),
        (status = 400, description = "Order is no longer open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn release_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<ReleaseResponse> {
    let released_units = state
        .repos
        .inventory
        .release(order_id, Some(auth_user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(ReleaseResponse {
        order_id,
        released_units,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/allocations/{order_id}",
    summary = "Allocations of an order",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses((status = 200, description = "Allocation rows, oldest first")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn order_allocations(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<inventory_allocation::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.allocations_for(order_id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/auto-restock",
    summary = "Restock rows at or below their reorder point",
    responses((status = 200, description = "Restocked rows")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn auto_restock(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<inventory_stock::Model>> {
    let restocked = state
        .repos
        .inventory
        .auto_restock(Some(auth_user.user_id))
        .await?;
    info!(count = restocked.len(), "auto-restock run");
    Ok(Json(ApiResponse::success(restocked)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    summary = "Rows at or below their reorder point",
    responses((status = 200, description = "Low stock rows")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn low_stock(State(state): State<AppState>) -> ApiResult<Vec<inventory_stock::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.low_stock().await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/expiring",
    summary = "Rows expiring soon",
    params(ExpiringQuery),
    responses(
        (status = 200, description = "Rows expiring within the look-ahead"),
        (status = 422, description = "days out of range", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn expiring_stock(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> ApiResult<Vec<inventory_stock::Model>> {
    let days = query.days.unwrap_or(DEFAULT_EXPIRY_HORIZON_DAYS);
    if !(1..=365).contains(&days) {
        return Err(ServiceError::ValidationError(
            "days: must be between 1 and 365".to_string(),
        ));
    }
    Ok(Json(ApiResponse::success(
        state.repos.inventory.expiring(days, Utc::now()).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/expired",
    summary = "Expired rows still holding units",
    responses((status = 200, description = "Expired rows")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn expired_stock(
    State(state): State<AppState>,
) -> ApiResult<Vec<inventory_stock::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.inventory.expired(Utc::now()).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/logs",
    summary = "Stock movement log",
    params(LogQuery),
    responses((status = 200, description = "Paginated movements, newest first")),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn stock_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<PaginatedResponse<inventory_log::Model>> {
    let page = state
        .repos
        .inventory
        .logs(
            query.product_id,
            query.warehouse_id,
            Pagination::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/forecast/{product_id}",
    summary = "Demand forecast",
    description = "Moving average of units sold, projected over the horizon",
    params(("product_id" = Uuid, Path, description = "Product ID"), ForecastQuery),
    responses(
        (status = 200, description = "Forecast", body = ApiResponse<DemandForecast>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Window or horizon out of range", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn forecast(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<DemandForecast> {
    let forecast = state
        .repos
        .inventory
        .forecast(
            product_id,
            query.window_days.unwrap_or(DEFAULT_FORECAST_DAYS),
            query.horizon_days.unwrap_or(DEFAULT_FORECAST_DAYS),
            Utc::now(),
        )
        .await?;
    Ok(Json(ApiResponse::success(forecast)))
}
