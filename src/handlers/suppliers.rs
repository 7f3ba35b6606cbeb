use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    entities::supplier,
    errors::ServiceError,
    repositories::{
        supplier_repository::{CreateSupplier, SupplierStockSummary, UpdateSupplier},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierListQuery {
    /// Matches name, e-mail or contact person
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/supplier",
    summary = "List suppliers",
    params(SupplierListQuery),
    responses((status = 200, description = "Paginated suppliers")),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<SupplierListQuery>,
) -> ApiResult<PaginatedResponse<supplier::Model>> {
    let page = state
        .repos
        .suppliers
        .list(
            query.search.as_deref(),
            query.is_active,
            Pagination::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/supplier/{id}",
    summary = "Get supplier",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.suppliers.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/supplier/{id}/stock",
    summary = "Stock supplied",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Stock summary", body = ApiResponse<SupplierStockSummary>),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn supplier_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SupplierStockSummary> {
    Ok(Json(ApiResponse::success(
        state.repos.suppliers.stock_summary(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/supplier",
    summary = "Create supplier",
    request_body = CreateSupplier,
    responses(
        (status = 201, description = "Supplier created"),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    Json(payload): Json<CreateSupplier>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.suppliers.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/supplier/{id}",
    summary = "Update supplier",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    request_body = UpdateSupplier,
    responses(
        (status = 200, description = "Supplier updated"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSupplier>,
) -> ApiResult<supplier::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.suppliers.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/supplier/{id}",
    summary = "Soft delete supplier",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 204, description = "Supplier deleted"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.suppliers.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/supplier/{id}/restore",
    summary = "Restore supplier",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier restored"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "suppliers"
)]
pub async fn restore_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.suppliers.restore(id).await?,
    )))
}
