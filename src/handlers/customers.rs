use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::PageQuery;
use crate::{
    entities::{customer, order},
    errors::ServiceError,
    repositories::{
        customer_repository::{CreateCustomer, UpdateCustomer},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerSearchParams {
    /// Matches first name, last name or e-mail
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/customer",
    summary = "List customers",
    params(CustomerSearchParams),
    responses(
        (status = 200, description = "Paginated customers"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(params): Query<CustomerSearchParams>,
) -> ApiResult<PaginatedResponse<customer::Model>> {
    let page = state
        .repos
        .customers
        .list(
            params.search.as_deref(),
            Pagination::new(params.page, params.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/{id}",
    summary = "Get customer",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<customer::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.customers.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/{id}/orders",
    summary = "Orders of a customer",
    params(("id" = Uuid, Path, description = "Customer ID"), PageQuery),
    responses(
        (status = 200, description = "Paginated orders, newest first"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn customer_orders(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.customers.orders(id, page.into()).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer",
    summary = "Create customer",
    description = "A customer created with a password can log in through the customer guard.",
    request_body = CreateCustomer,
    responses(
        (status = 201, description = "Customer created"),
        (status = 409, description = "E-mail taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomer>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.customers.create(payload).await?;
    info!(customer_id = %created.id, "customer created");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/{id}",
    summary = "Update customer",
    params(("id" = Uuid, Path, description = "Customer ID")),
    request_body = UpdateCustomer,
    responses(
        (status = 200, description = "Customer updated"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "E-mail taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomer>,
) -> ApiResult<customer::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.customers.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/{id}",
    summary = "Soft delete customer",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.customers.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/{id}/restore",
    summary = "Restore customer",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer restored"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn restore_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<customer::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.customers.restore(id).await?,
    )))
}
