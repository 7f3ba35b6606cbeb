use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    repositories::{
        order_repository::{CreateOrder, OrderDetails, OrderFilter},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// pending, processing, shipped, delivered or cancelled
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
    /// Placed at or after (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Placed at or before (RFC 3339)
    pub to: Option<DateTime<Utc>>,
    pub escalated: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl OrderListQuery {
    fn filter(&self) -> Result<OrderFilter, ServiceError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(OrderStatus::from_str(&raw.to_ascii_lowercase()).map_err(|_| {
                ServiceError::ValidationError(format!("status: unknown order status '{}'", raw))
            })?),
        };
        Ok(OrderFilter {
            status,
            customer_id: self.customer_id,
            from: self.from,
            to: self.to,
            escalated: self.escalated,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[schema(value_type = String, example = "processing")]
    pub status: OrderStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/order",
    summary = "List orders",
    description = "Get a paginated list of orders with optional filtering",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invalid filter", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let filter = query.filter()?;
    let page = state
        .repos
        .orders
        .list(&filter, Pagination::new(query.page, query.limit))
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/order/{id}",
    summary = "Get order",
    description = "Order with its items and current stock allocations",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    Ok(Json(ApiResponse::success(
        state.repos.orders.details(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/order",
    summary = "Create order",
    description = "Prices the lines, redeems the coupon and allocates stock in one transaction",
    request_body = CreateOrder,
    responses(
        (status = 201, description = "Order created successfully"),
        (status = 400, description = "Unsellable product or unusable coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer or product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error or insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrder>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state
        .repos
        .orders
        .create(request, Some(auth_user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

#[utoipa::path(
    put,
    path = "/api/v1/order/{id}/status",
    summary = "Change order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<order::Model> {
    let updated = state
        .repos
        .orders
        .update_status(id, request.status, Some(auth_user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    post,
    path = "/api/v1/order/{id}/cancel",
    summary = "Cancel order",
    description = "Cancels a pending or processing order and releases its stock",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<order::Model> {
    Ok(Json(ApiResponse::success(
        state
            .repos
            .orders
            .cancel(id, Some(auth_user.user_id))
            .await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/order/{id}",
    summary = "Soft delete order",
    description = "Only delivered or cancelled orders can be deleted",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 400, description = "Order still open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.orders.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/order/{id}/restore",
    summary = "Restore order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order restored"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn restore_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<order::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.orders.restore(id).await?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_is_parsed_case_insensitively() {
        let query = OrderListQuery {
            status: Some("Shipped".into()),
            ..Default::default()
        };
        assert_eq!(query.filter().unwrap().status, Some(OrderStatus::Shipped));

        let bad = OrderListQuery {
            status: Some("lost".into()),
            ..Default::default()
        };
        assert!(matches!(bad.filter(), Err(ServiceError::ValidationError(_))));
    }
}
