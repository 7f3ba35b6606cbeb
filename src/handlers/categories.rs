use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    entities::product_category,
    errors::ServiceError,
    repositories::category_repository::{CreateCategory, UpdateCategory},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/category",
    summary = "List categories",
    description = "Served from the category cache when warm.",
    responses((status = 200, description = "Categories ordered by name")),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Vec<product_category::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.categories.list_all().await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/category/{id}",
    summary = "Get category",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category"),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product_category::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.categories.find_by_id(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/category",
    summary = "Create category",
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created"),
        (status = 409, description = "Slug taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategory>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.categories.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/category/{id}",
    summary = "Update category",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = UpdateCategory,
    responses(
        (status = 200, description = "Category updated"),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategory>,
) -> ApiResult<product_category::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.categories.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/category/{id}",
    summary = "Soft delete category",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 400, description = "Category still has products", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/category/{id}/restore",
    summary = "Restore category",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category restored"),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn restore_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product_category::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.categories.restore(id).await?,
    )))
}
