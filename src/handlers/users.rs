use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::user,
    errors::ServiceError,
    repositories::{
        user_repository::{CreateUser, UpdateUser, UserWithRoles},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Matches name or e-mail
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/user",
    summary = "List users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Paginated users"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<PaginatedResponse<user::Model>> {
    let page = state
        .repos
        .users
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
    path = "/api/v1/user/{id}",
    summary = "Get user with roles",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserWithRoles> {
    Ok(Json(ApiResponse::success(state.repos.users.get(id).await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/user",
    summary = "Create user",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Unknown role", body = crate::errors::ErrorResponse),
        (status = 409, description = "E-mail already taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.users.create(payload).await?;
    info!(user_id = %created.user.id, by = %auth_user.user_id, "user created");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/user/{id}",
    summary = "Update user",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "E-mail already taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> ApiResult<user::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.users.update(id, payload).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/user/{id}/deactivate",
    summary = "Deactivate user",
    description = "Blocks further logins. Issued tokens are revoked by the logout job.",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 400, description = "Cannot deactivate yourself", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<user::Model> {
    if id == auth_user.user_id {
        return Err(ServiceError::InvalidOperation(
            "Cannot deactivate your own account".to_string(),
        ));
    }
    let updated = state.repos.users.set_active(id, false).await?;
    info!(user_id = %id, by = %auth_user.user_id, "user deactivated");
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    post,
    path = "/api/v1/user/{id}/activate",
    summary = "Activate user",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User activated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<user::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.users.set_active(id, true).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/user/{id}",
    summary = "Soft delete user",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    if id == auth_user.user_id {
        return Err(ServiceError::InvalidOperation(
            "Cannot delete your own account".to_string(),
        ));
    }
    state.repos.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/user/{id}/restore",
    summary = "Restore soft-deleted user",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User restored"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn restore_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<user::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.users.restore(id).await?,
    )))
}
