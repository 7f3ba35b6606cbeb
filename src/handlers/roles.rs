use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    entities::{permission, role},
    errors::ServiceError,
    repositories::role_repository::{
        CreatePermission, CreateRole, RoleAssignment, RoleWithPermissions, SyncPermissions,
        UpdateRole,
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/role",
    summary = "List roles",
    responses((status = 200, description = "Roles ordered by name")),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn list_roles(State(state): State<AppState>) -> ApiResult<Vec<role::Model>> {
    Ok(Json(ApiResponse::success(state.repos.roles.list().await?)))
}

#[utoipa::path(
    get,
    path = "/api/v1/role/{id}",
    summary = "Get role with its permissions",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role"),
        (status = 404, description = "Role not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RoleWithPermissions> {
    Ok(Json(ApiResponse::success(state.repos.roles.get(id).await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/role",
    summary = "Create role",
    request_body = CreateRole,
    responses(
        (status = 201, description = "Role created"),
        (status = 409, description = "Role name taken", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<CreateRole>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.roles.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/role/{id}",
    summary = "Update role",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "Role updated"),
        (status = 404, description = "Role not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRole>,
) -> ApiResult<role::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.roles.update(id, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/role/{id}",
    summary = "Delete role",
    description = "Removes the role together with its permission links and user assignments.",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.roles.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/v1/role/{id}/permissions",
    summary = "Replace the role's permissions",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = SyncPermissions,
    responses(
        (status = 200, description = "Permissions synced"),
        (status = 400, description = "Unknown permission names", body = crate::errors::ErrorResponse),
        (status = 404, description = "Role not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn sync_permissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SyncPermissions>,
) -> ApiResult<RoleWithPermissions> {
    Ok(Json(ApiResponse::success(
        state
            .repos
            .roles
            .sync_permissions(id, &payload.permissions)
            .await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/role/permissions",
    summary = "List permissions",
    responses((status = 200, description = "Permissions ordered by name")),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn list_permissions(
    State(state): State<AppState>,
) -> ApiResult<Vec<permission::Model>> {
    Ok(Json(ApiResponse::success(
        state.repos.roles.list_permissions().await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/role/permissions",
    summary = "Create permission",
    request_body = CreatePermission,
    responses(
        (status = 201, description = "Permission created"),
        (status = 409, description = "Permission exists", body = crate::errors::ErrorResponse),
        (status = 422, description = "Name is not `resource:action`", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<CreatePermission>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.repos.roles.create_permission(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    post,
    path = "/api/v1/role/assign",
    summary = "Assign a role to a user",
    request_body = RoleAssignment,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 404, description = "User or role not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Json(payload): Json<RoleAssignment>,
) -> Result<StatusCode, ServiceError> {
    state
        .repos
        .roles
        .assign(payload.user_id, payload.role_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/role/revoke",
    summary = "Revoke a role from a user",
    request_body = RoleAssignment,
    responses(
        (status = 204, description = "Role revoked"),
        (status = 404, description = "Role not assigned", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "roles"
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    Json(payload): Json<RoleAssignment>,
) -> Result<StatusCode, ServiceError> {
    state
        .repos
        .roles
        .revoke(payload.user_id, payload.role_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
