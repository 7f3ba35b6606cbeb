use axum::extract::{Json, Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    entities::user_activity,
    repositories::Pagination,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    pub user_id: Option<Uuid>,
    /// e.g. `product.create`
    pub action: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PruneQuery {
    /// Rows older than this many days are removed (1 - 3650)
    pub days: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PruneResponse {
    pub deleted: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/user_activity",
    summary = "List audited requests",
    params(ActivityQuery),
    responses((status = 200, description = "Paginated activity, newest first")),
    security(("Bearer" = [])),
    tag = "activity"
)]
pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<PaginatedResponse<user_activity::Model>> {
    let page = state
        .repos
        .activities
        .list(
            query.user_id,
            query.action.as_deref(),
            Pagination::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/user_activity/{id}",
    summary = "Get an activity row",
    params(("id" = Uuid, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Activity row"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "activity"
)]
pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<user_activity::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.activities.get(id).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/user_activity/prune",
    summary = "Prune old activity",
    params(PruneQuery),
    responses(
        (status = 200, description = "Number of deleted rows", body = ApiResponse<PruneResponse>),
        (status = 422, description = "days out of range", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "activity"
)]
pub async fn prune_activity(
    State(state): State<AppState>,
    Query(query): Query<PruneQuery>,
) -> ApiResult<PruneResponse> {
    let deleted = state
        .repos
        .activities
        .prune(query.days, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(PruneResponse { deleted })))
}
