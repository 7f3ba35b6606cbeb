use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::email,
    errors::ServiceError,
    repositories::{
        email_repository::{DraftEmail, MailboxFolder, SendEmail},
        Pagination,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MailboxQuery {
    /// inbox (default), sent, draft or trash
    pub folder: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmptyTrashResponse {
    pub deleted: u64,
}

fn sender_of(auth_user: &AuthUser) -> Result<&str, ServiceError> {
    auth_user
        .email
        .as_deref()
        .ok_or_else(|| ServiceError::Unauthorized("Token carries no e-mail address".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/v1/email",
    summary = "List a mailbox folder",
    params(MailboxQuery),
    responses(
        (status = 200, description = "Paginated messages, newest first"),
        (status = 422, description = "Unknown folder", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn list_emails(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<MailboxQuery>,
) -> ApiResult<PaginatedResponse<email::Model>> {
    let folder = match query.folder.as_deref() {
        Some(raw) if !raw.trim().is_empty() => MailboxFolder::from_str(raw)?,
        _ => MailboxFolder::default(),
    };
    let page = state
        .repos
        .emails
        .list(
            auth_user.user_id,
            folder,
            Pagination::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/email/{id}",
    summary = "Open a message",
    description = "Marks the message read",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 200, description = "Message"),
        (status = 404, description = "Not in the caller's mailbox", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn get_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<email::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.emails.get(auth_user.user_id, id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/email/send",
    summary = "Send a message",
    description = "Delivers through the mailer, keeps a sent copy and drops an inbox copy for known users",
    request_body = SendEmail,
    responses(
        (status = 201, description = "Sent copy"),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
        (status = 500, description = "Mail delivery failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn send_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<SendEmail>,
) -> Result<impl IntoResponse, ServiceError> {
    let sender = sender_of(&auth_user)?;
    let sent = state
        .repos
        .emails
        .send(auth_user.user_id, sender, payload, state.mailer.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(sent))))
}

#[utoipa::path(
    post,
    path = "/api/v1/email/draft",
    summary = "Save a draft",
    request_body = DraftEmail,
    responses((status = 201, description = "Draft saved")),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn save_draft(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<DraftEmail>,
) -> Result<impl IntoResponse, ServiceError> {
    let sender = sender_of(&auth_user)?;
    let draft = state
        .repos
        .emails
        .draft(auth_user.user_id, sender, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(draft))))
}

#[utoipa::path(
    put,
    path = "/api/v1/email/{id}/star",
    summary = "Toggle the star",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 200, description = "Message"),
        (status = 404, description = "Not in the caller's mailbox", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn toggle_star(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<email::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.emails.toggle_star(auth_user.user_id, id).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/email/{id}",
    summary = "Move to trash",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 204, description = "Trashed"),
        (status = 404, description = "Not in the caller's mailbox", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn trash_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.repos.emails.trash(auth_user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/email/{id}/restore",
    summary = "Restore from trash",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 200, description = "Restored message"),
        (status = 404, description = "Not in the caller's mailbox", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn restore_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<email::Model> {
    Ok(Json(ApiResponse::success(
        state.repos.emails.restore(auth_user.user_id, id).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/email/{id}/force",
    summary = "Delete a trashed message permanently",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Message is not in the trash", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not in the caller's mailbox", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn force_delete_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .repos
        .emails
        .force_delete(auth_user.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/email/trash",
    summary = "Empty the trash",
    responses((status = 200, description = "Number of deleted messages", body = ApiResponse<EmptyTrashResponse>)),
    security(("Bearer" = [])),
    tag = "emails"
)]
pub async fn empty_trash(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<EmptyTrashResponse> {
    let deleted = state.repos.emails.empty_trash(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(EmptyTrashResponse { deleted })))
}
