use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, paginate, BaseRepository, Pagination, Repository};
use crate::auth::password::hash_password;
use crate::entities::{role, user, user_role};
use crate::errors::ServiceError;
use crate::PaginatedResponse;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: user::Model,
    pub roles: Vec<String>,
}

/// Back-office users.
#[derive(Debug)]
pub struct UserRepository {
    base: BaseRepository,
}

impl UserRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .filter(user::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<UserWithRoles, ServiceError> {
        let found = self.find_by_id(id).await?;
        let mut roles: Vec<String> = found
            .find_related(role::Entity)
            .all(self.get_db())
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        roles.sort();
        Ok(UserWithRoles { user: found, roles })
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        search: Option<&str>,
        is_active: Option<bool>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<user::Model>, ServiceError> {
        let mut select = user::Entity::find().filter(user::Column::DeletedAt.is_null());
        if let Some(term) = search.filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            select = select.filter(
                Condition::any()
                    .add(user::Column::Name.like(pattern.as_str()))
                    .add(user::Column::Email.like(pattern.to_lowercase())),
            );
        }
        if let Some(is_active) = is_active {
            select = select.filter(user::Column::IsActive.eq(is_active));
        }
        let select = select
            .order_by_asc(user::Column::Name)
            .order_by_asc(user::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: CreateUser) -> Result<UserWithRoles, ServiceError> {
        input.validate()?;
        let password_hash = hash_password(&input.password)?;

        if !input.role_ids.is_empty() {
            let found = role::Entity::find()
                .filter(role::Column::Id.is_in(input.role_ids.iter().copied()))
                .all(self.get_db())
                .await?;
            if let Some(missing) = input
                .role_ids
                .iter()
                .find(|id| !found.iter().any(|r| r.id == **id))
            {
                return Err(ServiceError::BadRequest(format!("Unknown role {}", missing)));
            }
        }

        let now = Utc::now();
        let txn = self.get_db().begin().await?;
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(input.email.trim().to_lowercase()),
            password_hash: Set(password_hash),
            is_active: Set(input.is_active.unwrap_or(true)),
            last_login_at: Set(None),
            tokens_revoked_at: Set(None),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "User e-mail"))?;

        let mut role_ids = input.role_ids;
        role_ids.sort();
        role_ids.dedup();
        if !role_ids.is_empty() {
            user_role::Entity::insert_many(role_ids.into_iter().map(|role_id| {
                user_role::ActiveModel {
                    user_id: Set(created.id),
                    role_id: Set(role_id),
                }
            }))
            .exec_without_returning(&txn)
            .await?;
        }
        txn.commit().await?;

        info!(user_id = %created.id, "user created");
        self.get(created.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: UpdateUser) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = input.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if let Some(password) = input.password {
            active.password_hash = Set(hash_password(&password)?);
        }
        active.updated_at = Set(Utc::now());
        Ok(active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "User e-mail"))?)
    }

    /// Deactivated users keep their row; their sessions are cut by the
    /// logout job.
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<user::Model, ServiceError> {
        let existing = self.find_by_id(id).await?;
        if existing.is_active == is_active {
            return Ok(existing);
        }
        let mut active: user::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.get_db()).await?;
        info!(user_id = %id, is_active, "user activation changed");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        let now = Utc::now();
        let mut active: user::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        let existing = user::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }
        let mut active: user::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Inactive or deleted users whose tokens were not cut since they changed.
    #[instrument(skip(self))]
    pub async fn find_deactivated_unrevoked(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::IsActive.eq(false))
                    .add(user::Column::DeletedAt.is_not_null()),
            )
            .filter(
                Condition::any()
                    .add(user::Column::TokensRevokedAt.is_null())
                    .add(
                        Expr::col(user::Column::TokensRevokedAt)
                            .lt(Expr::col(user::Column::UpdatedAt)),
                    ),
            )
            .order_by_asc(user::Column::UpdatedAt)
            .all(self.get_db())
            .await?)
    }

    /// Records the revocation cutoff. `updated_at` moves with it so the user
    /// drops out of [`Self::find_deactivated_unrevoked`].
    #[instrument(skip(self))]
    pub async fn mark_tokens_revoked(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError> {
        user::Entity::update_many()
            .col_expr(user::Column::TokensRevokedAt, Expr::value(at))
            .col_expr(user::Column::UpdatedAt, Expr::value(at))
            .filter(user::Column::Id.eq(id))
            .exec(self.get_db())
            .await?;
        Ok(())
    }
}

impl Repository for UserRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
