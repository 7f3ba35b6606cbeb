use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{BaseRepository, Repository};
use crate::auth::permissions::{ALL_PERMISSIONS, DEFAULT_ROLES};
use crate::entities::{permission, role, role_permission, user, user_role};
use crate::errors::ServiceError;

/// Guard every back-office role and permission belongs to.
pub const API_GUARD: &str = "api";

lazy_static! {
    static ref PERMISSION_NAME: Regex = Regex::new(r"^[a-z][a-z_]*:[a-z][a-z_]*$").unwrap();
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRole {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateRole {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePermission {
    #[validate(regex = "PERMISSION_NAME")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SyncPermissions {
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: role::Model,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeedSummary {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Roles, permissions and their assignment to users.
#[derive(Debug)]
pub struct RoleRepository {
    base: BaseRepository,
}

impl RoleRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<role::Model>, ServiceError> {
        Ok(role::Entity::find()
            .order_by_asc(role::Column::Name)
            .all(self.get_db())
            .await?)
    }

    async fn find_role(&self, id: Uuid) -> Result<role::Model, ServiceError> {
        role::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Role", id))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<RoleWithPermissions, ServiceError> {
        let found = self.find_role(id).await?;
        let mut permissions: Vec<String> = found
            .find_related(permission::Entity)
            .all(self.get_db())
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        permissions.sort();
        Ok(RoleWithPermissions {
            role: found,
            permissions,
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateRole) -> Result<role::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        Ok(role::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_lowercase()),
            guard_name: Set(API_GUARD.to_string()),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Role"))?)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: UpdateRole) -> Result<role::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_role(id).await?;
        let mut active: role::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_lowercase());
        }
        if input.description.is_some() {
            active.description = Set(input.description);
        }
        active.updated_at = Set(Utc::now());
        Ok(active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Role"))?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.find_role(id).await?;
        let txn = self.get_db().begin().await?;
        role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        user_role::Entity::delete_many()
            .filter(user_role::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        role::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Replaces the role's permissions with `names`. Unknown names reject
    /// the whole request.
    #[instrument(skip(self, names))]
    pub async fn sync_permissions(
        &self,
        id: Uuid,
        names: &[String],
    ) -> Result<RoleWithPermissions, ServiceError> {
        self.find_role(id).await?;
        let wanted: BTreeSet<String> = names.iter().map(|n| n.trim().to_string()).collect();

        let found = if wanted.is_empty() {
            vec![]
        } else {
            permission::Entity::find()
                .filter(permission::Column::Name.is_in(wanted.iter().cloned()))
                .all(self.get_db())
                .await?
        };
        let known: BTreeSet<&str> = found.iter().map(|p| p.name.as_str()).collect();
        let unknown: Vec<&str> = wanted
            .iter()
            .map(String::as_str)
            .filter(|n| !known.contains(n))
            .collect();
        if !unknown.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "Unknown permission(s): {}",
                unknown.join(", ")
            )));
        }

        let txn = self.get_db().begin().await?;
        role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        if !found.is_empty() {
            role_permission::Entity::insert_many(found.iter().map(|p| {
                role_permission::ActiveModel {
                    role_id: Set(id),
                    permission_id: Set(p.id),
                }
            }))
            .exec_without_returning(&txn)
            .await?;
        }
        txn.commit().await?;

        info!(role_id = %id, count = found.len(), "role permissions synced");
        self.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn list_permissions(&self) -> Result<Vec<permission::Model>, ServiceError> {
        Ok(permission::Entity::find()
            .order_by_asc(permission::Column::Name)
            .all(self.get_db())
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_permission(
        &self,
        input: CreatePermission,
    ) -> Result<permission::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        Ok(permission::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            guard_name: Set(API_GUARD.to_string()),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Permission"))?)
    }

    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn assign(&self, user_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        user::Entity::find_by_id(user_id)
            .filter(user::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;
        self.find_role(role_id).await?;

        let existing = user_role::Entity::find_by_id((user_id, role_id))
            .one(self.get_db())
            .await?;
        if existing.is_none() {
            user_role::Entity::insert(user_role::ActiveModel {
                user_id: Set(user_id),
                role_id: Set(role_id),
            })
            .exec_without_returning(self.get_db())
            .await?;
            info!(user_id = %user_id, role_id = %role_id, "role assigned");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, user_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        let result = user_role::Entity::delete_by_id((user_id, role_id))
            .exec(self.get_db())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Role {} is not assigned to user {}",
                role_id, user_id
            )));
        }
        info!(user_id = %user_id, role_id = %role_id, "role revoked");
        Ok(())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<role::Model, ServiceError> {
        role::Entity::find()
            .filter(role::Column::Name.eq(name))
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Role", name))
    }

    /// Creates the built-in permissions and roles that are missing and links
    /// each built-in role to its default permissions. Safe to run repeatedly.
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> Result<SeedSummary, ServiceError> {
        let db = self.get_db();
        let now = Utc::now();
        let mut summary = SeedSummary::default();

        let mut permissions: HashMap<String, Uuid> = permission::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.name, p.id))
            .collect();
        for name in ALL_PERMISSIONS {
            if permissions.contains_key(*name) {
                continue;
            }
            let created = permission::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                guard_name: Set(API_GUARD.to_string()),
                description: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
            permissions.insert(created.name, created.id);
            summary.permissions_created += 1;
        }

        let mut role_names: Vec<&&str> = DEFAULT_ROLES.keys().collect();
        role_names.sort();
        for name in role_names {
            let role_id = match role::Entity::find()
                .filter(role::Column::Name.eq(*name))
                .one(db)
                .await?
            {
                Some(found) => found.id,
                None => {
                    summary.roles_created += 1;
                    role::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(name.to_string()),
                        guard_name: Set(API_GUARD.to_string()),
                        description: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(db)
                    .await?
                    .id
                }
            };

            let linked: BTreeSet<Uuid> = role_permission::Entity::find()
                .filter(role_permission::Column::RoleId.eq(role_id))
                .all(db)
                .await?
                .into_iter()
                .map(|rp| rp.permission_id)
                .collect();
            let missing: Vec<role_permission::ActiveModel> = DEFAULT_ROLES
                .get(*name)
                .into_iter()
                .flatten()
                .filter_map(|perm| permissions.get(*perm))
                .filter(|id| !linked.contains(*id))
                .map(|permission_id| role_permission::ActiveModel {
                    role_id: Set(role_id),
                    permission_id: Set(*permission_id),
                })
                .collect();
            if !missing.is_empty() {
                role_permission::Entity::insert_many(missing)
                    .exec_without_returning(db)
                    .await?;
            }
        }

        info!(
            permissions_created = summary.permissions_created,
            roles_created = summary.roles_created,
            "default roles seeded"
        );
        Ok(summary)
    }
}

impl Repository for RoleRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_follow_resource_action() {
        for name in ALL_PERMISSIONS {
            assert!(PERMISSION_NAME.is_match(name), "{}", name);
        }
        assert!(!PERMISSION_NAME.is_match("products"));
        assert!(!PERMISSION_NAME.is_match("Products:Read"));
        assert!(!PERMISSION_NAME.is_match("products:read:all"));
    }
}
