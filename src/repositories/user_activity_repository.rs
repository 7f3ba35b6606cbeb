use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{paginate, BaseRepository, Pagination, Repository};
use crate::entities::user_activity;
use crate::errors::ServiceError;
use crate::PaginatedResponse;

/// One audited request.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub action: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewActivity {
    /// `POST /api/v1/product/..` becomes `product.create`.
    pub fn action_for(method: &str, path: &str) -> String {
        let resource = path
            .trim_start_matches('/')
            .trim_start_matches("api/")
            .trim_start_matches("v1/")
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("root");
        let verb = match method {
            "POST" => "create",
            "PUT" | "PATCH" => "update",
            "DELETE" => "delete",
            "GET" | "HEAD" => "read",
            _ => "other",
        };
        format!("{}.{}", resource, verb)
    }
}

#[derive(Debug)]
pub struct UserActivityRepository {
    base: BaseRepository,
}

impl UserActivityRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    pub async fn record(&self, entry: NewActivity) -> Result<user_activity::Model, ServiceError> {
        let saved = user_activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(entry.user_id),
            action: Set(entry.action),
            method: Set(entry.method),
            path: Set(entry.path),
            status_code: Set(i32::from(entry.status_code)),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            created_at: Set(Utc::now()),
        }
        .insert(self.get_db())
        .await?;
        debug!(user_id = %saved.user_id, action = %saved.action, "activity recorded");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        action: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<user_activity::Model>, ServiceError> {
        let mut select = user_activity::Entity::find();
        if let Some(user_id) = user_id {
            select = select.filter(user_activity::Column::UserId.eq(user_id));
        }
        if let Some(action) = action.filter(|a| !a.trim().is_empty()) {
            select = select.filter(user_activity::Column::Action.eq(action.trim()));
        }
        let select = select
            .order_by_desc(user_activity::Column::CreatedAt)
            .order_by_asc(user_activity::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<user_activity::Model, ServiceError> {
        user_activity::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("User activity", id))
    }

    /// Deletes rows older than `days` days.
    #[instrument(skip(self))]
    pub async fn prune(&self, days: i64, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        if !(1..=3650).contains(&days) {
            return Err(ServiceError::ValidationError(
                "days: must be between 1 and 3650".to_string(),
            ));
        }
        let cutoff = now - Duration::days(days);
        let result = user_activity::Entity::delete_many()
            .filter(user_activity::Column::CreatedAt.lt(cutoff))
            .exec(self.get_db())
            .await?;
        info!(count = result.rows_affected, days, "pruned user activity");
        Ok(result.rows_affected)
    }
}

impl Repository for UserActivityRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_come_from_resource_and_method() {
        assert_eq!(NewActivity::action_for("POST", "/api/v1/product"), "product.create");
        assert_eq!(
            NewActivity::action_for("PUT", "/api/v1/inventory/123/adjust"),
            "inventory.update"
        );
        assert_eq!(NewActivity::action_for("DELETE", "/api/v1/email/trash"), "email.delete");
        assert_eq!(NewActivity::action_for("POST", "/"), "root.create");
    }
}
