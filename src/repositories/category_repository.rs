use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{slugify, BaseRepository, Repository};
use crate::cache::{get_json, set_json, CacheBackend};
use crate::entities::{product, product_category};
use crate::errors::ServiceError;
use crate::events::Event;

/// Cache key holding every live category.
pub const CATEGORY_CACHE_KEY: &str = "categories:all";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Product categories, read through a cache-aside layer.
pub struct CategoryRepository {
    base: BaseRepository,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CategoryRepository {
    pub fn new(base: BaseRepository, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { base, cache, ttl }
    }

    /// Every non-deleted category ordered by name.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<product_category::Model>, ServiceError> {
        match get_json::<Vec<product_category::Model>>(self.cache.as_ref(), CATEGORY_CACHE_KEY)
            .await
        {
            Ok(Some(cached)) => {
                debug!(count = cached.len(), "category cache hit");
                return Ok(cached);
            }
            Ok(None) => debug!("category cache miss"),
            Err(e) => warn!(error = %e, "category cache read failed"),
        }

        let categories = product_category::Entity::find()
            .filter(product_category::Column::DeletedAt.is_null())
            .order_by_asc(product_category::Column::Name)
            .all(self.get_db())
            .await?;

        if let Err(e) = set_json(
            self.cache.as_ref(),
            CATEGORY_CACHE_KEY,
            &categories,
            Some(self.ttl),
        )
        .await
        {
            warn!(error = %e, "category cache write failed");
        }
        Ok(categories)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<product_category::Model, ServiceError> {
        product_category::Entity::find_by_id(id)
            .filter(product_category::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: CreateCategory,
    ) -> Result<product_category::Model, ServiceError> {
        input.validate()?;
        let slug = resolve_slug(input.slug.as_deref(), &input.name)?;
        if let Some(parent_id) = input.parent_id {
            self.find_by_id(parent_id).await?;
        }

        let now = Utc::now();
        let category = product_category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            slug: Set(slug),
            description: Set(input.description),
            parent_id: Set(input.parent_id),
            is_active: Set(input.is_active.unwrap_or(true)),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Category slug"))?;

        self.changed(category.id).await;
        Ok(category)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateCategory,
    ) -> Result<product_category::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;

        if let Some(parent_id) = input.parent_id {
            if parent_id == id {
                return Err(ServiceError::InvalidOperation(
                    "A category cannot be its own parent".to_string(),
                ));
            }
            self.find_by_id(parent_id).await?;
        }

        let mut active: product_category::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(slug) = input.slug {
            active.slug = Set(resolve_slug(Some(&slug), &slug)?);
        }
        if input.description.is_some() {
            active.description = Set(input.description);
        }
        if input.parent_id.is_some() {
            active.parent_id = Set(input.parent_id);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let category = active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Category slug"))?;
        self.changed(id).await;
        Ok(category)
    }

    /// Soft delete; refused while live products still reference the category.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;

        let products = product::Entity::find()
            .filter(product::Column::CategoryId.eq(id))
            .filter(product::Column::DeletedAt.is_null())
            .count(self.get_db())
            .await?;
        if products > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Category still has {} product(s)",
                products
            )));
        }

        let now = Utc::now();
        let mut active: product_category::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;

        self.changed(id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<product_category::Model, ServiceError> {
        let existing = product_category::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }

        let mut active: product_category::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        let category = active.update(self.get_db()).await?;

        self.changed(id).await;
        Ok(category)
    }

    async fn changed(&self, id: Uuid) {
        if let Err(e) = self.cache.delete(CATEGORY_CACHE_KEY).await {
            warn!(error = %e, "failed to invalidate category cache");
        }
        self.base
            .events()
            .send_or_log(Event::CategoryChanged(id))
            .await;
    }
}

impl Repository for CategoryRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

fn resolve_slug(explicit: Option<&str>, name: &str) -> Result<String, ServiceError> {
    let slug = slugify(explicit.unwrap_or(name));
    if slug.is_empty() {
        return Err(ServiceError::ValidationError(
            "slug: must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_falls_back_to_name() {
        assert_eq!(resolve_slug(None, "Garden Tools").unwrap(), "garden-tools");
        assert_eq!(
            resolve_slug(Some("Outdoor & Garden"), "ignored").unwrap(),
            "outdoor-garden"
        );
    }

    #[test]
    fn empty_slug_is_rejected() {
        assert!(matches!(
            resolve_slug(None, "!!!"),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
