use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Order, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{
    like_pattern, paginate, slugify, validate_non_negative, BaseRepository, Pagination,
    Repository,
};
use crate::entities::inventory_stock;
use crate::entities::product::{self, ProductStatus};
use crate::entities::product_category;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::PaginatedResponse;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub discount_price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub cost_price: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "draft")]
    pub status: Option<ProductStatus>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub discount_price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub cost_price: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "active")]
    pub status: Option<ProductStatus>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSort {
    Name,
    Price,
    CreatedAt,
    Sku,
}

impl ProductSort {
    /// Unknown keys fall back to `created_at`.
    fn parse(key: &str) -> Self {
        match key {
            "name" => Self::Name,
            "price" => Self::Price,
            "sku" => Self::Sku,
            _ => Self::CreatedAt,
        }
    }

    fn column(self) -> product::Column {
        match self {
            Self::Name => product::Column::Name,
            Self::Price => product::Column::Price,
            Self::CreatedAt => product::Column::CreatedAt,
            Self::Sku => product::Column::Sku,
        }
    }
}

/// Listing criteria parsed from raw query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
    pub brand: Option<String>,
    pub is_featured: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub sort: ProductSort,
    pub ascending: bool,
    pub pagination: Pagination,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            category_id: None,
            status: None,
            brand: None,
            is_featured: None,
            min_price: None,
            max_price: None,
            search: None,
            sort: ProductSort::CreatedAt,
            ascending: false,
            pagination: Pagination::default(),
        }
    }
}

impl ProductQuery {
    /// Known keys are parsed, anything else is ignored. Malformed values of
    /// known keys are validation errors.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let mut query = ProductQuery::default();
        let mut page = None;
        let mut limit = None;

        for (key, raw) in params {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "category_id" => query.category_id = Some(parse_field(key, value)?),
                "status" => {
                    query.status = Some(
                        serde_json::from_value(serde_json::Value::String(value.to_string()))
                            .map_err(|_| invalid(key, value))?,
                    )
                }
                "brand" => query.brand = Some(value.to_string()),
                "is_featured" => query.is_featured = Some(parse_field(key, value)?),
                "min_price" => query.min_price = Some(parse_field(key, value)?),
                "max_price" => query.max_price = Some(parse_field(key, value)?),
                "search" => query.search = Some(value.to_string()),
                "sort_by" => query.sort = ProductSort::parse(value),
                "sort_order" => query.ascending = value.eq_ignore_ascii_case("asc"),
                "page" => page = Some(parse_field(key, value)?),
                "limit" => limit = Some(parse_field(key, value)?),
                _ => {}
            }
        }
        query.pagination = Pagination::new(page, limit);
        Ok(query)
    }
}

fn invalid(key: &str, value: &str) -> ServiceError {
    ServiceError::ValidationError(format!("{}: invalid value '{}'", key, value))
}

fn parse_field<T: FromStr>(key: &str, value: &str) -> Result<T, ServiceError> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

/// Units of a product summed over every warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductStockSummary {
    pub product_id: Uuid,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub warehouses: usize,
}

/// Catalog products
#[derive(Debug)]
pub struct ProductRepository {
    base: BaseRepository,
}

impl ProductRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .filter(product::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        query: &ProductQuery,
    ) -> Result<PaginatedResponse<product::Model>, ServiceError> {
        let mut select = product::Entity::find().filter(product::Column::DeletedAt.is_null());

        if let Some(category_id) = query.category_id {
            select = select.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(status) = query.status {
            select = select.filter(product::Column::Status.eq(status));
        }
        if let Some(brand) = &query.brand {
            select = select.filter(product::Column::Brand.eq(brand.as_str()));
        }
        if let Some(is_featured) = query.is_featured {
            select = select.filter(product::Column::IsFeatured.eq(is_featured));
        }
        if let Some(min_price) = query.min_price {
            select = select.filter(product::Column::Price.gte(min_price));
        }
        if let Some(max_price) = query.max_price {
            select = select.filter(product::Column::Price.lte(max_price));
        }
        if let Some(term) = &query.search {
            let pattern = like_pattern(term);
            select = select.filter(
                Condition::any()
                    .add(product::Column::Name.like(pattern.as_str()))
                    .add(product::Column::Sku.like(pattern.as_str())),
            );
        }

        let order = if query.ascending { Order::Asc } else { Order::Desc };
        let select = select
            .order_by(query.sort.column(), order)
            .order_by_asc(product::Column::Id);

        Ok(paginate(self.get_db(), select, query.pagination).await?)
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(&self, input: CreateProduct) -> Result<product::Model, ServiceError> {
        input.validate()?;
        check_discount(input.price, input.discount_price)?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let slug = slugify(input.slug.as_deref().unwrap_or(&input.name));
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "slug: must contain at least one letter or digit".to_string(),
            ));
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            slug: Set(slug),
            sku: Set(input.sku.trim().to_string()),
            description: Set(input.description),
            category_id: Set(input.category_id),
            brand: Set(input.brand),
            price: Set(input.price),
            discount_price: Set(input.discount_price),
            cost_price: Set(input.cost_price),
            status: Set(input.status.unwrap_or(ProductStatus::Draft)),
            is_featured: Set(input.is_featured.unwrap_or(false)),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Product SKU or slug"))?;

        info!(product_id = %created.id, "product created");
        self.base
            .events()
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        Ok(created)
    }

    /// Partial update; the discount rule is checked on the merged values.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateProduct,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;

        let price = input.price.unwrap_or(existing.price);
        let discount_price = input.discount_price.or(existing.discount_price);
        check_discount(price, discount_price)?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(slug) = input.slug {
            let slug = slugify(&slug);
            if slug.is_empty() {
                return Err(ServiceError::ValidationError(
                    "slug: must contain at least one letter or digit".to_string(),
                ));
            }
            active.slug = Set(slug);
        }
        if let Some(sku) = input.sku {
            active.sku = Set(sku.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(input.description);
        }
        if input.category_id.is_some() {
            active.category_id = Set(input.category_id);
        }
        if input.brand.is_some() {
            active.brand = Set(input.brand);
        }
        active.price = Set(price);
        active.discount_price = Set(discount_price);
        if input.cost_price.is_some() {
            active.cost_price = Set(input.cost_price);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Product SKU or slug"))?;
        self.base
            .events()
            .send_or_log(Event::ProductUpdated(id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        let now = Utc::now();
        let mut active: product::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;

        self.base
            .events()
            .send_or_log(Event::ProductDeleted(id))
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }

        let mut active: product::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        let restored = active.update(self.get_db()).await?;
        self.base
            .events()
            .send_or_log(Event::ProductUpdated(id))
            .await;
        Ok(restored)
    }

    #[instrument(skip(self))]
    pub async fn stock_summary(&self, id: Uuid) -> Result<ProductStockSummary, ServiceError> {
        self.find_by_id(id).await?;
        let rows = inventory_stock::Entity::find()
            .filter(inventory_stock::Column::ProductId.eq(id))
            .all(self.get_db())
            .await?;
        Ok(summarize_stock(id, &rows))
    }

    async fn ensure_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        product_category::Entity::find_by_id(category_id)
            .filter(product_category::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .map(|_| ())
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "category_id: unknown category {}",
                    category_id
                ))
            })
    }
}

impl Repository for ProductRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

fn check_discount(price: Decimal, discount_price: Option<Decimal>) -> Result<(), ServiceError> {
    match discount_price {
        Some(discount) if discount > price => Err(ServiceError::ValidationError(
            "discount_price: must not exceed price".to_string(),
        )),
        _ => Ok(()),
    }
}

fn summarize_stock(product_id: Uuid, rows: &[inventory_stock::Model]) -> ProductStockSummary {
    let on_hand: i64 = rows.iter().map(|r| i64::from(r.quantity)).sum();
    let reserved: i64 = rows.iter().map(|r| i64::from(r.reserved_quantity)).sum();
    let mut warehouses: Vec<Uuid> = rows.iter().map(|r| r.warehouse_id).collect();
    warehouses.sort();
    warehouses.dedup();

    ProductStockSummary {
        product_id,
        on_hand,
        reserved,
        available: on_hand - reserved,
        warehouses: warehouses.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_parses_known_keys_and_ignores_others() {
        let category = Uuid::new_v4();
        let query = ProductQuery::from_params(&params(&[
            ("category_id", &category.to_string()),
            ("status", "active"),
            ("min_price", "10.5"),
            ("is_featured", "true"),
            ("sort_by", "price"),
            ("sort_order", "ASC"),
            ("colour", "red"),
            ("limit", "500"),
        ]))
        .unwrap();

        assert_eq!(query.category_id, Some(category));
        assert_eq!(query.status, Some(ProductStatus::Active));
        assert_eq!(query.min_price, Some(dec!(10.5)));
        assert_eq!(query.is_featured, Some(true));
        assert_eq!(query.sort, ProductSort::Price);
        assert!(query.ascending);
        assert_eq!(query.pagination.limit, Pagination::MAX_LIMIT);
    }

    #[test]
    fn unknown_sort_key_falls_back_to_created_at() {
        let query = ProductQuery::from_params(&params(&[("sort_by", "popularity")])).unwrap();
        assert_eq!(query.sort, ProductSort::CreatedAt);
        assert!(!query.ascending);
    }

    #[rstest]
    #[case("max_price", "cheap")]
    #[case("status", "sold_out")]
    #[case("category_id", "not-a-uuid")]
    #[case("is_featured", "maybe")]
    #[case("page", "-1")]
    fn malformed_known_value_is_rejected(#[case] key: &str, #[case] value: &str) {
        let err = ProductQuery::from_params(&params(&[(key, value)])).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn discount_may_not_exceed_price() {
        assert!(check_discount(dec!(10), Some(dec!(10))).is_ok());
        assert!(check_discount(dec!(10), None).is_ok());
        assert!(check_discount(dec!(10), Some(dec!(10.01))).is_err());
    }
}
