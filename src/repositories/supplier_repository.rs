use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, paginate, BaseRepository, Pagination, Repository};
use crate::entities::{inventory_stock, supplier};
use crate::errors::ServiceError;
use crate::PaginatedResponse;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSupplier {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub contact_person: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplier {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub contact_person: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupplierStockSummary {
    pub supplier_id: Uuid,
    pub stock_rows: usize,
    pub units_on_hand: i64,
    pub distinct_products: usize,
}

#[derive(Debug)]
pub struct SupplierRepository {
    base: BaseRepository,
}

impl SupplierRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(id)
            .filter(supplier::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", id))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        search: Option<&str>,
        is_active: Option<bool>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<supplier::Model>, ServiceError> {
        let mut select = supplier::Entity::find().filter(supplier::Column::DeletedAt.is_null());
        if let Some(term) = search.filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            select = select.filter(
                Condition::any()
                    .add(supplier::Column::Name.like(pattern.as_str()))
                    .add(supplier::Column::Email.like(pattern.to_lowercase()))
                    .add(supplier::Column::ContactPerson.like(pattern.as_str())),
            );
        }
        if let Some(is_active) = is_active {
            select = select.filter(supplier::Column::IsActive.eq(is_active));
        }
        let select = select
            .order_by_asc(supplier::Column::Name)
            .order_by_asc(supplier::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateSupplier) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        Ok(supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(input.email.trim().to_lowercase()),
            phone: Set(input.phone),
            contact_person: Set(input.contact_person),
            address: Set(input.address),
            is_active: Set(input.is_active.unwrap_or(true)),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Supplier e-mail"))?)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateSupplier,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;

        let mut active: supplier::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = input.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if input.phone.is_some() {
            active.phone = Set(input.phone);
        }
        if input.contact_person.is_some() {
            active.contact_person = Set(input.contact_person);
        }
        if input.address.is_some() {
            active.address = Set(input.address);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        Ok(active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Supplier e-mail"))?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        let now = Utc::now();
        let mut active: supplier::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        let existing = supplier::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }
        let mut active: supplier::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    #[instrument(skip(self))]
    pub async fn stock_summary(&self, id: Uuid) -> Result<SupplierStockSummary, ServiceError> {
        self.find_by_id(id).await?;
        let rows = inventory_stock::Entity::find()
            .filter(inventory_stock::Column::SupplierId.eq(id))
            .all(self.get_db())
            .await?;

        let products: HashSet<Uuid> = rows.iter().map(|r| r.product_id).collect();
        Ok(SupplierStockSummary {
            supplier_id: id,
            stock_rows: rows.len(),
            units_on_hand: rows.iter().map(|r| i64::from(r.quantity)).sum(),
            distinct_products: products.len(),
        })
    }
}

impl Repository for SupplierRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
