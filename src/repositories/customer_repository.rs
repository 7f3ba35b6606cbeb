use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, paginate, BaseRepository, Pagination, Repository};
use crate::auth::password::hash_password;
use crate::entities::{customer, order};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::PaginatedResponse;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomer {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    /// Enables customer login when present
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomer {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug)]
pub struct CustomerRepository {
    base: BaseRepository,
}

impl CustomerRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .filter(customer::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    /// Search matches first name, last name or e-mail.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        search: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<customer::Model>, ServiceError> {
        let mut select = customer::Entity::find().filter(customer::Column::DeletedAt.is_null());
        if let Some(term) = search.filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            select = select.filter(
                Condition::any()
                    .add(customer::Column::FirstName.like(pattern.as_str()))
                    .add(customer::Column::LastName.like(pattern.as_str()))
                    .add(customer::Column::Email.like(pattern.to_lowercase())),
            );
        }
        let select = select
            .order_by_asc(customer::Column::LastName)
            .order_by_asc(customer::Column::FirstName)
            .order_by_asc(customer::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: CreateCustomer) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let password_hash = input.password.as_deref().map(hash_password).transpose()?;

        let now = Utc::now();
        let created = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(input.first_name.trim().to_string()),
            last_name: Set(input.last_name.trim().to_string()),
            email: Set(input.email.trim().to_lowercase()),
            phone: Set(input.phone),
            password_hash: Set(password_hash),
            is_active: Set(true),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Customer e-mail"))?;

        info!(customer_id = %created.id, "customer created");
        self.base
            .events()
            .send_or_log(Event::CustomerCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateCustomer,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;

        let mut active: customer::ActiveModel = existing.into();
        if let Some(first_name) = input.first_name {
            active.first_name = Set(first_name.trim().to_string());
        }
        if let Some(last_name) = input.last_name {
            active.last_name = Set(last_name.trim().to_string());
        }
        if let Some(email) = input.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if input.phone.is_some() {
            active.phone = Set(input.phone);
        }
        if let Some(password) = input.password {
            active.password_hash = Set(Some(hash_password(&password)?));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Customer e-mail"))?;
        self.base
            .events()
            .send_or_log(Event::CustomerUpdated(id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        let now = Utc::now();
        let mut active: customer::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        let existing = customer::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }
        let mut active: customer::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Orders placed by the customer, newest first.
    #[instrument(skip(self))]
    pub async fn orders(
        &self,
        customer_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        self.find_by_id(customer_id).await?;
        let select = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .filter(order::Column::DeletedAt.is_null())
            .order_by_desc(order::Column::PlacedAt)
            .order_by_asc(order::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }
}

impl Repository for CustomerRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
