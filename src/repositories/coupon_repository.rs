use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{paginate, validate_non_negative, BaseRepository, Pagination, Repository};
use crate::entities::coupon::{self, DiscountType};
use crate::errors::ServiceError;
use crate::PaginatedResponse;

fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_coupon_code"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCoupon {
    #[validate(length(min = 3, max = 50), custom = "validate_code")]
    pub code: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "percentage")]
    pub discount_type: DiscountType,
    #[validate(custom = "validate_non_negative")]
    pub value: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub min_order_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCoupon {
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub discount_type: Option<DiscountType>,
    #[validate(custom = "validate_non_negative")]
    pub value: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub min_order_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// Outcome of checking a code against an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Coupon codes are stored and matched upper case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn check_rules(
    discount_type: DiscountType,
    value: Decimal,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "value: percentage discounts cannot exceed 100".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (starts_at, expires_at) {
        if end <= start {
            return Err(ServiceError::ValidationError(
                "expires_at: must be after starts_at".to_string(),
            ));
        }
    }
    Ok(())
}

/// Looks a coupon up by code and checks it against `amount`; failures carry
/// the reason as a coupon error.
pub async fn evaluate_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(coupon::Model, Decimal), ServiceError> {
    let found = coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::CouponError("Coupon not found".to_string()))?;
    let discount = found
        .evaluate(amount, now)
        .map_err(ServiceError::CouponError)?;
    Ok((found, discount))
}

/// Counts one use of the coupon. The increment is conditional so concurrent
/// redemptions cannot exceed `max_uses`.
pub async fn redeem_in<C: ConnectionTrait>(
    conn: &C,
    coupon: &coupon::Model,
) -> Result<(), ServiceError> {
    let result = coupon::Entity::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupon::Column::Id.eq(coupon.id))
        .filter(
            Condition::any()
                .add(coupon::Column::MaxUses.is_null())
                .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::MaxUses))),
        )
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::CouponError(
            "Coupon usage limit reached".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub struct CouponRepository {
    base: BaseRepository,
}

impl CouponRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Coupon", id))
    }

    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let code = normalize_code(code);
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code.as_str()))
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Coupon", code))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        is_active: Option<bool>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<coupon::Model>, ServiceError> {
        let mut select = coupon::Entity::find();
        if let Some(is_active) = is_active {
            select = select.filter(coupon::Column::IsActive.eq(is_active));
        }
        let select = select
            .order_by_desc(coupon::Column::CreatedAt)
            .order_by_asc(coupon::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreateCoupon) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        check_rules(
            input.discount_type,
            input.value,
            input.starts_at,
            input.expires_at,
        )?;

        let now = Utc::now();
        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(normalize_code(&input.code)),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            min_order_amount: Set(input.min_order_amount),
            max_uses: Set(input.max_uses),
            used_count: Set(0),
            starts_at: Set(input.starts_at),
            expires_at: Set(input.expires_at),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Coupon code"))?;

        info!(coupon = %created.code, "coupon created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: UpdateCoupon) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;
        check_rules(
            input.discount_type.unwrap_or(existing.discount_type),
            input.value.unwrap_or(existing.value),
            input.starts_at.or(existing.starts_at),
            input.expires_at.or(existing.expires_at),
        )?;

        let mut active: coupon::ActiveModel = existing.into();
        if input.description.is_some() {
            active.description = Set(input.description);
        }
        if let Some(discount_type) = input.discount_type {
            active.discount_type = Set(discount_type);
        }
        if let Some(value) = input.value {
            active.value = Set(value);
        }
        if input.min_order_amount.is_some() {
            active.min_order_amount = Set(input.min_order_amount);
        }
        if input.max_uses.is_some() {
            active.max_uses = Set(input.max_uses);
        }
        if input.starts_at.is_some() {
            active.starts_at = Set(input.starts_at);
        }
        if input.expires_at.is_some() {
            active.expires_at = Set(input.expires_at);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = coupon::Entity::delete_by_id(id).exec(self.get_db()).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Coupon", id));
        }
        Ok(())
    }

    /// Never fails on an unusable code; the reason is reported instead.
    #[instrument(skip(self))]
    pub async fn validate_code(
        &self,
        code: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CouponValidation, ServiceError> {
        match evaluate_code(self.get_db(), code, amount, now).await {
            Ok((_, discount)) => Ok(CouponValidation {
                valid: true,
                discount,
                reason: None,
            }),
            Err(ServiceError::CouponError(reason)) => Ok(CouponValidation {
                valid: false,
                discount: Decimal::ZERO,
                reason: Some(reason),
            }),
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let found = self.find_by_code(code).await?;
        redeem_in(self.get_db(), &found).await?;
        self.find_by_id(found.id).await
    }
}

impl Repository for CouponRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_upper_cased() {
        assert_eq!(normalize_code(" summer-10 "), "SUMMER-10");
    }

    #[test]
    fn percentage_above_hundred_is_rejected() {
        assert!(check_rules(DiscountType::Percentage, dec!(100), None, None).is_ok());
        assert!(check_rules(DiscountType::Percentage, dec!(100.5), None, None).is_err());
        assert!(check_rules(DiscountType::Fixed, dec!(250), None, None).is_ok());
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        assert!(check_rules(
            DiscountType::Fixed,
            dec!(5),
            Some(now),
            Some(now - Duration::hours(1))
        )
        .is_err());
    }

    #[test]
    fn code_charset() {
        assert!(validate_code("SAVE_10-NOW").is_ok());
        assert!(validate_code("SAVE 10").is_err());
    }
}
