use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gift / discount code
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub min_order_amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub max_uses: Option<i32>,
    pub used_count: i32,
    #[sea_orm(nullable)]
    pub starts_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

impl Model {
    /// Checks the coupon against an order amount at `now` and returns the
    /// discount it grants, or the reason it cannot be used.
    pub fn evaluate(&self, amount: Decimal, now: DateTime<Utc>) -> Result<Decimal, String> {
        if !self.is_active {
            return Err("Coupon is not active".to_string());
        }
        if let Some(starts_at) = self.starts_at {
            if now < starts_at {
                return Err("Coupon is not yet valid".to_string());
            }
        }
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return Err("Coupon has expired".to_string());
            }
        }
        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Err("Coupon usage limit reached".to_string());
            }
        }
        if let Some(min) = self.min_order_amount {
            if amount < min {
                return Err(format!("Order amount must be at least {}", min.normalize()));
            }
        }
        Ok(self.discount_for(amount))
    }

    pub fn discount_for(&self, amount: Decimal) -> Decimal {
        match self.discount_type {
            DiscountType::Percentage => (amount * self.value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            DiscountType::Fixed => self.value.min(amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(discount_type: DiscountType, value: Decimal) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            code: "SAVE".into(),
            description: None,
            discount_type,
            value,
            min_order_amount: None,
            max_uses: None,
            used_count: 0,
            starts_at: None,
            expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount_rounds_to_cents() {
        let c = coupon(DiscountType::Percentage, dec!(15));
        assert_eq!(c.evaluate(dec!(33.33), Utc::now()).unwrap(), dec!(5.00));
        assert_eq!(c.discount_for(dec!(10.10)), dec!(1.52));
    }

    #[test]
    fn fixed_discount_is_capped_by_amount() {
        let c = coupon(DiscountType::Fixed, dec!(25));
        assert_eq!(c.discount_for(dec!(100)), dec!(25));
        assert_eq!(c.discount_for(dec!(10)), dec!(10));
    }

    #[test]
    fn rejects_inactive_expired_and_exhausted() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.is_active = false;
        assert_eq!(c.evaluate(dec!(50), now).unwrap_err(), "Coupon is not active");

        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(c.evaluate(dec!(50), now).unwrap_err(), "Coupon has expired");

        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.starts_at = Some(now + Duration::days(1));
        assert_eq!(c.evaluate(dec!(50), now).unwrap_err(), "Coupon is not yet valid");

        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.max_uses = Some(2);
        c.used_count = 2;
        assert_eq!(
            c.evaluate(dec!(50), now).unwrap_err(),
            "Coupon usage limit reached"
        );
    }

    #[test]
    fn enforces_minimum_order_amount() {
        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.min_order_amount = Some(dec!(40.00));
        assert_eq!(
            c.evaluate(dec!(39.99), Utc::now()).unwrap_err(),
            "Order amount must be at least 40"
        );
        assert_eq!(c.evaluate(dec!(40), Utc::now()).unwrap(), dec!(5));
    }
}
