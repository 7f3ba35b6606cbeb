//! Property-based tests for the pure pieces of the inventory and pricing
//! logic.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use commerce_admin_api::{
    entities::{
        coupon::{self, DiscountType},
        inventory_stock,
    },
    repositories::{
        inventory_repository::{compute_forecast, plan_fefo},
        slugify,
    },
};

fn stock_row(quantity: i32, reserved: i32, expiry_offset_days: Option<i64>) -> inventory_stock::Model {
    let base = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    inventory_stock::Model {
        id: Uuid::new_v4(),
        product_id: Uuid::nil(),
        warehouse_id: Uuid::nil(),
        supplier_id: None,
        batch_number: None,
        expiry_date: expiry_offset_days.map(|d| base + Duration::days(d)),
        quantity,
        reserved_quantity: reserved,
        reorder_point: 0,
        reorder_quantity: 0,
        auto_restock: false,
        created_at: base,
        updated_at: base,
    }
}

fn row_strategy() -> impl Strategy<Value = inventory_stock::Model> {
    (0i32..50, 0i32..50, proptest::option::of(0i64..365)).prop_map(|(a, b, expiry)| {
        let (reserved, quantity) = if a <= b { (a, b) } else { (b, a) };
        stock_row(quantity, reserved, expiry)
    })
}

fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn coupon(discount_type: DiscountType, value: Decimal) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        code: "PROP".to_string(),
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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fefo_plan_covers_exactly_what_was_asked(
        rows in proptest::collection::vec(row_strategy(), 0..8),
        needed in 1i32..200,
    ) {
        let total: i64 = rows.iter().map(|r| i64::from(r.available())).sum();
        match plan_fefo(&rows, needed) {
            Ok(picks) => {
                prop_assert!(i64::from(needed) <= total);
                prop_assert_eq!(picks.iter().map(|p| p.quantity).sum::<i32>(), needed);
                for pick in &picks {
                    let row = rows.iter().find(|r| r.id == pick.stock_id).unwrap();
                    prop_assert!(pick.quantity > 0);
                    prop_assert!(pick.quantity <= row.available());
                }
            }
            Err(shortfall) => {
                prop_assert!(i64::from(needed) > total);
                prop_assert_eq!(shortfall.available, total);
            }
        }
    }

    #[test]
    fn fefo_never_picks_a_later_batch_while_an_earlier_one_has_units(
        rows in proptest::collection::vec(row_strategy(), 1..8),
        needed in 1i32..40,
    ) {
        if let Ok(picks) = plan_fefo(&rows, needed) {
            let picked: Vec<&inventory_stock::Model> = picks
                .iter()
                .map(|p| rows.iter().find(|r| r.id == p.stock_id).unwrap())
                .collect();
            // All rows except the last pick are drained completely.
            for (pick, row) in picks.iter().zip(&picked).take(picks.len().saturating_sub(1)) {
                prop_assert_eq!(pick.quantity, row.available());
            }
            for pair in picked.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                match (a.expiry_date, b.expiry_date) {
                    (Some(x), Some(y)) => prop_assert!(x <= y),
                    (None, Some(_)) => prop_assert!(false, "undated row picked before a dated one"),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn discounts_never_exceed_the_amount(
        amount in money_strategy(),
        percent in 0i64..=100,
        fixed in money_strategy(),
    ) {
        let pct = coupon(DiscountType::Percentage, Decimal::from(percent));
        let discount = pct.discount_for(amount);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= amount);
        prop_assert!(discount.scale() <= 2);

        let flat = coupon(DiscountType::Fixed, fixed);
        prop_assert_eq!(flat.discount_for(amount), fixed.min(amount));
    }

    #[test]
    fn slugs_are_lowercase_and_dash_separated(input in "[ -~]{0,40}") {
        let slug = slugify(&input);
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
        prop_assert!(slug.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()));
        prop_assert_eq!(slugify(&slug), slug.clone());
    }

    #[test]
    fn projected_demand_rounds_up(
        units in 0i64..10_000,
        window in 1u32..365,
        horizon in 1u32..365,
    ) {
        let forecast = compute_forecast(Uuid::nil(), units, window, horizon, 0);
        let exact = Decimal::from(units) * Decimal::from(horizon) / Decimal::from(window);
        prop_assert!(Decimal::from(forecast.projected_demand) >= exact);
        prop_assert!(Decimal::from(forecast.projected_demand) < exact + Decimal::ONE);
        prop_assert_eq!(forecast.reorder_recommended, forecast.projected_demand > 0);
    }
}
