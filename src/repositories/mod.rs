use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, Select};
use std::sync::Arc;
use std::time::Duration;
use validator::ValidationError;

use crate::cache::CacheBackend;
use crate::events::EventSender;
use crate::PaginatedResponse;

pub mod cart_repository;
pub mod category_repository;
pub mod coupon_repository;
pub mod customer_repository;
pub mod email_repository;
pub mod inventory_repository;
pub mod order_repository;
pub mod product_repository;
pub mod role_repository;
pub mod supplier_repository;
pub mod user_activity_repository;
pub mod user_repository;

pub use cart_repository::CartRepository;
pub use category_repository::CategoryRepository;
pub use coupon_repository::CouponRepository;
pub use customer_repository::CustomerRepository;
pub use email_repository::EmailRepository;
pub use inventory_repository::InventoryRepository;
pub use order_repository::OrderRepository;
pub use product_repository::ProductRepository;
pub use role_repository::RoleRepository;
pub use supplier_repository::SupplierRepository;
pub use user_activity_repository::UserActivityRepository;
pub use user_repository::UserRepository;

/// Base repository trait that all repositories should implement
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

/// Shared state of every repository
#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn db_arc(&self) -> Arc<DatabaseConnection> {
        self.db.clone()
    }

    pub fn events(&self) -> &EventSender {
        &self.event_sender
    }
}

/// One-based page request with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u64 = 20;
    pub const MAX_LIMIT: u64 = 100;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Runs `select` one page at a time and wraps the result.
pub async fn paginate<E, C>(
    db: &C,
    select: Select<E>,
    pagination: Pagination,
) -> Result<PaginatedResponse<E::Model>, DbErr>
where
    E: EntityTrait,
    E::Model: Sync,
    C: ConnectionTrait,
{
    let paginator = select.paginate(db, pagination.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(pagination.page - 1).await?;
    Ok(PaginatedResponse::new(
        items,
        total,
        pagination.page,
        pagination.limit,
    ))
}

/// URL slug: lower case, runs of non alphanumerics collapsed to `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Contains-match pattern for `LIKE`.
pub fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

/// Validator hook for money and rate fields.
pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must not be negative"));
    }
    Ok(())
}

/// Every repository, shared through the application state.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<CategoryRepository>,
    pub products: Arc<ProductRepository>,
    pub customers: Arc<CustomerRepository>,
    pub orders: Arc<OrderRepository>,
    pub coupons: Arc<CouponRepository>,
    pub suppliers: Arc<SupplierRepository>,
    pub inventory: Arc<InventoryRepository>,
    pub roles: Arc<RoleRepository>,
    pub users: Arc<UserRepository>,
    pub emails: Arc<EmailRepository>,
    pub carts: Arc<CartRepository>,
    pub activities: Arc<UserActivityRepository>,
}

impl Repositories {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        cache: Arc<dyn CacheBackend>,
        category_cache_ttl: Duration,
    ) -> Self {
        let base = BaseRepository::new(db, event_sender);
        Self {
            categories: Arc::new(CategoryRepository::new(
                base.clone(),
                cache,
                category_cache_ttl,
            )),
            products: Arc::new(ProductRepository::new(base.clone())),
            customers: Arc::new(CustomerRepository::new(base.clone())),
            orders: Arc::new(OrderRepository::new(base.clone())),
            coupons: Arc::new(CouponRepository::new(base.clone())),
            suppliers: Arc::new(SupplierRepository::new(base.clone())),
            inventory: Arc::new(InventoryRepository::new(base.clone())),
            roles: Arc::new(RoleRepository::new(base.clone())),
            users: Arc::new(UserRepository::new(base.clone())),
            emails: Arc::new(EmailRepository::new(base.clone())),
            carts: Arc::new(CartRepository::new(base.clone())),
            activities: Arc::new(UserActivityRepository::new(base)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::default(), Pagination { page: 1, limit: 20 });
        assert_eq!(
            Pagination::new(Some(0), Some(1000)),
            Pagination { page: 1, limit: 100 }
        );
        assert_eq!(Pagination::new(Some(3), Some(0)).limit, 1);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Summer Shoes"), "summer-shoes");
        assert_eq!(slugify("  Men's  T-Shirts!! "), "men-s-t-shirts");
        assert_eq!(slugify("USB-C / Lightning"), "usb-c-lightning");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn negative_amounts_fail_validation() {
        use rust_decimal_macros::dec;
        assert!(validate_non_negative(&dec!(0)).is_ok());
        assert!(validate_non_negative(&dec!(12.5)).is_ok());
        assert!(validate_non_negative(&dec!(-0.01)).is_err());
    }

    #[test]
    fn like_pattern_trims_term() {
        assert_eq!(like_pattern(" shoe "), "%shoe%");
    }
}
