//! Shopping carts for customers and guest sessions.
//!
//! A caller owns at most one open cart. Totals are recomputed after every
//! change; a coupon that stopped applying is dropped during the recompute.
//! Merge and checkout touch several carts or an order, so they run inside a
//! transaction through the `*_in` helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::coupon_repository::evaluate_code;
use super::inventory_repository::available_for_sale;
use super::order_repository::{
    place_order_in, CreateOrder, OrderDetails, OrderLineInput, PlacedOrder, MAX_LINE_QUANTITY,
    MAX_ORDER_LINES,
};
use super::{BaseRepository, Repository};
use crate::db::with_transaction;
use crate::entities::cart::{self, CartStatus};
use crate::entities::{cart_item, customer, product};
use crate::errors::ServiceError;
use crate::events::Event;

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    Customer(Uuid),
    /// Guest identified by the `X-Cart-Session` header
    Guest(String),
}

impl CartOwner {
    fn condition(&self) -> Condition {
        match self {
            CartOwner::Customer(id) => Condition::all().add(cart::Column::CustomerId.eq(*id)),
            CartOwner::Guest(session) => Condition::all()
                .add(cart::Column::SessionId.eq(session.as_str()))
                .add(cart::Column::CustomerId.is_null()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCartItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItem {
    /// Zero removes the line
    #[validate(range(min = 0, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ApplyCoupon {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CheckoutCart {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

/// Idle customer cart due for a reminder.
#[derive(Debug, Clone)]
pub struct AbandonedCart {
    pub cart: cart::Model,
    pub customer: customer::Model,
    pub item_count: usize,
}

async fn find_open<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(cart::Entity::find()
        .filter(owner.condition())
        .filter(cart::Column::Status.is_in([CartStatus::Active, CartStatus::Abandoned]))
        .order_by_desc(cart::Column::UpdatedAt)
        .one(conn)
        .await?)
}

/// Open cart of `owner`, created on demand. An abandoned cart comes back to
/// life and becomes eligible for a new reminder.
async fn resolve_in<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
    now: DateTime<Utc>,
) -> Result<cart::Model, ServiceError> {
    if let Some(existing) = find_open(conn, owner).await? {
        if existing.status == CartStatus::Active {
            return Ok(existing);
        }
        let mut active: cart::ActiveModel = existing.into();
        active.status = Set(CartStatus::Active);
        active.reminder_sent_at = Set(None);
        active.updated_at = Set(now);
        return Ok(active.update(conn).await?);
    }

    let (customer_id, session_id) = match owner {
        CartOwner::Customer(id) => (Some(*id), None),
        CartOwner::Guest(session) => (None, Some(session.clone())),
    };
    Ok(cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        session_id: Set(session_id),
        status: Set(CartStatus::Active),
        coupon_code: Set(None),
        subtotal: Set(Decimal::ZERO),
        discount_total: Set(Decimal::ZERO),
        total: Set(Decimal::ZERO),
        reminder_sent_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?)
}

async fn line_for_product<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    product_id: Uuid,
) -> Result<Option<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

async fn line_count<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<usize, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .count(conn)
        .await? as usize)
}

/// Keeps a cart within what checkout can turn into an order.
fn check_order_limits(
    existing_line: bool,
    lines: usize,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(ServiceError::ValidationError(format!(
            "A cart line cannot hold more than {} units",
            MAX_LINE_QUANTITY
        )));
    }
    if !existing_line && lines >= MAX_ORDER_LINES {
        return Err(ServiceError::ValidationError(format!(
            "A cart cannot hold more than {} lines",
            MAX_ORDER_LINES
        )));
    }
    Ok(())
}

async fn sellable_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    let found = product::Entity::find_by_id(product_id)
        .filter(product::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
    if !found.is_sellable() {
        return Err(ServiceError::InvalidOperation(format!(
            "Product {} is not available for sale",
            found.sku
        )));
    }
    Ok(found)
}

async fn ensure_stock<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
    wanted: i32,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let available = available_for_sale(conn, product.id, now).await?;
    if i64::from(wanted) > available {
        return Err(ServiceError::InsufficientStock(format!(
            "Requested {} of {} but only {} available",
            wanted, product.sku, available
        )));
    }
    Ok(())
}

/// Writes the line for `product` with `quantity` units at the current price.
async fn upsert_line<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    existing: Option<cart_item::Model>,
    product: &product::Model,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let unit_price = product.effective_price();
    let line_total = unit_price * Decimal::from(quantity);
    match existing {
        Some(line) => {
            let mut active: cart_item::ActiveModel = line.into();
            active.quantity = Set(quantity);
            active.unit_price = Set(unit_price);
            active.line_total = Set(line_total);
            active.updated_at = Set(now);
            active.update(conn).await?;
        }
        None => {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                unit_price: Set(unit_price),
                line_total: Set(line_total),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?;
        }
    }
    Ok(())
}

/// Recomputes subtotal, discount and total from the stored lines.
pub async fn recompute_in<C: ConnectionTrait>(
    conn: &C,
    found: cart::Model,
    now: DateTime<Utc>,
) -> Result<CartView, ServiceError> {
    let items = load_items(conn, found.id).await?;
    let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();

    let mut coupon_code = found.coupon_code.clone();
    let mut discount = Decimal::ZERO;
    if let Some(code) = found.coupon_code.as_deref() {
        match evaluate_code(conn, code, subtotal, now).await {
            Ok((_, amount)) => discount = amount,
            Err(ServiceError::CouponError(reason)) => {
                info!(cart_id = %found.id, code, %reason, "coupon no longer applies, dropped");
                coupon_code = None;
            }
            Err(other) => return Err(other),
        }
    }

    let mut active: cart::ActiveModel = found.into();
    active.coupon_code = Set(coupon_code);
    active.subtotal = Set(subtotal);
    active.discount_total = Set(discount);
    active.total = Set(subtotal - discount);
    active.updated_at = Set(now);
    let updated = active.update(conn).await?;
    Ok(CartView {
        cart: updated,
        items,
    })
}

/// Moves the guest cart of `session_id` into the customer's cart. Merged
/// quantities never exceed what is in stock, and never shrink a line the
/// customer already had.
pub async fn merge_in<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    session_id: String,
    now: DateTime<Utc>,
) -> Result<(CartView, Option<Uuid>), ServiceError> {
    let guest = find_open(conn, &CartOwner::Guest(session_id)).await?;
    let target = resolve_in(conn, &CartOwner::Customer(customer_id), now).await?;
    let guest = match guest {
        Some(guest) => guest,
        None => return Ok((recompute_in(conn, target, now).await?, None)),
    };

    let mut lines = line_count(conn, target.id).await?;
    for line in load_items(conn, guest.id).await? {
        let item = match sellable_product(conn, line.product_id).await {
            Ok(item) => item,
            Err(ServiceError::NotFound(_)) | Err(ServiceError::InvalidOperation(_)) => {
                warn!(product_id = %line.product_id, "skipping unsellable guest cart line");
                continue;
            }
            Err(other) => return Err(other),
        };
        let existing = line_for_product(conn, target.id, item.id).await?;
        if existing.is_none() && lines >= MAX_ORDER_LINES {
            warn!(product_id = %item.id, "customer cart is full, guest cart line dropped");
            continue;
        }
        let current = existing.as_ref().map(|l| l.quantity).unwrap_or(0);
        let available = available_for_sale(conn, item.id, now).await?;
        let wanted = i64::from(current) + i64::from(line.quantity);
        let merged = wanted
            .min(available.max(i64::from(current)))
            .min(i64::from(MAX_LINE_QUANTITY.max(current)));
        let merged = i32::try_from(merged).unwrap_or(MAX_LINE_QUANTITY);
        if merged <= current {
            continue;
        }
        if existing.is_none() {
            lines += 1;
        }
        upsert_line(conn, target.id, existing, &item, merged, now).await?;
    }

    let guest_id = guest.id;
    let guest_coupon = guest.coupon_code.clone();
    let mut retired: cart::ActiveModel = guest.into();
    retired.status = Set(CartStatus::Merged);
    retired.updated_at = Set(now);
    retired.update(conn).await?;

    let target = if target.coupon_code.is_none() && guest_coupon.is_some() {
        let mut active: cart::ActiveModel = target.into();
        active.coupon_code = Set(guest_coupon);
        active.update(conn).await?
    } else {
        target
    };

    Ok((recompute_in(conn, target, now).await?, Some(guest_id)))
}

/// Turns the customer's open cart into an order and marks it converted.
pub async fn checkout_in<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    input: CheckoutCart,
    now: DateTime<Utc>,
) -> Result<(PlacedOrder, Uuid), ServiceError> {
    let found = find_open(conn, &CartOwner::Customer(customer_id))
        .await?
        .ok_or_else(|| ServiceError::InvalidOperation("Cart is empty".to_string()))?;
    let view = recompute_in(conn, found, now).await?;
    if view.items.is_empty() {
        return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
    }

    let placed = place_order_in(
        conn,
        CreateOrder {
            customer_id,
            items: view
                .items
                .iter()
                .map(|line| OrderLineInput {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
            coupon_code: view.cart.coupon_code.clone(),
            notes: input.notes,
        },
        now,
        None,
    )
    .await?;

    let cart_id = view.cart.id;
    let mut converted: cart::ActiveModel = view.cart.into();
    converted.status = Set(CartStatus::Converted);
    converted.updated_at = Set(now);
    converted.update(conn).await?;

    Ok((placed, cart_id))
}

#[derive(Debug)]
pub struct CartRepository {
    base: BaseRepository,
}

impl CartRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    async fn open_or_missing(&self, owner: &CartOwner) -> Result<cart::Model, ServiceError> {
        find_open(self.get_db(), owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))
    }

    async fn changed(&self, view: CartView) -> CartView {
        self.base
            .events()
            .send_or_log(Event::CartUpdated(view.cart.id))
            .await;
        view
    }

    #[instrument(skip(self))]
    pub async fn current(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let found = resolve_in(self.get_db(), owner, Utc::now()).await?;
        let items = load_items(self.get_db(), found.id).await?;
        Ok(CartView { cart: found, items })
    }

    /// Adds units of a product, merging with an existing line. The line's
    /// total quantity must be in stock.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddCartItem,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let db = self.get_db();
        let now = Utc::now();
        let item = sellable_product(db, input.product_id).await?;
        let found = resolve_in(db, owner, now).await?;

        let existing = line_for_product(db, found.id, item.id).await?;
        let wanted = existing.as_ref().map(|l| l.quantity).unwrap_or(0) + input.quantity;
        check_order_limits(existing.is_some(), line_count(db, found.id).await?, wanted)?;
        ensure_stock(db, &item, wanted, now).await?;
        upsert_line(db, found.id, existing, &item, wanted, now).await?;

        let view = recompute_in(db, found, now).await?;
        Ok(self.changed(view).await)
    }

    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        input: UpdateCartItem,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let db = self.get_db();
        let now = Utc::now();
        let found = self.open_or_missing(owner).await?;
        let line = cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(found.id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart item", item_id))?;

        if input.quantity == 0 {
            cart_item::Entity::delete_by_id(line.id).exec(db).await?;
        } else {
            let item = sellable_product(db, line.product_id).await?;
            ensure_stock(db, &item, input.quantity, now).await?;
            upsert_line(db, found.id, Some(line), &item, input.quantity, now).await?;
        }

        let view = recompute_in(db, found, now).await?;
        Ok(self.changed(view).await)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let db = self.get_db();
        let found = self.open_or_missing(owner).await?;
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(found.id))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Cart item", item_id));
        }
        let view = recompute_in(db, found, Utc::now()).await?;
        Ok(self.changed(view).await)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let db = self.get_db();
        let found = self.open_or_missing(owner).await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(found.id))
            .exec(db)
            .await?;
        let view = recompute_in(db, found, Utc::now()).await?;
        Ok(self.changed(view).await)
    }

    /// Fails with a coupon error when the code does not apply to the
    /// current subtotal.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        owner: &CartOwner,
        input: ApplyCoupon,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let db = self.get_db();
        let now = Utc::now();
        let found = resolve_in(db, owner, now).await?;
        let subtotal: Decimal = load_items(db, found.id)
            .await?
            .iter()
            .map(|i| i.line_total)
            .sum();
        let (coupon, _) = evaluate_code(db, &input.code, subtotal, now).await?;

        let mut active: cart::ActiveModel = found.into();
        active.coupon_code = Set(Some(coupon.code));
        let found = active.update(db).await?;
        let view = recompute_in(db, found, now).await?;
        Ok(self.changed(view).await)
    }

    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let db = self.get_db();
        let found = self.open_or_missing(owner).await?;
        let mut active: cart::ActiveModel = found.into();
        active.coupon_code = Set(None);
        let found = active.update(db).await?;
        let view = recompute_in(db, found, Utc::now()).await?;
        Ok(self.changed(view).await)
    }

    #[instrument(skip(self))]
    pub async fn merge(&self, customer_id: Uuid, session_id: &str) -> Result<CartView, ServiceError> {
        let session_id = session_id.to_string();
        let (view, merged_from) = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { merge_in(txn, customer_id, session_id, Utc::now()).await })
        })
        .await?;

        if let Some(from_cart_id) = merged_from {
            info!(from_cart_id = %from_cart_id, into_cart_id = %view.cart.id, "guest cart merged");
            self.base
                .events()
                .send_or_log(Event::CartMerged {
                    from_cart_id,
                    into_cart_id: view.cart.id,
                })
                .await;
        }
        Ok(view)
    }

    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        customer_id: Uuid,
        input: CheckoutCart,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;
        let (placed, cart_id) = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { checkout_in(txn, customer_id, input, Utc::now()).await })
        })
        .await?;

        let order_id = placed.details.order.id;
        info!(cart_id = %cart_id, order_id = %order_id, "cart checked out");
        placed.publish(self.base.events()).await;
        self.base
            .events()
            .send_or_log(Event::CartCheckedOut { cart_id, order_id })
            .await;
        Ok(placed.details)
    }

    /// Active customer carts with lines, idle since before `cutoff` and not
    /// yet reminded.
    #[instrument(skip(self))]
    pub async fn find_abandonment_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AbandonedCart>, ServiceError> {
        let db = self.get_db();
        let carts = cart::Entity::find()
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .filter(cart::Column::CustomerId.is_not_null())
            .filter(cart::Column::ReminderSentAt.is_null())
            .filter(cart::Column::UpdatedAt.lt(cutoff))
            .order_by_asc(cart::Column::UpdatedAt)
            .all(db)
            .await?;
        if carts.is_empty() {
            return Ok(vec![]);
        }

        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for line in cart_item::Entity::find()
            .filter(cart_item::Column::CartId.is_in(carts.iter().map(|c| c.id)))
            .all(db)
            .await?
        {
            *counts.entry(line.cart_id).or_default() += 1;
        }

        let customers: HashMap<Uuid, customer::Model> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(carts.iter().filter_map(|c| c.customer_id)))
            .filter(customer::Column::DeletedAt.is_null())
            .filter(customer::Column::IsActive.eq(true))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(carts
            .into_iter()
            .filter_map(|found| {
                let item_count = counts.get(&found.id).copied().unwrap_or(0);
                let owner = customers.get(&found.customer_id?)?.clone();
                (item_count > 0).then(|| AbandonedCart {
                    cart: found,
                    customer: owner,
                    item_count,
                })
            })
            .collect())
    }

    /// Stamps the reminder and marks the cart abandoned. Returns false when
    /// the cart changed state in the meantime.
    #[instrument(skip(self))]
    pub async fn mark_reminded(&self, cart_id: Uuid, at: DateTime<Utc>) -> Result<bool, ServiceError> {
        let result = cart::Entity::update_many()
            .col_expr(cart::Column::ReminderSentAt, Expr::value(at))
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Abandoned))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .exec(self.get_db())
            .await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }
        self.base
            .events()
            .send_or_log(Event::CartAbandoned(cart_id))
            .await;
        Ok(true)
    }
}

impl Repository for CartRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
