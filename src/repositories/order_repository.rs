use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::coupon_repository::{evaluate_code, redeem_in};
use super::inventory_repository::{allocate_in, consume_in, release_in};
use super::{paginate, BaseRepository, Pagination, Repository};
use crate::db::with_transaction;
use crate::entities::order::{self, OrderStatus};
use crate::entities::{customer, inventory_allocation, order_item, product};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::PaginatedResponse;

/// Most units a single order line may carry.
pub const MAX_LINE_QUANTITY: i32 = 10_000;
/// Most lines a single order may carry.
pub const MAX_ORDER_LINES: usize = 100;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrder {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<OrderLineInput>,
    #[validate(length(min = 1, max = 50))]
    pub coupon_code: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl CreateOrder {
    fn validate_lines(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for line in &self.items {
            line.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub escalated: Option<bool>,
}

/// An order with its lines and current allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub allocations: Vec<inventory_allocation::Model>,
}

/// Side effects of a placed order, published once the transaction commits.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub details: OrderDetails,
    pub coupon: Option<(String, Decimal)>,
}

impl PlacedOrder {
    pub async fn publish(&self, events: &crate::events::EventSender) {
        let order_id = self.details.order.id;
        events.send_or_log(Event::OrderCreated(order_id)).await;
        if let Some((code, discount)) = &self.coupon {
            events
                .send_or_log(Event::CouponRedeemed {
                    code: code.clone(),
                    discount: *discount,
                })
                .await;
        }
        if !self.details.allocations.is_empty() {
            events
                .send_or_log(Event::InventoryAllocated {
                    order_id,
                    allocations: self.details.allocations.iter().map(|a| a.id).collect(),
                })
                .await;
        }
    }
}

/// `ORD-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Prices the lines, applies the coupon, writes the order and reserves
/// stock. Runs on the caller's connection so it can join a transaction.
pub async fn place_order_in<C: ConnectionTrait>(
    conn: &C,
    input: CreateOrder,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<PlacedOrder, ServiceError> {
    input.validate_lines()?;

    let buyer = customer::Entity::find_by_id(input.customer_id)
        .filter(customer::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Customer", input.customer_id))?;
    if !buyer.is_active {
        return Err(ServiceError::InvalidOperation(
            "Customer account is disabled".to_string(),
        ));
    }

    let product_ids: Vec<Uuid> = input.items.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut priced = Vec::with_capacity(input.items.len());
    let mut subtotal = Decimal::ZERO;
    for line in &input.items {
        let item = products
            .get(&line.product_id)
            .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
        if !item.is_sellable() {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available for sale",
                item.sku
            )));
        }
        let unit_price = item.effective_price();
        let line_total = unit_price * Decimal::from(line.quantity);
        subtotal += line_total;
        priced.push((line.product_id, line.quantity, unit_price, line_total));
    }

    let mut coupon = None;
    let mut discount_total = Decimal::ZERO;
    if let Some(code) = input.coupon_code.as_deref() {
        let (found, discount) = evaluate_code(conn, code, subtotal, now).await?;
        redeem_in(conn, &found).await?;
        discount_total = discount;
        coupon = Some((found.code, discount));
    }

    let order_id = Uuid::new_v4();
    let created = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(generate_order_number(now)),
        customer_id: Set(buyer.id),
        status: Set(OrderStatus::Pending),
        subtotal: Set(subtotal),
        discount_total: Set(discount_total),
        total: Set(subtotal - discount_total),
        coupon_code: Set(coupon.as_ref().map(|(code, _)| code.clone())),
        notes: Set(input.notes),
        placed_at: Set(now),
        escalated_at: Set(None),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|e| ServiceError::from_db_unique(e, "Order number"))?;

    let mut items = Vec::with_capacity(priced.len());
    for (product_id, quantity, unit_price, line_total) in priced {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            line_total: Set(line_total),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;
        items.push(item);
    }

    let (allocations, _) = allocate_in(conn, order_id, now, user_id).await?;

    Ok(PlacedOrder {
        details: OrderDetails {
            order: created,
            items,
            allocations,
        },
        coupon,
    })
}

#[derive(Debug)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .filter(order::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    #[instrument(skip(self))]
    pub async fn details(&self, id: Uuid) -> Result<OrderDetails, ServiceError> {
        let found = self.find_by_id(id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .order_by_asc(order_item::Column::Id)
            .all(self.get_db())
            .await?;
        let allocations = inventory_allocation::Entity::find()
            .filter(inventory_allocation::Column::OrderId.eq(id))
            .order_by_asc(inventory_allocation::Column::CreatedAt)
            .all(self.get_db())
            .await?;
        Ok(OrderDetails {
            order: found,
            items,
            allocations,
        })
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let mut select = order::Entity::find().filter(order::Column::DeletedAt.is_null());
        if let Some(status) = filter.status {
            select = select.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(from) = filter.from {
            select = select.filter(order::Column::PlacedAt.gte(from));
        }
        if let Some(to) = filter.to {
            select = select.filter(order::Column::PlacedAt.lte(to));
        }
        match filter.escalated {
            Some(true) => select = select.filter(order::Column::EscalatedAt.is_not_null()),
            Some(false) => select = select.filter(order::Column::EscalatedAt.is_null()),
            None => {}
        }
        let select = select
            .order_by_desc(order::Column::PlacedAt)
            .order_by_asc(order::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    /// Places an order in one transaction: pricing, coupon redemption and
    /// stock allocation succeed or fail together.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create(
        &self,
        input: CreateOrder,
        user_id: Option<Uuid>,
    ) -> Result<OrderDetails, ServiceError> {
        let placed = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { place_order_in(txn, input, Utc::now(), user_id).await })
        })
        .await?;

        info!(
            order_id = %placed.details.order.id,
            order_number = %placed.details.order.order_number,
            total = %placed.details.order.total,
            "order placed"
        );
        placed.publish(self.base.events()).await;
        Ok(placed.details)
    }

    /// Moves an order along the status table. Cancelling releases stock;
    /// shipping consumes it. The status write is conditional on the status
    /// read here, so a concurrent change makes this call fail instead of
    /// releasing or consuming twice.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        next: OrderStatus,
        user_id: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let current = self.find_by_id(id).await?;
        let previous = current.status;
        if !previous.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change order status from {} to {}",
                previous, next
            )));
        }

        let (updated, moved) = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let result = order::Entity::update_many()
                    .col_expr(order::Column::Status, Expr::value(next))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now))
                    .filter(order::Column::Id.eq(id))
                    .filter(order::Column::Status.eq(previous))
                    .exec(txn)
                    .await?;
                if result.rows_affected != 1 {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} changed status concurrently",
                        id
                    )));
                }

                let moved = match next {
                    OrderStatus::Cancelled => release_in(txn, id, user_id).await?,
                    OrderStatus::Shipped => consume_in(txn, id, user_id).await?,
                    _ => 0,
                };
                let updated = order::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Order", id))?;
                Ok((updated, moved))
            })
        })
        .await?;

        info!(order_id = %id, from = %previous, to = %next, "order status changed");
        let events = self.base.events();
        events
            .send_or_log(Event::OrderStatusChanged {
                order_id: id,
                old_status: previous.to_string(),
                new_status: next.to_string(),
            })
            .await;
        match next {
            OrderStatus::Cancelled => {
                events.send_or_log(Event::OrderCancelled(id)).await;
                if moved > 0 {
                    events
                        .send_or_log(Event::InventoryReleased {
                            order_id: id,
                            quantity: moved,
                        })
                        .await;
                }
            }
            OrderStatus::Shipped if moved > 0 => {
                events
                    .send_or_log(Event::InventoryShipped {
                        order_id: id,
                        quantity: moved,
                    })
                    .await;
            }
            _ => {}
        }
        Ok(updated)
    }

    pub async fn cancel(&self, id: Uuid, user_id: Option<Uuid>) -> Result<order::Model, ServiceError> {
        self.update_status(id, OrderStatus::Cancelled, user_id).await
    }

    /// Only delivered or cancelled orders can be deleted.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        if !existing.status.is_final() {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot delete a {} order",
                existing.status
            )));
        }
        let now = Utc::now();
        let mut active: order::ActiveModel = existing.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        let existing = order::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;
        if existing.deleted_at.is_none() {
            return Ok(existing);
        }
        let mut active: order::ActiveModel = existing.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Open orders placed before `cutoff` that were never escalated.
    #[instrument(skip(self))]
    pub async fn find_delayed(&self, cutoff: DateTime<Utc>) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::DeletedAt.is_null())
            .filter(order::Column::EscalatedAt.is_null())
            .filter(
                order::Column::Status.is_in([OrderStatus::Pending, OrderStatus::Processing]),
            )
            .filter(order::Column::PlacedAt.lt(cutoff))
            .order_by_asc(order::Column::PlacedAt)
            .all(self.get_db())
            .await?)
    }

    pub async fn mark_escalated(
        &self,
        found: order::Model,
        at: DateTime<Utc>,
    ) -> Result<order::Model, ServiceError> {
        let mut active: order::ActiveModel = found.into();
        active.escalated_at = Set(Some(at));
        active.updated_at = Set(at);
        Ok(active.update(self.get_db()).await?)
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
