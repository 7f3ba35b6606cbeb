//! Stock levels per product and warehouse.
//!
//! Rows are keyed by (product, warehouse, batch). Units move through three
//! paths:
//!
//! - adjustments and restocks change `quantity` on one row;
//! - transfers take units from the source warehouse first-expired-first-out
//!   and credit a destination row with the same batch;
//! - allocations reserve units for an order (`reserved_quantity`) and are
//!   released again when the order is cancelled.
//!
//! Multi-row operations have `*_in` variants that run on any connection so
//! order creation and checkout can reuse them inside their own transaction.
//! Quantity changes are conditional updates, so two writers can never push a
//! row below its reservations.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{paginate, BaseRepository, Pagination, Repository};
use crate::db::with_transaction;
use crate::entities::inventory_allocation::{self, AllocationStatus};
use crate::entities::inventory_log::{self, MovementReason};
use crate::entities::order::{self, OrderStatus};
use crate::entities::{inventory_stock, order_item, product, supplier, warehouse};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::PaginatedResponse;

fn validate_change(change: i32) -> Result<(), ValidationError> {
    if change == 0 {
        return Err(ValidationError::new("must not be zero"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateStock {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub supplier_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
    #[validate(range(min = 0))]
    pub reorder_quantity: Option<i32>,
    pub auto_restock: Option<bool>,
}

/// Quantities change only through adjustments, transfers and allocations.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStock {
    pub supplier_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
    #[validate(range(min = 0))]
    pub reorder_quantity: Option<i32>,
    pub auto_restock: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustStock {
    #[validate(custom = "validate_change")]
    pub change: i32,
    #[validate(length(max = 255))]
    pub reason: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TransferStock {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWarehouse {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateWarehouse {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferLine {
    pub from_stock_id: Uuid,
    pub to_stock_id: Uuid,
    pub batch_number: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferResult {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub quantity: i32,
    pub lines: Vec<TransferLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DemandForecast {
    pub product_id: Uuid,
    pub window_days: u32,
    pub horizon_days: u32,
    pub units_sold: i64,
    pub average_daily_demand: Decimal,
    pub projected_demand: i64,
    pub available: i64,
    pub days_of_cover: Option<Decimal>,
    pub reorder_recommended: bool,
}

/// Units to take from one stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickLine {
    pub stock_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: i32,
    pub available: i64,
}

/// Chooses rows earliest expiry first (undated rows last, then oldest row
/// first) until `needed` units are covered.
pub fn plan_fefo(rows: &[inventory_stock::Model], needed: i32) -> Result<Vec<PickLine>, Shortfall> {
    let mut candidates: Vec<&inventory_stock::Model> =
        rows.iter().filter(|r| r.available() > 0).collect();
    candidates.sort_by_key(|r| (r.expiry_date.is_none(), r.expiry_date, r.created_at, r.id));

    let mut remaining = needed;
    let mut picks = Vec::new();
    for row in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(row.available());
        picks.push(PickLine {
            stock_id: row.id,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > 0 {
        return Err(Shortfall {
            requested: needed,
            available: rows.iter().map(|r| i64::from(r.available().max(0))).sum(),
        });
    }
    Ok(picks)
}

/// Moving-average demand projection.
pub fn compute_forecast(
    product_id: Uuid,
    units_sold: i64,
    window_days: u32,
    horizon_days: u32,
    available: i64,
) -> DemandForecast {
    let window = i64::from(window_days.max(1));
    let horizon = i64::from(horizon_days);
    let average_daily_demand = (Decimal::from(units_sold) / Decimal::from(window)).round_dp(2);
    let projected_demand = (units_sold * horizon + window - 1) / window;
    let days_of_cover = if units_sold > 0 {
        Some((Decimal::from(available.max(0)) * Decimal::from(window) / Decimal::from(units_sold)).round_dp(1))
    } else {
        None
    };

    DemandForecast {
        product_id,
        window_days,
        horizon_days,
        units_sold,
        average_daily_demand,
        projected_demand,
        available,
        days_of_cover,
        reorder_recommended: projected_demand > available,
    }
}

fn shortage(product_id: Uuid, shortfall: Shortfall) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "product {}: requested {}, available {}",
        product_id, shortfall.requested, shortfall.available
    ))
}

async fn find_stock<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<inventory_stock::Model, ServiceError> {
    inventory_stock::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Stock row", id))
}

async fn active_warehouse_ids<C: ConnectionTrait>(conn: &C) -> Result<Vec<Uuid>, DbErr> {
    Ok(warehouse::Entity::find()
        .filter(warehouse::Column::IsActive.eq(true))
        .all(conn)
        .await?
        .into_iter()
        .map(|w| w.id)
        .collect())
}

/// Rows of a product that can be sold at `now`: active warehouses only,
/// expired batches excluded.
async fn sellable_rows<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<inventory_stock::Model>, DbErr> {
    let warehouses = active_warehouse_ids(conn).await?;
    if warehouses.is_empty() {
        return Ok(vec![]);
    }
    Ok(inventory_stock::Entity::find()
        .filter(inventory_stock::Column::ProductId.eq(product_id))
        .filter(inventory_stock::Column::WarehouseId.is_in(warehouses))
        .all(conn)
        .await?
        .into_iter()
        .filter(|r| !r.is_expired(now))
        .collect())
}

/// Units of a product customers can still buy.
pub async fn available_for_sale<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    now: DateTime<Utc>,
) -> Result<i64, DbErr> {
    Ok(sellable_rows(conn, product_id, now)
        .await?
        .iter()
        .map(|r| i64::from(r.available().max(0)))
        .sum())
}

/// `quantity += delta`; a decrease only applies while it keeps the row at
/// or above its reservations.
async fn shift_quantity<C: ConnectionTrait>(
    conn: &C,
    stock_id: Uuid,
    delta: i32,
) -> Result<bool, DbErr> {
    let mut update = inventory_stock::Entity::update_many()
        .col_expr(
            inventory_stock::Column::Quantity,
            Expr::col(inventory_stock::Column::Quantity).add(delta),
        )
        .col_expr(inventory_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_stock::Column::Id.eq(stock_id));
    if delta < 0 {
        update = update.filter(
            Expr::expr(
                Expr::col(inventory_stock::Column::Quantity)
                    .sub(Expr::col(inventory_stock::Column::ReservedQuantity)),
            )
            .gte(-delta),
        );
    }
    Ok(update.exec(conn).await?.rows_affected == 1)
}

async fn shift_reserved<C: ConnectionTrait>(
    conn: &C,
    stock_id: Uuid,
    delta: i32,
) -> Result<bool, DbErr> {
    let mut update = inventory_stock::Entity::update_many()
        .col_expr(
            inventory_stock::Column::ReservedQuantity,
            Expr::col(inventory_stock::Column::ReservedQuantity).add(delta),
        )
        .col_expr(inventory_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_stock::Column::Id.eq(stock_id));
    update = if delta > 0 {
        update.filter(
            Expr::expr(
                Expr::col(inventory_stock::Column::Quantity)
                    .sub(Expr::col(inventory_stock::Column::ReservedQuantity)),
            )
            .gte(delta),
        )
    } else {
        update.filter(inventory_stock::Column::ReservedQuantity.gte(-delta))
    };
    Ok(update.exec(conn).await?.rows_affected == 1)
}

/// Movement log entry. For adjustments, transfers, restocks and shipments
/// `change` and `quantity_after` describe on-hand units; for allocations and releases
/// they describe available units.
async fn write_log<C: ConnectionTrait>(
    conn: &C,
    stock: &inventory_stock::Model,
    change: i32,
    quantity_after: i32,
    reason: MovementReason,
    reference: Option<String>,
    user_id: Option<Uuid>,
) -> Result<inventory_log::Model, DbErr> {
    inventory_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_stock_id: Set(stock.id),
        product_id: Set(stock.product_id),
        warehouse_id: Set(stock.warehouse_id),
        change: Set(change),
        quantity_after: Set(quantity_after),
        reason: Set(reason),
        reference: Set(reference),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
}

/// Reserves stock for every line of an order. Existing allocations are
/// returned untouched; otherwise either every line is covered or nothing is
/// written.
pub async fn allocate_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    now: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<(Vec<inventory_allocation::Model>, bool), ServiceError> {
    let existing = inventory_allocation::Entity::find()
        .filter(inventory_allocation::Column::OrderId.eq(order_id))
        .filter(inventory_allocation::Column::Status.eq(AllocationStatus::Allocated))
        .all(conn)
        .await?;
    if !existing.is_empty() {
        return Ok((existing, false));
    }

    let mut needed: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?
    {
        *needed.entry(item.product_id).or_insert(0) += item.quantity;
    }

    let mut plan = Vec::new();
    for (product_id, quantity) in &needed {
        let rows = sellable_rows(conn, *product_id, now).await?;
        let picks = plan_fefo(&rows, *quantity).map_err(|s| shortage(*product_id, s))?;
        plan.extend(picks.into_iter().map(|p| (*product_id, p)));
    }

    let reference = Some(format!("order:{}", order_id));
    let mut allocations = Vec::with_capacity(plan.len());
    for (product_id, pick) in plan {
        if !shift_reserved(conn, pick.stock_id, pick.quantity).await? {
            return Err(ServiceError::InsufficientStock(format!(
                "product {}: stock changed while allocating",
                product_id
            )));
        }
        let stock = find_stock(conn, pick.stock_id).await?;
        write_log(
            conn,
            &stock,
            -pick.quantity,
            stock.available(),
            MovementReason::Allocation,
            reference.clone(),
            user_id,
        )
        .await?;

        let allocation = inventory_allocation::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            inventory_stock_id: Set(pick.stock_id),
            product_id: Set(product_id),
            quantity: Set(pick.quantity),
            status: Set(AllocationStatus::Allocated),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        allocations.push(allocation);
    }
    Ok((allocations, true))
}

/// Returns every reserved unit of an order to its row. Returns the number of
/// units released.
pub async fn release_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<i32, ServiceError> {
    let allocations = inventory_allocation::Entity::find()
        .filter(inventory_allocation::Column::OrderId.eq(order_id))
        .filter(inventory_allocation::Column::Status.eq(AllocationStatus::Allocated))
        .all(conn)
        .await?;

    let reference = Some(format!("order:{}", order_id));
    let mut released = 0;
    for allocation in allocations {
        if !shift_reserved(conn, allocation.inventory_stock_id, -allocation.quantity).await? {
            return Err(ServiceError::InternalError(format!(
                "reserved units of stock row {} are out of sync",
                allocation.inventory_stock_id
            )));
        }
        let stock = find_stock(conn, allocation.inventory_stock_id).await?;
        write_log(
            conn,
            &stock,
            allocation.quantity,
            stock.available(),
            MovementReason::Release,
            reference.clone(),
            user_id,
        )
        .await?;

        released += allocation.quantity;
        let mut active: inventory_allocation::ActiveModel = allocation.into();
        active.status = Set(AllocationStatus::Released);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
    }
    Ok(released)
}

/// Takes the reserved units of a shipped order off the shelf: both
/// `quantity` and `reserved_quantity` drop by the allocated amount and the
/// allocations become `consumed`. Returns the number of units shipped.
pub async fn consume_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<i32, ServiceError> {
    let allocations = inventory_allocation::Entity::find()
        .filter(inventory_allocation::Column::OrderId.eq(order_id))
        .filter(inventory_allocation::Column::Status.eq(AllocationStatus::Allocated))
        .all(conn)
        .await?;

    let reference = Some(format!("order:{}", order_id));
    let mut shipped = 0;
    for allocation in allocations {
        let result = inventory_stock::Entity::update_many()
            .col_expr(
                inventory_stock::Column::Quantity,
                Expr::col(inventory_stock::Column::Quantity).sub(allocation.quantity),
            )
            .col_expr(
                inventory_stock::Column::ReservedQuantity,
                Expr::col(inventory_stock::Column::ReservedQuantity).sub(allocation.quantity),
            )
            .col_expr(inventory_stock::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_stock::Column::Id.eq(allocation.inventory_stock_id))
            .filter(inventory_stock::Column::ReservedQuantity.gte(allocation.quantity))
            .exec(conn)
            .await?;
        if result.rows_affected != 1 {
            return Err(ServiceError::InternalError(format!(
                "reserved units of stock row {} are out of sync",
                allocation.inventory_stock_id
            )));
        }
        let stock = find_stock(conn, allocation.inventory_stock_id).await?;
        write_log(
            conn,
            &stock,
            -allocation.quantity,
            stock.quantity,
            MovementReason::Shipment,
            reference.clone(),
            user_id,
        )
        .await?;

        shipped += allocation.quantity;
        let mut active: inventory_allocation::ActiveModel = allocation.into();
        active.status = Set(AllocationStatus::Consumed);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
    }
    Ok(shipped)
}

async fn ensure_active_warehouse<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<warehouse::Model, ServiceError> {
    let found = warehouse::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Warehouse", id))?;
    if !found.is_active {
        return Err(ServiceError::InvalidOperation(format!(
            "Warehouse {} is not active",
            found.code
        )));
    }
    Ok(found)
}

/// Destination row with the same batch, created empty when missing.
async fn destination_row<C: ConnectionTrait>(
    conn: &C,
    source: &inventory_stock::Model,
    to_warehouse_id: Uuid,
) -> Result<inventory_stock::Model, DbErr> {
    let mut select = inventory_stock::Entity::find()
        .filter(inventory_stock::Column::ProductId.eq(source.product_id))
        .filter(inventory_stock::Column::WarehouseId.eq(to_warehouse_id));
    select = match &source.batch_number {
        Some(batch) => select.filter(inventory_stock::Column::BatchNumber.eq(batch.as_str())),
        None => select.filter(inventory_stock::Column::BatchNumber.is_null()),
    };
    if let Some(found) = select.one(conn).await? {
        return Ok(found);
    }

    let now = Utc::now();
    inventory_stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(source.product_id),
        warehouse_id: Set(to_warehouse_id),
        supplier_id: Set(source.supplier_id),
        batch_number: Set(source.batch_number.clone()),
        expiry_date: Set(source.expiry_date),
        quantity: Set(0),
        reserved_quantity: Set(0),
        reorder_point: Set(0),
        reorder_quantity: Set(0),
        auto_restock: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
}

/// Moves units of one product between warehouses, batch by batch.
pub async fn transfer_in<C: ConnectionTrait>(
    conn: &C,
    input: TransferStock,
    user_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<TransferResult, ServiceError> {
    if input.from_warehouse_id == input.to_warehouse_id {
        return Err(ServiceError::InvalidOperation(
            "Source and destination warehouses must differ".to_string(),
        ));
    }
    ensure_active_warehouse(conn, input.from_warehouse_id).await?;
    ensure_active_warehouse(conn, input.to_warehouse_id).await?;

    let rows: Vec<inventory_stock::Model> = inventory_stock::Entity::find()
        .filter(inventory_stock::Column::ProductId.eq(input.product_id))
        .filter(inventory_stock::Column::WarehouseId.eq(input.from_warehouse_id))
        .all(conn)
        .await?
        .into_iter()
        .filter(|r| !r.is_expired(now))
        .collect();
    let picks =
        plan_fefo(&rows, input.quantity).map_err(|s| shortage(input.product_id, s))?;

    let reference = input
        .reference
        .clone()
        .or_else(|| Some(format!("transfer:{}", Uuid::new_v4())));
    let mut lines = Vec::with_capacity(picks.len());
    for pick in picks {
        if !shift_quantity(conn, pick.stock_id, -pick.quantity).await? {
            return Err(ServiceError::InsufficientStock(format!(
                "product {}: stock changed while transferring",
                input.product_id
            )));
        }
        let source = find_stock(conn, pick.stock_id).await?;
        write_log(
            conn,
            &source,
            -pick.quantity,
            source.quantity,
            MovementReason::TransferOut,
            reference.clone(),
            user_id,
        )
        .await?;

        let target = destination_row(conn, &source, input.to_warehouse_id).await?;
        shift_quantity(conn, target.id, pick.quantity).await?;
        let target = find_stock(conn, target.id).await?;
        write_log(
            conn,
            &target,
            pick.quantity,
            target.quantity,
            MovementReason::TransferIn,
            reference.clone(),
            user_id,
        )
        .await?;

        lines.push(TransferLine {
            from_stock_id: source.id,
            to_stock_id: target.id,
            batch_number: source.batch_number.clone(),
            quantity: pick.quantity,
        });
    }

    Ok(TransferResult {
        product_id: input.product_id,
        from_warehouse_id: input.from_warehouse_id,
        to_warehouse_id: input.to_warehouse_id,
        quantity: input.quantity,
        lines,
    })
}

#[derive(Debug)]
pub struct InventoryRepository {
    base: BaseRepository,
}

impl InventoryRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<inventory_stock::Model, ServiceError> {
        find_stock(self.get_db(), id).await
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        product_id: Option<Uuid>,
        warehouse_id: Option<Uuid>,
        supplier_id: Option<Uuid>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<inventory_stock::Model>, ServiceError> {
        let mut select = inventory_stock::Entity::find();
        if let Some(product_id) = product_id {
            select = select.filter(inventory_stock::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = warehouse_id {
            select = select.filter(inventory_stock::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(supplier_id) = supplier_id {
            select = select.filter(inventory_stock::Column::SupplierId.eq(supplier_id));
        }
        let select = select
            .order_by_asc(inventory_stock::Column::CreatedAt)
            .order_by_asc(inventory_stock::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn create(
        &self,
        input: CreateStock,
        user_id: Option<Uuid>,
    ) -> Result<inventory_stock::Model, ServiceError> {
        input.validate()?;
        let db = self.get_db();
        product::Entity::find_by_id(input.product_id)
            .filter(product::Column::DeletedAt.is_null())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", input.product_id))?;
        warehouse::Entity::find_by_id(input.warehouse_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Warehouse", input.warehouse_id))?;
        if let Some(supplier_id) = input.supplier_id {
            self.ensure_supplier(supplier_id).await?;
        }

        let mut duplicate = inventory_stock::Entity::find()
            .filter(inventory_stock::Column::ProductId.eq(input.product_id))
            .filter(inventory_stock::Column::WarehouseId.eq(input.warehouse_id));
        duplicate = match &input.batch_number {
            Some(batch) => duplicate.filter(inventory_stock::Column::BatchNumber.eq(batch.as_str())),
            None => duplicate.filter(inventory_stock::Column::BatchNumber.is_null()),
        };
        if duplicate.one(db).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Stock row for this product, warehouse and batch already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let created = inventory_stock::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            warehouse_id: Set(input.warehouse_id),
            supplier_id: Set(input.supplier_id),
            batch_number: Set(input.batch_number),
            expiry_date: Set(input.expiry_date),
            quantity: Set(input.quantity),
            reserved_quantity: Set(0),
            reorder_point: Set(input.reorder_point.unwrap_or(0)),
            reorder_quantity: Set(input.reorder_quantity.unwrap_or(0)),
            auto_restock: Set(input.auto_restock.unwrap_or(false)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        if created.quantity > 0 {
            write_log(
                db,
                &created,
                created.quantity,
                created.quantity,
                MovementReason::Initial,
                None,
                user_id,
            )
            .await?;
        }
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateStock,
    ) -> Result<inventory_stock::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_by_id(id).await?;
        if let Some(supplier_id) = input.supplier_id {
            self.ensure_supplier(supplier_id).await?;
        }

        let mut active: inventory_stock::ActiveModel = existing.into();
        if input.supplier_id.is_some() {
            active.supplier_id = Set(input.supplier_id);
        }
        if input.batch_number.is_some() {
            active.batch_number = Set(input.batch_number);
        }
        if input.expiry_date.is_some() {
            active.expiry_date = Set(input.expiry_date);
        }
        if let Some(reorder_point) = input.reorder_point {
            active.reorder_point = Set(reorder_point);
        }
        if let Some(reorder_quantity) = input.reorder_quantity {
            active.reorder_quantity = Set(reorder_quantity);
        }
        if let Some(auto_restock) = input.auto_restock {
            active.auto_restock = Set(auto_restock);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Rows holding reservations cannot be removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_by_id(id).await?;
        if existing.reserved_quantity > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Stock row still holds {} reserved unit(s)",
                existing.reserved_quantity
            )));
        }
        inventory_log::Entity::delete_many()
            .filter(inventory_log::Column::InventoryStockId.eq(id))
            .exec(self.get_db())
            .await?;
        inventory_stock::Entity::delete_by_id(id)
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        Ok(warehouse::Entity::find()
            .order_by_asc(warehouse::Column::Code)
            .all(self.get_db())
            .await?)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_warehouse(
        &self,
        input: CreateWarehouse,
    ) -> Result<warehouse::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        Ok(warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            code: Set(input.code.trim().to_uppercase()),
            location: Set(input.location),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Warehouse code"))?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_warehouse(
        &self,
        id: Uuid,
        input: UpdateWarehouse,
    ) -> Result<warehouse::Model, ServiceError> {
        input.validate()?;
        let existing = warehouse::Entity::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Warehouse", id))?;

        let mut active: warehouse::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(code) = input.code {
            active.code = Set(code.trim().to_uppercase());
        }
        if input.location.is_some() {
            active.location = Set(input.location);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        Ok(active
            .update(self.get_db())
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Warehouse code"))?)
    }

    /// Adds `change` (which may be negative) to the on-hand quantity.
    #[instrument(skip(self, input))]
    pub async fn adjust(
        &self,
        id: Uuid,
        input: AdjustStock,
        user_id: Option<Uuid>,
    ) -> Result<inventory_stock::Model, ServiceError> {
        input.validate()?;
        let db = self.get_db();
        let before = self.find_by_id(id).await?;

        if !shift_quantity(db, id, input.change).await? {
            return Err(ServiceError::InsufficientStock(format!(
                "adjustment of {} would leave fewer units than the {} reserved",
                input.change, before.reserved_quantity
            )));
        }
        let after = self.find_by_id(id).await?;

        let reference = match (input.reason, input.reference) {
            (Some(reason), Some(reference)) => Some(format!("{}: {}", reason, reference)),
            (reason, reference) => reason.or(reference),
        };
        write_log(
            db,
            &after,
            input.change,
            after.quantity,
            MovementReason::Adjustment,
            reference,
            user_id,
        )
        .await?;

        info!(stock_id = %id, change = input.change, quantity = after.quantity, "stock adjusted");
        self.base
            .events()
            .send_or_log(Event::InventoryAdjusted {
                stock_id: id,
                product_id: after.product_id,
                warehouse_id: after.warehouse_id,
                old_quantity: before.quantity,
                new_quantity: after.quantity,
            })
            .await;
        Ok(after)
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id, quantity = input.quantity))]
    pub async fn transfer(
        &self,
        input: TransferStock,
        user_id: Option<Uuid>,
    ) -> Result<TransferResult, ServiceError> {
        input.validate()?;
        let result = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { transfer_in(txn, input, user_id, Utc::now()).await })
        })
        .await?;

        info!(lines = result.lines.len(), "stock transferred");
        self.base
            .events()
            .send_or_log(Event::StockTransferred {
                product_id: result.product_id,
                from_warehouse_id: result.from_warehouse_id,
                to_warehouse_id: result.to_warehouse_id,
                quantity: result.quantity,
            })
            .await;
        Ok(result)
    }

    /// Reserves stock for an open order.
    #[instrument(skip(self))]
    pub async fn allocate(
        &self,
        order_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Vec<inventory_allocation::Model>, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .filter(order::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if !found.status.is_open() {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot allocate stock for a {} order",
                found.status
            )));
        }

        let (allocations, created) = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { allocate_in(txn, order_id, Utc::now(), user_id).await })
        })
        .await?;

        if created {
            self.base
                .events()
                .send_or_log(Event::InventoryAllocated {
                    order_id,
                    allocations: allocations.iter().map(|a| a.id).collect(),
                })
                .await;
        }
        Ok(allocations)
    }

    /// Only open orders hold releasable reservations; shipped units are gone.
    #[instrument(skip(self))]
    pub async fn release(&self, order_id: Uuid, user_id: Option<Uuid>) -> Result<i32, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if !found.status.is_open() {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot release stock of a {} order",
                found.status
            )));
        }

        let released = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move { release_in(txn, order_id, user_id).await })
        })
        .await?;

        if released > 0 {
            self.base
                .events()
                .send_or_log(Event::InventoryReleased {
                    order_id,
                    quantity: released,
                })
                .await;
        }
        Ok(released)
    }

    #[instrument(skip(self))]
    pub async fn allocations_for(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<inventory_allocation::Model>, ServiceError> {
        Ok(inventory_allocation::Entity::find()
            .filter(inventory_allocation::Column::OrderId.eq(order_id))
            .order_by_asc(inventory_allocation::Column::CreatedAt)
            .all(self.get_db())
            .await?)
    }

    /// Tops up every auto-restock row at or below its reorder point.
    #[instrument(skip(self))]
    pub async fn auto_restock(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<inventory_stock::Model>, ServiceError> {
        let db = self.get_db();
        let candidates = inventory_stock::Entity::find()
            .filter(inventory_stock::Column::AutoRestock.eq(true))
            .filter(inventory_stock::Column::ReorderQuantity.gt(0))
            .all(db)
            .await?;

        let mut restocked = Vec::new();
        for row in candidates.into_iter().filter(|r| r.needs_reorder()) {
            if !shift_quantity(db, row.id, row.reorder_quantity).await? {
                warn!(stock_id = %row.id, "restock update matched no row");
                continue;
            }
            let after = find_stock(db, row.id).await?;
            write_log(
                db,
                &after,
                row.reorder_quantity,
                after.quantity,
                MovementReason::Restock,
                Some("auto-restock".to_string()),
                user_id,
            )
            .await?;

            self.base
                .events()
                .send_or_log(Event::StockRestocked {
                    stock_id: after.id,
                    product_id: after.product_id,
                    warehouse_id: after.warehouse_id,
                    added: row.reorder_quantity,
                    new_quantity: after.quantity,
                })
                .await;
            restocked.push(after);
        }

        info!(count = restocked.len(), "auto-restock finished");
        Ok(restocked)
    }

    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<inventory_stock::Model>, ServiceError> {
        Ok(inventory_stock::Entity::find()
            .filter(
                Expr::expr(
                    Expr::col(inventory_stock::Column::Quantity)
                        .sub(Expr::col(inventory_stock::Column::ReservedQuantity)),
                )
                .lte(Expr::col(inventory_stock::Column::ReorderPoint)),
            )
            .order_by_asc(inventory_stock::Column::ProductId)
            .all(self.get_db())
            .await?)
    }

    /// Rows with units left whose batch expires within `days`.
    #[instrument(skip(self))]
    pub async fn expiring(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<inventory_stock::Model>, ServiceError> {
        let until = now + Duration::days(i64::from(days));
        Ok(inventory_stock::Entity::find()
            .filter(inventory_stock::Column::ExpiryDate.gt(now))
            .filter(inventory_stock::Column::ExpiryDate.lte(until))
            .filter(inventory_stock::Column::Quantity.gt(0))
            .order_by_asc(inventory_stock::Column::ExpiryDate)
            .all(self.get_db())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<inventory_stock::Model>, ServiceError> {
        Ok(inventory_stock::Entity::find()
            .filter(inventory_stock::Column::ExpiryDate.lte(now))
            .filter(inventory_stock::Column::Quantity.gt(0))
            .order_by_asc(inventory_stock::Column::ExpiryDate)
            .all(self.get_db())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn logs(
        &self,
        product_id: Option<Uuid>,
        warehouse_id: Option<Uuid>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<inventory_log::Model>, ServiceError> {
        let mut select = inventory_log::Entity::find();
        if let Some(product_id) = product_id {
            select = select.filter(inventory_log::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = warehouse_id {
            select = select.filter(inventory_log::Column::WarehouseId.eq(warehouse_id));
        }
        let select = select
            .order_by_desc(inventory_log::Column::CreatedAt)
            .order_by_asc(inventory_log::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    /// Demand over the last `window_days` projected over `horizon_days`.
    #[instrument(skip(self))]
    pub async fn forecast(
        &self,
        product_id: Uuid,
        window_days: u32,
        horizon_days: u32,
        now: DateTime<Utc>,
    ) -> Result<DemandForecast, ServiceError> {
        if !(1..=365).contains(&window_days) || !(1..=365).contains(&horizon_days) {
            return Err(ServiceError::ValidationError(
                "window_days and horizon_days must be between 1 and 365".to_string(),
            ));
        }
        let db = self.get_db();
        product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let window_start = now - Duration::days(i64::from(window_days));
        let units_sold: i64 = order_item::Entity::find()
            .inner_join(order::Entity)
            .filter(order_item::Column::ProductId.eq(product_id))
            .filter(order::Column::PlacedAt.gte(window_start))
            .filter(order::Column::PlacedAt.lte(now))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .filter(order::Column::DeletedAt.is_null())
            .all(db)
            .await?
            .iter()
            .map(|item| i64::from(item.quantity))
            .sum();
        let available = available_for_sale(db, product_id, now).await?;

        Ok(compute_forecast(
            product_id,
            units_sold,
            window_days,
            horizon_days,
            available,
        ))
    }

    async fn ensure_supplier(&self, supplier_id: Uuid) -> Result<(), ServiceError> {
        supplier::Entity::find_by_id(supplier_id)
            .filter(supplier::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))
    }
}

impl Repository for InventoryRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(quantity: i32, reserved: i32, expiry_in_days: Option<i64>) -> inventory_stock::Model {
        let now = Utc::now();
        inventory_stock::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            warehouse_id: Uuid::nil(),
            supplier_id: None,
            batch_number: None,
            expiry_date: expiry_in_days.map(|d| now + Duration::days(d)),
            quantity,
            reserved_quantity: reserved,
            reorder_point: 0,
            reorder_quantity: 0,
            auto_restock: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fefo_takes_earliest_expiry_first_and_undated_last() {
        let undated = row(10, 0, None);
        let late = row(10, 0, Some(60));
        let soon = row(3, 0, Some(5));
        let rows = vec![undated.clone(), late.clone(), soon.clone()];

        let picks = plan_fefo(&rows, 15).unwrap();
        assert_eq!(
            picks,
            vec![
                PickLine { stock_id: soon.id, quantity: 3 },
                PickLine { stock_id: late.id, quantity: 10 },
                PickLine { stock_id: undated.id, quantity: 2 },
            ]
        );
    }

    #[test]
    fn fefo_skips_reserved_units() {
        let busy = row(5, 5, Some(1));
        let free = row(4, 1, Some(2));
        let picks = plan_fefo(&[busy, free.clone()], 3).unwrap();
        assert_eq!(picks, vec![PickLine { stock_id: free.id, quantity: 3 }]);
    }

    #[test]
    fn fefo_reports_shortfall() {
        let rows = vec![row(2, 0, None), row(3, 1, Some(10))];
        assert_eq!(
            plan_fefo(&rows, 5),
            Err(Shortfall {
                requested: 5,
                available: 4
            })
        );
    }

    #[test]
    fn forecast_moving_average() {
        let id = Uuid::new_v4();
        let forecast = compute_forecast(id, 60, 30, 14, 20);
        assert_eq!(forecast.average_daily_demand, Decimal::from(2));
        assert_eq!(forecast.projected_demand, 28);
        assert_eq!(forecast.days_of_cover, Some(Decimal::from(10)));
        assert!(forecast.reorder_recommended);
    }

    #[test]
    fn forecast_without_sales_has_no_cover_estimate() {
        let forecast = compute_forecast(Uuid::new_v4(), 0, 30, 30, 12);
        assert_eq!(forecast.projected_demand, 0);
        assert_eq!(forecast.days_of_cover, None);
        assert!(!forecast.reorder_recommended);
    }

    #[test]
    fn zero_adjustment_is_invalid() {
        let input = AdjustStock {
            change: 0,
            reason: None,
            reference: None,
        };
        assert!(input.validate().is_err());
    }
}
