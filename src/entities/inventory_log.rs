use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only stock movement record
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_stock_id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub change: i32,
    pub quantity_after: i32,
    pub reason: MovementReason,
    #[sea_orm(nullable)]
    pub reference: Option<String>,
    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_stock::Entity",
        from = "Column::InventoryStockId",
        to = "super::inventory_stock::Column::Id",
        on_delete = "Cascade"
    )]
    Stock,
}

impl Related<super::inventory_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stock.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    #[sea_orm(string_value = "initial")]
    Initial,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer_out")]
    TransferOut,
    #[sea_orm(string_value = "transfer_in")]
    TransferIn,
    #[sea_orm(string_value = "allocation")]
    Allocation,
    #[sea_orm(string_value = "release")]
    Release,
    #[sea_orm(string_value = "shipment")]
    Shipment,
    #[sea_orm(string_value = "restock")]
    Restock,
}
