use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_access_tables::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_sales_tables::Migration),
            Box::new(m20240101_000004_create_inventory_tables::Migration),
            Box::new(m20240101_000005_create_engagement_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_access_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_access_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Users::TokensRevokedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Users::DeletedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Roles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Roles::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Roles::Name).string().not_null().unique_key())
                        .col(ColumnDef::new(Roles::GuardName).string().not_null())
                        .col(ColumnDef::new(Roles::Description).string().null())
                        .col(ColumnDef::new(Roles::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Roles::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Permissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Permissions::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Permissions::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Permissions::GuardName).string().not_null())
                        .col(ColumnDef::new(Permissions::Description).string().null())
                        .col(
                            ColumnDef::new(Permissions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Permissions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RolePermissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(RolePermissions::RoleId).uuid().not_null())
                        .col(ColumnDef::new(RolePermissions::PermissionId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(RolePermissions::RoleId)
                                .col(RolePermissions::PermissionId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_role_permissions_role")
                                .from(RolePermissions::Table, RolePermissions::RoleId)
                                .to(Roles::Table, Roles::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_role_permissions_permission")
                                .from(RolePermissions::Table, RolePermissions::PermissionId)
                                .to(Permissions::Table, Permissions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserRoles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(UserRoles::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserRoles::RoleId).uuid().not_null())
                        .primary_key(Index::create().col(UserRoles::UserId).col(UserRoles::RoleId))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_roles_user")
                                .from(UserRoles::Table, UserRoles::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_roles_role")
                                .from(UserRoles::Table, UserRoles::RoleId)
                                .to(Roles::Table, Roles::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserRoles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RolePermissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Permissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Roles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Users {
        Table,
        Id,
        Name,
        Email,
        PasswordHash,
        IsActive,
        LastLoginAt,
        TokensRevokedAt,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Roles {
        Table,
        Id,
        Name,
        GuardName,
        Description,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Permissions {
        Table,
        Id,
        Name,
        GuardName,
        Description,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RolePermissions {
        Table,
        RoleId,
        PermissionId,
    }

    #[derive(DeriveIden)]
    enum UserRoles {
        Table,
        UserId,
        RoleId,
    }
}

mod m20240101_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductCategories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductCategories::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductCategories::Name).string().not_null())
                        .col(
                            ColumnDef::new(ProductCategories::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ProductCategories::Description).string().null())
                        .col(ColumnDef::new(ProductCategories::ParentId).uuid().null())
                        .col(
                            ColumnDef::new(ProductCategories::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ProductCategories::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductCategories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductCategories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Slug).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::Brand).string().null())
                        .col(ColumnDef::new(Products::Price).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Products::DiscountPrice).decimal_len(19, 4).null())
                        .col(ColumnDef::new(Products::CostPrice).decimal_len(19, 4).null())
                        .col(ColumnDef::new(Products::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Products::IsFeatured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Products::DeletedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductCategories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductCategories {
        Table,
        Id,
        Name,
        Slug,
        Description,
        ParentId,
        IsActive,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Slug,
        Sku,
        Description,
        CategoryId,
        Brand,
        Price,
        DiscountPrice,
        CostPrice,
        Status,
        IsFeatured,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Customers::FirstName).string().not_null())
                        .col(ColumnDef::new(Customers::LastName).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::PasswordHash).string().null())
                        .col(
                            ColumnDef::new(Customers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Customers::DeletedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Orders::DiscountTotal).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Orders::Total).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(ColumnDef::new(Orders::PlacedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::EscalatedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Orders::DeletedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(OrderItems::LineTotal).decimal_len(19, 4).not_null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Coupons::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Coupons::Description).string().null())
                        .col(ColumnDef::new(Coupons::DiscountType).string_len(20).not_null())
                        .col(ColumnDef::new(Coupons::Value).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Coupons::MinOrderAmount).decimal_len(19, 4).null())
                        .col(ColumnDef::new(Coupons::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(Coupons::UsedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::StartsAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Coupons::ExpiresAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        FirstName,
        LastName,
        Email,
        Phone,
        PasswordHash,
        IsActive,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        Subtotal,
        DiscountTotal,
        Total,
        CouponCode,
        Notes,
        PlacedAt,
        EscalatedAt,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
        LineTotal,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        Value,
        MinOrderAmount,
        MaxUses,
        UsedCount,
        StartsAt,
        ExpiresAt,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::ContactPerson).string().null())
                        .col(ColumnDef::new(Suppliers::Address).text().null())
                        .col(
                            ColumnDef::new(Suppliers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Suppliers::DeletedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Warehouses::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Warehouses::Location).string().null())
                        .col(
                            ColumnDef::new(Warehouses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Warehouses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warehouses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryStocks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryStocks::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(InventoryStocks::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryStocks::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(InventoryStocks::SupplierId).uuid().null())
                        .col(ColumnDef::new(InventoryStocks::BatchNumber).string().null())
                        .col(
                            ColumnDef::new(InventoryStocks::ExpiryDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::ReorderPoint)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::ReorderQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::AutoRestock)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryStocks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_stocks_product_warehouse")
                        .table(InventoryStocks::Table)
                        .col(InventoryStocks::ProductId)
                        .col(InventoryStocks::WarehouseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(InventoryLogs::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(InventoryLogs::InventoryStockId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::Change).integer().not_null())
                        .col(ColumnDef::new(InventoryLogs::QuantityAfter).integer().not_null())
                        .col(ColumnDef::new(InventoryLogs::Reason).string_len(20).not_null())
                        .col(ColumnDef::new(InventoryLogs::Reference).string().null())
                        .col(ColumnDef::new(InventoryLogs::UserId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_logs_stock")
                                .from(InventoryLogs::Table, InventoryLogs::InventoryStockId)
                                .to(InventoryStocks::Table, InventoryStocks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryAllocations::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(InventoryAllocations::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryAllocations::InventoryStockId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAllocations::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryAllocations::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(InventoryAllocations::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_allocations_order_id")
                        .table(InventoryAllocations::Table)
                        .col(InventoryAllocations::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryStocks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        Email,
        Phone,
        ContactPerson,
        Address,
        IsActive,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
        Name,
        Code,
        Location,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryStocks {
        Table,
        Id,
        ProductId,
        WarehouseId,
        SupplierId,
        BatchNumber,
        ExpiryDate,
        Quantity,
        ReservedQuantity,
        ReorderPoint,
        ReorderQuantity,
        AutoRestock,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryLogs {
        Table,
        Id,
        InventoryStockId,
        ProductId,
        WarehouseId,
        Change,
        QuantityAfter,
        Reason,
        Reference,
        UserId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryAllocations {
        Table,
        Id,
        OrderId,
        InventoryStockId,
        ProductId,
        Quantity,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_engagement_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_engagement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Emails::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Emails::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Emails::UserId).uuid().not_null())
                        .col(ColumnDef::new(Emails::Sender).string().not_null())
                        .col(ColumnDef::new(Emails::Recipient).string().not_null())
                        .col(ColumnDef::new(Emails::Subject).string().not_null())
                        .col(ColumnDef::new(Emails::Body).text().not_null())
                        .col(ColumnDef::new(Emails::Folder).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Emails::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Emails::IsStarred)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Emails::DeletedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Emails::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Emails::UpdatedAt).timestamp_with_time_zone().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_emails_user")
                                .from(Emails::Table, Emails::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Carts::CustomerId).uuid().null())
                        .col(ColumnDef::new(Carts::SessionId).string().null())
                        .col(ColumnDef::new(Carts::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Carts::CouponCode).string().null())
                        .col(ColumnDef::new(Carts::Subtotal).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Carts::DiscountTotal).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Carts::Total).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Carts::ReminderSentAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Carts::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Carts::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(CartItems::UnitPrice).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(CartItems::LineTotal).decimal_len(19, 4).not_null())
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserActivities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserActivities::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(UserActivities::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserActivities::Action).string().not_null())
                        .col(ColumnDef::new(UserActivities::Method).string_len(10).not_null())
                        .col(ColumnDef::new(UserActivities::Path).string().not_null())
                        .col(ColumnDef::new(UserActivities::StatusCode).integer().not_null())
                        .col(ColumnDef::new(UserActivities::IpAddress).string().null())
                        .col(ColumnDef::new(UserActivities::UserAgent).string().null())
                        .col(
                            ColumnDef::new(UserActivities::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_activities_user_id")
                        .table(UserActivities::Table)
                        .col(UserActivities::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserActivities::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Emails::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Emails {
        Table,
        Id,
        UserId,
        Sender,
        Recipient,
        Subject,
        Body,
        Folder,
        IsRead,
        IsStarred,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        CustomerId,
        SessionId,
        Status,
        CouponCode,
        Subtotal,
        DiscountTotal,
        Total,
        ReminderSentAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        UnitPrice,
        LineTotal,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum UserActivities {
        Table,
        Id,
        UserId,
        Action,
        Method,
        Path,
        StatusCode,
        IpAddress,
        UserAgent,
        CreatedAt,
    }
}
