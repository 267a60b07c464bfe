use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_production_tables::Migration),
            Box::new(m20240601_000002_create_store_inventory_table::Migration),
            Box::new(m20240601_000003_create_showroom_and_sales_tables::Migration),
            Box::new(m20240601_000004_create_approval_tables::Migration),
            Box::new(m20240601_000005_create_dispatch_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_production_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductionOrders::ProductName).string().not_null())
                        .col(ColumnDef::new(ProductionOrders::Category).string().not_null())
                        .col(ColumnDef::new(ProductionOrders::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(ProductionOrders::Status)
                                .string_len(32)
                                .not_null()
                                .default("created"),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ProductionOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Materials).json().not_null())
                        .col(ColumnDef::new(PurchaseOrders::OriginalRequirements).json().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(PurchaseOrders::FinanceDecidedBy).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
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
                        .name("idx_purchase_orders_production_order_id")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::ProductionOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AssemblyOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(AssemblyOrders::ProductionOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyOrders::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(AssemblyOrders::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(AssemblyOrders::Progress)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(AssemblyOrders::TestResults).json().not_null())
                        .col(
                            ColumnDef::new(AssemblyOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyOrders::UpdatedAt)
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
                        .name("idx_assembly_orders_production_order_id")
                        .table(AssemblyOrders::Table)
                        .col(AssemblyOrders::ProductionOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AssemblyOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductionOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum ProductionOrders {
        Table,
        Id,
        ProductName,
        Category,
        Quantity,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum PurchaseOrders {
        Table,
        Id,
        ProductionOrderId,
        Materials,
        OriginalRequirements,
        Status,
        FinanceDecidedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum AssemblyOrders {
        Table,
        Id,
        ProductionOrderId,
        Quantity,
        Status,
        Progress,
        TestResults,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_store_inventory_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_store_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StoreInventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StoreInventory::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StoreInventory::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StoreInventory::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StoreInventory::Category).string().null())
                        .col(
                            ColumnDef::new(StoreInventory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreInventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StoreInventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum StoreInventory {
        Table,
        Id,
        Name,
        Quantity,
        Category,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_showroom_and_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_showroom_and_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ShowroomProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShowroomProducts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::ProductionOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::AssemblyOrderId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ShowroomProducts::Name).string().not_null())
                        .col(ColumnDef::new(ShowroomProducts::Category).string().not_null())
                        .col(
                            ColumnDef::new(ShowroomProducts::CostPrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::SalePrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::ShowroomStatus)
                                .string_len(16)
                                .not_null()
                                .default("available"),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::SoldDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShowroomProducts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::ShowroomProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CustomerName).string().not_null())
                        .col(ColumnDef::new(SalesOrders::CustomerPhone).string().null())
                        .col(ColumnDef::new(SalesOrders::CustomerEmail).string().null())
                        .col(ColumnDef::new(SalesOrders::CustomerAddress).string().null())
                        .col(ColumnDef::new(SalesOrders::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::UnitPrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::TransportCost)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::DiscountAmount)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::FinalAmount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::PaymentStatus).string_len(32).not_null())
                        .col(ColumnDef::new(SalesOrders::OrderStatus).string_len(40).not_null())
                        .col(ColumnDef::new(SalesOrders::DeliveryType).string_len(24).not_null())
                        .col(
                            ColumnDef::new(SalesOrders::PreviousDeliveryType)
                                .string_len(24)
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CouponCode).string().null())
                        .col(
                            ColumnDef::new(SalesOrders::FinanceBypass)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
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
                        .name("idx_sales_orders_showroom_product_id")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::ShowroomProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesTransactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::SalesOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::Amount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::Reference).string().null())
                        .col(
                            ColumnDef::new(SalesTransactions::CreatedAt)
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
                        .name("idx_sales_transactions_sales_order_id")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FinanceTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FinanceTransactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(FinanceTransactions::Kind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(FinanceTransactions::Amount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinanceTransactions::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinanceTransactions::ReferenceType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinanceTransactions::ReferenceId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinanceTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FinanceTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShowroomProducts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum ShowroomProducts {
        Table,
        Id,
        ProductionOrderId,
        AssemblyOrderId,
        Name,
        Category,
        CostPrice,
        SalePrice,
        ShowroomStatus,
        SoldDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum SalesOrders {
        Table,
        Id,
        OrderNumber,
        ShowroomProductId,
        CustomerName,
        CustomerPhone,
        CustomerEmail,
        CustomerAddress,
        Quantity,
        UnitPrice,
        TransportCost,
        DiscountAmount,
        FinalAmount,
        PaymentStatus,
        OrderStatus,
        DeliveryType,
        PreviousDeliveryType,
        CouponCode,
        FinanceBypass,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum SalesTransactions {
        Table,
        Id,
        SalesOrderId,
        Amount,
        PaymentMethod,
        Reference,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum FinanceTransactions {
        Table,
        Id,
        Kind,
        Amount,
        Description,
        ReferenceType,
        ReferenceId,
        CreatedAt,
    }
}

mod m20240601_000004_create_approval_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_approval_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TransportApprovalRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransportApprovalRequests::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::SalesOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::DeliveryType)
                                .string_len(24)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::OriginalTransportCost)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::RequestedTransportCost)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::DemandAmount)
                                .decimal_len(14, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(TransportApprovalRequests::ApprovedBy).string().null())
                        .col(ColumnDef::new(TransportApprovalRequests::RejectedBy).string().null())
                        .col(
                            ColumnDef::new(TransportApprovalRequests::NegotiationRound)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(TransportApprovalRequests::Notes).text().null())
                        .col(
                            ColumnDef::new(TransportApprovalRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportApprovalRequests::UpdatedAt)
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
                        .name("idx_transport_approval_sales_order_id")
                        .table(TransportApprovalRequests::Table)
                        .col(TransportApprovalRequests::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ApprovalRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ApprovalRequests::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ApprovalRequests::SalesOrderId).integer().not_null())
                        .col(ColumnDef::new(ApprovalRequests::Kind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(ApprovalRequests::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(ApprovalRequests::PreviousDiscount)
                                .decimal_len(14, 2)
                                .null(),
                        )
                        .col(ColumnDef::new(ApprovalRequests::RequestedBy).string().null())
                        .col(ColumnDef::new(ApprovalRequests::DecidedBy).string().null())
                        .col(ColumnDef::new(ApprovalRequests::Notes).text().null())
                        .col(
                            ColumnDef::new(ApprovalRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ApprovalRequests::UpdatedAt)
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
                        .name("idx_approval_requests_sales_order_id")
                        .table(ApprovalRequests::Table)
                        .col(ApprovalRequests::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ApprovalRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TransportApprovalRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum TransportApprovalRequests {
        Table,
        Id,
        SalesOrderId,
        DeliveryType,
        OriginalTransportCost,
        RequestedTransportCost,
        DemandAmount,
        Status,
        ApprovedBy,
        RejectedBy,
        NegotiationRound,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum ApprovalRequests {
        Table,
        Id,
        SalesOrderId,
        Kind,
        Status,
        PreviousDiscount,
        RequestedBy,
        DecidedBy,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000005_create_dispatch_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_dispatch_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vehicles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Vehicles::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Vehicles::RegistrationNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Vehicles::DriverName).string().null())
                        .col(ColumnDef::new(Vehicles::DriverContact).string().null())
                        .col(
                            ColumnDef::new(Vehicles::Status)
                                .string_len(16)
                                .not_null()
                                .default("available"),
                        )
                        .col(
                            ColumnDef::new(Vehicles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vehicles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DispatchRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DispatchRequests::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DispatchRequests::SalesOrderId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(DispatchRequests::ShowroomProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispatchRequests::DeliveryKind)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(DispatchRequests::Status).string_len(32).not_null())
                        .col(ColumnDef::new(DispatchRequests::PartyName).string().not_null())
                        .col(ColumnDef::new(DispatchRequests::PartyContact).string().null())
                        .col(ColumnDef::new(DispatchRequests::PartyAddress).string().null())
                        .col(ColumnDef::new(DispatchRequests::VehicleId).integer().null())
                        .col(ColumnDef::new(DispatchRequests::VehicleNumber).string().null())
                        .col(ColumnDef::new(DispatchRequests::DriverName).string().null())
                        .col(ColumnDef::new(DispatchRequests::DriverContact).string().null())
                        .col(
                            ColumnDef::new(DispatchRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispatchRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GatePasses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GatePasses::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GatePasses::DispatchRequestId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(GatePasses::SalesOrderId).integer().not_null())
                        .col(ColumnDef::new(GatePasses::CustomerName).string().not_null())
                        .col(ColumnDef::new(GatePasses::VehicleNumber).string().null())
                        .col(
                            ColumnDef::new(GatePasses::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(GatePasses::MismatchAttempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(GatePasses::LastAttemptedName).string().null())
                        .col(ColumnDef::new(GatePasses::OverrideBy).string().null())
                        .col(ColumnDef::new(GatePasses::ReleasedBy).string().null())
                        .col(
                            ColumnDef::new(GatePasses::ReleasedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GatePasses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GatePasses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransportJobs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransportJobs::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(TransportJobs::DispatchRequestId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(TransportJobs::SalesOrderId).integer().not_null())
                        .col(ColumnDef::new(TransportJobs::VehicleId).integer().null())
                        .col(ColumnDef::new(TransportJobs::DriverName).string().null())
                        .col(ColumnDef::new(TransportJobs::DriverContact).string().null())
                        .col(ColumnDef::new(TransportJobs::Destination).string().null())
                        .col(
                            ColumnDef::new(TransportJobs::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(TransportJobs::FailureReason).text().null())
                        .col(
                            ColumnDef::new(TransportJobs::StartedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransportJobs::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransportJobs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportJobs::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransportJobs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GatePasses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DispatchRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Vehicles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Vehicles {
        Table,
        Id,
        RegistrationNumber,
        DriverName,
        DriverContact,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum DispatchRequests {
        Table,
        Id,
        SalesOrderId,
        ShowroomProductId,
        DeliveryKind,
        Status,
        PartyName,
        PartyContact,
        PartyAddress,
        VehicleId,
        VehicleNumber,
        DriverName,
        DriverContact,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum GatePasses {
        Table,
        Id,
        DispatchRequestId,
        SalesOrderId,
        CustomerName,
        VehicleNumber,
        Status,
        MismatchAttempts,
        LastAttemptedName,
        OverrideBy,
        ReleasedBy,
        ReleasedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum TransportJobs {
        Table,
        Id,
        DispatchRequestId,
        SalesOrderId,
        VehicleId,
        DriverName,
        DriverContact,
        Destination,
        Status,
        FailureReason,
        StartedAt,
        DeliveredAt,
        CreatedAt,
        UpdatedAt,
    }
}
