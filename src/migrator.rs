use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_requisitions_table::Migration),
            Box::new(m20240101_000003_create_requisition_items_table::Migration),
            Box::new(m20240101_000004_create_issued_items_table::Migration),
            Box::new(m20240101_000005_create_dispatch_counters_table::Migration),
            Box::new(m20240101_000006_create_issue_records_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Products::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Category).string().not_null())
                        .col(ColumnDef::new(Products::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Products::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::LastUpdated).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category")
                        .table(Products::Table)
                        .col(Products::Category)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        Code,
        Name,
        Category,
        Unit,
        Quantity,
        UnitPrice,
        CreatedAt,
        LastUpdated,
    }
}

mod m20240101_000002_create_requisitions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_requisitions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Requisitions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Requisitions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::DispatchNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::RequestDate)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Requisitions::Department).string().not_null())
                        .col(
                            ColumnDef::new(Requisitions::RequestedBy)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::RequesterEmail)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Requisitions::Comments).string().null())
                        .col(
                            ColumnDef::new(Requisitions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Requisitions::Approver1).string().not_null())
                        .col(ColumnDef::new(Requisitions::Approver2).string().not_null())
                        .col(ColumnDef::new(Requisitions::ConfirmedBy).string().null())
                        .col(ColumnDef::new(Requisitions::ConfirmedAt).timestamp().null())
                        .col(ColumnDef::new(Requisitions::ApprovedBy).string().null())
                        .col(ColumnDef::new(Requisitions::ApprovedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Requisitions::ApprovalComments)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Requisitions::RejectedBy).string().null())
                        .col(ColumnDef::new(Requisitions::RejectedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Requisitions::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Requisitions::RejectionStage).string().null())
                        .col(ColumnDef::new(Requisitions::IssuedBy).string().null())
                        .col(ColumnDef::new(Requisitions::IssuedAt).timestamp().null())
                        .col(ColumnDef::new(Requisitions::IssueNotes).string().null())
                        .col(
                            ColumnDef::new(Requisitions::DriverReceivedBy)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::DriverReceivedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::DriverSignature)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Requisitions::DriverNotes).string().null())
                        .col(
                            ColumnDef::new(Requisitions::FinalReceivedBy)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Requisitions::FinalReceivedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(Requisitions::FinalSignature).string().null())
                        .col(
                            ColumnDef::new(Requisitions::FinalReceiptMethod)
                                .string_len(20)
                                .null(),
                        )
                        .col(ColumnDef::new(Requisitions::FinalNotes).string().null())
                        .col(ColumnDef::new(Requisitions::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Requisitions::UpdatedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Requisitions::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requisitions_status")
                        .table(Requisitions::Table)
                        .col(Requisitions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requisitions_requested_by")
                        .table(Requisitions::Table)
                        .col(Requisitions::RequestedBy)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requisitions_created_at")
                        .table(Requisitions::Table)
                        .col(Requisitions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Requisitions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Requisitions {
        Table,
        Id,
        DispatchNumber,
        RequestDate,
        Department,
        RequestedBy,
        RequesterEmail,
        Comments,
        Status,
        Approver1,
        Approver2,
        ConfirmedBy,
        ConfirmedAt,
        ApprovedBy,
        ApprovedAt,
        ApprovalComments,
        RejectedBy,
        RejectedAt,
        RejectionReason,
        RejectionStage,
        IssuedBy,
        IssuedAt,
        IssueNotes,
        DriverReceivedBy,
        DriverReceivedAt,
        DriverSignature,
        DriverNotes,
        FinalReceivedBy,
        FinalReceivedAt,
        FinalSignature,
        FinalReceiptMethod,
        FinalNotes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000003_create_requisition_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_requisition_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RequisitionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequisitionItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequisitionItems::RequisitionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequisitionItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequisitionItems::Name).string().not_null())
                        .col(ColumnDef::new(RequisitionItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(RequisitionItems::RequestedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequisitionItems::ApprovedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RequisitionItems::ApprovalNotes)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RequisitionItems::Position)
                                .integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requisition_items_requisition_id")
                        .table(RequisitionItems::Table)
                        .col(RequisitionItems::RequisitionId)
                        .to_owned(),
                )
                .await?;

            // One line item per distinct product on a requisition.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_requisition_items_requisition_product")
                        .table(RequisitionItems::Table)
                        .col(RequisitionItems::RequisitionId)
                        .col(RequisitionItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequisitionItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum RequisitionItems {
        Table,
        Id,
        RequisitionId,
        ProductId,
        Name,
        Unit,
        RequestedQuantity,
        ApprovedQuantity,
        ApprovalNotes,
        Position,
    }
}

mod m20240101_000004_create_issued_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_issued_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IssuedItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IssuedItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IssuedItems::RequisitionId).uuid().not_null())
                        .col(ColumnDef::new(IssuedItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(IssuedItems::Name).string().not_null())
                        .col(ColumnDef::new(IssuedItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(IssuedItems::RequestedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IssuedItems::IssuedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IssuedItems::Shortage)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(IssuedItems::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_issued_items_requisition_id")
                        .table(IssuedItems::Table)
                        .col(IssuedItems::RequisitionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IssuedItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum IssuedItems {
        Table,
        Id,
        RequisitionId,
        ProductId,
        Name,
        Unit,
        RequestedQuantity,
        IssuedQuantity,
        Shortage,
        CreatedAt,
    }
}

mod m20240101_000005_create_dispatch_counters_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_dispatch_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DispatchCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DispatchCounters::Id)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispatchCounters::Count)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DispatchCounters::LastResetYear)
                                .integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DispatchCounters::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum DispatchCounters {
        Table,
        Id,
        Count,
        LastResetYear,
    }
}

mod m20240101_000006_create_issue_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_issue_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IssueRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IssueRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IssueRecords::ProductId).uuid().not_null())
                        .col(ColumnDef::new(IssueRecords::ProductName).string().not_null())
                        .col(ColumnDef::new(IssueRecords::Quantity).integer().not_null())
                        .col(ColumnDef::new(IssueRecords::IssuedTo).string().not_null())
                        .col(ColumnDef::new(IssueRecords::IssuedBy).string().not_null())
                        .col(ColumnDef::new(IssueRecords::Notes).string().null())
                        .col(
                            ColumnDef::new(IssueRecords::Shortage)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(IssueRecords::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_issue_records_product_id")
                        .table(IssueRecords::Table)
                        .col(IssueRecords::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IssueRecords::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum IssueRecords {
        Table,
        Id,
        ProductId,
        ProductName,
        Quantity,
        IssuedTo,
        IssuedBy,
        Notes,
        Shortage,
        CreatedAt,
    }
}
