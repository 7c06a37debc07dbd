use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_users_table::Migration),
            Box::new(m20240601_000002_create_orders_table::Migration),
            Box::new(m20240601_000003_create_pickups_table::Migration),
            Box::new(m20240601_000004_create_timeline_lines_table::Migration),
            Box::new(m20240601_000005_create_occurrences_table::Migration),
        ]
    }
}

mod m20240601_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_users_table"
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
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(
                            ColumnDef::new(Users::Login)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(ColumnDef::new(Users::Department).string().not_null())
                        .col(
                            ColumnDef::new(Users::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
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
                        .name("idx_users_department")
                        .table(Users::Table)
                        .col(Users::Department)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Login,
        PasswordHash,
        Role,
        Department,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::ErpOrderId).string().null())
                        .col(ColumnDef::new(Orders::ErpStatus).string().null())
                        .col(ColumnDef::new(Orders::InternalStatus).string_len(32).null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
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
                        .name("idx_orders_erp_order_id")
                        .table(Orders::Table)
                        .col(Orders::ErpOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        ErpOrderId,
        ErpStatus,
        InternalStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_pickups_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_pickups_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Pickups::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Pickups::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Pickups::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Pickups::PickupNumber).integer().not_null())
                        .col(ColumnDef::new(Pickups::RetrieverName).string().null())
                        .col(ColumnDef::new(Pickups::RetrieverCpf).string_len(11).null())
                        .col(ColumnDef::new(Pickups::OperatorId).uuid().null())
                        .col(ColumnDef::new(Pickups::OperatorName).string().null())
                        .col(ColumnDef::new(Pickups::Carrier).string().null())
                        .col(ColumnDef::new(Pickups::TrackingCode).string().null())
                        .col(ColumnDef::new(Pickups::PreviousTrackingCode).string().null())
                        .col(
                            ColumnDef::new(Pickups::TrackingUpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Pickups::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Pickups::PhotoUrl).string().null())
                        .col(ColumnDef::new(Pickups::Items).json().null())
                        .col(
                            ColumnDef::new(Pickups::ErpSyncedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Pickups::ErpError).text().null())
                        .col(
                            ColumnDef::new(Pickups::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Pickups::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pickups_order_id")
                                .from(Pickups::Table, Pickups::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Sequential attempt numbers per order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("ux_pickups_order_number")
                        .table(Pickups::Table)
                        .col(Pickups::OrderId)
                        .col(Pickups::PickupNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pickups_status")
                        .table(Pickups::Table)
                        .col(Pickups::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pickups_created_at")
                        .table(Pickups::Table)
                        .col(Pickups::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Pickups::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Pickups {
        Table,
        Id,
        OrderId,
        PickupNumber,
        RetrieverName,
        RetrieverCpf,
        OperatorId,
        OperatorName,
        Carrier,
        TrackingCode,
        PreviousTrackingCode,
        TrackingUpdatedAt,
        Status,
        PhotoUrl,
        Items,
        ErpSyncedAt,
        ErpError,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
    }
}

mod m20240601_000004_create_timeline_lines_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_timeline_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TimelineLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TimelineLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TimelineLines::PickupId).uuid().not_null())
                        .col(ColumnDef::new(TimelineLines::Sequence).integer().not_null())
                        .col(
                            ColumnDef::new(TimelineLines::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TimelineLines::OpenedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(TimelineLines::OpenedByName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TimelineLines::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(TimelineLines::ClosedBy).uuid().null())
                        .col(
                            ColumnDef::new(TimelineLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TimelineLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_timeline_lines_pickup_id")
                                .from(TimelineLines::Table, TimelineLines::PickupId)
                                .to(Pickups::Table, Pickups::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("ux_timeline_lines_pickup_sequence")
                        .table(TimelineLines::Table)
                        .col(TimelineLines::PickupId)
                        .col(TimelineLines::Sequence)
                        .to_owned(),
                )
                .await?;

            // One open line per pickup. Partial indexes are not expressible through
            // the schema builder, but the statement is valid on Postgres and SQLite.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS ux_timeline_lines_one_open \
                     ON timeline_lines (pickup_id) WHERE status = 'ABERTA'",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TimelineLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TimelineLines {
        Table,
        Id,
        PickupId,
        Sequence,
        Status,
        OpenedBy,
        OpenedByName,
        ClosedAt,
        ClosedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Pickups {
        Table,
        Id,
    }
}

mod m20240601_000005_create_occurrences_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_occurrences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Occurrences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Occurrences::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Occurrences::LineId).uuid().not_null())
                        .col(ColumnDef::new(Occurrences::PickupId).uuid().not_null())
                        .col(ColumnDef::new(Occurrences::Description).text().not_null())
                        .col(ColumnDef::new(Occurrences::SenderId).uuid().not_null())
                        .col(ColumnDef::new(Occurrences::SenderName).string().not_null())
                        .col(ColumnDef::new(Occurrences::RecipientId).uuid().null())
                        .col(ColumnDef::new(Occurrences::RecipientName).string().null())
                        .col(
                            ColumnDef::new(Occurrences::OriginDepartment)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Occurrences::DestinationDepartment)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Occurrences::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Occurrences::Kind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Occurrences::ReturnReason)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Occurrences::AnsweredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Occurrences::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Occurrences::ResolvedBy).uuid().null())
                        .col(
                            ColumnDef::new(Occurrences::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Occurrences::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_occurrences_line_id")
                                .from(Occurrences::Table, Occurrences::LineId)
                                .to(TimelineLines::Table, TimelineLines::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_occurrences_line_status")
                        .table(Occurrences::Table)
                        .col(Occurrences::LineId)
                        .col(Occurrences::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_occurrences_pickup_id")
                        .table(Occurrences::Table)
                        .col(Occurrences::PickupId)
                        .to_owned(),
                )
                .await?;

            // Notification polling filters on these
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_occurrences_routing")
                        .table(Occurrences::Table)
                        .col(Occurrences::Status)
                        .col(Occurrences::DestinationDepartment)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_occurrences_recipient_id")
                        .table(Occurrences::Table)
                        .col(Occurrences::RecipientId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Occurrences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Occurrences {
        Table,
        Id,
        LineId,
        PickupId,
        Description,
        SenderId,
        SenderName,
        RecipientId,
        RecipientName,
        OriginDepartment,
        DestinationDepartment,
        Status,
        Kind,
        ReturnReason,
        AnsweredAt,
        ResolvedAt,
        ResolvedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TimelineLines {
        Table,
        Id,
    }
}
