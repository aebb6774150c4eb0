use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Members {
    Table,
    Id,
}

#[derive(Iden)]
enum MaturityRecords {
    Table,
    Id,
    MemberId,
    Cycle,
    TotalDeposit,
    MonthsCompleted,
    Status,
    ManualOverride,
    AdjustedInterest,
    CreatedAt,
    UpdatedAt,
    ClaimedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MaturityRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaturityRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MaturityRecords::MemberId).string().not_null())
                    .col(ColumnDef::new(MaturityRecords::Cycle).integer().not_null())
                    .col(
                        ColumnDef::new(MaturityRecords::TotalDeposit)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaturityRecords::MonthsCompleted)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaturityRecords::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(MaturityRecords::ManualOverride)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MaturityRecords::AdjustedInterest).big_integer())
                    .col(
                        ColumnDef::new(MaturityRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaturityRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaturityRecords::ClaimedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-maturity_records-member_id")
                            .from(MaturityRecords::Table, MaturityRecords::MemberId)
                            .to(Members::Table, Members::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-maturity_records-member_id-cycle")
                    .table(MaturityRecords::Table)
                    .col(MaturityRecords::MemberId)
                    .col(MaturityRecords::Cycle)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // At most one open cycle per member.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"uidx-maturity_records-member_id-pending\" \
                 ON maturity_records (member_id) WHERE status = 'pending'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS \"uidx-maturity_records-member_id-pending\"")
            .await?;
        manager
            .drop_table(Table::drop().table(MaturityRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}
