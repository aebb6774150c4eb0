use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Loans {
    Table,
    InstallmentsCount,
    InstallmentAmount,
}

// SQLite accepts a single column change per ALTER TABLE.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Loans::Table)
                    .add_column(ColumnDef::new(Loans::InstallmentsCount).integer())
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Loans::Table)
                    .add_column(ColumnDef::new(Loans::InstallmentAmount).big_integer())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Loans::Table)
                    .drop_column(Loans::InstallmentAmount)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Loans::Table)
                    .drop_column(Loans::InstallmentsCount)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
