//! Initial schema for the society ledger.
//!
//! - `members`: enrolled society members, optionally linked to a login identity
//! - `loans`: loan requests and their status machine
//! - `passbook_entries`: the append-only ledger every balance is derived from

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Members {
    Table,
    Id,
    Name,
    Status,
    EnrolledAt,
    UserId,
}

#[derive(Iden)]
enum Loans {
    Table,
    Id,
    MemberId,
    LoanAmount,
    InterestRateBps,
    RemainingBalance,
    Status,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PassbookEntries {
    Table,
    Id,
    MemberId,
    LoanId,
    Mode,
    DepositAmount,
    LoanInstallment,
    InterestAuto,
    FineAuto,
    DisbursedAmount,
    Description,
    TransactionDate,
    RecordedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Members
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Members::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Members::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Members::Name).string().not_null())
                    .col(
                        ColumnDef::new(Members::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Members::EnrolledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Members::UserId).string().unique_key())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Loans
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Loans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Loans::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Loans::MemberId).string().not_null())
                    .col(ColumnDef::new(Loans::LoanAmount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Loans::InterestRateBps)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Loans::RemainingBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Loans::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Loans::Description).string())
                    .col(
                        ColumnDef::new(Loans::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Loans::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-loans-member_id")
                            .from(Loans::Table, Loans::MemberId)
                            .to(Members::Table, Members::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-loans-member_id-status")
                    .table(Loans::Table)
                    .col(Loans::MemberId)
                    .col(Loans::Status)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Passbook entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(PassbookEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PassbookEntries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PassbookEntries::MemberId).string().not_null())
                    .col(ColumnDef::new(PassbookEntries::LoanId).string())
                    .col(ColumnDef::new(PassbookEntries::Mode).string().not_null())
                    .col(
                        ColumnDef::new(PassbookEntries::DepositAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PassbookEntries::LoanInstallment)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PassbookEntries::InterestAuto)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PassbookEntries::FineAuto)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PassbookEntries::DisbursedAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(PassbookEntries::Description).string())
                    .col(
                        ColumnDef::new(PassbookEntries::TransactionDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PassbookEntries::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-passbook_entries-member_id")
                            .from(PassbookEntries::Table, PassbookEntries::MemberId)
                            .to(Members::Table, Members::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-passbook_entries-loan_id")
                            .from(PassbookEntries::Table, PassbookEntries::LoanId)
                            .to(Loans::Table, Loans::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-passbook_entries-member_id-transaction_date")
                    .table(PassbookEntries::Table)
                    .col(PassbookEntries::MemberId)
                    .col(PassbookEntries::TransactionDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-passbook_entries-loan_id")
                    .table(PassbookEntries::Table)
                    .col(PassbookEntries::LoanId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PassbookEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Loans::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Members::Table).to_owned())
            .await?;
        Ok(())
    }
}
