//! Daily return bookkeeping.
//!
//! `daily_return_logs` holds one row per subscription per credited date; the
//! unique index on `(subscription_id, credited_for)` is what makes the accrual
//! job idempotent. `daily_return_summaries` pre-aggregates those logs per
//! account by day, ISO week and month.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum DailyReturnLogs {
    Table,
    Id,
    SubscriptionId,
    AccountId,
    CreditedFor,
    AmountMinor,
    LedgerEntryId,
    CreatedAt,
}

#[derive(Iden)]
enum DailyReturnSummaries {
    Table,
    AccountId,
    PeriodType,
    PeriodKey,
    TotalMinor,
    EntryCount,
}

#[derive(Iden)]
enum Subscriptions {
    Table,
    Id,
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyReturnLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyReturnLogs::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnLogs::SubscriptionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DailyReturnLogs::AccountId).string().not_null())
                    .col(ColumnDef::new(DailyReturnLogs::CreditedFor).date().not_null())
                    .col(
                        ColumnDef::new(DailyReturnLogs::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnLogs::LedgerEntryId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-daily_return_logs-subscription_id")
                            .from(DailyReturnLogs::Table, DailyReturnLogs::SubscriptionId)
                            .to(Subscriptions::Table, Subscriptions::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-daily_return_logs-account_id")
                            .from(DailyReturnLogs::Table, DailyReturnLogs::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-daily_return_logs-subscription_id-credited_for")
                    .table(DailyReturnLogs::Table)
                    .col(DailyReturnLogs::SubscriptionId)
                    .col(DailyReturnLogs::CreditedFor)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-daily_return_logs-account_id-credited_for")
                    .table(DailyReturnLogs::Table)
                    .col(DailyReturnLogs::AccountId)
                    .col(DailyReturnLogs::CreditedFor)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DailyReturnSummaries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyReturnSummaries::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnSummaries::PeriodType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnSummaries::PeriodKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyReturnSummaries::TotalMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyReturnSummaries::EntryCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(DailyReturnSummaries::AccountId)
                            .col(DailyReturnSummaries::PeriodType)
                            .col(DailyReturnSummaries::PeriodKey),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyReturnSummaries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DailyReturnLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}
