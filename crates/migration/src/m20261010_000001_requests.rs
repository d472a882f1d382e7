use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum WithdrawalRequests {
    Table,
    Id,
    AccountId,
    AmountMinor,
    FeeMinor,
    NetAmountMinor,
    Destination,
    Status,
    HoldEntryId,
    VerificationToken,
    CreatedAt,
    DecidedAt,
}

#[derive(Iden)]
enum RechargeRequests {
    Table,
    Id,
    AccountId,
    AmountMinor,
    ExternalTxnId,
    Status,
    CreatedAt,
    DecidedAt,
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
                    .table(WithdrawalRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WithdrawalRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::FeeMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::NetAmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::Destination)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WithdrawalRequests::Status).string().not_null())
                    .col(
                        ColumnDef::new(WithdrawalRequests::HoldEntryId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::VerificationToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(WithdrawalRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WithdrawalRequests::DecidedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-withdrawal_requests-account_id")
                            .from(WithdrawalRequests::Table, WithdrawalRequests::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-withdrawal_requests-status-created_at")
                    .table(WithdrawalRequests::Table)
                    .col(WithdrawalRequests::Status)
                    .col(WithdrawalRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RechargeRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RechargeRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RechargeRequests::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(RechargeRequests::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RechargeRequests::ExternalTxnId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RechargeRequests::Status).string().not_null())
                    .col(
                        ColumnDef::new(RechargeRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RechargeRequests::DecidedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recharge_requests-account_id")
                            .from(RechargeRequests::Table, RechargeRequests::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-recharge_requests-external_txn_id")
                    .table(RechargeRequests::Table)
                    .col(RechargeRequests::ExternalTxnId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RechargeRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WithdrawalRequests::Table).to_owned())
            .await?;
        Ok(())
    }
}
