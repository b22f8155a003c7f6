use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Accounts: one row per customer, also the per-account lock anchor
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(pk_uuid(Accounts::Id))
                    .col(string_len(Accounts::ExternalRef, 255).unique_key().not_null())
                    .col(string_null(Accounts::DisplayName))
                    .col(string_null(Accounts::Email))
                    .col(
                        timestamp_with_time_zone(Accounts::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Accounts::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Credit batches
        manager
            .create_table(
                Table::create()
                    .table(CreditBatches::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditBatches::Id))
                    .col(uuid(CreditBatches::AccountId).not_null())
                    .col(big_integer(CreditBatches::AmountAdded).not_null())
                    .col(
                        big_integer(CreditBatches::AmountConsumed)
                            .default(0)
                            .not_null(),
                    )
                    .col(string_len(CreditBatches::Origin, 32).not_null())
                    .col(string_null(CreditBatches::ExternalPaymentId))
                    .col(
                        string_len(CreditBatches::Status, 16)
                            .default("active")
                            .not_null(),
                    )
                    .col(string_null(CreditBatches::VoidReason))
                    .col(
                        timestamp_with_time_zone(CreditBatches::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(CreditBatches::ExpiresAt))
                    .col(
                        timestamp_with_time_zone(CreditBatches::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(CreditBatches::AmountAdded).gt(0))
                    .check(Expr::col(CreditBatches::AmountConsumed).gte(0))
                    .check(
                        Expr::col(CreditBatches::AmountConsumed)
                            .lte(Expr::col(CreditBatches::AmountAdded)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credit_batches_account_id")
                            .from(CreditBatches::Table, CreditBatches::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Balance and debit scans filter by account + status
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_batches_account_status")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::AccountId)
                    .col(CreditBatches::Status)
                    .to_owned(),
            )
            .await?;

        // Sweeper scans active batches by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_batches_status_expires_at")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::Status)
                    .col(CreditBatches::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // At most one batch per paid external payment (NULLs are distinct)
        manager
            .create_index(
                Index::create()
                    .name("uq_credit_batches_origin_external_payment_id")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::Origin)
                    .col(CreditBatches::ExternalPaymentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Settlement records: the idempotency table
        manager
            .create_table(
                Table::create()
                    .table(SettlementRecords::Table)
                    .if_not_exists()
                    .col(pk_uuid(SettlementRecords::Id))
                    .col(string_len(SettlementRecords::Origin, 32).not_null())
                    .col(string_len(SettlementRecords::ExternalPaymentId, 255).not_null())
                    .col(uuid(SettlementRecords::AccountId).not_null())
                    .col(big_integer(SettlementRecords::Amount).not_null())
                    .col(uuid_null(SettlementRecords::BatchId))
                    .col(string_len(SettlementRecords::Outcome, 16).not_null())
                    .col(string_null(SettlementRecords::RejectionReason))
                    .col(
                        integer(SettlementRecords::DuplicateCount)
                            .default(0)
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(
                        SettlementRecords::LastDuplicateAt,
                    ))
                    .col(
                        timestamp_with_time_zone(SettlementRecords::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(SettlementRecords::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_settlement_records_batch_id")
                            .from(SettlementRecords::Table, SettlementRecords::BatchId)
                            .to(CreditBatches::Table, CreditBatches::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // CRITICAL: the storage-level uniqueness that makes settle() race-free
        manager
            .create_index(
                Index::create()
                    .name("uq_settlement_records_origin_external_payment_id")
                    .table(SettlementRecords::Table)
                    .col(SettlementRecords::Origin)
                    .col(SettlementRecords::ExternalPaymentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Debit transactions
        manager
            .create_table(
                Table::create()
                    .table(DebitTransactions::Table)
                    .if_not_exists()
                    .col(pk_uuid(DebitTransactions::Id))
                    .col(uuid(DebitTransactions::AccountId).not_null())
                    .col(string_null(DebitTransactions::OrderRef))
                    .col(big_integer(DebitTransactions::Amount).not_null())
                    .col(string_len(DebitTransactions::Status, 24).not_null())
                    .col(text_null(DebitTransactions::FailureReason))
                    .col(
                        timestamp_with_time_zone(DebitTransactions::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(DebitTransactions::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(DebitTransactions::ReversedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_debit_transactions_account_id")
                            .from(DebitTransactions::Table, DebitTransactions::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_debit_transactions_account_id")
                    .table(DebitTransactions::Table)
                    .col(DebitTransactions::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_debit_transactions_order_ref")
                    .table(DebitTransactions::Table)
                    .col(DebitTransactions::OrderRef)
                    .to_owned(),
            )
            .await?;

        // Debit allocations: (batch_id, amount_taken) breakdown
        manager
            .create_table(
                Table::create()
                    .table(DebitAllocations::Table)
                    .if_not_exists()
                    .col(pk_uuid(DebitAllocations::Id))
                    .col(uuid(DebitAllocations::DebitId).not_null())
                    .col(uuid(DebitAllocations::BatchId).not_null())
                    .col(big_integer(DebitAllocations::Amount).not_null())
                    .col(integer(DebitAllocations::Position).not_null())
                    .check(Expr::col(DebitAllocations::Amount).gt(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_debit_allocations_debit_id")
                            .from(DebitAllocations::Table, DebitAllocations::DebitId)
                            .to(DebitTransactions::Table, DebitTransactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_debit_allocations_batch_id")
                            .from(DebitAllocations::Table, DebitAllocations::BatchId)
                            .to(CreditBatches::Table, CreditBatches::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_debit_allocations_debit_id")
                    .table(DebitAllocations::Table)
                    .col(DebitAllocations::DebitId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DebitAllocations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DebitTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SettlementRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CreditBatches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
    ExternalRef,
    DisplayName,
    Email,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditBatches {
    Table,
    Id,
    AccountId,
    AmountAdded,
    AmountConsumed,
    Origin,
    ExternalPaymentId,
    Status,
    VoidReason,
    CreatedAt,
    ExpiresAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SettlementRecords {
    Table,
    Id,
    Origin,
    ExternalPaymentId,
    AccountId,
    Amount,
    BatchId,
    Outcome,
    RejectionReason,
    DuplicateCount,
    LastDuplicateAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DebitTransactions {
    Table,
    Id,
    AccountId,
    OrderRef,
    Amount,
    Status,
    FailureReason,
    CreatedAt,
    UpdatedAt,
    ReversedAt,
}

#[derive(DeriveIden)]
enum DebitAllocations {
    Table,
    Id,
    DebitId,
    BatchId,
    Amount,
    Position,
}
