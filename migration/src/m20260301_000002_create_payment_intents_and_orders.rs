use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Payment intents: pending purchases awaiting a provider confirmation
        manager
            .create_table(
                Table::create()
                    .table(PaymentIntents::Table)
                    .if_not_exists()
                    .col(pk_uuid(PaymentIntents::Id))
                    .col(uuid(PaymentIntents::AccountId).not_null())
                    .col(string_len(PaymentIntents::Origin, 32).not_null())
                    .col(string_len(PaymentIntents::PackageId, 64).not_null())
                    .col(big_integer(PaymentIntents::Credits).not_null())
                    .col(big_integer(PaymentIntents::PriceCents).not_null())
                    .col(string_null(PaymentIntents::ExternalPaymentId))
                    .col(
                        string_len(PaymentIntents::Status, 16)
                            .default("pending")
                            .not_null(),
                    )
                    .col(text_null(PaymentIntents::StatusDetail))
                    .col(
                        timestamp_with_time_zone(PaymentIntents::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(PaymentIntents::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_intents_account_id")
                            .from(PaymentIntents::Table, PaymentIntents::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Webhooks look intents up by the provider's payment id
        manager
            .create_index(
                Index::create()
                    .name("uq_payment_intents_origin_external_payment_id")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::Origin)
                    .col(PaymentIntents::ExternalPaymentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_intents_account_id")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::AccountId)
                    .to_owned(),
            )
            .await?;

        // Orders
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_uuid(Orders::Id))
                    .col(uuid(Orders::AccountId).not_null())
                    .col(string_len(Orders::Kind, 24).not_null())
                    .col(big_integer(Orders::Cost).not_null())
                    .col(string_len(Orders::Status, 16).not_null())
                    .col(uuid_null(Orders::DebitId))
                    .col(string_null(Orders::ProviderRef))
                    .col(text_null(Orders::FailureReason))
                    .col(
                        timestamp_with_time_zone(Orders::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Orders::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_account_id")
                            .from(Orders::Table, Orders::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_account_id")
                    .table(Orders::Table)
                    .col(Orders::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PaymentIntents::Table).to_owned())
            .await?;

        Ok(())
    }
}

// Reference to Accounts table from the ledger migration
#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PaymentIntents {
    Table,
    Id,
    AccountId,
    Origin,
    PackageId,
    Credits,
    PriceCents,
    ExternalPaymentId,
    Status,
    StatusDetail,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    AccountId,
    Kind,
    Cost,
    Status,
    DebitId,
    ProviderRef,
    FailureReason,
    CreatedAt,
    UpdatedAt,
}
