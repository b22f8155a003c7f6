use entity::accounts;
use sea_orm::{entity::*, query::*, sea_query::OnConflict, DatabaseConnection};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

pub struct AccountService {
    db: DatabaseConnection,
}

impl AccountService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the account for `external_ref`, or return the existing one.
    #[instrument(skip(self))]
    pub async fn ensure_account(
        &self,
        external_ref: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> LedgerResult<(accounts::Model, bool)> {
        let now = OffsetDateTime::now_utc();
        let account = accounts::ActiveModel {
            id: Set(Uuid::now_v7()),
            external_ref: Set(external_ref.to_string()),
            display_name: Set(display_name.map(|s| s.to_string())),
            email: Set(email.map(|s| s.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = accounts::Entity::insert(account)
            .on_conflict(
                OnConflict::column(accounts::Column::ExternalRef)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let account = self
            .find_by_external_ref(external_ref)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(external_ref.to_string()))?;

        if inserted == 1 {
            info!(account_id = %account.id, external_ref, "Created account");
        }

        Ok((account, inserted == 1))
    }

    pub async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> LedgerResult<Option<accounts::Model>> {
        Ok(accounts::Entity::find()
            .filter(accounts::Column::ExternalRef.eq(external_ref))
            .one(&self.db)
            .await?)
    }

    pub async fn get(&self, account_id: Uuid) -> LedgerResult<accounts::Model> {
        accounts::Entity::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }
}
