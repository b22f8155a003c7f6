// Integration tests against SQLite databases with migrations applied

mod api_test;
mod ledger_test;
mod payments_test;
mod settlement_test;
mod sweeper_test;

use entity::{credit_batches, sea_orm_active_enums::BatchOrigin};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;
use voxledger::services::{AccountService, LedgerService};

/// Fresh database per test. A single connection keeps the in-memory
/// database alive and shared by every task in the test.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to apply migrations");
    db
}

/// File-backed database shared by several pooled connections, so
/// transactions from concurrent tasks genuinely overlap.
pub struct SharedDb {
    pub db: DatabaseConnection,
    /// Kept alive for the duration of the test
    pub _temp_dir: TempDir,
}

pub async fn setup_shared_db() -> SharedDb {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("ledger.db").display()
    );

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(4)
        .min_connections(4)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to open database file");
    db.execute_unprepared("PRAGMA journal_mode=WAL")
        .await
        .expect("Failed to enable WAL");
    Migrator::up(&db, None)
        .await
        .expect("Failed to apply migrations");

    SharedDb {
        db,
        _temp_dir: temp_dir,
    }
}

pub async fn create_account(db: &DatabaseConnection) -> Uuid {
    let (account, created) = AccountService::new(db.clone())
        .ensure_account(&format!("user-{}", Uuid::new_v4()), Some("Test User"), None)
        .await
        .expect("Failed to create account");
    assert!(created);
    account.id
}

pub async fn grant(
    db: &DatabaseConnection,
    account_id: Uuid,
    amount: i64,
    expires_at: Option<OffsetDateTime>,
) -> credit_batches::Model {
    LedgerService::new(db.clone())
        .credit(account_id, amount, BatchOrigin::AdminGrant, None, expires_at)
        .await
        .expect("Failed to credit account")
}

pub async fn reload_batch(db: &DatabaseConnection, batch_id: Uuid) -> credit_batches::Model {
    credit_batches::Entity::find_by_id(batch_id)
        .one(db)
        .await
        .unwrap()
        .expect("batch exists")
}
