//! `SeaORM` Entity prelude.

pub use super::accounts::Entity as Accounts;
pub use super::credit_batches::Entity as CreditBatches;
pub use super::debit_allocations::Entity as DebitAllocations;
pub use super::debit_transactions::Entity as DebitTransactions;
pub use super::orders::Entity as Orders;
pub use super::payment_intents::Entity as PaymentIntents;
pub use super::settlement_records::Entity as SettlementRecords;
