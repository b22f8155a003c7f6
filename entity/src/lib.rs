//! `SeaORM` Entity definitions for the credit ledger.

pub mod prelude;

pub mod accounts;
pub mod credit_batches;
pub mod debit_allocations;
pub mod debit_transactions;
pub mod orders;
pub mod payment_intents;
pub mod sea_orm_active_enums;
pub mod settlement_records;
