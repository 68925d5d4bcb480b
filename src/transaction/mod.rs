//! Transaction management for the finance dashboard.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the `TransactionStore` trait
//! - The Supabase and SQLite store backends
//! - Validation of request bodies and path parameters
//! - The route handlers for the CRUD and statistics endpoints

mod core;
mod create_endpoint;
mod delete_endpoint;
mod edit_endpoint;
mod list_endpoint;
mod postgrest;
mod schema;
mod sqlite;
mod stats;

pub use core::{
    NewTransaction, PageWindow, SortField, Transaction, TransactionId, TransactionKind,
    TransactionPatch, TransactionQuery, TransactionStore, TransactionSummary,
    ensure_positive_amount,
};
pub use create_endpoint::create_transaction_endpoint;
pub use delete_endpoint::delete_transaction_endpoint;
pub use edit_endpoint::edit_transaction_endpoint;
pub use list_endpoint::list_transactions_endpoint;
pub use postgrest::PostgrestTransactionStore;
pub use sqlite::SQLiteTransactionStore;
pub use stats::get_stats_endpoint;
