//! Defines the core data models for transactions and the store trait that persists them.

use std::{fmt::Display, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Error,
    pagination::SortOrder,
    user::UserId,
    validation::{FieldError, IssueCode},
};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the type used to identify transactions.
pub type TransactionId = Uuid;

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

impl TransactionKind {
    /// The name used for the kind in JSON and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!(
                "Invalid enum value. Expected 'income' | 'expense', received '{other}'"
            )),
        }
    }
}

/// An income or expense recorded by a user.
///
/// Transactions are always owned by exactly one user and are never visible to
/// anyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// Whether this was income or an expense.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// What the transaction was for, e.g. "Rent" or "Sales".
    pub category: String,
    /// The amount of money, always greater than zero.
    pub amount: f64,
    /// Optional free text about the transaction.
    #[serde(default)]
    pub description: Option<String>,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// When the transaction was recorded.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    /// When the transaction was last changed.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// The validated data for a transaction that has not been stored yet.
///
/// The owner is deliberately absent, stores stamp it from the authenticated
/// user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether this is income or an expense.
    pub kind: TransactionKind,
    /// What the transaction was for.
    pub category: String,
    /// The amount of money.
    pub amount: f64,
    /// Free text about the transaction.
    pub description: Option<String>,
    /// When the transaction happened.
    pub date: OffsetDateTime,
}

/// A partial update to a transaction, `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    /// The new kind.
    pub kind: Option<TransactionKind>,
    /// The new category.
    pub category: Option<String>,
    /// The new amount.
    pub amount: Option<f64>,
    /// The new description.
    pub description: Option<String>,
    /// The new date.
    pub date: Option<OffsetDateTime>,
}

/// The subset of a transaction needed to compute statistics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionSummary {
    /// Whether this was income or an expense.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// The amount of money.
    pub amount: f64,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// The fields transactions can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Sort by the transaction date.
    #[default]
    Date,
    /// Sort by amount.
    Amount,
    /// Sort by category name.
    Category,
    /// Sort by income/expense.
    Kind,
    /// Sort by when the transaction was recorded.
    CreatedAt,
}

impl SortField {
    /// The column name used by the database for this field.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::Amount => "amount",
            SortField::Category => "category",
            SortField::Kind => "type",
            SortField::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortField::Date),
            "amount" => Ok(SortField::Amount),
            "category" => Ok(SortField::Category),
            "type" => Ok(SortField::Kind),
            "created_at" => Ok(SortField::CreatedAt),
            _ => Err(()),
        }
    }
}

/// A contiguous range of rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// The number of rows to skip.
    pub offset: u64,
    /// The maximum number of rows to return.
    pub limit: u64,
}

/// Defines how transactions should be fetched from [TransactionStore::list].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    /// The field to sort by.
    pub sort_by: SortField,
    /// The direction to sort in.
    pub sort_order: SortOrder,
    /// Return only this window of rows. `None` returns every row.
    pub window: Option<PageWindow>,
}

impl Default for TransactionQuery {
    /// Newest transactions first, no paging.
    fn default() -> Self {
        Self {
            sort_by: SortField::Date,
            sort_order: SortOrder::Descending,
            window: None,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Handles the creation, retrieval, update and deletion of transactions.
///
/// Every operation is scoped to `user_id`. Implementations must never read or
/// write a row owned by another user.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Retrieve the user's transactions in the order defined by `query`.
    async fn list(
        &self,
        user_id: &UserId,
        query: TransactionQuery,
    ) -> Result<Vec<Transaction>, Error>;

    /// Store a new transaction owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::ValidationFailed] without touching the database if the
    /// amount is not positive.
    async fn create(&self, user_id: &UserId, transaction: NewTransaction)
    -> Result<Transaction, Error>;

    /// Apply `patch` to the transaction `id` owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if no transaction matches both `id` and `user_id`.
    async fn update(
        &self,
        user_id: &UserId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error>;

    /// Delete the transaction `id` owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if no transaction matches both `id` and `user_id`.
    async fn delete(&self, user_id: &UserId, id: TransactionId) -> Result<(), Error>;

    /// Retrieve the type, amount and date of every transaction owned by `user_id`.
    async fn summaries(&self, user_id: &UserId) -> Result<Vec<TransactionSummary>, Error>;
}

/// Check that `amount` can be stored.
///
/// # Errors
/// Returns [Error::ValidationFailed] if `amount` is zero, negative or not finite.
pub fn ensure_positive_amount(amount: f64) -> Result<(), Error> {
    if amount.is_finite() && amount > 0.0 {
        return Ok(());
    }

    Err(Error::invalid_field(FieldError::new(
        "amount",
        "Amount must be positive",
        IssueCode::TooSmall,
    )))
}
