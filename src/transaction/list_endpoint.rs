//! Defines the endpoint for listing the caller's transactions.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use serde::Serialize;

use crate::{
    AppState, Error,
    pagination::Pagination,
    transaction::{Transaction, TransactionStore},
    user::UserId,
    validation::ValidatedQuery,
};

/// The state needed to list transactions.
#[derive(Clone)]
pub struct ListTransactionsState {
    /// The store for managing transactions.
    pub transaction_store: Arc<dyn TransactionStore>,
}

impl FromRef<AppState> for ListTransactionsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            transaction_store: state.transaction_store.clone(),
        }
    }
}

/// The response body for [list_transactions_endpoint].
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// The caller's transactions in the requested order.
    pub transactions: Vec<Transaction>,
}

/// A route handler that returns the caller's transactions, newest first unless
/// the query asks otherwise.
pub async fn list_transactions_endpoint(
    State(state): State<ListTransactionsState>,
    Extension(user_id): Extension<UserId>,
    ValidatedQuery(pagination): ValidatedQuery<Pagination>,
) -> Result<Json<TransactionsResponse>, Error> {
    let transactions = state
        .transaction_store
        .list(&user_id, pagination.into_query())
        .await
        .inspect_err(|error| tracing::error!("Could not list transactions for {user_id}: {error}"))?;

    Ok(Json(TransactionsResponse { transactions }))
}
