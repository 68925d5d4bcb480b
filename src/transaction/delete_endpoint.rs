//! Defines the endpoint for deleting one of the caller's transactions.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
};

use crate::{
    AppState, Error,
    transaction::{TransactionStore, schema::TransactionIdParam},
    user::UserId,
    validation::ValidatedPath,
};

/// The state needed to delete a transaction.
#[derive(Clone)]
pub struct DeleteTransactionState {
    /// The store for managing transactions.
    pub transaction_store: Arc<dyn TransactionStore>,
}

impl FromRef<AppState> for DeleteTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            transaction_store: state.transaction_store.clone(),
        }
    }
}

/// A route handler for deleting one of the caller's transactions, responds with 204 No Content.
pub async fn delete_transaction_endpoint(
    State(state): State<DeleteTransactionState>,
    Extension(user_id): Extension<UserId>,
    ValidatedPath(TransactionIdParam(transaction_id)): ValidatedPath<TransactionIdParam>,
) -> Result<StatusCode, Error> {
    state
        .transaction_store
        .delete(&user_id, transaction_id)
        .await
        .inspect_err(|error| match error {
            Error::NotFound(_) => tracing::warn!(
                "Could not delete transaction {transaction_id} for {user_id}: {error}"
            ),
            error => tracing::error!("Could not delete transaction {transaction_id}: {error}"),
        })?;

    Ok(StatusCode::NO_CONTENT)
}
