//! Defines the endpoint for partially updating one of the caller's transactions.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};

use crate::{
    AppState, Error,
    transaction::{
        TransactionPatch, TransactionStore, create_endpoint::TransactionResponse,
        schema::TransactionIdParam,
    },
    user::UserId,
    validation::{ValidatedJson, ValidatedPath},
};

/// The state needed to edit a transaction.
#[derive(Clone)]
pub struct EditTransactionState {
    /// The store for managing transactions.
    pub transaction_store: Arc<dyn TransactionStore>,
}

impl FromRef<AppState> for EditTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            transaction_store: state.transaction_store.clone(),
        }
    }
}

/// A route handler that applies a partial update to one of the caller's transactions.
///
/// Responds with 404 if the transaction does not exist or belongs to someone else.
pub async fn edit_transaction_endpoint(
    State(state): State<EditTransactionState>,
    Extension(user_id): Extension<UserId>,
    ValidatedPath(TransactionIdParam(transaction_id)): ValidatedPath<TransactionIdParam>,
    ValidatedJson(patch): ValidatedJson<TransactionPatch>,
) -> Result<Json<TransactionResponse>, Error> {
    let transaction = state
        .transaction_store
        .update(&user_id, transaction_id, patch)
        .await
        .inspect_err(|error| match error {
            Error::NotFound(_) => tracing::warn!(
                "Could not update transaction {transaction_id} for {user_id}: {error}"
            ),
            error => tracing::error!("Could not update transaction {transaction_id}: {error}"),
        })?;

    Ok(Json(TransactionResponse { transaction }))
}
