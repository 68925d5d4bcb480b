//! Defines the endpoint for creating a new transaction.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    AppState, Error,
    transaction::{NewTransaction, Transaction, TransactionStore},
    user::UserId,
    validation::ValidatedJson,
};

/// The state needed to create a transaction.
#[derive(Clone)]
pub struct CreateTransactionState {
    /// The store for managing transactions.
    pub transaction_store: Arc<dyn TransactionStore>,
}

impl FromRef<AppState> for CreateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            transaction_store: state.transaction_store.clone(),
        }
    }
}

/// The response body for a single transaction.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// The stored transaction.
    pub transaction: Transaction,
}

/// A route handler for creating a new transaction owned by the caller.
///
/// Responds with 201 Created and the stored transaction.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionState>,
    Extension(user_id): Extension<UserId>,
    ValidatedJson(new_transaction): ValidatedJson<NewTransaction>,
) -> Result<(StatusCode, Json<TransactionResponse>), Error> {
    let transaction = state
        .transaction_store
        .create(&user_id, new_transaction)
        .await
        .inspect_err(|error| tracing::error!("Could not create transaction for {user_id}: {error}"))?;

    tracing::info!("Created transaction {} for {user_id}", transaction.id);

    Ok((StatusCode::CREATED, Json(TransactionResponse { transaction })))
}
