//! Implements a transaction store backed by the `transactions` table of a Supabase project.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use crate::{
    Error,
    supabase::{SupabaseClient, send},
    transaction::{
        NewTransaction, Transaction, TransactionId, TransactionKind, TransactionPatch,
        TransactionQuery, TransactionStore, TransactionSummary, ensure_positive_amount,
    },
    user::UserId,
};

const TABLE: &str = "transactions";

/// Stores transactions in Supabase through its PostgREST API.
#[derive(Debug, Clone)]
pub struct PostgrestTransactionStore {
    client: SupabaseClient,
}

impl PostgrestTransactionStore {
    /// Create a store that uses `client`.
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    #[serde(rename = "type")]
    kind: TransactionKind,
    category: &'a str,
    amount: f64,
    description: Option<&'a str>,
    #[serde(with = "time::serde::rfc3339")]
    date: OffsetDateTime,
}

#[derive(Serialize)]
struct UpdateRow {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<TransactionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

async fn read_rows<T: DeserializeOwned>(response: reqwest::Response) -> Result<Vec<T>, Error> {
    response
        .json()
        .await
        .map_err(|error| Error::Database(format!("unexpected response from Supabase: {error}")))
}

/// Take the single row returned by a write filtered on ID and owner.
fn single_row(rows: Vec<Transaction>) -> Result<Transaction, Error> {
    rows.into_iter()
        .next()
        .ok_or(Error::NotFound("Transaction"))
}

#[async_trait]
impl TransactionStore for PostgrestTransactionStore {
    async fn list(
        &self,
        user_id: &UserId,
        query: TransactionQuery,
    ) -> Result<Vec<Transaction>, Error> {
        let mut params = vec![
            ("select", "*".to_owned()),
            ("user_id", eq(user_id)),
            (
                "order",
                format!(
                    "{}.{},id.asc",
                    query.sort_by.column(),
                    query.sort_order.as_str()
                ),
            ),
        ];

        if let Some(window) = query.window {
            params.push(("limit", window.limit.to_string()));
            params.push(("offset", window.offset.to_string()));
        }

        let response = send(self.client.table(Method::GET, TABLE).query(&params)).await?;

        read_rows(response).await
    }

    /// Insert a row owned by `user_id`, whatever the client sent.
    async fn create(
        &self,
        user_id: &UserId,
        transaction: NewTransaction,
    ) -> Result<Transaction, Error> {
        ensure_positive_amount(transaction.amount)?;

        let row = InsertRow {
            user_id: user_id.as_str(),
            kind: transaction.kind,
            category: &transaction.category,
            amount: transaction.amount,
            description: transaction.description.as_deref(),
            date: transaction.date,
        };

        let request = self
            .client
            .table(Method::POST, TABLE)
            .header("Prefer", "return=representation")
            .json(&row);
        let rows = read_rows(send(request).await?).await?;

        rows.into_iter().next().ok_or_else(|| {
            Error::Database("Supabase did not return the inserted transaction".to_owned())
        })
    }

    async fn update(
        &self,
        user_id: &UserId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error> {
        if let Some(amount) = patch.amount {
            ensure_positive_amount(amount)?;
        }

        let row = UpdateRow {
            kind: patch.kind,
            category: patch.category,
            amount: patch.amount,
            description: patch.description,
            date: patch.date,
            updated_at: OffsetDateTime::now_utc(),
        };

        let request = self
            .client
            .table(Method::PATCH, TABLE)
            .query(&[("id", eq(id)), ("user_id", eq(user_id))])
            .header("Prefer", "return=representation")
            .json(&row);

        single_row(read_rows(send(request).await?).await?)
    }

    async fn delete(&self, user_id: &UserId, id: TransactionId) -> Result<(), Error> {
        let request = self
            .client
            .table(Method::DELETE, TABLE)
            .query(&[("id", eq(id)), ("user_id", eq(user_id))])
            .header("Prefer", "return=representation");

        single_row(read_rows(send(request).await?).await?).map(|_| ())
    }

    async fn summaries(&self, user_id: &UserId) -> Result<Vec<TransactionSummary>, Error> {
        let request = self
            .client
            .table(Method::GET, TABLE)
            .query(&[("select", "type,amount,date".to_owned()), ("user_id", eq(user_id))]);

        read_rows(send(request).await?).await
    }
}
