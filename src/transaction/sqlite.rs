//! Implements a SQLite backed transaction store for local development and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Error,
    db::{format_stored_date_time, parse_stored_date_time},
    pagination::SortOrder,
    transaction::{
        NewTransaction, Transaction, TransactionId, TransactionKind, TransactionPatch,
        TransactionQuery, TransactionStore, TransactionSummary, ensure_positive_amount,
    },
    user::UserId,
};

const COLUMNS: &str =
    "id, user_id, type, category, amount, description, date, created_at, updated_at";

/// Stores transactions in a SQLite database.
///
/// The `transactions` table must have been created with [crate::db::initialize].
#[derive(Debug, Clone)]
pub struct SQLiteTransactionStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteTransactionStore {
    /// Create a new store for the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|_| Error::DatabaseLockError)
    }

    fn map_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
        let id: String = row.get(0)?;
        let id = Uuid::try_parse(&id).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error))
        })?;
        let user_id: String = row.get(1)?;
        let kind = parse_kind(2, row.get(2)?)?;
        let category = row.get(3)?;
        let amount = row.get(4)?;
        let description = row.get(5)?;
        let date: String = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(Transaction {
            id,
            user_id: UserId::new(user_id),
            kind,
            category,
            amount,
            description,
            date: parse_stored_date_time(6, &date)?,
            created_at: Some(parse_stored_date_time(7, &created_at)?),
            updated_at: Some(parse_stored_date_time(8, &updated_at)?),
        })
    }
}

fn parse_kind(index: usize, text: String) -> Result<TransactionKind, rusqlite::Error> {
    text.parse::<TransactionKind>().map_err(|message| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            message.into(),
        )
    })
}

/// Map "no rows" to [Error::NotFound] for single transaction lookups.
fn not_found_or(error: rusqlite::Error) -> Error {
    match error {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("Transaction"),
        error => error.into(),
    }
}

#[async_trait]
impl TransactionStore for SQLiteTransactionStore {
    /// Query for the user's transactions.
    ///
    /// Ties in the sort column are broken by ID so that paging is stable.
    ///
    /// # Errors
    /// This function will return a [Error::SqlError] there is a SQL error.
    async fn list(
        &self,
        user_id: &UserId,
        query: TransactionQuery,
    ) -> Result<Vec<Transaction>, Error> {
        let direction = match query.sort_order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };

        let mut query_string_parts = vec![
            format!("SELECT {COLUMNS} FROM transactions WHERE user_id = ?1"),
            format!("ORDER BY {} {direction}, id ASC", query.sort_by.column()),
        ];

        if let Some(window) = query.window {
            query_string_parts.push(format!("LIMIT {} OFFSET {}", window.limit, window.offset));
        }

        let query_string = query_string_parts.join(" ");

        self.lock()?
            .prepare(&query_string)?
            .query_map([user_id.as_str()], Self::map_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
            .collect()
    }

    /// Create a new transaction owned by `user_id`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::ValidationFailed] if the amount is not positive,
    /// - or [Error::SqlError] if there is some other SQL error.
    async fn create(
        &self,
        user_id: &UserId,
        transaction: NewTransaction,
    ) -> Result<Transaction, Error> {
        ensure_positive_amount(transaction.amount)?;

        let now = format_stored_date_time(OffsetDateTime::now_utc())?;
        let date = format_stored_date_time(transaction.date)?;

        let transaction = self
            .lock()?
            .prepare(&format!(
                "INSERT INTO transactions ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 RETURNING {COLUMNS}"
            ))?
            .query_row(
                (
                    Uuid::new_v4().to_string(),
                    user_id.as_str(),
                    transaction.kind.as_str(),
                    transaction.category,
                    transaction.amount,
                    transaction.description,
                    date,
                    now,
                ),
                Self::map_row,
            )?;

        Ok(transaction)
    }

    /// Apply `patch` to one of the user's transactions.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::ValidationFailed] if the new amount is not positive,
    /// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
    /// - or [Error::SqlError] if there is some other SQL error.
    async fn update(
        &self,
        user_id: &UserId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error> {
        if let Some(amount) = patch.amount {
            ensure_positive_amount(amount)?;
        }

        let mut set_clause_parts = vec![];
        let mut query_parameters = vec![];

        let mut set = |column: &str, value: Value| {
            query_parameters.push(value);
            set_clause_parts.push(format!("{column} = ?{}", query_parameters.len()));
        };

        if let Some(kind) = patch.kind {
            set("type", Value::Text(kind.as_str().to_owned()));
        }
        if let Some(category) = patch.category {
            set("category", Value::Text(category));
        }
        if let Some(amount) = patch.amount {
            set("amount", Value::Real(amount));
        }
        if let Some(description) = patch.description {
            set("description", Value::Text(description));
        }
        if let Some(date) = patch.date {
            set("date", Value::Text(format_stored_date_time(date)?));
        }
        set(
            "updated_at",
            Value::Text(format_stored_date_time(OffsetDateTime::now_utc())?),
        );

        query_parameters.push(Value::Text(id.to_string()));
        let id_index = query_parameters.len();
        query_parameters.push(Value::Text(user_id.to_string()));
        let user_id_index = query_parameters.len();

        let query_string = format!(
            "UPDATE transactions SET {} WHERE id = ?{id_index} AND user_id = ?{user_id_index}
             RETURNING {COLUMNS}",
            set_clause_parts.join(", ")
        );

        self.lock()?
            .prepare(&query_string)?
            .query_row(params_from_iter(query_parameters.iter()), Self::map_row)
            .map_err(not_found_or)
    }

    /// Delete one of the user's transactions.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
    /// - or [Error::SqlError] if there is some other SQL error.
    async fn delete(&self, user_id: &UserId, id: TransactionId) -> Result<(), Error> {
        let rows_affected = self.lock()?.execute(
            "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
            (id.to_string(), user_id.as_str()),
        )?;

        match rows_affected {
            0 => Err(Error::NotFound("Transaction")),
            _ => Ok(()),
        }
    }

    async fn summaries(&self, user_id: &UserId) -> Result<Vec<TransactionSummary>, Error> {
        self.lock()?
            .prepare("SELECT type, amount, date FROM transactions WHERE user_id = ?1")?
            .query_map([user_id.as_str()], |row| {
                let date: String = row.get(2)?;

                Ok(TransactionSummary {
                    kind: parse_kind(0, row.get(0)?)?,
                    amount: row.get(1)?,
                    date: parse_stored_date_time(2, &date)?,
                })
            })?
            .map(|maybe_summary| maybe_summary.map_err(Error::SqlError))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::macros::datetime;
    use uuid::Uuid;

    use crate::{
        Error,
        db::initialize,
        pagination::SortOrder,
        transaction::{
            NewTransaction, PageWindow, SortField, TransactionKind, TransactionPatch,
            TransactionQuery, TransactionStore, sqlite::SQLiteTransactionStore,
        },
        user::UserId,
    };

    fn get_store() -> SQLiteTransactionStore {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        SQLiteTransactionStore::new(Arc::new(Mutex::new(connection)))
    }

    fn new_transaction(amount: f64, day: u8) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            category: "Supplies".to_owned(),
            amount,
            description: Some(format!("Order {day}")),
            date: datetime!(2024-01-01 12:00 UTC).replace_day(day).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_stamps_owner_and_timestamps() {
        let store = get_store();
        let user_id = UserId::new("user-1");

        let transaction = store
            .create(&user_id, new_transaction(12.5, 3))
            .await
            .unwrap();

        assert_eq!(transaction.user_id, user_id);
        assert_eq!(transaction.amount, 12.5);
        assert_eq!(transaction.kind, TransactionKind::Expense);
        assert_eq!(transaction.date, datetime!(2024-01-03 12:00 UTC));
        assert!(transaction.created_at.is_some());
        assert_eq!(transaction.created_at, transaction.updated_at);
    }

    #[tokio::test]
    async fn create_rejects_non_positive_amount() {
        let store = get_store();
        let user_id = UserId::new("user-1");

        let result = store.create(&user_id, new_transaction(0.0, 3)).await;

        assert!(matches!(result, Err(Error::ValidationFailed(_))));
        assert!(
            store
                .list(&user_id, TransactionQuery::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn list_only_returns_own_transactions() {
        let store = get_store();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let want = store.create(&alice, new_transaction(1.0, 1)).await.unwrap();
        store.create(&bob, new_transaction(2.0, 2)).await.unwrap();

        let got = store
            .list(&alice, TransactionQuery::default())
            .await
            .unwrap();

        assert_eq!(got, vec![want]);
    }

    #[tokio::test]
    async fn list_defaults_to_newest_first() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        for day in [2, 9, 5] {
            store
                .create(&user_id, new_transaction(day as f64, day))
                .await
                .unwrap();
        }

        let got: Vec<_> = store
            .list(&user_id, TransactionQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.date.day())
            .collect();

        assert_eq!(got, [9, 5, 2]);
    }

    #[tokio::test]
    async fn list_sorts_and_pages() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        for (amount, day) in [(30.0, 1), (10.0, 2), (50.0, 3), (20.0, 4), (40.0, 5)] {
            store
                .create(&user_id, new_transaction(amount, day))
                .await
                .unwrap();
        }

        let query = TransactionQuery {
            sort_by: SortField::Amount,
            sort_order: SortOrder::Ascending,
            window: Some(PageWindow {
                offset: 2,
                limit: 2,
            }),
        };
        let got: Vec<_> = store
            .list(&user_id, query)
            .await
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.amount)
            .collect();

        assert_eq!(got, [30.0, 40.0]);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        let original = store
            .create(&user_id, new_transaction(12.5, 3))
            .await
            .unwrap();

        let patch = TransactionPatch {
            amount: Some(99.0),
            kind: Some(TransactionKind::Income),
            ..Default::default()
        };
        let updated = store.update(&user_id, original.id, patch).await.unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.amount, 99.0);
        assert_eq!(updated.kind, TransactionKind::Income);
        assert_eq!(updated.category, original.category);
        assert_eq!(updated.description, original.description);
        assert_eq!(updated.date, original.date);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
    }

    #[tokio::test]
    async fn update_rejects_non_positive_amount() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        let original = store
            .create(&user_id, new_transaction(12.5, 3))
            .await
            .unwrap();

        let patch = TransactionPatch {
            amount: Some(-3.0),
            ..Default::default()
        };
        let result = store.update(&user_id, original.id, patch).await;

        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn update_of_another_users_transaction_is_not_found() {
        let store = get_store();
        let owner = UserId::new("owner");
        let intruder = UserId::new("intruder");
        let transaction = store.create(&owner, new_transaction(5.0, 1)).await.unwrap();

        let patch = TransactionPatch {
            category: Some("Stolen".to_owned()),
            ..Default::default()
        };
        let result = store.update(&intruder, transaction.id, patch).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        let unchanged = store
            .list(&owner, TransactionQuery::default())
            .await
            .unwrap();
        assert_eq!(unchanged, vec![transaction]);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let store = get_store();

        let result = store
            .update(
                &UserId::new("user-1"),
                Uuid::new_v4(),
                TransactionPatch::default(),
            )
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_transaction_once() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        let transaction = store
            .create(&user_id, new_transaction(5.0, 1))
            .await
            .unwrap();

        store.delete(&user_id, transaction.id).await.unwrap();

        assert!(matches!(
            store.delete(&user_id, transaction.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(
            store
                .list(&user_id, TransactionQuery::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_of_another_users_transaction_is_not_found() {
        let store = get_store();
        let owner = UserId::new("owner");
        let transaction = store.create(&owner, new_transaction(5.0, 1)).await.unwrap();

        let result = store.delete(&UserId::new("intruder"), transaction.id).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(
            store
                .list(&owner, TransactionQuery::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn summaries_are_scoped_to_user() {
        let store = get_store();
        let user_id = UserId::new("user-1");
        store
            .create(&user_id, new_transaction(7.0, 4))
            .await
            .unwrap();
        store
            .create(&UserId::new("user-2"), new_transaction(8.0, 4))
            .await
            .unwrap();

        let summaries = store.summaries(&user_id).await.unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].amount, 7.0);
        assert_eq!(summaries[0].kind, TransactionKind::Expense);
        assert_eq!(summaries[0].date, datetime!(2024-01-04 12:00 UTC));
    }
}
