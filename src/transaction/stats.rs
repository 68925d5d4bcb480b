//! Computes lifetime and current month totals over a user's transactions.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use serde::Serialize;
use time::OffsetDateTime;
use time_tz::Tz;

use crate::{
    AppState, Error,
    timezone::{get_timezone, to_local},
    transaction::{TransactionKind, TransactionStore, TransactionSummary},
    user::UserId,
};

/// Totals over every transaction a user owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    /// The number of transactions.
    pub total_transactions: usize,
    /// The sum of all income.
    pub total_income: f64,
    /// The sum of all expenses.
    pub total_expenses: f64,
    /// Income minus expenses.
    pub balance: f64,
    /// The sum of income in the current calendar month.
    pub monthly_income: f64,
    /// The sum of expenses in the current calendar month.
    pub monthly_expenses: f64,
}

/// Fold `transactions` into a [StatsSummary].
///
/// A transaction counts towards the monthly totals when its date falls in the
/// same calendar month and year as `now`, with both expressed in `timezone`.
pub fn summarize(
    transactions: &[TransactionSummary],
    now: OffsetDateTime,
    timezone: &Tz,
) -> StatsSummary {
    let now = to_local(now, timezone);
    let current_month = (now.year(), now.month());

    let mut stats = StatsSummary {
        total_transactions: transactions.len(),
        ..Default::default()
    };

    for transaction in transactions {
        let date = to_local(transaction.date, timezone);
        let is_current_month = (date.year(), date.month()) == current_month;

        match transaction.kind {
            TransactionKind::Income => {
                stats.total_income += transaction.amount;
                if is_current_month {
                    stats.monthly_income += transaction.amount;
                }
            }
            TransactionKind::Expense => {
                stats.total_expenses += transaction.amount;
                if is_current_month {
                    stats.monthly_expenses += transaction.amount;
                }
            }
        }
    }

    stats.balance = stats.total_income - stats.total_expenses;

    stats
}

/// The state needed to compute transaction statistics.
#[derive(Clone)]
pub struct StatsState {
    /// The store to read transactions from.
    pub transaction_store: Arc<dyn TransactionStore>,
    /// The canonical timezone name that defines the current month.
    pub local_timezone: String,
}

impl FromRef<AppState> for StatsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            transaction_store: state.transaction_store.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// The response body for [get_stats_endpoint].
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// The caller's totals.
    pub stats: StatsSummary,
}

/// A route handler that returns the caller's transaction totals.
pub async fn get_stats_endpoint(
    State(state): State<StatsState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<StatsResponse>, Error> {
    let timezone = get_timezone(&state.local_timezone).ok_or_else(|| {
        Error::Internal(format!("invalid timezone {}", state.local_timezone))
    })?;

    let transactions = state
        .transaction_store
        .summaries(&user_id)
        .await
        .inspect_err(|error| {
            tracing::error!("Could not fetch transactions for stats for {user_id}: {error}")
        })?;

    let stats = summarize(&transactions, OffsetDateTime::now_utc(), timezone);

    Ok(Json(StatsResponse { stats }))
}
