//! Sets up the SQLite database used by the local transaction store.

use rusqlite::{Connection, Transaction as SqlTransaction};
use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

use crate::Error;

/// How timestamps are stored in SQLite, e.g. "2024-01-05T09:00:00.000000Z".
///
/// Timestamps are always converted to UTC and use a fixed number of subsecond
/// digits so that sorting the text column sorts chronologically.
const STORED_DATE_TIME_FORMAT: &[BorrowedFormatItem] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// Create the application's tables if they do not exist yet.
///
/// # Errors
/// Returns an [Error::SqlError] if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
            category TEXT NOT NULL CHECK (length(category) > 0),
            amount REAL NOT NULL CHECK (amount > 0),
            description TEXT,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date)",
        (),
    )?;

    Ok(())
}

/// Format `date_time` for storage.
pub(crate) fn format_stored_date_time(date_time: OffsetDateTime) -> Result<String, Error> {
    date_time
        .to_offset(UtcOffset::UTC)
        .format(STORED_DATE_TIME_FORMAT)
        .map_err(|error| Error::Internal(format!("could not format {date_time}: {error}")))
}

/// Parse a timestamp read from column `index`.
pub(crate) fn parse_stored_date_time(
    index: usize,
    text: &str,
) -> Result<OffsetDateTime, rusqlite::Error> {
    time::PrimitiveDateTime::parse(text, STORED_DATE_TIME_FORMAT)
        .map(|date_time| date_time.assume_utc())
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
}
