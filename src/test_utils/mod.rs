#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    AppState,
    auth::StaticIdentityProvider,
    config::Environment,
    crm::CrmClient,
    db::initialize,
    rate_limit::RateLimiter,
    transaction::{SQLiteTransactionStore, TransactionStore},
};

/// The access token that resolves to [ALICE].
pub(crate) const ALICE_TOKEN: &str = "alice-token";
pub(crate) const ALICE: &str = "alice";
/// The access token that resolves to [BOB].
pub(crate) const BOB_TOKEN: &str = "bob-token";
pub(crate) const BOB: &str = "bob";

#[track_caller]
pub(crate) fn get_test_store() -> Arc<dyn TransactionStore> {
    let connection = Connection::open_in_memory().expect("Could not open database in memory.");
    initialize(&connection).expect("Could not initialize database.");

    Arc::new(SQLiteTransactionStore::new(Arc::new(Mutex::new(connection))))
}

/// App state backed by an in-memory database, accepting [ALICE_TOKEN] and [BOB_TOKEN].
///
/// The CRM is not configured.
#[track_caller]
pub(crate) fn get_test_app_state() -> AppState {
    get_test_app_state_with(Environment::Production, RateLimiter::default())
}

#[track_caller]
pub(crate) fn get_test_app_state_with(
    environment: Environment,
    rate_limiter: RateLimiter,
) -> AppState {
    AppState::new(
        get_test_store(),
        Arc::new(StaticIdentityProvider::new([
            (ALICE_TOKEN, ALICE),
            (BOB_TOKEN, BOB),
        ])),
        CrmClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None),
        environment,
        "Etc/UTC",
        rate_limiter,
    )
    .expect("Could not create app state.")
}
