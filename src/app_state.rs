//! Implements a struct that holds the state of the REST server.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::http::HeaderValue;
use rusqlite::Connection;

use crate::{
    Error,
    auth::{IdentityProvider, StaticIdentityProvider, SupabaseIdentityProvider},
    client_ip::ClientAddressSource,
    config::{Backend, Config, Environment},
    crm::CrmClient,
    db::initialize,
    rate_limit::RateLimiter,
    supabase::SupabaseClient,
    timezone::get_timezone,
    transaction::{PostgrestTransactionStore, SQLiteTransactionStore, TransactionStore},
};

/// How long outbound requests to Supabase and the CRM may take.
const OUTBOUND_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Settings for the HTTP layers wrapped around every route.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// The origin allowed to make cross-origin requests.
    pub allowed_origin: HeaderValue,
    /// How long a request may take before it is answered with 408 Request Timeout.
    pub request_timeout: Duration,
    /// Where client addresses are read from for logs.
    pub address_source: ClientAddressSource,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            allowed_origin: HeaderValue::from_static("http://localhost:3000"),
            request_timeout: Duration::from_secs(30),
            address_source: ClientAddressSource::default(),
        }
    }
}

/// The state of the REST server.
///
/// Every client handle is created once at start up and shared by all requests.
#[derive(Clone)]
pub struct AppState {
    /// Persists transactions.
    pub transaction_store: Arc<dyn TransactionStore>,

    /// Resolves access tokens to users.
    pub identity_provider: Arc<dyn IdentityProvider>,

    /// Forwards requests to the CRM.
    pub crm_client: CrmClient,

    /// Controls how much detail error responses carry.
    pub environment: Environment,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,

    /// Limits how many requests each client may make.
    pub rate_limiter: Arc<RateLimiter>,

    /// Settings for CORS and request timeouts.
    pub http_settings: HttpSettings,
}

impl AppState {
    /// Create a new [AppState] from explicitly constructed parts.
    ///
    /// `local_timezone` should be a valid, canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// # Errors
    /// Returns an [Error::Internal] if `local_timezone` is not a known timezone.
    pub fn new(
        transaction_store: Arc<dyn TransactionStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        crm_client: CrmClient,
        environment: Environment,
        local_timezone: &str,
        rate_limiter: RateLimiter,
    ) -> Result<Self, Error> {
        if get_timezone(local_timezone).is_none() {
            return Err(Error::Internal(format!(
                "unknown timezone \"{local_timezone}\", expected a canonical name such as \"Pacific/Auckland\""
            )));
        }

        Ok(Self {
            transaction_store,
            identity_provider,
            crm_client,
            environment,
            local_timezone: local_timezone.to_owned(),
            rate_limiter: Arc::new(rate_limiter),
            http_settings: HttpSettings::default(),
        })
    }

    /// Create the state described by `config`.
    ///
    /// With Supabase configured, transactions live in its `transactions` table
    /// and tokens are verified by Supabase Auth. Otherwise transactions live in
    /// SQLite and only the configured static tokens are accepted.
    ///
    /// # Errors
    /// Returns an error if the configuration is inconsistent, the HTTP client
    /// cannot be built or the database cannot be opened and initialized.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::Internal(format!("could not build HTTP client: {error}")))?;

        let (transaction_store, identity_provider): (
            Arc<dyn TransactionStore>,
            Arc<dyn IdentityProvider>,
        ) = match config.backend()? {
            Backend::Supabase { url, service_key } => {
                tracing::info!("Using Supabase project at {url}");
                let client = SupabaseClient::new(http.clone(), &url, service_key);

                (
                    Arc::new(PostgrestTransactionStore::new(client.clone())),
                    Arc::new(SupabaseIdentityProvider::new(client)),
                )
            }
            Backend::Sqlite {
                path,
                static_auth_tokens,
            } => {
                let connection = match &path {
                    Some(path) => {
                        tracing::info!("Using SQLite database at {}", path.display());
                        Connection::open(path)?
                    }
                    None => {
                        tracing::warn!("No database configured, using an in-memory SQLite database");
                        Connection::open_in_memory()?
                    }
                };
                initialize(&connection)?;

                (
                    Arc::new(SQLiteTransactionStore::new(Arc::new(Mutex::new(connection)))),
                    Arc::new(StaticIdentityProvider::parse(&static_auth_tokens)?),
                )
            }
        };

        if config.hubspot_access_token.is_none() {
            tracing::warn!("HUBSPOT_ACCESS_TOKEN is not set, CRM requests will fail");
        }

        let crm_client = CrmClient::new(
            http,
            &config.hubspot_base_url,
            config.hubspot_access_token.clone(),
        );

        let allowed_origin = HeaderValue::from_str(&config.frontend_url).map_err(|error| {
            Error::Internal(format!("invalid frontend URL {}: {error}", config.frontend_url))
        })?;

        let address_source = if config.trust_proxy {
            ClientAddressSource::ForwardedFor
        } else {
            ClientAddressSource::Peer
        };

        let mut state = Self::new(
            transaction_store,
            identity_provider,
            crm_client,
            config.environment,
            &config.local_timezone,
            RateLimiter::new(config.rate_limit_window(), config.rate_limit_max_requests)
                .with_address_source(address_source),
        )?;
        state.http_settings = HttpSettings {
            allowed_origin,
            request_timeout: config.request_timeout(),
            address_source,
        };

        Ok(state)
    }
}
