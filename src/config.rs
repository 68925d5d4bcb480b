//! Command line and environment configuration for the server.

use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{Error, crm::DEFAULT_CRM_BASE_URL};

/// The environment the server runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    /// Error responses include debug detail.
    Development,
    /// Error responses never include internal detail.
    #[default]
    Production,
}

/// The API server for the finance dashboard.
///
/// Every option can also be set with the environment variable named in its help.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// The address to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Whether to run in development or production mode.
    #[arg(long = "env", env = "APP_ENV", value_enum, default_value_t = Environment::Production)]
    pub environment: Environment,

    /// The URL of the Supabase project, e.g. "https://abc.supabase.co".
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// The service role key of the Supabase project.
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub supabase_service_key: Option<String>,

    /// File path to a SQLite database, used when Supabase is not configured.
    ///
    /// Defaults to an in-memory database.
    #[arg(long, env = "SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// Comma separated `token:user_id` pairs accepted when Supabase is not configured.
    #[arg(long, env = "STATIC_AUTH_TOKENS", hide_env_values = true, default_value = "")]
    pub static_auth_tokens: String,

    /// The private app access token for HubSpot.
    #[arg(long, env = "HUBSPOT_ACCESS_TOKEN", hide_env_values = true)]
    pub hubspot_access_token: Option<String>,

    /// The origin of the HubSpot API.
    #[arg(long, env = "HUBSPOT_BASE_URL", default_value = DEFAULT_CRM_BASE_URL)]
    pub hubspot_base_url: String,

    /// The origin of the frontend allowed to make cross-origin requests.
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// The canonical timezone that defines the current month, e.g. "Pacific/Auckland".
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Etc/UTC")]
    pub local_timezone: String,

    /// The number of requests a client may make per rate limit window.
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 100)]
    pub rate_limit_max_requests: u32,

    /// The length of the rate limit window in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_limit_window_secs: u64,

    /// Read client addresses from `X-Forwarded-For`.
    ///
    /// Only set this behind a reverse proxy that overwrites the header,
    /// otherwise clients can pick their own address.
    #[arg(long, env = "TRUST_PROXY")]
    pub trust_proxy: bool,

    /// How long a request may take before the server gives up, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Also write debug logs to this file.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Where transactions and identities come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// A hosted Supabase project.
    Supabase {
        /// The project URL.
        url: String,
        /// The service role key.
        service_key: String,
    },
    /// A local SQLite database with a fixed set of access tokens.
    Sqlite {
        /// The database file, `None` for in-memory.
        path: Option<PathBuf>,
        /// Comma separated `token:user_id` pairs.
        static_auth_tokens: String,
    },
}

impl Config {
    /// Pick the backend from the Supabase settings.
    ///
    /// # Errors
    /// Returns an [Error::Internal] if only one of the Supabase URL and service key is set.
    pub fn backend(&self) -> Result<Backend, Error> {
        let non_empty = |value: &Option<String>| value.clone().filter(|value| !value.is_empty());

        match (
            non_empty(&self.supabase_url),
            non_empty(&self.supabase_service_key),
        ) {
            (Some(url), Some(service_key)) => Ok(Backend::Supabase { url, service_key }),
            (None, None) => Ok(Backend::Sqlite {
                path: self.sqlite_path.clone(),
                static_auth_tokens: self.static_auth_tokens.clone(),
            }),
            _ => Err(Error::Internal(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY must be set together".to_owned(),
            )),
        }
    }

    /// The per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The rate limit window.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }
}
