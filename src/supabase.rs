//! A thin client for the hosted Supabase project that holds transactions and users.

use reqwest::{Method, RequestBuilder, Response};

use crate::Error;

/// Connection details for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    service_key: String,
}

impl SupabaseClient {
    /// Create a client for the project at `url`, e.g. "https://abc.supabase.co".
    ///
    /// `service_key` is the service role key. It bypasses row level security, so
    /// every query must filter by the owning user itself.
    pub fn new(http: reqwest::Client, url: &str, service_key: impl Into<String>) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_owned(),
            service_key: service_key.into(),
        }
    }

    /// Start a request against the REST (PostgREST) API for `table`.
    pub(crate) fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{table}", self.url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Start a request against the Auth API authenticated as the user holding
    /// `access_token`.
    pub(crate) fn auth_as(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/auth/v1/{path}", self.url))
            .header("apikey", &self.service_key)
            .bearer_auth(access_token)
    }
}

/// Send `request` and check that Supabase answered with a success status.
///
/// # Errors
/// Returns an [Error::Database] if the request could not be sent or Supabase
/// returned an error status. The error keeps Supabase's message for the logs.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, Error> {
    let response = request
        .send()
        .await
        .map_err(|error| Error::Database(format!("could not reach Supabase: {error}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Database(format!("Supabase returned {status}: {body}")))
}
