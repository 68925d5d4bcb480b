//! Resolves bearer access tokens to the users they were issued to.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::{Error, supabase::SupabaseClient, user::UserId};

/// Verifies access tokens issued by an external identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the user that `access_token` was issued to.
    ///
    /// # Errors
    /// Returns [Error::AuthenticationInvalid] if the token is unknown, expired
    /// or could not be verified.
    async fn resolve(&self, access_token: &str) -> Result<UserId, Error>;
}

/// Verifies tokens with Supabase Auth.
#[derive(Debug, Clone)]
pub struct SupabaseIdentityProvider {
    client: SupabaseClient,
}

impl SupabaseIdentityProvider {
    /// Create a provider that asks the Supabase project behind `client`.
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn resolve(&self, access_token: &str) -> Result<UserId, Error> {
        let response = self
            .client
            .auth_as(Method::GET, "user", access_token)
            .send()
            .await
            .map_err(|error| {
                tracing::error!("Could not reach Supabase Auth: {error}");
                Error::AuthenticationInvalid
            })?;

        if !response.status().is_success() {
            tracing::debug!("Supabase Auth rejected token with {}", response.status());
            return Err(Error::AuthenticationInvalid);
        }

        let user: AuthUser = response.json().await.map_err(|error| {
            tracing::error!("Unexpected response from Supabase Auth: {error}");
            Error::AuthenticationInvalid
        })?;

        Ok(UserId::new(user.id))
    }
}

/// Verifies tokens against a fixed list, for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, UserId>,
}

impl StaticIdentityProvider {
    /// Create a provider that accepts `tokens`, a list of `(token, user_id)` pairs.
    pub fn new<T, U>(tokens: impl IntoIterator<Item = (T, U)>) -> Self
    where
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, user_id)| (token.into(), UserId::new(user_id)))
                .collect(),
        }
    }

    /// Parse a comma separated list of `token:user_id` pairs.
    ///
    /// # Errors
    /// Returns an [Error::Internal] naming the first malformed entry.
    pub fn parse(pairs: &str) -> Result<Self, Error> {
        let mut tokens = Vec::new();

        for entry in pairs.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            match entry.split_once(':') {
                Some((token, user_id)) if !token.is_empty() && !user_id.is_empty() => {
                    tokens.push((token.to_owned(), user_id.to_owned()));
                }
                _ => {
                    return Err(Error::Internal(format!(
                        "invalid static token entry \"{entry}\", expected token:user_id"
                    )));
                }
            }
        }

        Ok(Self::new(tokens))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, access_token: &str) -> Result<UserId, Error> {
        self.tokens
            .get(access_token)
            .cloned()
            .ok_or(Error::AuthenticationInvalid)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::get,
    };
    use serde_json::json;

    use crate::{
        Error,
        auth::identity::{IdentityProvider, StaticIdentityProvider, SupabaseIdentityProvider},
        supabase::SupabaseClient,
        user::UserId,
    };

    #[tokio::test]
    async fn static_provider_resolves_known_tokens() {
        let provider = StaticIdentityProvider::parse("abc:user-1, def:user-2").unwrap();

        assert_eq!(provider.resolve("abc").await.unwrap(), UserId::new("user-1"));
        assert_eq!(provider.resolve("def").await.unwrap(), UserId::new("user-2"));
        assert!(matches!(
            provider.resolve("xyz").await,
            Err(Error::AuthenticationInvalid)
        ));
    }

    #[test]
    fn static_provider_rejects_malformed_entries() {
        assert!(StaticIdentityProvider::parse("").is_ok());
        assert!(StaticIdentityProvider::parse("abc").is_err());
        assert!(StaticIdentityProvider::parse("abc:").is_err());
    }

    async fn fake_supabase_auth() -> SupabaseClient {
        async fn get_user(headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
            let authorization = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok());

            match (authorization, headers.get("apikey")) {
                (Some("Bearer good-token"), Some(_)) => {
                    (StatusCode::OK, Json(json!({"id": "user-42", "email": "a@b.c"})))
                }
                _ => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"msg": "invalid JWT"})),
                ),
            }
        }

        let app = Router::new().route("/auth/v1/user", get(get_user));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        SupabaseClient::new(reqwest::Client::new(), &format!("http://{address}"), "anon")
    }

    #[tokio::test]
    async fn supabase_provider_resolves_valid_token() {
        let provider = SupabaseIdentityProvider::new(fake_supabase_auth().await);

        assert_eq!(
            provider.resolve("good-token").await.unwrap(),
            UserId::new("user-42")
        );
    }

    #[tokio::test]
    async fn supabase_provider_rejects_invalid_token() {
        let provider = SupabaseIdentityProvider::new(fake_supabase_auth().await);

        assert!(matches!(
            provider.resolve("bad-token").await,
            Err(Error::AuthenticationInvalid)
        ));
    }
}
