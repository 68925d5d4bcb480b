//! Proxies requests to the HubSpot CRM API using the server's access token.

use axum::{
    body::Bytes,
    extract::{FromRef, State},
    http::{HeaderMap, Method, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::{
    AppState, Error,
    endpoints::{self, format_endpoint},
};

/// The default HubSpot API origin.
pub const DEFAULT_CRM_BASE_URL: &str = "https://api.hubapi.com";

/// A client for the CRM API.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl CrmClient {
    /// Create a client for the API at `base_url`.
    ///
    /// Without an `access_token` every proxied request fails with
    /// [Error::CrmNotConfigured].
    pub fn new(http: reqwest::Client, base_url: &str, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_token: access_token.filter(|token| !token.is_empty()),
        }
    }
}

/// Marks a response that was relayed from the CRM verbatim.
///
/// Error statuses on these responses belong to the CRM and are not rewritten
/// into the error envelope.
#[derive(Debug, Clone, Copy)]
pub struct RelayedResponse;

/// The state needed by the CRM proxy.
#[derive(Debug, Clone)]
pub struct CrmState {
    /// The client used to reach the CRM.
    pub crm_client: CrmClient,
}

impl FromRef<AppState> for CrmState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            crm_client: state.crm_client.clone(),
        }
    }
}

/// A route handler that forwards the request to `<base url>/<path>` and relays
/// the CRM's status, content type and body.
///
/// The path and query string are forwarded exactly as received, percent-encoding included.
pub async fn crm_proxy_endpoint(
    State(state): State<CrmState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let client = state.crm_client;
    let Some(access_token) = client.access_token.as_deref() else {
        tracing::error!("Received a CRM request but no CRM access token is configured");
        return Err(Error::CrmNotConfigured);
    };

    let prefix = format_endpoint(endpoints::CRM_PROXY, "");
    let path = uri.path().strip_prefix(prefix.as_str()).unwrap_or_default();

    let mut url = format!("{}/{}", client.base_url, path.trim_start_matches('/'));
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut request = client
        .http
        .request(method.clone(), &url)
        .bearer_auth(access_token);
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        request = request.header(CONTENT_TYPE, content_type);
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = request.send().await.map_err(|error| {
        tracing::error!("CRM request {method} {url} failed: {error}");
        Error::UpstreamFailure(error.to_string())
    })?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let upstream_body = upstream.bytes().await.map_err(|error| {
        tracing::error!("Could not read CRM response for {method} {url}: {error}");
        Error::UpstreamFailure(error.to_string())
    })?;

    tracing::debug!("CRM responded to {method} {url} with {status}");

    let mut response = (status, upstream_body).into_response();
    match content_type {
        Some(content_type) => {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        None => {
            response.headers_mut().remove(CONTENT_TYPE);
        }
    }
    response.extensions_mut().insert(RelayedResponse);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE},
        routing::any,
    };
    use serde_json::{Value, json};

    use crate::{
        Error,
        crm::{CrmClient, CrmState, RelayedResponse, crm_proxy_endpoint},
    };

    /// Start a fake CRM that echoes what it received.
    async fn fake_crm() -> String {
        async fn echo(
            method: Method,
            uri: Uri,
            headers: HeaderMap,
            body: Bytes,
        ) -> (StatusCode, Json<Value>) {
            let status = if uri.path().ends_with("missing") {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };

            (
                status,
                Json(json!({
                    "method": method.as_str(),
                    "path": uri.path(),
                    "query": uri.query(),
                    "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
                    "contentType": headers.get("content-type").and_then(|v| v.to_str().ok()),
                    "body": String::from_utf8_lossy(&body),
                })),
            )
        }

        let app = Router::new().route("/{*path}", any(echo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{address}")
    }

    fn state(base_url: &str, access_token: Option<&str>) -> State<CrmState> {
        State(CrmState {
            crm_client: CrmClient::new(
                reqwest::Client::new(),
                base_url,
                access_token.map(str::to_owned),
            ),
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn forwards_request_with_server_token() {
        let base_url = fake_crm().await;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = crm_proxy_endpoint(
            state(&base_url, Some("crm-token")),
            Method::POST,
            Uri::from_static("/api/hubspot/crm/v3/objects/contacts?limit=5"),
            headers,
            Bytes::from_static(br#"{"properties":{"email":"a@b.c"}}"#),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.extensions().get::<RelayedResponse>().is_some());
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            body_json(response).await,
            json!({
                "method": "POST",
                "path": "/crm/v3/objects/contacts",
                "query": "limit=5",
                "authorization": "Bearer crm-token",
                "contentType": "application/json",
                "body": r#"{"properties":{"email":"a@b.c"}}"#,
            })
        );
    }

    #[tokio::test]
    async fn relays_upstream_error_status() {
        let base_url = fake_crm().await;

        let response = crm_proxy_endpoint(
            state(&base_url, Some("crm-token")),
            Method::GET,
            Uri::from_static("/api/hubspot/crm/v3/objects/missing"),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["method"], "GET");
    }

    #[tokio::test]
    async fn fails_without_access_token() {
        let result = crm_proxy_endpoint(
            state("http://127.0.0.1:9", None),
            Method::GET,
            Uri::from_static("/api/hubspot/crm/v3/objects/contacts"),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;

        assert!(matches!(result, Err(Error::CrmNotConfigured)));
    }

    #[tokio::test]
    async fn unreachable_crm_is_upstream_failure() {
        // Bind then drop a listener to get a port that refuses connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = crm_proxy_endpoint(
            state(&format!("http://{address}"), Some("crm-token")),
            Method::GET,
            Uri::from_static("/api/hubspot/crm/v3/objects/contacts"),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;

        assert!(matches!(result, Err(Error::UpstreamFailure(_))));
    }

    #[tokio::test]
    async fn forwards_encoded_path_verbatim() {
        let base_url = fake_crm().await;

        let response = crm_proxy_endpoint(
            state(&base_url, Some("crm-token")),
            Method::GET,
            Uri::from_static("/api/hubspot/crm/v3/objects/a%3Fb%23c?archived=false"),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["path"], "/crm/v3/objects/a%3Fb%23c");
        assert_eq!(body["query"], "archived=false");
    }
}
