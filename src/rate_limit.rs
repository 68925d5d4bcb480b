//! Fixed window rate limiting per client address.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    Error,
    client_ip::{ClientAddressSource, client_ip},
};

/// The default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
/// The default window length, 15 minutes.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Expired windows are swept once this many clients are tracked.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// The outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The number of requests allowed per window.
    pub limit: u32,
    /// The number of requests left in the current window.
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

impl Decision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_seconds()));
    }

    fn reset_seconds(&self) -> u64 {
        self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0)
    }
}

/// Counts requests per client in fixed windows.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    address_source: ClientAddressSource,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Allow `max_requests` per `window` for each client.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            address_source: ClientAddressSource::default(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Identify clients by the address read from `source`.
    pub fn with_address_source(mut self, source: ClientAddressSource) -> Self {
        self.address_source = source;
        self
    }

    /// Count a request from `client`.
    pub fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Decision {
        // The map holds plain counters, a panic elsewhere cannot leave it inconsistent.
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() >= PRUNE_THRESHOLD && !clients.contains_key(client) {
            let window = self.window;
            clients.retain(|_, entry| now.duration_since(entry.started) < window);
        }

        let entry = clients.entry(client.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

/// Middleware that rejects clients exceeding their quota with 429 Too Many Requests.
///
/// Every response carries `ratelimit-limit`, `ratelimit-remaining` and
/// `ratelimit-reset` headers.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(
        request.headers(),
        request.extensions(),
        limiter.address_source,
    );
    let decision = limiter.check(&client);

    if !decision.allowed {
        tracing::warn!("Rate limit exceeded for {client}");

        let mut response = Error::RateLimited.into_response();
        decision.write_headers(response.headers_mut());
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(decision.reset_seconds()));
        return response;
    }

    let mut response = next.run(request).await;
    decision.write_headers(response.headers_mut());

    response
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use axum::{
        Router,
        http::{HeaderName, HeaderValue, StatusCode},
        middleware,
        routing::get,
    };
    use axum_test::TestServer;

    use crate::{
        client_ip::ClientAddressSource,
        rate_limit::{RateLimiter, rate_limit_middleware},
    };

    fn get_test_server(limiter: RateLimiter) -> TestServer {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(
                Arc::new(limiter),
                rate_limit_middleware,
            ));

        TestServer::try_new(app).expect("Could not create test server.")
    }

    async fn ping_from(server: &TestServer, forwarded_for: &'static str) -> StatusCode {
        server
            .get("/ping")
            .add_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_static(forwarded_for),
            )
            .await
            .status_code()
    }

    #[test]
    fn allows_up_to_limit_per_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();

        let decisions: Vec<_> = (0..4)
            .map(|_| limiter.check_at("203.0.113.7", start))
            .collect();

        assert!(decisions[..3].iter().all(|decision| decision.allowed));
        assert_eq!(decisions[2].remaining, 0);
        assert!(!decisions[3].allowed);
    }

    #[test]
    fn counts_clients_separately() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();

        assert!(limiter.check_at("a", start).allowed);
        assert!(limiter.check_at("b", start).allowed);
        assert!(!limiter.check_at("a", start).allowed);
    }

    #[test]
    fn resets_after_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();

        assert!(limiter.check_at("a", start).allowed);
        assert!(!limiter.check_at("a", start + Duration::from_secs(59)).allowed);

        let decision = limiter.check_at("a", start + Duration::from_secs(60));
        assert!(decision.allowed);
        assert_eq!(decision.reset_after, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn responds_429_with_headers() {
        let server = get_test_server(RateLimiter::new(Duration::from_secs(900), 2));

        let first = server.get("/ping").await;
        first.assert_status_ok();
        assert_eq!(first.header("ratelimit-limit"), "2");
        assert_eq!(first.header("ratelimit-remaining"), "1");

        server.get("/ping").await.assert_status_ok();

        let limited = server.get("/ping").await;
        limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.header("ratelimit-remaining"), "0");
        assert_eq!(
            limited.json::<serde_json::Value>()["error"],
            "Too many requests from this IP, please try again later."
        );
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_evade_limit() {
        let server = get_test_server(RateLimiter::new(Duration::from_secs(900), 2));

        let statuses = [
            ping_from(&server, "198.51.100.0").await,
            ping_from(&server, "198.51.100.1").await,
            ping_from(&server, "198.51.100.2").await,
        ];

        assert_eq!(
            statuses,
            [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn trusted_proxy_counts_forwarded_clients_separately() {
        let server = get_test_server(
            RateLimiter::new(Duration::from_secs(900), 1)
                .with_address_source(ClientAddressSource::ForwardedFor),
        );

        assert_eq!(ping_from(&server, "198.51.100.0").await, StatusCode::OK);
        assert_eq!(ping_from(&server, "198.51.100.1").await, StatusCode::OK);
        assert_eq!(
            ping_from(&server, "198.51.100.0").await,
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
