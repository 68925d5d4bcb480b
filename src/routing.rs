//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{
        Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{any, get, put},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::{
    AppState,
    auth::auth_guard,
    crm::crm_proxy_endpoint,
    endpoints,
    error::now_timestamp,
    error_normalizer::{error_normalizer, not_found_fallback},
    logging::{MAX_BODY_BYTES, logging_middleware},
    rate_limit::rate_limit_middleware,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, edit_transaction_endpoint,
        get_stats_endpoint, list_transactions_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Every `/api` route requires a bearer token and counts towards the caller's
/// rate limit. All error responses share the JSON error envelope.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(endpoints::TRANSACTION_STATS, get(get_stats_endpoint))
        .route(
            endpoints::TRANSACTION,
            put(edit_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(endpoints::CRM_PROXY, any(crm_proxy_endpoint))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(state.http_settings.allowed_origin.clone())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .merge(api_routes)
        .fallback(not_found_fallback)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.http_settings.request_timeout,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), error_normalizer))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// The response body for the health check.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Report that the server is up.
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: now_timestamp(),
    })
}
