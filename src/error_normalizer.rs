//! Middleware that gives every error response the same JSON envelope and logs it.

use axum::{
    Json,
    extract::{FromRef, Request, State},
    http::{
        StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    client_ip::{ClientAddressSource, client_ip},
    config::Environment,
    crm::RelayedResponse,
    error::{ErrorEnvelope, ErrorReport},
};

/// The state needed to shape and log error responses.
#[derive(Debug, Clone, Copy)]
pub struct ErrorNormalizerState {
    /// Controls whether envelopes carry a `stack`.
    pub environment: Environment,
    /// Where the logged client address is read from.
    pub address_source: ClientAddressSource,
}

impl FromRef<AppState> for ErrorNormalizerState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            environment: state.environment,
            address_source: state.http_settings.address_source,
        }
    }
}

/// Log every error response and shape it as `{error, statusCode, timestamp, details?, stack?}`.
///
/// Errors returned by handlers already carry an envelope, in development it
/// gains a `stack` with the error's debug representation. Bare error
/// responses produced by the framework (405, 408, 413, ...) are wrapped in an
/// envelope. Responses relayed from the CRM are passed through untouched.
pub async fn error_normalizer(
    State(state): State<ErrorNormalizerState>,
    request: Request,
    next: Next,
) -> Response {
    let environment = state.environment;
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let client = client_ip(request.headers(), request.extensions(), state.address_source);

    let response = next.run(request).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error())
        || response.extensions().get::<RelayedResponse>().is_some()
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();

    let (mut envelope, detail, body) = match parts.extensions.remove::<ErrorReport>() {
        Some(report) => (report.envelope, report.detail, Some(body)),
        None => {
            let detail = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(error) => format!("could not read response body: {error}"),
            };

            (ErrorEnvelope::new(status, ""), detail, None)
        }
    };

    log_failure(status, &method, &path, &client, &envelope, &detail);

    match (environment, body) {
        (Environment::Production, Some(body)) => Response::from_parts(parts, body),
        (environment, _) => {
            if environment == Environment::Development {
                envelope.stack = Some(detail);
            }

            parts.headers.remove(CONTENT_LENGTH);
            parts.headers.remove(CONTENT_TYPE);

            (parts, Json(envelope)).into_response()
        }
    }
}

fn log_failure(
    status: StatusCode,
    method: &axum::http::Method,
    path: &str,
    client: &str,
    envelope: &ErrorEnvelope,
    detail: &str,
) {
    if status.is_server_error() {
        tracing::error!(
            %method,
            path,
            client,
            status = status.as_u16(),
            "{}: {detail}",
            envelope.error
        );
    } else {
        tracing::warn!(
            %method,
            path,
            client,
            status = status.as_u16(),
            "{}",
            envelope.error
        );
    }
}

/// A fallback route handler for paths that match no route.
pub async fn not_found_fallback() -> Response {
    crate::Error::NotFound("Route").into_response()
}
