//! Defines the app level error type and its conversion into the JSON error envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::validation::{FieldError, ValidationErrors};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request did not carry a bearer token.
    #[error("Access token required")]
    AuthenticationMissing,

    /// The bearer token could not be resolved to a user by the identity provider.
    #[error("Invalid token")]
    AuthenticationInvalid,

    /// One or more fields of the request failed validation.
    #[error("Validation failed")]
    ValidationFailed(ValidationErrors),

    /// The requested resource was not found, or is not owned by the caller.
    ///
    /// The string names the kind of resource, e.g. "Transaction".
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The client has sent too many requests in the current rate limit window.
    #[error("Too many requests from this IP, please try again later.")]
    RateLimited,

    /// The request body exceeded the configured size limit.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// A request to an upstream service could not be completed.
    ///
    /// The string should only be logged, clients receive a generic message.
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    /// The CRM proxy was called but no access token has been configured.
    #[error("the CRM integration is not configured")]
    CrmNotConfigured,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(#[from] rusqlite::Error),

    /// The hosted database rejected a request or returned something unexpected.
    #[error("database request failed: {0}")]
    Database(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Any other unexpected failure.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status code the error resolves to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::AuthenticationMissing | Error::AuthenticationInvalid => StatusCode::UNAUTHORIZED,
            Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Error::CrmNotConfigured
            | Error::SqlError(_)
            | Error::Database(_)
            | Error::DatabaseLockError
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to show to the client.
    fn client_message(&self) -> String {
        match self {
            Error::UpstreamFailure(_) => "Bad Gateway".to_owned(),
            error if error.status_code().is_server_error() => "Internal Server Error".to_owned(),
            error => error.to_string(),
        }
    }

    /// Shorthand for a validation failure on a single field.
    pub fn invalid_field(error: FieldError) -> Self {
        Error::ValidationFailed(ValidationErrors::from(vec![error]))
    }
}

/// The JSON body sent for every error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// A human readable description of what went wrong.
    pub error: String,
    /// Mirrors the HTTP status of the response.
    pub status_code: u16,
    /// When the error was produced, as an RFC 3339 string.
    pub timestamp: String,
    /// Per-field problems for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    /// Debug detail of the failure, only populated in development.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    /// Create an envelope for `status` stamped with the current time.
    ///
    /// An empty `message` falls back to the canonical reason of `status`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let error = if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_owned()
        } else {
            message
        };

        Self {
            error,
            status_code: status.as_u16(),
            timestamp: now_timestamp(),
            details: None,
            stack: None,
        }
    }
}

/// The current UTC time formatted as RFC 3339.
pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Attached to error responses so that [crate::error_normalizer] can log the
/// failure and, in development, expose its detail.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// The envelope that was sent as the response body.
    pub envelope: ErrorEnvelope,
    /// The debug representation of the original error.
    pub detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut envelope = ErrorEnvelope::new(status, self.client_message());

        if let Error::ValidationFailed(ref errors) = self {
            envelope.details = Some(errors.as_slice().to_vec());
        }

        let report = ErrorReport {
            envelope: envelope.clone(),
            detail: format!("{self:?}"),
        };

        let mut response = (status, Json(envelope)).into_response();
        response.extensions_mut().insert(report);

        response
    }
}
