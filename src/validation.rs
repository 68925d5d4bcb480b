//! Schema validation for request bodies, query strings and path parameters.
//!
//! Handlers receive already validated values through the [ValidatedJson],
//! [ValidatedQuery] and [ValidatedPath] extractors. A failed validation
//! rejects the request with [Error::ValidationFailed], which lists every
//! offending field rather than just the first one.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, rejection::JsonRejection},
    http::{StatusCode, request::Parts},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::Error;

/// Machine readable classification of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// The value is missing or has the wrong JSON type.
    InvalidType,
    /// The value is below its minimum (number or length).
    TooSmall,
    /// The value is above its maximum (number or length).
    TooBig,
    /// The string is not in the expected format, e.g. a UUID or datetime.
    InvalidString,
    /// The value is not one of the allowed options.
    InvalidEnumValue,
    /// The body could not be parsed as JSON.
    InvalidJson,
}

/// A single problem with a single field of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// The path of the field, e.g. "amount". Empty for the section itself.
    pub field: String,
    /// A human readable description of the problem.
    pub message: String,
    /// What kind of problem this is.
    pub code: IssueCode,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: &str, message: impl Into<String>, code: IssueCode) -> Self {
        Self {
            field: field.to_owned(),
            message: message.into(),
            code,
        }
    }
}

/// All the problems found while validating one section of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// The individual field errors, in the order they were found.
    pub fn as_slice(&self) -> &[FieldError] {
        &self.0
    }

    /// Whether a problem was recorded for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

/// A type that can be produced by checking and normalizing raw request input.
pub trait Validate: Sized {
    /// The raw form of the request section, e.g. a JSON value.
    type Input;

    /// Check `input` against the declared shape and produce the normalized value.
    ///
    /// # Errors
    /// Returns every field that failed a check.
    fn validate(input: Self::Input) -> Result<Self, ValidationErrors>;
}

/// Whether a field must be present in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// A missing field is reported as an error.
    Required,
    /// A missing field is skipped.
    Optional,
}

/// Reads typed fields from a JSON object while collecting errors.
///
/// Keys that are never read are ignored, which strips unknown keys from the
/// normalized value.
pub struct Fields<'a> {
    object: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> Fields<'a> {
    /// Start reading fields from `body`.
    ///
    /// # Errors
    /// Returns an error if `body` is not a JSON object.
    pub fn new(body: &'a Value) -> Result<Self, ValidationErrors> {
        match body {
            Value::Object(object) => Ok(Self {
                object,
                errors: ValidationErrors::default(),
            }),
            other => Err(ValidationErrors::from(vec![FieldError::new(
                "",
                format!("Expected object, received {}", json_type_name(other)),
                IssueCode::InvalidType,
            )])),
        }
    }

    fn get(&mut self, name: &str, presence: Presence) -> Option<&'a Value> {
        let object = self.object;

        match object.get(name) {
            Some(value) => Some(value),
            None => {
                if presence == Presence::Required {
                    self.reject(name, "Required", IssueCode::InvalidType);
                }
                None
            }
        }
    }

    /// Read the number `name`.
    pub fn number(&mut self, name: &str, presence: Presence) -> Option<f64> {
        let value = self.get(name, presence)?;

        match value.as_f64() {
            Some(number) => Some(number),
            None => {
                self.reject(
                    name,
                    format!("Expected number, received {}", json_type_name(value)),
                    IssueCode::InvalidType,
                );
                None
            }
        }
    }

    /// Read the string `name`.
    pub fn string(&mut self, name: &str, presence: Presence) -> Option<String> {
        let value = self.get(name, presence)?;

        match value.as_str() {
            Some(text) => Some(text.to_owned()),
            None => {
                self.reject(
                    name,
                    format!("Expected string, received {}", json_type_name(value)),
                    IssueCode::InvalidType,
                );
                None
            }
        }
    }

    /// Record a problem with the field `name`.
    pub fn reject(&mut self, name: &str, message: impl Into<String>, code: IssueCode) {
        self.errors.push(FieldError::new(name, message, code));
    }

    /// Finish reading and return all the errors found, if any.
    ///
    /// # Errors
    /// Returns the collected errors if at least one field was rejected.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extracts and validates a JSON request body.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: Validate<Input = Value> + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(request, state)
            .await
            .map_err(map_json_rejection)?;

        T::validate(body).map(Self).map_err(Error::ValidationFailed)
    }
}

fn map_json_rejection(rejection: JsonRejection) -> Error {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::PayloadTooLarge;
    }

    Error::invalid_field(FieldError::new(
        "body",
        rejection.body_text(),
        IssueCode::InvalidJson,
    ))
}

/// Extracts and validates the query string.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: Validate<Input = HashMap<String, String>> + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                Error::invalid_field(FieldError::new(
                    "query",
                    rejection.body_text(),
                    IssueCode::InvalidType,
                ))
            })?;

        T::validate(params).map(Self).map_err(Error::ValidationFailed)
    }
}

/// A path parameter with a declared shape.
pub trait PathParam: Validate<Input = String> {
    /// The problem reported when the parameter is not valid percent-encoded UTF-8.
    fn undecodable() -> FieldError;
}

/// Extracts and validates a single path parameter.
#[derive(Debug)]
pub struct ValidatedPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedPath<T>
where
    T: PathParam + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(param) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                if rejection.status().is_client_error() {
                    tracing::debug!("could not decode path parameter: {rejection}");
                    return Error::invalid_field(T::undecodable());
                }

                tracing::error!("could not read path parameter: {rejection}");
                Error::Internal(rejection.body_text())
            })?;

        T::validate(param).map(Self).map_err(Error::ValidationFailed)
    }
}
