//! The request shapes accepted by the transaction endpoints.

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{
    transaction::{NewTransaction, TransactionId, TransactionKind, TransactionPatch},
    validation::{
        FieldError, Fields, IssueCode, PathParam, Presence, Validate, ValidationErrors,
    },
};

/// The maximum number of characters in a transaction description.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

impl Validate for NewTransaction {
    type Input = Value;

    /// Expects `{amount, description, category, date?, type}`.
    ///
    /// Any other keys, including `user_id`, are dropped. A missing date
    /// defaults to the current time.
    fn validate(body: Value) -> Result<Self, ValidationErrors> {
        let mut fields = Fields::new(&body)?;

        let amount = read_amount(&mut fields, Presence::Required);
        let description = read_description(&mut fields, Presence::Required);
        let category = read_category(&mut fields, Presence::Required);
        let date = read_date(&mut fields);
        let kind = read_kind(&mut fields, Presence::Required);

        fields.finish()?;

        match (amount, description, category, kind) {
            (Some(amount), Some(description), Some(category), Some(kind)) => Ok(NewTransaction {
                kind,
                category,
                amount,
                description: Some(description),
                date: date.unwrap_or_else(OffsetDateTime::now_utc),
            }),
            // `finish` reports every missing required field.
            _ => Err(ValidationErrors::default()),
        }
    }
}

impl Validate for TransactionPatch {
    type Input = Value;

    /// Accepts any subset of the fields allowed on creation.
    fn validate(body: Value) -> Result<Self, ValidationErrors> {
        let mut fields = Fields::new(&body)?;

        let patch = TransactionPatch {
            amount: read_amount(&mut fields, Presence::Optional),
            description: read_description(&mut fields, Presence::Optional),
            category: read_category(&mut fields, Presence::Optional),
            date: read_date(&mut fields),
            kind: read_kind(&mut fields, Presence::Optional),
        };

        fields.finish()?;

        Ok(patch)
    }
}

fn read_amount(fields: &mut Fields, presence: Presence) -> Option<f64> {
    let amount = fields.number("amount", presence)?;

    if amount <= 0.0 {
        fields.reject("amount", "Amount must be positive", IssueCode::TooSmall);
        return None;
    }

    Some(amount)
}

fn read_description(fields: &mut Fields, presence: Presence) -> Option<String> {
    let description = fields.string("description", presence)?;
    let length = description.chars().count();

    if length < 1 {
        fields.reject(
            "description",
            "Description is required",
            IssueCode::TooSmall,
        );
        return None;
    }

    if length > MAX_DESCRIPTION_LENGTH {
        fields.reject(
            "description",
            format!("Description must be {MAX_DESCRIPTION_LENGTH} characters or less"),
            IssueCode::TooBig,
        );
        return None;
    }

    Some(description)
}

fn read_category(fields: &mut Fields, presence: Presence) -> Option<String> {
    let category = fields.string("category", presence)?;

    if category.is_empty() {
        fields.reject("category", "Category is required", IssueCode::TooSmall);
        return None;
    }

    Some(category)
}

fn read_date(fields: &mut Fields) -> Option<OffsetDateTime> {
    let date = fields.string("date", Presence::Optional)?;

    match OffsetDateTime::parse(&date, &Rfc3339) {
        Ok(date) => Some(date),
        Err(_) => {
            fields.reject("date", "Invalid datetime", IssueCode::InvalidString);
            None
        }
    }
}

fn read_kind(fields: &mut Fields, presence: Presence) -> Option<TransactionKind> {
    let kind = fields.string("type", presence)?;

    match kind.parse::<TransactionKind>() {
        Ok(kind) => Some(kind),
        Err(message) => {
            fields.reject("type", message, IssueCode::InvalidEnumValue);
            None
        }
    }
}

/// The length of a UUID in its hyphenated form.
const HYPHENATED_UUID_LENGTH: usize = 36;

/// The `id` path parameter of a single transaction route.
///
/// Only the hyphenated form, e.g. `67e55044-10b1-426f-9247-bb680e5fe0c8`, is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionIdParam(pub TransactionId);

impl Validate for TransactionIdParam {
    type Input = String;

    fn validate(param: String) -> Result<Self, ValidationErrors> {
        if param.len() != HYPHENATED_UUID_LENGTH {
            return Err(ValidationErrors::from(vec![invalid_id()]));
        }

        Uuid::try_parse(&param)
            .map(Self)
            .map_err(|_| ValidationErrors::from(vec![invalid_id()]))
    }
}

impl PathParam for TransactionIdParam {
    fn undecodable() -> FieldError {
        invalid_id()
    }
}

fn invalid_id() -> FieldError {
    FieldError::new("id", "Invalid uuid", IssueCode::InvalidString)
}
