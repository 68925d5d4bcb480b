//! This modules defines the common functionality for paging and sorting lists.

use std::collections::HashMap;

use crate::{
    transaction::{PageWindow, SortField, TransactionQuery},
    validation::{FieldError, IssueCode, Validate, ValidationErrors},
};

/// The page number to default to when only `limit` is given.
pub const DEFAULT_PAGE: u64 = 1;
/// The page size to default to when only `page` is given.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// The largest page size a client may request.
pub const MAX_PAGE_SIZE: u64 = 100;
/// The largest row offset databases accept, a signed 64-bit integer.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// The order to sort items in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in order of increasing value.
    Ascending,
    /// Sort in order of decreasing value.
    Descending,
}

impl SortOrder {
    /// The short name used in query strings and by PostgREST.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Validated paging and sorting options from a query string.
///
/// Query parameters: `page` (integer > 0), `limit` (integer in 1..=100),
/// `sortBy` and `sortOrder` (`asc` or `desc`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// The 1-based page number.
    pub page: Option<u64>,
    /// The number of items per page.
    pub limit: Option<u64>,
    /// The field to sort by.
    pub sort_by: Option<SortField>,
    /// The direction to sort in.
    pub sort_order: Option<SortOrder>,
}

impl Pagination {
    /// Convert the options into a store query.
    ///
    /// Paging only applies when `page` or `limit` was given, otherwise every
    /// item is returned. Sorting defaults to newest first.
    pub fn into_query(self) -> TransactionQuery {
        let defaults = TransactionQuery::default();

        let window = match (self.page, self.limit) {
            (None, None) => None,
            (page, limit) => {
                let page = page.unwrap_or(DEFAULT_PAGE);
                let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);

                Some(PageWindow {
                    offset: page_offset(page, limit).unwrap_or(MAX_OFFSET),
                    limit,
                })
            }
        };

        TransactionQuery {
            sort_by: self.sort_by.unwrap_or(defaults.sort_by),
            sort_order: self.sort_order.unwrap_or(defaults.sort_order),
            window,
        }
    }
}

impl Validate for Pagination {
    type Input = HashMap<String, String>;

    fn validate(params: Self::Input) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();

        let page = parse_integer(&params, "page", &mut errors).and_then(|page| {
            if page < 1 {
                errors.push(FieldError::new(
                    "page",
                    "Number must be greater than 0",
                    IssueCode::TooSmall,
                ));
                None
            } else {
                Some(page as u64)
            }
        });

        let limit = parse_integer(&params, "limit", &mut errors).and_then(|limit| {
            if limit < 1 {
                errors.push(FieldError::new(
                    "limit",
                    "Number must be greater than or equal to 1",
                    IssueCode::TooSmall,
                ));
                None
            } else if limit as u64 > MAX_PAGE_SIZE {
                errors.push(FieldError::new(
                    "limit",
                    format!("Number must be less than or equal to {MAX_PAGE_SIZE}"),
                    IssueCode::TooBig,
                ));
                None
            } else {
                Some(limit as u64)
            }
        });

        let page_size = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page.is_some_and(|page| page_offset(page, page_size).is_none()) {
            errors.push(FieldError::new(
                "page",
                "Page is beyond the last possible row",
                IssueCode::TooBig,
            ));
        }

        let sort_by = params
            .get("sortBy")
            .and_then(|value| match value.parse::<SortField>() {
                Ok(field) => Some(field),
                Err(()) => {
                    errors.push(FieldError::new(
                        "sortBy",
                        format!(
                            "Invalid enum value. Expected 'date' | 'amount' | 'category' | 'type' \
                            | 'created_at', received '{value}'"
                        ),
                        IssueCode::InvalidEnumValue,
                    ));
                    None
                }
            });

        let sort_order = params
            .get("sortOrder")
            .and_then(|value| match value.as_str() {
                "asc" => Some(SortOrder::Ascending),
                "desc" => Some(SortOrder::Descending),
                other => {
                    errors.push(FieldError::new(
                        "sortOrder",
                        format!("Invalid enum value. Expected 'asc' | 'desc', received '{other}'"),
                        IssueCode::InvalidEnumValue,
                    ));
                    None
                }
            });

        if !errors.is_empty() {
            return Err(ValidationErrors::from(errors));
        }

        Ok(Self {
            page,
            limit,
            sort_by,
            sort_order,
        })
    }
}

/// The number of rows before the 1-based `page`, `None` if it exceeds [MAX_OFFSET].
fn page_offset(page: u64, limit: u64) -> Option<u64> {
    page.saturating_sub(1)
        .checked_mul(limit)
        .filter(|offset| *offset <= MAX_OFFSET)
}

/// Parse the query parameter `name` as a whole number.
///
/// Returns `None` when the parameter is absent or invalid, recording an error
/// for the latter.
fn parse_integer(
    params: &HashMap<String, String>,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    let raw = params.get(name)?;

    match raw.trim().parse::<i64>() {
        Ok(number) => Some(number),
        Err(_) if raw.trim().parse::<f64>().is_ok_and(f64::is_finite) => {
            errors.push(FieldError::new(
                name,
                "Expected integer, received float",
                IssueCode::InvalidType,
            ));
            None
        }
        Err(_) => {
            errors.push(FieldError::new(
                name,
                "Expected number, received nan",
                IssueCode::InvalidType,
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        pagination::{Pagination, SortOrder},
        transaction::{PageWindow, SortField, TransactionQuery},
        validation::{IssueCode, Validate},
    };

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn accepts_limit_bounds() {
        for limit in ["1", "100"] {
            let got = Pagination::validate(params(&[("limit", limit)]));

            assert!(got.is_ok(), "limit {limit} should be accepted, got {got:?}");
        }
    }

    #[test]
    fn rejects_limit_out_of_bounds() {
        let errors = Pagination::validate(params(&[("limit", "0")])).unwrap_err();
        assert_eq!(errors.as_slice()[0].field, "limit");
        assert_eq!(errors.as_slice()[0].code, IssueCode::TooSmall);

        let errors = Pagination::validate(params(&[("limit", "101")])).unwrap_err();
        assert_eq!(errors.as_slice()[0].field, "limit");
        assert_eq!(errors.as_slice()[0].code, IssueCode::TooBig);
    }

    #[test]
    fn rejects_non_positive_page() {
        let errors = Pagination::validate(params(&[("page", "0")])).unwrap_err();

        assert_eq!(errors.as_slice()[0].field, "page");
        assert_eq!(errors.as_slice()[0].code, IssueCode::TooSmall);
    }

    #[test]
    fn rejects_page_past_last_row() {
        let errors = Pagination::validate(params(&[
            ("page", "9223372036854775807"),
            ("limit", "100"),
        ]))
        .unwrap_err();

        assert_eq!(errors.as_slice()[0].field, "page");
        assert_eq!(errors.as_slice()[0].code, IssueCode::TooBig);
    }

    #[test]
    fn accepts_page_at_last_row() {
        let query = Pagination::validate(params(&[
            ("page", "9223372036854775807"),
            ("limit", "1"),
        ]))
        .unwrap()
        .into_query();

        assert_eq!(
            query.window,
            Some(PageWindow {
                offset: 9223372036854775806,
                limit: 1
            })
        );
    }

    #[test]
    fn rejects_non_numbers() {
        let errors =
            Pagination::validate(params(&[("page", "abc"), ("limit", "2.5")])).unwrap_err();

        assert_eq!(errors.as_slice().len(), 2);
        assert!(errors.has_field("page"));
        assert!(errors.has_field("limit"));
        assert!(
            errors
                .as_slice()
                .iter()
                .all(|error| error.code == IssueCode::InvalidType)
        );
    }

    #[test]
    fn rejects_unknown_sort_options() {
        let errors =
            Pagination::validate(params(&[("sortBy", "user_id"), ("sortOrder", "up")]))
                .unwrap_err();

        assert!(errors.has_field("sortBy"));
        assert!(errors.has_field("sortOrder"));
    }

    #[test]
    fn ignores_unknown_parameters() {
        let got = Pagination::validate(params(&[("foo", "bar")])).unwrap();

        assert_eq!(got, Pagination::default());
    }

    #[test]
    fn no_paging_returns_everything_newest_first() {
        let query = Pagination::default().into_query();

        assert_eq!(query, TransactionQuery::default());
        assert_eq!(query.window, None);
        assert_eq!(query.sort_order, SortOrder::Descending);
    }

    #[test]
    fn page_and_limit_become_a_window() {
        let pagination = Pagination::validate(params(&[
            ("page", "3"),
            ("limit", "10"),
            ("sortBy", "amount"),
            ("sortOrder", "asc"),
        ]))
        .unwrap();

        let query = pagination.into_query();

        assert_eq!(
            query,
            TransactionQuery {
                sort_by: SortField::Amount,
                sort_order: SortOrder::Ascending,
                window: Some(PageWindow {
                    offset: 20,
                    limit: 10
                }),
            }
        );
    }

    #[test]
    fn page_without_limit_uses_default_page_size() {
        let query = Pagination::validate(params(&[("page", "2")]))
            .unwrap()
            .into_query();

        assert_eq!(
            query.window,
            Some(PageWindow {
                offset: 20,
                limit: 20
            })
        );
    }
}
