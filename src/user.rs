//! The identity of an authenticated user.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A newtype wrapper for the user IDs issued by the identity provider.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors. User IDs only ever come from a verified access token, never from the request body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
