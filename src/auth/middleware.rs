//! Authentication middleware that resolves the caller from a bearer token.

use std::sync::Arc;

use axum::{
    RequestPartsExt,
    extract::{FromRef, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, Error, auth::IdentityProvider};

/// The state needed for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    /// Verifies access tokens.
    pub identity_provider: Arc<dyn IdentityProvider>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            identity_provider: state.identity_provider.clone(),
        }
    }
}

/// Middleware function that checks for a valid bearer access token.
///
/// The user ID is placed into the request and the request executed normally if
/// the token is valid, otherwise a 401 error is returned before the route
/// handler (or any of its extractors) runs.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(user_id): Extension<UserId>` to receive the user ID.
pub async fn auth_guard(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let (mut parts, body) = request.into_parts();

    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| Error::AuthenticationMissing)?;

    if bearer.token().is_empty() {
        return Err(Error::AuthenticationMissing);
    }

    let user_id = state.identity_provider.resolve(bearer.token()).await?;

    parts.extensions.insert(user_id);
    let request = Request::from_parts(parts, body);

    Ok(next.run(request).await)
}
