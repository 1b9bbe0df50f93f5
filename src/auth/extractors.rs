//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::ApiAuthError;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extractor for handlers behind the auth gate.
///
/// Reads the identity the gate attached; it never looks at cookies itself.
/// Rejects with the standard 401 response if the gate did not run or the
/// route was allow-listed.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(Auth)
            .ok_or(ApiAuthError {
                secure_cookies: state.settings().secure_cookies,
            })
    }
}
