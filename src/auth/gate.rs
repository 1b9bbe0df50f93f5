//! Request-pipeline entry point for authentication.
//!
//! Every request under the gate gets exactly one `AuthDecision`. Failures
//! short-circuit before any handler runs; successes attach the identity to
//! the request and let the response finisher apply rotated tokens afterwards.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_token_cookie};
use super::decision::AuthDecision;
use super::errors::AuthErrorKind;
use super::finisher::ResponseFinisher;
use super::rotator::{Resolution, TokenRotator};
use super::state::{AuthState, HasAuthBackend};
use super::types::AuthenticatedUser;
use crate::csrf::CSRF_HEADER_NAME;

/// Methods that never change state and skip the CSRF check.
fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Decide how to treat one request.
pub async fn decide<S>(state: &S, method: &Method, path: &str, headers: &HeaderMap) -> AuthDecision
where
    S: HasAuthBackend + Send + Sync,
{
    if state.settings().is_public_path(path) {
        return AuthDecision::Bypassed;
    }

    let access_token = get_token_cookie(headers, ACCESS_COOKIE_NAME);
    let refresh_token = get_token_cookie(headers, REFRESH_COOKIE_NAME);

    let resolution = match TokenRotator::new(state)
        .resolve(access_token, refresh_token)
        .await
    {
        Ok(resolution) => resolution,
        Err(AuthErrorKind::NotAuthenticated) => {
            debug!(path = %path, "No usable credentials");
            return AuthDecision::AuthFailed;
        }
        Err(kind) => {
            warn!(path = %path, reason = %kind, "Refresh token rejected");
            return AuthDecision::AuthFailed;
        }
    };

    if !is_read_only(method) {
        // Always the resolved token. After a rotation its secret is new, so a
        // mutating request that needed one fails until the client picks up
        // the fresh `csrf_token`.
        let resolved = match &resolution {
            Resolution::Current(access) | Resolution::Rotated { access, .. } => {
                access.token.as_str()
            }
        };

        let header = headers
            .get(CSRF_HEADER_NAME)
            .and_then(|v| v.to_str().ok());

        if let Err(e) = state.csrf().validate(resolved, header) {
            warn!(path = %path, method = %method, reason = %e, "CSRF validation failed");
            return AuthDecision::CsrfFailed;
        }
    }

    match resolution {
        Resolution::Current(access) => AuthDecision::Authenticated(access),
        Resolution::Rotated { access, tokens } => {
            AuthDecision::AuthenticatedWithRotation { access, tokens }
        }
    }
}

/// Middleware wrapping protected routes.
///
/// On success the forwarded request carries an `AuthenticatedUser` extension
/// and an `Authorization: Bearer` header with the resolved access token.
pub async fn auth_gate(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let decision = decide(
        &state,
        request.method(),
        request.uri().path(),
        request.headers(),
    )
    .await;

    let finisher = ResponseFinisher::new(&state.settings);

    if decision.is_failure() {
        return finisher.finish(decision, Response::default()).await;
    }

    if let Some(access) = decision.access() {
        match HeaderValue::from_str(&format!("Bearer {}", access.token)) {
            Ok(value) => {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
            Err(e) => warn!(error = %e, "Access token is not a valid header value"),
        }
        request
            .extensions_mut()
            .insert(AuthenticatedUser::from(access));
    }

    let response = next.run(request).await;
    finisher.finish(decision, response).await
}
