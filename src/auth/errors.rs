//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie};
use crate::jwt::TokenError;

/// Internal reason authentication failed.
///
/// Only used for logging; every kind collapses into the same outward
/// `authentication_failed` response.
#[derive(Debug)]
pub enum AuthErrorKind {
    /// Neither an access token nor a refresh token was presented
    NotAuthenticated,
    Token(TokenError),
    /// The refresh token names a user that no longer exists
    SubjectNotFound,
    UnexpectedInternal,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthErrorKind::NotAuthenticated => write!(f, "No credentials presented"),
            AuthErrorKind::Token(e) => write!(f, "{}", e),
            AuthErrorKind::SubjectNotFound => write!(f, "Token subject not found"),
            AuthErrorKind::UnexpectedInternal => write!(f, "Unexpected internal error"),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
}

/// 401 with both auth cookies cleared.
pub fn auth_failed_response(secure_cookies: bool) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Authentication required",
            code: "authentication_failed",
        }),
    )
        .into_response();

    let headers = response.headers_mut();
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure_cookies)) {
            headers.append(header::SET_COOKIE, value);
        }
    }

    response
}

/// 403; cookies are left alone since the session itself is valid.
pub fn csrf_failed_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "CSRF validation failed",
            code: "csrf_failed",
        }),
    )
        .into_response()
}

/// Rejection for the `Auth` extractor when no identity was attached.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) secure_cookies: bool,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        auth_failed_response(self.secure_cookies)
    }
}
