//! Applies an `AuthDecision` to the outgoing response.

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use tracing::{debug, error};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, token_cookie};
use super::decision::{AuthDecision, NewTokens};
use super::errors::{auth_failed_response, csrf_failed_response};
use crate::settings::AuthSettings;

/// Body field carrying a newly issued CSRF secret.
pub const CSRF_BODY_FIELD: &str = "csrf_token";

/// Largest JSON body we will buffer to inject the CSRF field.
const MAX_JSON_BODY: usize = 16 * 1024 * 1024;

pub struct ResponseFinisher<'a> {
    settings: &'a AuthSettings,
}

impl<'a> ResponseFinisher<'a> {
    pub fn new(settings: &'a AuthSettings) -> Self {
        Self { settings }
    }

    /// Materialize the decision into status, cookies and body.
    ///
    /// Failures replace whatever response was produced; successful
    /// decisions pass the response through, augmented on rotation.
    pub async fn finish(&self, decision: AuthDecision, response: Response) -> Response {
        match decision {
            AuthDecision::AuthFailed => auth_failed_response(self.settings.secure_cookies),
            AuthDecision::CsrfFailed => csrf_failed_response(),
            AuthDecision::AuthenticatedWithRotation { tokens, .. } => {
                self.attach_tokens(response, &tokens).await
            }
            AuthDecision::Authenticated(_) | AuthDecision::Bypassed => response,
        }
    }

    /// Set token cookies and, for JSON bodies, expose the CSRF secret.
    ///
    /// A cookie the handler already set itself (logout clearing the session)
    /// is left as the handler wrote it.
    pub async fn attach_tokens(&self, mut response: Response, tokens: &NewTokens) -> Response {
        let secure = self.settings.secure_cookies;
        let mut cookies = vec![(
            ACCESS_COOKIE_NAME,
            token_cookie(
                ACCESS_COOKIE_NAME,
                &tokens.access.token,
                tokens.access.duration,
                secure,
            ),
        )];
        if let Some(refresh) = &tokens.refresh {
            cookies.push((
                REFRESH_COOKIE_NAME,
                token_cookie(REFRESH_COOKIE_NAME, &refresh.token, refresh.duration, secure),
            ));
        }
        cookies.retain(|(name, _)| !sets_cookie(&response, name));

        let headers = response.headers_mut();
        for (_, cookie) in cookies {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => error!(error = %e, "Token cookie is not a valid header value"),
            }
        }

        if is_json(&response) {
            inject_csrf(response, &tokens.csrf).await
        } else {
            debug!("Response is not JSON, CSRF token only in access token");
            response
        }
    }
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|c| c.split_once('=').is_some_and(|(n, _)| n.trim() == name))
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Add `csrf_token` to a JSON object body. Other JSON values pass through.
async fn inject_csrf(response: Response, csrf: &str) -> Response {
    let (mut parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_JSON_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer response body");
            parts.status = StatusCode::INTERNAL_SERVER_ERROR;
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let bytes = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut map)) => {
            map.insert(CSRF_BODY_FIELD.to_string(), Value::String(csrf.to_string()));
            match serde_json::to_vec(&map) {
                Ok(rewritten) => Bytes::from(rewritten),
                Err(_) => bytes,
            }
        }
        _ => bytes,
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
