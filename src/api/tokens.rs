//! Token endpoints.
//!
//! - GET `/verify` - Check the current session (rotating it if needed)
//! - POST `/logout` - Blacklist the refresh token and clear cookies

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, Auth, AuthErrorKind, REFRESH_COOKIE_NAME, TokenRotator, clear_cookie,
    get_token_cookie,
};
use crate::csrf::CsrfBinder;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::settings::AuthSettings;

#[derive(Clone)]
pub struct TokensState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub csrf: CsrfBinder,
    pub settings: Arc<AuthSettings>,
}

impl_has_auth_backend!(TokensState);

pub fn router(state: TokensState) -> Router {
    Router::new()
        .route("/verify", get(verify_token))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Serialize)]
struct VerifyResponse {
    sub: String,
    exp: u64,
}

/// Lightweight session check. A JSON body lets a rotated session hand the
/// client its new `csrf_token`.
async fn verify_token(Auth(auth): Auth) -> impl IntoResponse {
    Json(VerifyResponse {
        sub: auth.subject,
        exp: auth.claims.exp,
    })
}

/// Blacklist the presented refresh token and clear both cookies.
async fn logout(
    State(state): State<TokensState>,
    Auth(auth): Auth,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(raw) = get_token_cookie(&headers, REFRESH_COOKIE_NAME) {
        match TokenRotator::new(&state).decode_refresh(raw).await {
            Ok(claims) => {
                state
                    .db
                    .blacklist()
                    .add(&claims.jti, &claims.sub, claims.exp)
                    .await
                    .db_err("Failed to blacklist refresh token")?;
            }
            Err(AuthErrorKind::UnexpectedInternal) => {
                return Err(ApiError::internal("Database error"));
            }
            Err(e) => debug!(reason = %e, "Logout with unusable refresh token"),
        }
    }

    info!(subject = %auth.subject, "User logged out");

    let mut response = Json(serde_json::json!({ "success": true })).into_response();
    let secure = state.settings.secure_cookies;
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}
