//! User endpoints.
//!
//! - POST `/register` - Create an account and start a session
//! - POST `/login` - Verify a password and start a session (rate limited)
//! - GET `/me` - Current user
//! - PATCH `/me` - Rename the current user

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{
    ApiError, MIN_PASSWORD_LENGTH, ResultExt, conflict_or_db_error, validate_username,
};
use crate::auth::{Auth, ResponseFinisher, issue_session};
use crate::csrf::CsrfBinder;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::password::{hash_password, verify_password};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::settings::AuthSettings;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub csrf: CsrfBinder,
    pub settings: Arc<AuthSettings>,
    pub rate_limit: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_login,
        ));

    Router::new()
        .route("/register", post(register))
        .route("/me", get(get_me).patch(update_me))
        .with_state(state)
        .merge(login_router)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    username: String,
}

#[derive(Serialize)]
struct UserResponse {
    uuid: String,
    username: String,
}

/// Start a session: token cookies plus `csrf_token` in the body, exactly as
/// a rotation would produce them.
async fn start_session(
    state: &UsersState,
    status: StatusCode,
    body: UserResponse,
) -> Result<Response, ApiError> {
    let tokens = issue_session(state, &body.uuid).internal_err("Failed to issue tokens")?;
    let response = (status, Json(body)).into_response();
    Ok(ResponseFinisher::new(&state.settings)
        .attach_tokens(response, &tokens)
        .await)
}

async fn register(
    State(state): State<UsersState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let username = validate_username(&payload.username)?.to_string();

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let available = state
        .db
        .users()
        .is_username_available(&username)
        .await
        .db_err("Failed to check username availability")?;

    if !available {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Failed to hash password")?;

    let uuid = uuid::Uuid::new_v4().to_string();
    state
        .db
        .users()
        .create(&uuid, &username, &password_hash)
        .await
        .map_err(|e| conflict_or_db_error(e, "Username is already taken", "Failed to create user"))?;

    info!(user = %username, "User registered");

    start_session(&state, StatusCode::CREATED, UserResponse { uuid, username }).await
}

async fn login(
    State(state): State<UsersState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let invalid = || ApiError::unauthorized("Invalid username or password");

    let user = state
        .db
        .users()
        .get_by_username(payload.username.trim())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(invalid)?;

    let password = payload.password;
    let stored = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .internal_err("Password verification task failed")?;

    if !verified {
        return Err(invalid());
    }

    info!(user = %user.username, "User logged in");

    start_session(
        &state,
        StatusCode::OK,
        UserResponse {
            uuid: user.uuid,
            username: user.username,
        },
    )
    .await
}

async fn get_me(
    State(state): State<UsersState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(&auth.subject)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        uuid: user.uuid,
        username: user.username,
    }))
}

async fn update_me(
    State(state): State<UsersState>,
    Auth(auth): Auth,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_username(&payload.username)?;

    let user = state
        .db
        .users()
        .get_by_uuid(&auth.subject)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    // Case-only changes keep the same uniqueness slot
    if !user.username.eq_ignore_ascii_case(username) {
        let available = state
            .db
            .users()
            .is_username_available(username)
            .await
            .db_err("Failed to check username availability")?;

        if !available {
            return Err(ApiError::conflict("Username is already taken"));
        }
    }

    let updated = state
        .db
        .users()
        .update_username(&user.uuid, username)
        .await
        .map_err(|e| {
            conflict_or_db_error(e, "Username is already taken", "Failed to update username")
        })?;

    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(Json(UserResponse {
        uuid: user.uuid,
        username: username.to_string(),
    }))
}
