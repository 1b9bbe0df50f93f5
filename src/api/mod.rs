mod error;
mod tokens;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthState;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use tokens::TokensState;
pub use users::UsersState;

/// Create the API router. The auth gate is layered on by the caller.
pub fn create_api_router(auth: &AuthState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let users_state = UsersState {
        db: auth.db.clone(),
        codec: auth.codec.clone(),
        csrf: auth.csrf.clone(),
        settings: auth.settings.clone(),
        rate_limit,
    };

    let tokens_state = TokensState {
        db: auth.db.clone(),
        codec: auth.codec.clone(),
        csrf: auth.csrf.clone(),
        settings: auth.settings.clone(),
    };

    Router::new()
        .nest("/users", users::router(users_state))
        .nest("/tokens", tokens::router(tokens_state))
}
