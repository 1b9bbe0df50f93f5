//! JWT cookie authentication with refresh rotation and CSRF binding.
//!
//! Dual-token system: short-lived access tokens (stateless, carrying a CSRF
//! secret) and long-lived refresh tokens (blacklistable by JTI). The gate
//! middleware resolves a usable access token per request, rotating it when
//! it is missing, expired or about to expire, and the response finisher
//! writes any new tokens back as cookies.

mod cookie;
mod decision;
mod errors;
mod extractors;
mod finisher;
mod gate;
mod ip;
mod rotator;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, get_cookie, get_token_cookie,
    token_cookie,
};
pub use decision::{AuthDecision, NewTokens, ResolvedAccess};
pub use errors::{ApiAuthError, AuthErrorKind, auth_failed_response, csrf_failed_response};
pub use extractors::Auth;
pub use finisher::{CSRF_BODY_FIELD, ResponseFinisher};
pub use gate::{auth_gate, decide};
pub use ip::{UNKNOWN_CLIENT, extract_client_ip};
pub use rotator::{Resolution, TokenRotator, issue_session};
pub use state::{AuthState, HasAuthBackend};
pub use types::AuthenticatedUser;
