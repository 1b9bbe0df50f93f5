//! The per-request authentication decision.
//!
//! Created by the gate, carried to the response stage, then dropped.

use crate::jwt::{AccessClaims, AccessTokenResult, RefreshTokenResult};

/// An access token that verified and is not expired.
#[derive(Debug, Clone)]
pub struct ResolvedAccess {
    /// Raw token, forwarded downstream as the bearer credential
    pub token: String,
    pub claims: AccessClaims,
}

impl From<&AccessTokenResult> for ResolvedAccess {
    fn from(result: &AccessTokenResult) -> Self {
        Self {
            token: result.token.clone(),
            claims: result.claims.clone(),
        }
    }
}

/// Token material minted during this request, for the response stage.
#[derive(Debug, Clone)]
pub struct NewTokens {
    pub access: AccessTokenResult,
    /// Only present when the refresh token itself was rotated
    pub refresh: Option<RefreshTokenResult>,
    /// The secret bound into `access`, shown to the client once
    pub csrf: String,
}

/// Outcome of the auth gate for one request.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// Allow-listed route; no identity attached, nothing to finish.
    Bypassed,
    Authenticated(ResolvedAccess),
    AuthenticatedWithRotation {
        access: ResolvedAccess,
        tokens: NewTokens,
    },
    /// No usable access token and no usable refresh token.
    AuthFailed,
    /// Authenticated, but a mutating request failed the CSRF check.
    CsrfFailed,
}

impl AuthDecision {
    /// The access token downstream handlers should see, if any.
    pub fn access(&self) -> Option<&ResolvedAccess> {
        match self {
            AuthDecision::Authenticated(access)
            | AuthDecision::AuthenticatedWithRotation { access, .. } => Some(access),
            _ => None,
        }
    }

    /// Whether the request must not reach business handlers.
    pub fn is_failure(&self) -> bool {
        matches!(self, AuthDecision::AuthFailed | AuthDecision::CsrfFailed)
    }
}
