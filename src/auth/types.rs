//! Authentication user types.

use crate::jwt::AccessClaims;

use super::decision::ResolvedAccess;

/// Identity the gate attaches to a request for downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Subject (user UUID)
    pub subject: String,
    /// JWT claims from the resolved access token
    pub claims: AccessClaims,
    /// Bearer credential (the resolved access token)
    pub bearer: String,
}

impl From<&ResolvedAccess> for AuthenticatedUser {
    fn from(access: &ResolvedAccess) -> Self {
        Self {
            subject: access.claims.sub.clone(),
            claims: access.claims.clone(),
            bearer: access.token.clone(),
        }
    }
}
