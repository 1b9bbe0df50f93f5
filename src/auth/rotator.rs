//! Access token resolution and rotation.
//!
//! Decision table, given the access and refresh cookies:
//!
//! | access token               | refresh token | action                  |
//! |----------------------------|---------------|-------------------------|
//! | valid, not expiring soon   | any           | use as-is               |
//! | valid, expiring soon       | present       | refresh                 |
//! | valid, expiring soon       | absent        | use as-is               |
//! | absent, invalid or expired | present       | refresh                 |
//! | absent, invalid or expired | absent        | fail                    |
//!
//! A failed refresh attempt always fails the request, even when the access
//! token was still valid.

use tracing::{debug, error, info, warn};

use super::decision::{NewTokens, ResolvedAccess};
use super::errors::AuthErrorKind;
use super::state::HasAuthBackend;
use crate::expiry::is_expiring_soon;
use crate::jwt::{RefreshClaims, TokenError, unix_now};

/// Usable access token produced by the rotator.
#[derive(Debug)]
pub enum Resolution {
    /// The presented access token is good as it is.
    Current(ResolvedAccess),
    /// A new access token (and maybe refresh token) was minted.
    Rotated {
        access: ResolvedAccess,
        tokens: NewTokens,
    },
}

/// Runs the decision table against one request's cookies.
pub struct TokenRotator<'a, S> {
    backend: &'a S,
}

impl<'a, S> TokenRotator<'a, S>
where
    S: HasAuthBackend + Send + Sync,
{
    pub fn new(backend: &'a S) -> Self {
        Self { backend }
    }

    /// Produce a usable access token or the reason there is none.
    pub async fn resolve(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<Resolution, AuthErrorKind> {
        let now = unix_now().map_err(AuthErrorKind::Token)?;
        let settings = self.backend.settings();

        let current = access_token.and_then(|raw| match self.backend.codec().decode_access(raw) {
            Ok(claims) => Some(ResolvedAccess {
                token: raw.to_string(),
                claims,
            }),
            Err(e) => {
                debug!(error = %e, "Access token invalid");
                None
            }
        });

        match (current, refresh_token) {
            (Some(current), refresh) => {
                if !is_expiring_soon(&current.claims, settings.access_threshold, now) {
                    return Ok(Resolution::Current(current));
                }
                match refresh {
                    Some(refresh) => {
                        debug!(subject = %current.claims.sub, "Access token expiring soon, will refresh");
                        self.refresh(refresh, now).await
                    }
                    None => {
                        debug!(subject = %current.claims.sub, "Access token expiring soon but no refresh token");
                        Ok(Resolution::Current(current))
                    }
                }
            }
            (None, Some(refresh)) => self.refresh(refresh, now).await,
            (None, None) => Err(AuthErrorKind::NotAuthenticated),
        }
    }

    /// Decode a refresh token and reject blacklisted identifiers.
    pub async fn decode_refresh(&self, raw: &str) -> Result<RefreshClaims, AuthErrorKind> {
        let claims = self
            .backend
            .codec()
            .decode_refresh(raw)
            .map_err(AuthErrorKind::Token)?;

        match self.backend.db().blacklist().contains(&claims.jti).await {
            Ok(false) => Ok(claims),
            Ok(true) => Err(AuthErrorKind::Token(TokenError::Blacklisted)),
            Err(e) => {
                error!(error = %e, "Failed to check refresh token blacklist");
                Err(AuthErrorKind::UnexpectedInternal)
            }
        }
    }

    async fn refresh(&self, raw: &str, now: u64) -> Result<Resolution, AuthErrorKind> {
        let settings = self.backend.settings();
        let claims = self.decode_refresh(raw).await?;

        let user = self
            .backend
            .db()
            .users()
            .get_by_uuid(&claims.sub)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to get user");
                AuthErrorKind::UnexpectedInternal
            })?
            .ok_or(AuthErrorKind::SubjectNotFound)?;

        let bound = self.backend.csrf().bind_new(&user.uuid).map_err(|e| {
            error!(error = %e, "Failed to mint access token");
            AuthErrorKind::UnexpectedInternal
        })?;

        let rotate_refresh = settings.rotate_refresh_tokens
            && is_expiring_soon(&claims, settings.refresh_threshold, now);

        let refresh = if rotate_refresh {
            if settings.blacklist_after_rotation {
                self.blacklist_best_effort(&claims).await;
            }
            let refresh = self.backend.codec().mint_refresh(&user.uuid).map_err(|e| {
                error!(error = %e, "Failed to mint refresh token");
                AuthErrorKind::UnexpectedInternal
            })?;
            Some(refresh)
        } else {
            None
        };

        info!(
            user = %user.username,
            refresh_rotated = refresh.is_some(),
            "Successfully refreshed tokens"
        );

        Ok(Resolution::Rotated {
            access: ResolvedAccess::from(&bound.access),
            tokens: NewTokens {
                access: bound.access,
                refresh,
                csrf: bound.csrf,
            },
        })
    }

    /// Blacklist failures must never block a rotation.
    async fn blacklist_best_effort(&self, claims: &RefreshClaims) {
        if let Err(e) = self
            .backend
            .db()
            .blacklist()
            .add(&claims.jti, &claims.sub, claims.exp)
            .await
        {
            warn!(jti = %claims.jti, error = %e, "Failed to blacklist rotated refresh token");
        }
    }
}

/// Mint a complete token set for a fresh session (login, registration).
pub fn issue_session<S: HasAuthBackend>(
    backend: &S,
    subject: &str,
) -> Result<NewTokens, TokenError> {
    let bound = backend.csrf().bind_new(subject)?;
    let refresh = backend.codec().mint_refresh(subject)?;
    Ok(NewTokens {
        access: bound.access,
        refresh: Some(refresh),
        csrf: bound.csrf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::db::Database;
    use crate::jwt::{AccessClaims, RefreshClaims, TokenType};
    use crate::settings::AuthSettings;
    use jsonwebtoken::{EncodingKey, Header};
    use std::sync::Arc;

    const SECRET: &[u8] = b"test-secret-key-for-testing";

    async fn state(settings: AuthSettings) -> AuthState {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create("uuid-1", "alice", "hash").await.unwrap();
        AuthState::new(db, SECRET, Arc::new(settings))
    }

    /// Every freshly minted token counts as expiring soon.
    fn always_expiring() -> AuthSettings {
        AuthSettings {
            access_threshold: 10_000,
            refresh_threshold: 10_000_000,
            refresh_lifetime: 1_000_000,
            ..AuthSettings::default()
        }
    }

    fn expired_access(subject: &str) -> String {
        let now = unix_now().unwrap();
        let claims = AccessClaims {
            sub: subject.to_string(),
            token_type: TokenType::Access,
            iat: now - 600,
            exp: now - 300,
            csrf: "old".to_string(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
            .unwrap()
    }

    fn refresh_for(subject: &str, exp_in: u64) -> (String, String) {
        let now = unix_now().unwrap();
        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + exp_in,
        };
        let token =
            jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
                .unwrap();
        (token, claims.jti)
    }

    #[tokio::test]
    async fn test_valid_access_used_as_is() {
        let state = state(AuthSettings::default()).await;
        let access = state.codec.mint_access("uuid-1", "csrf").unwrap();
        let (refresh, _) = refresh_for("uuid-1", 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(Some(&access.token), Some(&refresh))
            .await
            .unwrap();

        match resolution {
            Resolution::Current(current) => assert_eq!(current.token, access.token),
            other => panic!("expected current token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expiring_access_without_refresh_used_as_is() {
        let state = state(always_expiring()).await;
        let access = state.codec.mint_access("uuid-1", "csrf").unwrap();

        let resolution = TokenRotator::new(&state)
            .resolve(Some(&access.token), None)
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Current(_)));
    }

    #[tokio::test]
    async fn test_expiring_access_is_rotated_with_new_csrf() {
        let state = state(always_expiring()).await;
        let access = state.codec.mint_access("uuid-1", "old-csrf").unwrap();
        let (refresh, _) = refresh_for("uuid-1", 20_000_000);

        let resolution = TokenRotator::new(&state)
            .resolve(Some(&access.token), Some(&refresh))
            .await
            .unwrap();

        match resolution {
            Resolution::Rotated { access: new, tokens } => {
                assert_ne!(new.token, access.token);
                assert_ne!(tokens.csrf, "old-csrf");
                assert_eq!(new.claims.csrf, tokens.csrf);
                assert_eq!(new.claims.sub, "uuid-1");
                // Refresh token is far from expiry: kept
                assert!(tokens.refresh.is_none());
            }
            other => panic!("expected rotation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_access_refreshes() {
        let state = state(AuthSettings::default()).await;
        let (refresh, _) = refresh_for("uuid-1", 3 * 24 * 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(Some(&expired_access("uuid-1")), Some(&refresh))
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Rotated { .. }));
    }

    #[tokio::test]
    async fn test_no_tokens_fails() {
        let state = state(AuthSettings::default()).await;

        let result = TokenRotator::new(&state).resolve(None, None).await;
        assert!(matches!(result, Err(AuthErrorKind::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_invalid_access_without_refresh_fails() {
        let state = state(AuthSettings::default()).await;

        let result = TokenRotator::new(&state)
            .resolve(Some(&expired_access("uuid-1")), None)
            .await;
        assert!(matches!(result, Err(AuthErrorKind::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_for_missing_subject_fails() {
        let state = state(AuthSettings::default()).await;
        let (refresh, _) = refresh_for("uuid-gone", 3600);

        let result = TokenRotator::new(&state).resolve(None, Some(&refresh)).await;
        assert!(matches!(result, Err(AuthErrorKind::SubjectNotFound)));
    }

    #[tokio::test]
    async fn test_failed_refresh_fails_even_with_valid_access() {
        let state = state(always_expiring()).await;
        let access = state.codec.mint_access("uuid-1", "csrf").unwrap();

        let result = TokenRotator::new(&state)
            .resolve(Some(&access.token), Some("garbage"))
            .await;
        assert!(matches!(
            result,
            Err(AuthErrorKind::Token(TokenError::Malformed))
        ));
    }

    #[tokio::test]
    async fn test_expiring_refresh_is_rotated_and_blacklisted() {
        let state = state(always_expiring()).await;
        let (refresh, jti) = refresh_for("uuid-1", 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(None, Some(&refresh))
            .await
            .unwrap();

        let Resolution::Rotated { tokens, .. } = resolution else {
            panic!("expected rotation");
        };
        let new_refresh = tokens.refresh.expect("refresh token should rotate");
        assert_ne!(new_refresh.claims.jti, jti);
        assert!(state.db.blacklist().contains(&jti).await.unwrap());

        // The old identifier can never mint again
        let again = TokenRotator::new(&state).resolve(None, Some(&refresh)).await;
        assert!(matches!(
            again,
            Err(AuthErrorKind::Token(TokenError::Blacklisted))
        ));
    }

    #[tokio::test]
    async fn test_rotation_disabled_keeps_refresh() {
        let state = state(AuthSettings {
            rotate_refresh_tokens: false,
            ..always_expiring()
        })
        .await;
        let (refresh, jti) = refresh_for("uuid-1", 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(None, Some(&refresh))
            .await
            .unwrap();

        let Resolution::Rotated { tokens, .. } = resolution else {
            panic!("expected rotation");
        };
        assert!(tokens.refresh.is_none());
        assert!(!state.db.blacklist().contains(&jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_without_blacklist() {
        let state = state(AuthSettings {
            blacklist_after_rotation: false,
            ..always_expiring()
        })
        .await;
        let (refresh, jti) = refresh_for("uuid-1", 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(None, Some(&refresh))
            .await
            .unwrap();

        let Resolution::Rotated { tokens, .. } = resolution else {
            panic!("expected rotation");
        };
        assert!(tokens.refresh.is_some());
        assert!(!state.db.blacklist().contains(&jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_blacklist_failure_does_not_block_rotation() {
        let state = state(always_expiring()).await;
        sqlx::query(
            "CREATE TRIGGER deny_blacklist BEFORE INSERT ON blacklisted_tokens
             BEGIN SELECT RAISE(ABORT, 'blacklist unavailable'); END",
        )
        .execute(state.db.pool())
        .await
        .unwrap();
        let (refresh, jti) = refresh_for("uuid-1", 3600);

        let resolution = TokenRotator::new(&state)
            .resolve(None, Some(&refresh))
            .await
            .unwrap();

        let Resolution::Rotated { tokens, .. } = resolution else {
            panic!("expected rotation");
        };
        assert!(tokens.refresh.is_some());
        assert!(!state.db.blacklist().contains(&jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_blacklist_lookup_failure_fails_closed() {
        let state = state(AuthSettings::default()).await;
        sqlx::query("DROP TABLE blacklisted_tokens")
            .execute(state.db.pool())
            .await
            .unwrap();
        let (refresh, _) = refresh_for("uuid-1", 3600);

        let result = TokenRotator::new(&state).resolve(None, Some(&refresh)).await;
        assert!(matches!(result, Err(AuthErrorKind::UnexpectedInternal)));
    }

    #[tokio::test]
    async fn test_issue_session() {
        let state = state(AuthSettings::default()).await;

        let tokens = issue_session(&state, "uuid-1").unwrap();
        let claims = state.codec.decode_access(&tokens.access.token).unwrap();
        assert_eq!(claims.csrf, tokens.csrf);
        let refresh = tokens.refresh.unwrap();
        assert!(state.codec.decode_refresh(&refresh.token).is_ok());
    }
}
