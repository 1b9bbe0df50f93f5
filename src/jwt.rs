//! JWT token minting and verification.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::expiry::Expiring;
use crate::settings::AuthSettings;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, carries the CSRF secret
    Access,
    /// Long-lived refresh token - carries a JTI so it can be blacklisted
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Double-submit CSRF secret, fixed when the token is minted
    pub csrf: String,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (unique identifier for blacklisting)
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    pub claims: AccessClaims,
    /// Token duration in seconds
    pub duration: u64,
}

/// A freshly minted refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    pub claims: RefreshClaims,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signs and verifies access and refresh tokens.
///
/// Key material and lifetimes are fixed at construction; the codec is
/// shared behind an `Arc` and never mutated.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_lifetime: u64,
    refresh_lifetime: u64,
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::TimeError)
}

impl TokenCodec {
    /// Create a codec with the given secret, using the algorithm and
    /// lifetimes from `settings`.
    pub fn new(secret: &[u8], settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: settings.algorithm.as_jwt(),
            access_lifetime: settings.access_lifetime,
            refresh_lifetime: settings.refresh_lifetime,
        }
    }

    /// Mint an access token for `subject` with `csrf` bound as a claim.
    pub fn mint_access(&self, subject: &str, csrf: &str) -> Result<AccessTokenResult, TokenError> {
        let now = unix_now()?;

        let claims = AccessClaims {
            sub: subject.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp: expiry(now, self.access_lifetime)?,
            csrf: csrf.to_string(),
        };

        let token = self.encode(&claims)?;

        Ok(AccessTokenResult {
            token,
            claims,
            duration: self.access_lifetime,
        })
    }

    /// Mint a refresh token for `subject` with a fresh JTI.
    pub fn mint_refresh(&self, subject: &str) -> Result<RefreshTokenResult, TokenError> {
        let now = unix_now()?;

        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: expiry(now, self.refresh_lifetime)?,
        };

        let token = self.encode(&claims)?;

        Ok(RefreshTokenResult {
            token,
            claims,
            duration: self.refresh_lifetime,
        })
    }

    /// Verify and decode an access token.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::WrongTokenType);
        }
        check_not_expired(claims.exp)?;
        Ok(claims)
    }

    /// Verify and decode a refresh token.
    ///
    /// This checks signature, type and expiry only. Blacklist membership
    /// needs storage and is checked by the rotator.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::WrongTokenType);
        }
        check_not_expired(claims.exp)?;
        Ok(claims)
    }

    fn encode<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        jsonwebtoken::decode::<C>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::from)
    }
}

fn expiry(now: u64, lifetime: u64) -> Result<u64, TokenError> {
    now.checked_add(lifetime).ok_or(TokenError::TimeError)
}

/// A token whose expiry equals the current second is already expired.
fn check_not_expired(exp: u64) -> Result<(), TokenError> {
    if exp <= unix_now()? {
        return Err(TokenError::Expired);
    }
    Ok(())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum TokenError {
    /// Signature does not verify against the configured key/algorithm
    InvalidSignature,
    /// Token expiry is in the past
    Expired,
    /// Not a decodable JWT or missing required claims
    Malformed,
    /// Refresh token JTI has been blacklisted
    Blacklisted,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time unavailable, or an expiry past the end of the clock
    TimeError,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::Blacklisted => write!(f, "Token has been blacklisted"),
            TokenError::WrongTokenType => write!(f, "Wrong token type"),
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::TimeError => write!(f, "Time out of range"),
        }
    }
}

impl std::error::Error for TokenError {}
