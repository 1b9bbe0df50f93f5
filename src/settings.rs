//! Authentication settings, built once at startup and shared read-only.

use jsonwebtoken::Algorithm;

/// Default access token lifetime: 5 minutes.
pub const DEFAULT_ACCESS_LIFETIME_SECS: u64 = 5 * 60;

/// Default refresh token lifetime: 2 weeks.
pub const DEFAULT_REFRESH_LIFETIME_SECS: u64 = 14 * 24 * 60 * 60;

/// Default window before access token expiry in which it gets rotated.
pub const DEFAULT_ACCESS_THRESHOLD_SECS: u64 = 60;

/// Default window before refresh token expiry in which it gets rotated.
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 24 * 60 * 60;

/// Longest accepted lifetime for either token kind: 10 years.
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Route paths that bypass the auth gate entirely.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/api/users/login", "/api/users/register"];

/// HMAC algorithm used to sign both token kinds.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    pub fn as_jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

/// Immutable authentication policy.
///
/// Passed explicitly (usually as `Arc<AuthSettings>`) into the token codec,
/// the gate and the response finisher. Nothing mutates it after startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub algorithm: SigningAlgorithm,
    /// Access token lifetime in seconds, also the access cookie Max-Age.
    pub access_lifetime: u64,
    /// Refresh token lifetime in seconds, also the refresh cookie Max-Age.
    pub refresh_lifetime: u64,
    /// Access tokens with less than this many seconds left are rotated.
    pub access_threshold: u64,
    /// Refresh tokens with less than this many seconds left are replaced
    /// (only when `rotate_refresh_tokens` is set).
    pub refresh_threshold: u64,
    pub rotate_refresh_tokens: bool,
    pub blacklist_after_rotation: bool,
    /// Whether to set the Secure flag on auth cookies.
    pub secure_cookies: bool,
    /// Exact request paths that skip every check.
    pub public_paths: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::default(),
            access_lifetime: DEFAULT_ACCESS_LIFETIME_SECS,
            refresh_lifetime: DEFAULT_REFRESH_LIFETIME_SECS,
            access_threshold: DEFAULT_ACCESS_THRESHOLD_SECS,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD_SECS,
            rotate_refresh_tokens: true,
            blacklist_after_rotation: true,
            secure_cookies: false,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl AuthSettings {
    /// Check that lifetimes and thresholds are usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.access_lifetime == 0 {
            return Err(SettingsError::ZeroLifetime("access"));
        }
        if self.refresh_lifetime == 0 {
            return Err(SettingsError::ZeroLifetime("refresh"));
        }
        if self.access_lifetime > MAX_LIFETIME_SECS {
            return Err(SettingsError::LifetimeTooLong("access"));
        }
        if self.refresh_lifetime > MAX_LIFETIME_SECS {
            return Err(SettingsError::LifetimeTooLong("refresh"));
        }
        if self.access_threshold == 0 {
            return Err(SettingsError::ZeroThreshold("access"));
        }
        if self.refresh_threshold == 0 {
            return Err(SettingsError::ZeroThreshold("refresh"));
        }

        if self.access_threshold >= self.access_lifetime {
            tracing::warn!(
                threshold = self.access_threshold,
                lifetime = self.access_lifetime,
                "Access threshold covers the whole lifetime; every request will rotate"
            );
        }
        if self.refresh_threshold >= self.refresh_lifetime {
            tracing::warn!(
                threshold = self.refresh_threshold,
                lifetime = self.refresh_lifetime,
                "Refresh threshold covers the whole lifetime; every refresh will rotate"
            );
        }

        Ok(())
    }

    /// Whether the path is on the allow-list.
    pub fn is_public_path(&self, path: &str) -> bool {
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        self.public_paths.iter().any(|p| p == path)
    }
}

/// Invalid settings detected at startup.
#[derive(Debug, PartialEq, Eq)]
pub enum SettingsError {
    ZeroLifetime(&'static str),
    LifetimeTooLong(&'static str),
    ZeroThreshold(&'static str),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::ZeroLifetime(kind) => {
                write!(f, "{} token lifetime must be greater than zero", kind)
            }
            SettingsError::LifetimeTooLong(kind) => write!(
                f,
                "{} token lifetime must be at most {} seconds",
                kind, MAX_LIFETIME_SECS
            ),
            SettingsError::ZeroThreshold(kind) => {
                write!(f, "{} expiry threshold must be greater than zero", kind)
            }
        }
    }
}

impl std::error::Error for SettingsError {}
