//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::rate_limit::DEFAULT_LOGIN_PER_MINUTE;
use crate::settings::{
    AuthSettings, DEFAULT_ACCESS_LIFETIME_SECS, DEFAULT_ACCESS_THRESHOLD_SECS,
    DEFAULT_REFRESH_LIFETIME_SECS, DEFAULT_REFRESH_THRESHOLD_SECS, SigningAlgorithm,
};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokengate",
    about = "Cookie-based JWT sessions with refresh rotation and CSRF binding"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokengate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// HMAC algorithm for signing tokens
    #[arg(long, value_enum, default_value = "hs256")]
    pub algorithm: SigningAlgorithm,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_LIFETIME", default_value_t = DEFAULT_ACCESS_LIFETIME_SECS)]
    pub access_lifetime: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_LIFETIME", default_value_t = DEFAULT_REFRESH_LIFETIME_SECS)]
    pub refresh_lifetime: u64,

    /// Rotate access tokens with less than this many seconds left
    #[arg(long, default_value_t = DEFAULT_ACCESS_THRESHOLD_SECS)]
    pub access_threshold: u64,

    /// Replace refresh tokens with less than this many seconds left
    #[arg(long, default_value_t = DEFAULT_REFRESH_THRESHOLD_SECS)]
    pub refresh_threshold: u64,

    /// Never replace refresh tokens during rotation
    #[arg(long)]
    pub no_refresh_rotation: bool,

    /// Keep replaced refresh tokens usable instead of blacklisting them
    #[arg(long)]
    pub no_blacklist_after_rotation: bool,

    /// Set the Secure flag on auth cookies (use behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Login attempts allowed per minute per client IP
    #[arg(long, default_value_t = DEFAULT_LOGIN_PER_MINUTE)]
    pub login_rate_limit: u32,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    check_secret_length(secret)
}

fn check_secret_length(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Build and validate the auth settings from arguments.
/// Returns None and logs an error if they are unusable.
pub fn build_settings(args: &Args) -> Option<AuthSettings> {
    let settings = AuthSettings {
        algorithm: args.algorithm,
        access_lifetime: args.access_lifetime,
        refresh_lifetime: args.refresh_lifetime,
        access_threshold: args.access_threshold,
        refresh_threshold: args.refresh_threshold,
        rotate_refresh_tokens: !args.no_refresh_rotation,
        blacklist_after_rotation: !args.no_blacklist_after_rotation,
        secure_cookies: args.secure_cookies,
        ..AuthSettings::default()
    };

    match settings.validate() {
        Ok(()) => Some(settings),
        Err(e) => {
            error!(error = %e, "Invalid auth settings");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    jwt_secret: String,
    settings: AuthSettings,
    args: &Args,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        settings,
        login_per_minute: args.login_rate_limit,
        trust_forwarded_for: args.trust_forwarded_for,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
