pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod csrf;
pub mod db;
pub mod expiry;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod settings;

use api::create_api_router;
use auth::{AuthState, auth_gate};
use axum::{Router, middleware};
use db::Database;
use rate_limit::RateLimitConfig;
use settings::AuthSettings;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Token lifetimes, rotation policy and cookie flags
    pub settings: AuthSettings,
    /// Login attempts allowed per minute per client IP
    pub login_per_minute: u32,
    /// Key rate limits on X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
}

/// Create the application router with the given configuration.
///
/// Every `/api` route sits behind the auth gate; the allow-list in the
/// settings decides which ones it lets through untouched.
pub fn create_app(config: &ServerConfig) -> Router {
    let auth_state = AuthState::new(
        config.db.clone(),
        &config.jwt_secret,
        Arc::new(config.settings.clone()),
    );
    let rate_limit = Arc::new(RateLimitConfig::new(
        config.login_per_minute,
        config.trust_forwarded_for,
    ));

    let api_router = create_api_router(&auth_state, rate_limit);

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(auth_state, auth_gate))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
