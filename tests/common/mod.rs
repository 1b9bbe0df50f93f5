#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::Value;
use tokengate::{
    ServerConfig, create_app,
    db::Database,
    jwt::{AccessClaims, RefreshClaims, TokenType, unix_now},
    settings::AuthSettings,
};
use tower::ServiceExt;

pub const SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(AuthSettings::default()).await
    }

    pub async fn with_settings(settings: AuthSettings) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: SECRET.to_vec(),
            settings,
            login_per_minute: 1000,
            trust_forwarded_for: false,
        };
        Self {
            app: create_app(&config),
            db,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Register a user through the API and return the session.
    pub async fn register(&self, username: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/api/users/register",
                &serde_json::json!({ "username": username, "password": PASSWORD }),
                None,
            ))
            .await;
        assert_eq!(response.status(), 201);
        Session::from_response(response).await
    }
}

/// Cookies and CSRF secret a client would hold.
#[derive(Debug, Clone)]
pub struct Session {
    pub uuid: String,
    pub access: String,
    pub refresh: String,
    pub csrf: String,
}

impl Session {
    pub async fn from_response(response: Response<Body>) -> Self {
        let cookies = extract_set_cookies(&response);
        let access = cookie_value(&cookies, "access_token").expect("no access cookie");
        let refresh = cookie_value(&cookies, "refresh_token").expect("no refresh cookie");
        let json = body_json(response).await;
        Self {
            uuid: json["uuid"].as_str().unwrap().to_string(),
            access,
            refresh,
            csrf: json["csrf_token"].as_str().unwrap().to_string(),
        }
    }

    pub fn cookie(&self) -> String {
        format!(
            "access_token={}; refresh_token={}",
            self.access, self.refresh
        )
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Extract Set-Cookie headers from response.
pub fn extract_set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a non-empty cookie being set.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix(&format!("{}=", name))?;
        let value = value.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Check if a specific cookie is being cleared (Max-Age=0).
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn sign<T: serde::Serialize>(claims: &T) -> String {
    jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

/// Access token for `subject` expiring `exp_offset` seconds from now
/// (negative for already expired).
pub fn access_token(subject: &str, csrf: &str, exp_offset: i64) -> String {
    let now = unix_now().unwrap();
    sign(&AccessClaims {
        sub: subject.to_string(),
        token_type: TokenType::Access,
        iat: now - 600,
        exp: now.saturating_add_signed(exp_offset),
        csrf: csrf.to_string(),
    })
}

/// Refresh token for `subject` with a chosen JTI.
pub fn refresh_token(subject: &str, jti: &str, exp_offset: i64) -> String {
    let now = unix_now().unwrap();
    sign(&RefreshClaims {
        jti: jti.to_string(),
        sub: subject.to_string(),
        token_type: TokenType::Refresh,
        iat: now - 600,
        exp: now.saturating_add_signed(exp_offset),
    })
}
