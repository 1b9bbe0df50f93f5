//! End-to-end session tests through the user and token endpoints.
//!
//! Tests cover:
//! - Registration and login issuing cookies plus csrf_token
//! - CSRF-protected mutation with the issued secret
//! - Silent rotation once the access token is close to expiry
//! - Logout blacklisting the refresh token
//! - Login rate limiting

mod common;

use axum::http::StatusCode;
use common::{
    PASSWORD, Session, TestApp, access_token, body_json, cookie_value, extract_set_cookies,
    get_request, has_cleared_cookie, json_request,
};
use tokengate::{ServerConfig, create_app, db::Database, settings::AuthSettings};
use tower::ServiceExt;

fn with_csrf(
    mut request: axum::http::Request<axum::body::Body>,
    csrf: &str,
) -> axum::http::Request<axum::body::Body> {
    request
        .headers_mut()
        .insert("x-csrf-token", csrf.parse().unwrap());
    request
}

async fn login(app: &TestApp, username: &str, password: &str) -> axum::http::Response<axum::body::Body> {
    app.send(json_request(
        "POST",
        "/api/users/login",
        &serde_json::json!({ "username": username, "password": password }),
        None,
    ))
    .await
}

#[tokio::test]
async fn test_register_issues_session() {
    let app = TestApp::new().await;

    let session = app.register("alice").await;

    assert!(!session.access.is_empty());
    assert!(!session.refresh.is_empty());
    assert_eq!(session.csrf.len(), 43);

    let user = app.db.users().get_by_uuid(&session.uuid).await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert!(user.password_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;
    app.register("alice").await;

    let taken = app
        .send(json_request(
            "POST",
            "/api/users/register",
            &serde_json::json!({ "username": "ALICE", "password": PASSWORD }),
            None,
        ))
        .await;
    assert_eq!(taken.status(), StatusCode::CONFLICT);

    let short_password = app
        .send(json_request(
            "POST",
            "/api/users/register",
            &serde_json::json!({ "username": "bob", "password": "short" }),
            None,
        ))
        .await;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);

    let bad_name = app
        .send(json_request(
            "POST",
            "/api/users/register",
            &serde_json::json!({ "username": "bad name", "password": PASSWORD }),
            None,
        ))
        .await;
    assert_eq!(bad_name.status(), StatusCode::BAD_REQUEST);
    assert!(extract_set_cookies(&bad_name).is_empty());
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::new().await;
    let registered = app.register("alice").await;

    let wrong = login(&app, "alice", "wrong-password").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&wrong).is_empty());

    let response = login(&app, "alice", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(cookies.iter().all(|c| c.contains("HttpOnly") && c.contains("SameSite=Lax")));
    let session = Session::from_response(response).await;

    assert_eq!(session.uuid, registered.uuid);
    assert_ne!(session.csrf, registered.csrf);
    assert_ne!(session.refresh, registered.refresh);
}

#[tokio::test]
async fn test_me() {
    let app = TestApp::new().await;
    let session = app.register("alice").await;

    let response = app
        .send(get_request("/api/users/me", Some(&session.cookie())))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());
    let json = body_json(response).await;
    assert_eq!(json["uuid"], session.uuid.as_str());
    assert_eq!(json["username"], "alice");
}

#[tokio::test]
async fn test_end_to_end_csrf_and_rotation() {
    let app = TestApp::new().await;
    app.register("alice").await;
    let session = Session::from_response(login(&app, "alice", PASSWORD).await).await;

    // Matching header
    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "alice2" }),
                Some(&session.cookie()),
            ),
            &session.csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());

    // Wrong header
    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "mallory" }),
                Some(&session.cookie()),
            ),
            "forged",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "csrf_failed");

    // Access token now inside the expiring-soon window, refresh still valid
    let nearly_expired = access_token(&session.uuid, &session.csrf, 20);
    let cookie = format!(
        "access_token={}; refresh_token={}",
        nearly_expired, session.refresh
    );
    let response = app.send(get_request("/api/users/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_access = cookie_value(&extract_set_cookies(&response), "access_token")
        .expect("rotated access cookie");
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice2");
    let new_csrf = json["csrf_token"].as_str().unwrap().to_string();
    assert_ne!(new_csrf, session.csrf);

    // The new secret is bound to the new access token
    let cookie = format!(
        "access_token={}; refresh_token={}",
        new_access, session.refresh
    );
    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "alice3" }),
                Some(&cookie),
            ),
            &new_csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "alice4" }),
                Some(&cookie),
            ),
            &session.csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rename_conflict() {
    let app = TestApp::new().await;
    app.register("bob").await;
    let session = app.register("alice").await;

    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "Bob" }),
                Some(&session.cookie()),
            ),
            &session.csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Changing only the case of your own name is fine
    let response = app
        .send(with_csrf(
            json_request(
                "PATCH",
                "/api/users/me",
                &serde_json::json!({ "username": "Alice" }),
                Some(&session.cookie()),
            ),
            &session.csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "Alice");
}

#[tokio::test]
async fn test_logout() {
    let app = TestApp::new().await;
    let session = app.register("alice").await;

    let logout = || {
        json_request(
            "POST",
            "/api/tokens/logout",
            &serde_json::json!({}),
            Some(&session.cookie()),
        )
    };

    // CSRF-protected like any other mutation
    let response = app.send(logout()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(with_csrf(logout(), &session.csrf)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
    assert_eq!(app.db.blacklist().count().await.unwrap(), 1);

    // The refresh token is dead
    let cookie = format!("refresh_token={}", session.refresh);
    let response = app.send(get_request("/api/users/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_with_expiring_access_needs_fresh_secret() {
    let app = TestApp::new().await;
    let session = app.register("alice").await;

    // Logout is mutating, so a rotation on the way in invalidates the old secret
    let cookie = format!(
        "access_token={}; refresh_token={}",
        access_token(&session.uuid, &session.csrf, 10),
        session.refresh
    );
    let response = app
        .send(with_csrf(
            json_request("POST", "/api/tokens/logout", &serde_json::json!({}), Some(&cookie)),
            &session.csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.db.blacklist().count().await.unwrap(), 0);

    let response = app.send(get_request("/api/tokens/verify", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_access = cookie_value(&extract_set_cookies(&response), "access_token").unwrap();
    let new_csrf = body_json(response).await["csrf_token"]
        .as_str()
        .unwrap()
        .to_string();

    let cookie = format!(
        "access_token={}; refresh_token={}",
        new_access, session.refresh
    );
    let response = app
        .send(with_csrf(
            json_request("POST", "/api/tokens/logout", &serde_json::json!({}), Some(&cookie)),
            &new_csrf,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
    assert_eq!(app.db.blacklist().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_login_rate_limited() {
    let db = Database::open(":memory:").await.unwrap();
    let config = ServerConfig {
        db,
        jwt_secret: common::SECRET.to_vec(),
        settings: AuthSettings::default(),
        login_per_minute: 2,
        trust_forwarded_for: false,
    };
    let app = create_app(&config);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/users/login",
                &serde_json::json!({ "username": "nobody", "password": PASSWORD }),
                None,
            ))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
}
