//! Router-level tests: requests go through axum with `oneshot`

use std::net::SocketAddr;
use std::sync::Arc;

use auth_gateway::{AuthGateway, GatewayConfig};
use auth_identity::{NewPrincipal, PasswordPolicy};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use database_layer::{CredentialStore, DatabaseConfig};
use hearth_server::{create_app, TrustedProxies};
use http_body_util::BodyExt;
use logger_redacted::PiiRedactor;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_PASSWORD: &str = "Granite-Harbor-19";
const ALICE_PASSWORD: &str = "Kettle-Drum-42";
const PARENT_PASSWORD: &str = "Lantern-Pines-77";
const PROXY: &str = "10.0.0.1";

struct TestApp {
    _dir: TempDir,
    app: Router,
    admin_token: String,
}

async fn setup() -> TestApp {
    setup_with(TrustedProxies::default()).await
}

async fn setup_with(proxies: TrustedProxies) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::open(&DatabaseConfig::for_path(&dir.path().join("http.db")))
        .await
        .unwrap();
    let config = GatewayConfig {
        password: PasswordPolicy {
            bcrypt_cost: 4,
            ..Default::default()
        },
        ..Default::default()
    };
    let gateway = Arc::new(AuthGateway::new(store, config, PiiRedactor::default()).unwrap());
    gateway
        .bootstrap_admin(NewPrincipal {
            username: "root".into(),
            email: "root@example.com".into(),
            password: Some(ADMIN_PASSWORD.into()),
            role: None,
            settings: Default::default(),
        })
        .await
        .unwrap();

    let app = create_app(gateway, proxies);
    let (status, body) = send(&app, "POST", "/v1/auth/login", None, Some(login_body("root", ADMIN_PASSWORD))).await;
    assert_eq!(status, StatusCode::OK);
    let admin_token = body["token"].as_str().unwrap().to_string();

    TestApp {
        _dir: dir,
        app,
        admin_token,
    }
}

fn login_body(username: &str, password: &str) -> Value {
    json!({
        "principal": { "username": username },
        "credentials": { "method": "password", "password": password }
    })
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// A login arriving over a connection from `peer`
async fn login_from(app: &Router, peer: &str, forwarded_for: Option<&str>, body: Value) -> StatusCode {
    let peer: SocketAddr = format!("{peer}:40000").parse().unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(peer));
    if let Some(forwarded_for) = forwarded_for {
        builder = builder.header("x-forwarded-for", forwarded_for);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_health() {
    let t = setup().await;
    let (status, body) = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_login_check_and_logout() {
    let t = setup().await;
    let (status, body) = send(
        &t.app,
        "POST",
        "/v1/admin/principals",
        Some(&t.admin_token),
        Some(json!({ "username": "alice", "email": "alice@example.com", "password": ALICE_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let alice_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("alice", ALICE_PASSWORD))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["session_type"], "standard");
    assert_eq!(body["session"]["role_id"], "member");
    let token = body["token"].as_str().unwrap().to_string();

    let (_, body) = send(&t.app, "POST", "/v1/auth/check", Some(&token), Some(json!({ "permission": "profile.read" }))).await;
    assert_eq!(body["granted"], true);
    let (_, body) = send(&t.app, "POST", "/v1/auth/check", Some(&token), Some(json!({ "permission": "users.delete" }))).await;
    assert_eq!(body["granted"], false);

    let (status, body) = send(&t.app, "GET", &format!("/v1/auth/status/{alice_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");

    let (status, body) = send(&t.app, "POST", "/v1/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged_out"], true);

    let (status, body) = send(&t.app, "GET", "/v1/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], error_common::codes::authentication::SESSION_INVALID);
}

#[tokio::test]
async fn test_failed_login_body_is_generic() {
    let t = setup().await;
    let (status, unknown) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("mallory", ALICE_PASSWORD))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, wrong) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("root", "Granite-Harbor-18"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
    assert_eq!(unknown["error"]["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_rate_limited_login_sets_retry_after() {
    let t = setup().await;
    for _ in 0..5 {
        send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("mallory", "Guess-Work-99"))).await;
    }

    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(login_body("mallory", "Guess-Work-99").to_string()))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);
}

#[tokio::test]
async fn test_admin_routes_require_permission() {
    let t = setup().await;
    send(
        &t.app,
        "POST",
        "/v1/admin/principals",
        Some(&t.admin_token),
        Some(json!({ "username": "bob", "email": "bob@example.com", "password": ALICE_PASSWORD })),
    )
    .await;
    let (_, body) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("bob", ALICE_PASSWORD))).await;
    let bob_token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.app,
        "POST",
        "/v1/admin/principals",
        Some(&bob_token),
        Some(json!({ "username": "carol", "email": "carol@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Permission denied");

    let (status, _) = send(&t.app, "POST", "/v1/admin/roles", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        "POST",
        "/v1/admin/roles",
        Some(&t.admin_token),
        Some(json!({
            "id": "tutor",
            "display_name": "Homework Tutor",
            "permissions": ["homework.*"],
            "inherits_from": "guest"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_forwarded_for_from_untrusted_peer_cannot_dodge_throttle() {
    let t = setup().await;
    for i in 0..5 {
        let forged = format!("198.51.100.{i}");
        let status = login_from(&t.app, "203.0.113.9", Some(&forged), login_body("mallory", "Guess-Work-99")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let status = login_from(&t.app, "203.0.113.9", Some("198.51.100.77"), login_body("mallory", "Guess-Work-99")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // The block follows the connection, not the header
    let status = login_from(&t.app, "203.0.113.10", None, login_body("mallory", "Guess-Work-99")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trusted_proxy_forwards_client_address() {
    let t = setup_with(TrustedProxies::new([PROXY.parse().unwrap()])).await;
    for _ in 0..5 {
        login_from(&t.app, PROXY, Some("198.51.100.1"), login_body("mallory", "Guess-Work-99")).await;
    }
    let status = login_from(&t.app, PROXY, Some("198.51.100.1"), login_body("mallory", "Guess-Work-99")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let status = login_from(&t.app, PROXY, Some("198.51.100.2"), login_body("mallory", "Guess-Work-99")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_anonymous_federated_login_is_refused() {
    let t = setup().await;
    let claim = json!({
        "principal": { "username": "root" },
        "credentials": { "method": "federated", "provider": "google", "subject": "anything" }
    });
    let (status, body) = send(&t.app, "POST", "/v1/auth/login", None, Some(claim)).await;
    assert_ne!(status, StatusCode::OK);
    assert!(body.get("token").is_none());

    let assertion = json!({
        "principal": { "username": "root" },
        "provider": "google",
        "subject": "anything"
    });
    let (status, _) = send(&t.app, "POST", "/v1/auth/sso", None, Some(assertion.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Even a session that may assert cannot vouch for an unlinked subject
    let (status, _) = send(&t.app, "POST", "/v1/auth/sso", Some(&t.admin_token), Some(assertion)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_parent_cannot_reset_admin_password() {
    let t = setup().await;
    let (status, _) = send(
        &t.app,
        "POST",
        "/v1/admin/principals",
        Some(&t.admin_token),
        Some(json!({ "username": "pat", "email": "pat@example.com", "password": PARENT_PASSWORD, "role": "parent" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("pat", PARENT_PASSWORD))).await;
    let parent_token = body["token"].as_str().unwrap().to_string();
    let (_, body) = send(&t.app, "GET", "/v1/auth/session", Some(&t.admin_token), None).await;
    let admin_id = body["principal_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/v1/admin/principals/{admin_id}/password"),
        Some(&parent_token),
        Some(json!({ "password": "Stolen-Crown-66" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Permission denied");

    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/v1/admin/principals/{admin_id}/passcode/disable"),
        Some(&parent_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&t.app, "POST", "/v1/auth/login", None, Some(login_body("root", ADMIN_PASSWORD))).await;
    assert_eq!(status, StatusCode::OK);
}
