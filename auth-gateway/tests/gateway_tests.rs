//! Gateway flows against an on-disk credential store
//!
//! Scenarios:
//! 1. Alice logs in, is authorized, logs out
//! 2. A passcode session is escalated in place with a password
//! 3. Expired sessions are invalid without waiting for the reaper
//! 4. The sixth login attempt from one address is throttled
//! 5. Unknown principals and wrong passwords fail the same way
//! 6. Administrative operations require the caller's permission
//! 7. Session caps, guest, API and federated logins
//! 8. The reaper and the background loops

use std::sync::Arc;
use std::time::Duration;

use auth_gateway::*;
use auth_identity::{NewPrincipal, PasswordPolicy};
use auth_rbac::NewRole;
use database_layer::repository::audit;
use database_layer::{CredentialStore, DatabaseConfig, DeviceInfo, DeviceType, SessionType};
use error_common::CoreError;
use logger_redacted::PiiRedactor;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;
use uuid::Uuid;

const ALICE_PASSWORD: &str = "Kettle-Drum-42";
const PARENT_PASSWORD: &str = "Lantern-Pines-77";
const PARENT_PASSCODE: &str = "5829";

struct Harness {
    _dir: TempDir,
    store: CredentialStore,
    gateway: Arc<AuthGateway>,
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        password: PasswordPolicy {
            bcrypt_cost: 4,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn harness_with(config: GatewayConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::open(&DatabaseConfig::for_path(&dir.path().join("gateway.db")))
        .await
        .unwrap();
    let gateway = AuthGateway::new(store.clone(), config, PiiRedactor::default()).unwrap();
    Harness {
        _dir: dir,
        store,
        gateway: Arc::new(gateway),
    }
}

async fn harness() -> Harness {
    harness_with(test_config()).await
}

fn new_principal(username: &str, password: Option<&str>, role: &str) -> NewPrincipal {
    NewPrincipal {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: password.map(str::to_string),
        role: Some(role.to_string()),
        settings: Default::default(),
    }
}

async fn create(h: &Harness, username: &str, password: Option<&str>, role: &str) -> Uuid {
    h.gateway
        .passwords()
        .create(new_principal(username, password, role), None)
        .await
        .unwrap()
}

fn password(secret: &str) -> Credentials {
    Credentials::Password {
        password: SecretString::new(secret.to_string()),
    }
}

fn passcode(secret: &str) -> Credentials {
    Credentials::Passcode {
        passcode: SecretString::new(secret.to_string()),
    }
}

fn by_name(username: &str, credentials: Credentials) -> AuthRequest {
    AuthRequest::new(PrincipalRef::Username(username.to_string()), credentials)
}

async fn login(h: &Harness, username: &str, secret: &str) -> String {
    h.gateway
        .authenticate(by_name(username, password(secret)))
        .await
        .unwrap()
        .session
        .id
}

#[tokio::test]
async fn test_alice_logs_in_and_out() {
    let h = harness().await;
    let alice = create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::NotConnected);

    let outcome = h
        .gateway
        .authenticate(by_name("Alice", password(ALICE_PASSWORD)).from_ip("192.168.1.20"))
        .await
        .unwrap();
    let token = outcome.session.id.clone();
    assert_eq!(outcome.session.principal_id, alice);
    assert_eq!(outcome.session.session_type, SessionType::Standard);
    assert_eq!(outcome.session.role_id, "member");
    assert!(!outcome.requires_password_change);
    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::Connected);

    assert!(h.gateway.check_permission(&token, "profile.read", None).await.unwrap());
    assert!(h.gateway.check_permission(&token, "home.lights", None).await.unwrap());
    assert!(!h.gateway.check_permission(&token, "users.delete", None).await.unwrap());

    let validated = h.gateway.validate(&token).await.unwrap().unwrap();
    assert_eq!(validated.metadata.ip_address.as_deref(), Some("192.168.1.20"));

    let refreshed = h.gateway.refresh(&token).await.unwrap();
    assert!(refreshed.expires_at >= outcome.session.expires_at);

    assert!(h.gateway.invalidate(&token).await.unwrap());
    assert!(h.gateway.validate(&token).await.unwrap().is_none());
    assert!(!h.gateway.check_permission(&token, "profile.read", None).await.unwrap());
    assert!(!h.gateway.invalidate(&token).await.unwrap());

    let logins = audit::recent(h.store.pool(), Some("login"), 5).await.unwrap();
    assert_eq!(logins.len(), 1);
    let logouts = audit::recent(h.store.pool(), Some("logout"), 5).await.unwrap();
    assert_eq!(logouts.len(), 1);
}

#[tokio::test]
async fn test_passcode_session_escalates_in_place() {
    let h = harness().await;
    let parent = create(&h, "pat", Some(PARENT_PASSWORD), "parent").await;
    h.gateway
        .passcodes()
        .create(parent, PARENT_PASSCODE, None)
        .await
        .unwrap();

    let outcome = h
        .gateway
        .authenticate(by_name("pat", passcode(PARENT_PASSCODE)).on_device(DeviceInfo::of_type(DeviceType::Phone)))
        .await
        .unwrap();
    let token = outcome.session.id;
    assert_eq!(outcome.session.session_type, SessionType::Passcode);

    assert!(h.gateway.check_permission(&token, "calendar.update", None).await.unwrap());
    assert!(
        !h.gateway.check_permission(&token, "users.update", None).await.unwrap(),
        "user management waits for escalation"
    );
    assert!(!h.gateway.check_permission(&token, "family.update", None).await.unwrap());

    assert!(!h.gateway.escalate(&token, "Wrong-Password-1").await.unwrap());
    assert!(h.gateway.escalate(&token, PARENT_PASSWORD).await.unwrap());

    let escalated = h.gateway.validate(&token).await.unwrap().unwrap();
    assert_eq!(escalated.session_type, SessionType::Standard);
    assert_eq!(escalated.metadata.escalated_from, Some(SessionType::Passcode));
    assert!(escalated.metadata.escalated_at.is_some());
    assert!(h.gateway.check_permission(&token, "users.update", None).await.unwrap());
    assert!(h.gateway.check_permission(&token, "family.update", None).await.unwrap());

    // Already standard
    assert!(!h.gateway.escalate(&token, PARENT_PASSWORD).await.unwrap());

    let attempts = audit::recent(h.store.pool(), Some("session_escalate"), 5).await.unwrap();
    assert_eq!(attempts.len(), 2);
}

#[tokio::test]
async fn test_expired_session_invalid_without_reaper() {
    let mut config = test_config();
    config.sessions.standard.lifetime = Duration::from_millis(500);
    let h = harness_with(config).await;
    let alice = create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    let token = login(&h, "alice", ALICE_PASSWORD).await;
    assert!(h.gateway.validate(&token).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::Expired);
    assert!(h.gateway.validate(&token).await.unwrap().is_none());
    assert!(matches!(h.gateway.refresh(&token).await, Err(CoreError::SessionNotFound)));
    // Reaped on lookup
    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::NotConnected);
}

#[tokio::test]
async fn test_sixth_attempt_from_one_address_is_throttled() {
    let h = harness().await;
    create(&h, "alice", Some(ALICE_PASSWORD), "member").await;

    for n in 0..5 {
        let result = h
            .gateway
            .authenticate(by_name(&format!("nobody{n}"), password("Guess-Work-99")).from_ip("203.0.113.9"))
            .await;
        assert!(matches!(result, Err(CoreError::AuthenticationFailed { .. })), "attempt {n}");
    }

    let throttled = h
        .gateway
        .authenticate(by_name("alice", password(ALICE_PASSWORD)).from_ip("203.0.113.9"))
        .await;
    match throttled {
        Err(err @ CoreError::RateLimited { .. }) => assert!(err.retry_after_secs().unwrap() > 0),
        other => panic!("expected rate limiting, got {other:?}"),
    }

    // Other addresses are unaffected
    let outcome = h
        .gateway
        .authenticate(by_name("alice", password(ALICE_PASSWORD)).from_ip("192.168.1.20"))
        .await;
    assert!(outcome.is_ok());

    let blocked = audit::recent(h.store.pool(), Some("rate_limited"), 5).await.unwrap();
    assert_eq!(blocked.len(), 1);
}

#[tokio::test]
async fn test_unknown_principal_and_wrong_password_look_alike() {
    let h = harness().await;
    create(&h, "alice", Some(ALICE_PASSWORD), "member").await;

    let unknown = h
        .gateway
        .authenticate(by_name("mallory", password(ALICE_PASSWORD)))
        .await
        .unwrap_err();
    let wrong = h
        .gateway
        .authenticate(by_name("alice", password("Kettle-Drum-43")))
        .await
        .unwrap_err();

    assert_eq!(unknown.code(), wrong.code());
    assert_eq!(unknown.public_message(), wrong.public_message());
    assert_eq!(unknown.to_string(), wrong.to_string());

    let failures = audit::recent(h.store.pool(), Some("login"), 5).await.unwrap();
    assert_eq!(failures.len(), 2);
}

#[tokio::test]
async fn test_admin_operations_require_permission() {
    let h = harness().await;
    let admin = h
        .gateway
        .bootstrap_admin(new_principal("root", Some("Granite-Harbor-19"), "member"))
        .await
        .unwrap()
        .unwrap();
    assert!(h
        .gateway
        .bootstrap_admin(new_principal("root2", Some("Granite-Harbor-19"), "admin"))
        .await
        .unwrap()
        .is_none());

    let bob = create(&h, "bob", Some(ALICE_PASSWORD), "member").await;
    let admin_token = login(&h, "root", "Granite-Harbor-19").await;
    let bob_token = login(&h, "bob", ALICE_PASSWORD).await;

    let denied = h
        .gateway
        .register_principal(&bob_token, new_principal("carol", Some(ALICE_PASSWORD), "member"))
        .await;
    assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));
    assert!(matches!(
        h.gateway.register_principal("not-a-token", new_principal("carol", None, "member")).await,
        Err(CoreError::SessionNotFound)
    ));

    let carol = h
        .gateway
        .register_principal(&admin_token, new_principal("carol", Some(ALICE_PASSWORD), "member"))
        .await
        .unwrap();
    h.gateway.assign_role(&admin_token, carol, "child").await.unwrap();
    let carol_token = login(&h, "carol", ALICE_PASSWORD).await;
    assert!(h.gateway.check_permission(&carol_token, "calendar.read", None).await.unwrap());
    assert!(!h.gateway.check_permission(&carol_token, "home.lights", None).await.unwrap());

    h.gateway
        .create_role(
            &admin_token,
            NewRole {
                id: "tutor".into(),
                display_name: "Homework Tutor".into(),
                permissions: vec!["homework.*".into()],
                inherits_from: Some("guest".into()),
            },
        )
        .await
        .unwrap();
    assert!(h.gateway.grant_permission(&admin_token, "tutor", "home.lights").await.unwrap());

    let temporary = h.gateway.reset_password(&admin_token, bob).await.unwrap();
    assert!(h.gateway.validate(&bob_token).await.unwrap().is_none(), "reset ends sessions");
    let outcome = h
        .gateway
        .authenticate(by_name("bob", password(temporary.expose_secret())))
        .await
        .unwrap();
    assert!(outcome.requires_password_change);

    assert_eq!(h.gateway.revoke_principal_sessions(&admin_token, carol).await.unwrap(), 1);
    assert!(h.gateway.validate(&carol_token).await.unwrap().is_none());

    let denials = audit::recent(h.store.pool(), Some("permission_denied"), 5).await.unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(h.gateway.get_auth_status(admin).await, AuthStatus::Connected);
}

#[tokio::test]
async fn test_password_changes_and_unlock() {
    let h = harness().await;
    let admin = create(&h, "root", Some("Granite-Harbor-19"), "admin").await;
    let alice = create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    let admin_token = login(&h, "root", "Granite-Harbor-19").await;
    let alice_token = login(&h, "alice", ALICE_PASSWORD).await;

    h.gateway
        .change_own_password(&alice_token, ALICE_PASSWORD, "Copper-Kettle-58")
        .await
        .unwrap();
    assert!(matches!(
        h.gateway.change_password(&alice_token, admin, "Copper-Kettle-59").await,
        Err(CoreError::PermissionDenied { .. })
    ));

    for _ in 0..4 {
        let failed = h.gateway.authenticate(by_name("alice", password("Wrong-Guess-11")).from_ip("10.1.0.1")).await;
        assert!(matches!(failed, Err(CoreError::AuthenticationFailed { .. })));
    }
    let locked = h
        .gateway
        .authenticate(by_name("alice", password("Wrong-Guess-11")).from_ip("10.1.0.2"))
        .await;
    assert!(matches!(locked, Err(CoreError::AccountLocked { .. })));
    assert!(!h.gateway.check_permission(&alice_token, "profile.read", None).await.unwrap());

    h.gateway.unlock_account(&admin_token, alice).await.unwrap();
    assert!(h.gateway.check_permission(&alice_token, "profile.read", None).await.unwrap());
    h.gateway
        .change_password(&admin_token, alice, "Velvet-Compass-31")
        .await
        .unwrap();
    let outcome = h
        .gateway
        .authenticate(by_name("alice", password("Velvet-Compass-31")).from_ip("10.1.0.3"))
        .await
        .unwrap();
    assert!(!outcome.requires_password_change);
}

#[tokio::test]
async fn test_passcode_management() {
    let h = harness().await;
    let parent = create(&h, "pat", Some(PARENT_PASSWORD), "parent").await;
    let kid = create(&h, "kim", None, "child").await;
    let parent_token = login(&h, "pat", PARENT_PASSWORD).await;

    h.gateway.set_passcode(&parent_token, kid, "3817").await.unwrap();
    h.gateway.set_passcode(&parent_token, parent, PARENT_PASSCODE).await.unwrap();

    for _ in 0..3 {
        let result = h.gateway.authenticate(by_name("kim", passcode("9402")).from_ip("10.2.0.1")).await;
        assert!(result.is_err());
    }
    assert!(h.gateway.reset_passcode_attempts(&parent_token, kid).await.unwrap());

    let outcome = h
        .gateway
        .authenticate(by_name("kim", passcode("3817")).from_ip("10.2.0.2"))
        .await
        .unwrap();
    assert_eq!(outcome.session.session_type, SessionType::Passcode);

    // A passcode session cannot change a passcode, not even its own
    assert!(matches!(
        h.gateway.set_passcode(&outcome.session.id, kid, "6150").await,
        Err(CoreError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn test_parent_cannot_take_over_admin_credentials() {
    let h = harness().await;
    let admin = create(&h, "root", Some("Granite-Harbor-19"), "admin").await;
    create(&h, "pat", Some(PARENT_PASSWORD), "parent").await;
    let kid = create(&h, "kim", None, "child").await;
    let parent_token = login(&h, "pat", PARENT_PASSWORD).await;

    let refused = |result: Result<(), CoreError>| {
        matches!(result, Err(CoreError::PermissionDenied { reason }) if reason == "target_privileged")
    };
    assert!(refused(h.gateway.change_password(&parent_token, admin, "Stolen-Crown-66").await));
    assert!(refused(h.gateway.set_passcode(&parent_token, admin, "2468").await));
    assert!(refused(h.gateway.unlock_account(&parent_token, admin).await));
    assert!(matches!(
        h.gateway.revoke_principal_sessions(&parent_token, admin).await,
        Err(CoreError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.gateway.register_principal(&parent_token, new_principal("mole", Some(ALICE_PASSWORD), "admin")).await,
        Err(CoreError::PermissionDenied { .. })
    ));

    // The household below the parent is still theirs to manage
    h.gateway.set_passcode(&parent_token, kid, "3817").await.unwrap();

    let outcome = h
        .gateway
        .authenticate(by_name("root", password("Granite-Harbor-19")))
        .await
        .unwrap();
    assert_eq!(outcome.session.role_id, "admin");
    assert!(matches!(
        h.gateway.authenticate(by_name("root", passcode("2468"))).await,
        Err(CoreError::AuthenticationFailed { .. })
    ));

    let denials = audit::recent(h.store.pool(), Some("permission_denied"), 10).await.unwrap();
    assert!(denials
        .iter()
        .any(|entry| entry.details["reason"] == "target_privileged"));
}

#[tokio::test]
async fn test_disable_passcode_and_first_password() {
    let h = harness().await;
    let parent = create(&h, "pat", Some(PARENT_PASSWORD), "parent").await;
    let kid = create(&h, "kim", None, "child").await;
    let sibling = create(&h, "lee", None, "child").await;
    let parent_token = login(&h, "pat", PARENT_PASSWORD).await;

    h.gateway.set_passcode(&parent_token, kid, "3817").await.unwrap();
    let kid_session = h
        .gateway
        .authenticate(by_name("kim", passcode("3817")).from_ip("10.3.0.1"))
        .await
        .unwrap()
        .session;

    // A passcode session may not turn its own passcode off
    assert!(matches!(
        h.gateway.disable_passcode(&kid_session.id, kid).await,
        Err(CoreError::PermissionDenied { .. })
    ));
    assert!(h.gateway.disable_passcode(&parent_token, kid).await.unwrap());
    assert!(!h.gateway.disable_passcode(&parent_token, kid).await.unwrap());
    assert!(h
        .gateway
        .authenticate(by_name("kim", passcode("3817")).from_ip("10.3.0.2"))
        .await
        .is_err());

    // The freed value can go to someone else
    h.gateway.set_passcode(&parent_token, sibling, "3817").await.unwrap();

    h.gateway.set_passcode(&parent_token, parent, PARENT_PASSCODE).await.unwrap();
    assert!(h.gateway.disable_passcode(&parent_token, parent).await.unwrap());

    h.gateway
        .set_initial_password(&parent_token, kid, "Maple-Sprout-24")
        .await
        .unwrap();
    let outcome = h
        .gateway
        .authenticate(by_name("kim", password("Maple-Sprout-24")).from_ip("10.3.0.3"))
        .await
        .unwrap();
    assert_eq!(outcome.session.session_type, SessionType::Standard);
    assert!(matches!(
        h.gateway.set_initial_password(&parent_token, kid, "Maple-Sprout-25").await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn test_session_cap_and_alternate_methods() {
    let h = harness().await;
    create(&h, "visitor", None, "guest").await;
    create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    let service = create(&h, "backup-bot", Some("Service-Secret-808"), "service").await;

    let mut sso_settings = database_layer::Settings::new();
    sso_settings.insert("sso.google".into(), serde_json::json!("google-sub-4471"));
    h.gateway
        .passwords()
        .create(
            NewPrincipal {
                settings: sso_settings,
                ..new_principal("sam", None, "member")
            },
            None,
        )
        .await
        .unwrap();

    for _ in 0..2 {
        h.gateway.authenticate(by_name("visitor", Credentials::Guest)).await.unwrap();
    }
    let capped = h.gateway.authenticate(by_name("visitor", Credentials::Guest)).await;
    assert!(matches!(capped, Err(CoreError::PermissionDenied { reason }) if reason == "session_limit_reached"));

    let not_a_guest = h.gateway.authenticate(by_name("alice", Credentials::Guest)).await;
    assert!(matches!(not_a_guest, Err(CoreError::AuthenticationFailed { .. })));

    let api = h
        .gateway
        .authenticate(AuthRequest::new(
            PrincipalRef::Id(service),
            Credentials::ApiKey {
                secret: SecretString::new("Service-Secret-808".into()),
            },
        ))
        .await
        .unwrap();
    assert_eq!(api.session.session_type, SessionType::Api);
    assert!(h.gateway.check_permission(&api.session.id, "tasks.read", None).await.unwrap());
    assert!(!h.gateway.check_permission(&api.session.id, "tasks.update", None).await.unwrap());

    let federated = |subject: &str| FederatedLogin::new(PrincipalRef::Username("sam".into()), "google", subject);
    let sso = h
        .gateway
        .authenticate_federated(&api.session.id, federated("google-sub-4471"))
        .await
        .unwrap();
    assert_eq!(sso.session.session_type, SessionType::Sso);
    assert!(matches!(
        h.gateway.authenticate_federated(&api.session.id, federated("google-sub-9999")).await,
        Err(CoreError::AuthenticationFailed { .. })
    ));

    let logins = audit::recent(h.store.pool(), Some("sso_login"), 5).await.unwrap();
    assert!(logins.iter().any(|entry| entry.details["asserted_by"] == service.to_string()));
}

#[tokio::test]
async fn test_federated_login_needs_an_asserting_adapter() {
    let h = harness().await;
    create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    let mut sso_settings = database_layer::Settings::new();
    sso_settings.insert("sso.google".into(), serde_json::json!("google-sub-4471"));
    let sam = h
        .gateway
        .passwords()
        .create(
            NewPrincipal {
                settings: sso_settings,
                ..new_principal("sam", None, "member")
            },
            None,
        )
        .await
        .unwrap();
    let claim = || FederatedLogin::new(PrincipalRef::Id(sam), "google", "google-sub-4471");

    assert!(matches!(
        h.gateway.authenticate_federated("not-a-token", claim()).await,
        Err(CoreError::SessionNotFound)
    ));
    let alice_token = login(&h, "alice", ALICE_PASSWORD).await;
    assert!(matches!(
        h.gateway.authenticate_federated(&alice_token, claim()).await,
        Err(CoreError::PermissionDenied { .. })
    ));
    assert_eq!(h.gateway.get_auth_status(sam).await, AuthStatus::NotConnected);

    let denials = audit::recent(h.store.pool(), Some("permission_denied"), 5).await.unwrap();
    assert_eq!(denials.len(), 1);
}

#[tokio::test]
async fn test_reaper_removes_expired_sessions() {
    let mut config = test_config();
    config.sessions.standard.lifetime = Duration::from_millis(500);
    let h = harness_with(config).await;
    let alice = create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    login(&h, "alice", ALICE_PASSWORD).await;
    login(&h, "alice", ALICE_PASSWORD).await;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(h.gateway.reap_expired_sessions().await.unwrap(), 2);
    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::NotConnected);
    assert_eq!(h.gateway.reap_expired_sessions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_background_tasks_reap_and_stop() {
    let mut config = test_config();
    config.sessions.standard.lifetime = Duration::from_millis(300);
    config.scheduler = SchedulerConfig {
        cache_sweep_interval: Duration::from_millis(20),
        session_reap_interval: Duration::from_millis(50),
        rate_limit_evict_interval: Duration::from_millis(20),
        audit_retention_interval: Duration::from_millis(50),
    };
    let h = harness_with(config.clone()).await;
    let alice = create(&h, "alice", Some(ALICE_PASSWORD), "member").await;
    login(&h, "alice", ALICE_PASSWORD).await;

    let tasks = BackgroundTasks::spawn(Arc::clone(&h.gateway), &config.scheduler);
    assert_eq!(tasks.len(), 4);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(h.gateway.get_auth_status(alice).await, AuthStatus::NotConnected);

    tokio::time::timeout(Duration::from_secs(5), tasks.shutdown())
        .await
        .expect("background tasks should stop promptly");
}
