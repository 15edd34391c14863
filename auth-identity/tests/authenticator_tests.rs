//! Authenticator behavior against an on-disk credential store

use audit_engine::{AuditConfig, AuditLogger};
use auth_identity::*;
use chrono::Utc;
use database_layer::repository::{audit, users};
use database_layer::{CredentialStore, DatabaseConfig};
use logger_redacted::PiiRedactor;
use secrecy::ExposeSecret;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const ALICE_PASSWORD: &str = "Kettle-Drum-42";

struct Harness {
    _dir: TempDir,
    store: CredentialStore,
    passwords: PasswordAuthenticator,
    passcodes: PasscodeAuthenticator,
}

async fn harness_with(passcode_policy: PasscodePolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::open(&DatabaseConfig::for_path(&dir.path().join("identity.db")))
        .await
        .unwrap();
    let audit = AuditLogger::new(store.clone(), PiiRedactor::default(), AuditConfig::default());
    let password_policy = PasswordPolicy {
        bcrypt_cost: 4,
        ..Default::default()
    };
    Harness {
        passwords: PasswordAuthenticator::new(store.clone(), audit.clone(), password_policy),
        passcodes: PasscodeAuthenticator::new(store.clone(), audit, passcode_policy).unwrap(),
        store,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(PasscodePolicy::default()).await
}

fn new_principal(username: &str, password: Option<&str>) -> NewPrincipal {
    NewPrincipal {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: password.map(str::to_string),
        role: None,
        settings: Default::default(),
    }
}

async fn create(h: &Harness, username: &str) -> Uuid {
    h.passwords
        .create(new_principal(username, Some(ALICE_PASSWORD)), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_and_verify_password() {
    let h = harness().await;
    let alice = create(&h, "alice").await;

    assert_eq!(
        h.passwords.verify(alice, ALICE_PASSWORD).await.unwrap(),
        PasswordVerification::Success {
            requires_change: false
        }
    );
    assert_eq!(
        h.passwords.verify(alice, "Kettle-Drum-43").await.unwrap(),
        PasswordVerification::Failure {
            remaining_attempts: 4
        }
    );

    let created = audit::recent(h.store.pool(), Some("principal_create"), 5).await.unwrap();
    assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn test_invalid_input_rejected_before_any_write() {
    let h = harness().await;

    let weak = h.passwords.create(new_principal("alice", Some("short")), None).await;
    assert!(matches!(weak, Err(IdentityError::WeakPassword(_))));

    let bad_name = h.passwords.create(new_principal("a b", Some(ALICE_PASSWORD)), None).await;
    assert!(matches!(bad_name, Err(IdentityError::InvalidUsername(_))));

    let mut unknown_role = new_principal("alice", Some(ALICE_PASSWORD));
    unknown_role.role = Some("pilot".into());
    assert!(matches!(
        h.passwords.create(unknown_role, None).await,
        Err(IdentityError::UnknownRole(_))
    ));

    assert_eq!(users::count(h.store.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_identity_rejected() {
    let h = harness().await;
    create(&h, "alice").await;

    let mut same_name = new_principal("ALICE", Some(ALICE_PASSWORD));
    same_name.email = "other@example.com".into();
    assert!(matches!(
        h.passwords.create(same_name, None).await,
        Err(IdentityError::IdentityTaken)
    ));

    let mut same_email = new_principal("alice2", Some(ALICE_PASSWORD));
    same_email.email = "Alice@Example.com".into();
    assert!(matches!(
        h.passwords.create(same_email, None).await,
        Err(IdentityError::IdentityTaken)
    ));
}

#[tokio::test]
async fn test_fifth_failure_locks_and_sixth_reports_lock() {
    let h = harness().await;
    let bob = create(&h, "bob").await;

    for remaining in (1..5).rev() {
        assert_eq!(
            h.passwords.verify(bob, "Wrong-Guess-1").await.unwrap(),
            PasswordVerification::Failure {
                remaining_attempts: remaining
            }
        );
    }

    let fifth = h.passwords.verify(bob, "Wrong-Guess-1").await.unwrap();
    assert!(matches!(
        fifth,
        PasswordVerification::Locked {
            newly_locked: true,
            ..
        }
    ));

    // Correct password, still locked
    match h.passwords.verify(bob, ALICE_PASSWORD).await.unwrap() {
        PasswordVerification::Locked {
            locked_until,
            newly_locked,
        } => {
            assert!(!newly_locked);
            assert!(locked_until > Utc::now());
        }
        other => panic!("expected lock, got {other:?}"),
    }

    h.passwords.unlock(bob, Uuid::new_v4()).await.unwrap();
    assert!(matches!(
        h.passwords.verify(bob, ALICE_PASSWORD).await.unwrap(),
        PasswordVerification::Success { .. }
    ));
}

#[tokio::test]
async fn test_success_resets_failure_counter() {
    let h = harness().await;
    let carol = create(&h, "carol").await;

    for _ in 0..4 {
        h.passwords.verify(carol, "Wrong-Guess-1").await.unwrap();
    }
    assert!(matches!(
        h.passwords.verify(carol, ALICE_PASSWORD).await.unwrap(),
        PasswordVerification::Success { .. }
    ));
    let stored = users::find_by_id(h.store.pool(), carol).await.unwrap().unwrap();
    assert_eq!(stored.failed_password_attempts, 0);

    assert_eq!(
        h.passwords.verify(carol, "Wrong-Guess-1").await.unwrap(),
        PasswordVerification::Failure {
            remaining_attempts: 4
        }
    );
}

#[tokio::test]
async fn test_self_service_change_checks_current_and_history() {
    let h = harness().await;
    let dave = create(&h, "dave").await;

    let wrong_current = h
        .passwords
        .change(
            dave,
            PasswordChange::SelfService {
                current: "Not-It-123".into(),
            },
            "Fresh-Start-77",
        )
        .await;
    assert!(matches!(wrong_current, Err(IdentityError::InvalidCredentials(_))));

    let reused = h
        .passwords
        .change(
            dave,
            PasswordChange::SelfService {
                current: ALICE_PASSWORD.into(),
            },
            ALICE_PASSWORD,
        )
        .await;
    assert!(matches!(reused, Err(IdentityError::PasswordReused)));

    h.passwords
        .change(
            dave,
            PasswordChange::Administrative {
                changed_by: Uuid::new_v4(),
            },
            "Fresh-Start-77",
        )
        .await
        .unwrap();
    assert!(matches!(
        h.passwords.verify(dave, "Fresh-Start-77").await.unwrap(),
        PasswordVerification::Success { .. }
    ));
}

#[tokio::test]
async fn test_reset_issues_temporary_password_that_must_change() {
    let h = harness().await;
    let erin = create(&h, "erin").await;

    let temporary = h.passwords.reset(erin, Uuid::new_v4()).await.unwrap();

    assert_eq!(
        h.passwords.verify(erin, temporary.expose_secret()).await.unwrap(),
        PasswordVerification::Success {
            requires_change: true
        }
    );
    let resets = audit::recent(h.store.pool(), Some("password_reset"), 5).await.unwrap();
    assert!(!resets.first().unwrap().details.to_string().contains(temporary.expose_secret()));
}

#[tokio::test]
async fn test_set_password_only_for_passcode_principals() {
    let h = harness().await;
    let kid = h.passwords.create(new_principal("kiddo", None), None).await.unwrap();

    assert!(matches!(
        h.passwords.verify(kid, "Anything-1").await,
        Err(IdentityError::InvalidCredentials(_))
    ));

    h.passwords.set_password(kid, "Tree-House-9", Uuid::new_v4()).await.unwrap();
    assert!(matches!(
        h.passwords.set_password(kid, "Tree-House-10", Uuid::new_v4()).await,
        Err(IdentityError::PasswordAlreadySet)
    ));
}

#[tokio::test]
async fn test_passcode_backoff_grows_from_last_failure() {
    let h = harness_with(PasscodePolicy {
        max_attempts: 2,
        lockout_base: Duration::from_millis(300),
        lockout_cap: 3,
        ..Default::default()
    })
    .await;
    let frank = create(&h, "frank").await;
    h.passcodes.create(frank, "4826", None).await.unwrap();

    assert_eq!(
        h.passcodes.verify(frank, "7391").await.unwrap(),
        PasscodeVerification::Failure {
            remaining_attempts: 1
        }
    );

    let before = Utc::now();
    let first_lock = match h.passcodes.verify(frank, "7391").await.unwrap() {
        PasscodeVerification::Locked {
            locked_until,
            newly_locked: true,
        } => locked_until,
        other => panic!("expected a new lock, got {other:?}"),
    };
    assert!(first_lock >= before + chrono::Duration::milliseconds(300));
    assert!(first_lock <= Utc::now() + chrono::Duration::milliseconds(300));

    // The right passcode during the lock is still a failed attempt
    let second_lock = match h.passcodes.verify(frank, "4826").await.unwrap() {
        PasscodeVerification::Locked {
            locked_until,
            newly_locked: false,
        } => locked_until,
        other => panic!("expected the lock to hold, got {other:?}"),
    };
    assert!(second_lock >= first_lock + chrono::Duration::milliseconds(250));

    assert_eq!(h.passcodes.lockout_duration(3), Duration::from_millis(600));
    assert_eq!(h.passcodes.lockout_duration(10), Duration::from_millis(900));

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(
        h.passcodes.verify(frank, "4826").await.unwrap(),
        PasscodeVerification::Success
    );
}

#[tokio::test]
async fn test_passcode_uniqueness_and_reuse_after_disable() {
    let h = harness().await;
    let alice = create(&h, "alice").await;
    let bob = create(&h, "bob").await;

    h.passcodes.create(alice, "4826", None).await.unwrap();
    assert!(matches!(
        h.passcodes.create(bob, "4826", None).await,
        Err(IdentityError::PasscodeNotUnique)
    ));

    assert!(h.passcodes.disable(alice, alice).await.unwrap());
    h.passcodes.create(bob, "4826", None).await.unwrap();
    assert_eq!(
        h.passcodes.verify(bob, "4826").await.unwrap(),
        PasscodeVerification::Success
    );
    assert_eq!(
        h.passcodes.verify(alice, "4826").await.unwrap(),
        PasscodeVerification::NoPasscode
    );
}

#[tokio::test]
async fn test_passcode_history_and_weak_patterns() {
    let h = harness().await;
    let gina = create(&h, "gina").await;

    assert!(matches!(
        h.passcodes.create(gina, "1212", None).await,
        Err(IdentityError::InvalidPasscode(_))
    ));

    h.passcodes.create(gina, "4826", None).await.unwrap();
    h.passcodes.create(gina, "7391", None).await.unwrap();
    assert!(matches!(
        h.passcodes.create(gina, "4826", None).await,
        Err(IdentityError::PasscodeReused)
    ));
}

#[tokio::test]
async fn test_passcode_expiry_and_attempt_reset() {
    let h = harness_with(PasscodePolicy {
        validity: Some(Duration::from_millis(200)),
        ..Default::default()
    })
    .await;
    let hank = create(&h, "hank").await;
    h.passcodes.create(hank, "5820", None).await.unwrap();

    h.passcodes.verify(hank, "5821").await.unwrap();
    assert!(h.passcodes.reset_failed_attempts(hank, Uuid::new_v4()).await.unwrap());
    assert_eq!(
        h.passcodes.verify(hank, "5820").await.unwrap(),
        PasscodeVerification::Success
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(
        h.passcodes.verify(hank, "5820").await.unwrap(),
        PasscodeVerification::Expired
    );
}

#[tokio::test]
async fn test_passcode_keeps_limit_it_was_created_with() {
    let h = harness_with(PasscodePolicy {
        max_attempts: 5,
        ..Default::default()
    })
    .await;
    let gina = create(&h, "gina").await;
    h.passcodes.create(gina, "4826", None).await.unwrap();

    // Tightening the policy later does not shorten this credential's allowance
    let audit = AuditLogger::new(h.store.clone(), PiiRedactor::default(), AuditConfig::default());
    let stricter = PasscodeAuthenticator::new(
        h.store.clone(),
        audit,
        PasscodePolicy {
            max_attempts: 3,
            ..Default::default()
        },
    )
    .unwrap();

    for remaining in (2..=4).rev() {
        assert_eq!(
            stricter.verify(gina, "7391").await.unwrap(),
            PasscodeVerification::Failure {
                remaining_attempts: remaining
            }
        );
    }
    assert_eq!(
        stricter.verify(gina, "7391").await.unwrap(),
        PasscodeVerification::Failure {
            remaining_attempts: 1
        }
    );
    assert!(matches!(
        stricter.verify(gina, "7391").await.unwrap(),
        PasscodeVerification::Locked {
            newly_locked: true,
            ..
        }
    ));
}
