//! Full-password credentials: creation, verification with lockout, and rotation

use audit_engine::{actions, principal_resource, AuditEvent, AuditLogger};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use database_layer::repository::{roles, users};
use database_layer::{CredentialStore, NewPrincipalRecord, Principal, Settings, DEFAULT_PRINCIPAL_ROLE};
use error_common::FailureReason;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PasswordPolicy;
use crate::error::{IdentityError, IdentityResult};
use crate::hashing::BcryptHasher;
use crate::policy::{validate_email, validate_username};

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    /// Passcode-only principals may be created without one
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

/// Outcome of a password check that reached the credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerification {
    Success {
        requires_change: bool,
    },
    Failure {
        remaining_attempts: u32,
    },
    Locked {
        locked_until: DateTime<Utc>,
        /// True when this attempt applied the lock
        newly_locked: bool,
    },
}

#[derive(Debug, Clone)]
pub enum PasswordChange {
    /// The principal changes their own password and proves the current one
    SelfService { current: String },
    /// An administrator sets the password; the caller checks `users.update`
    Administrative { changed_by: Uuid },
}

pub struct PasswordAuthenticator {
    store: CredentialStore,
    audit: AuditLogger,
    policy: PasswordPolicy,
    hasher: BcryptHasher,
}

impl PasswordAuthenticator {
    pub fn new(store: CredentialStore, audit: AuditLogger, policy: PasswordPolicy) -> Self {
        let hasher = BcryptHasher::new(policy.bcrypt_cost);
        Self {
            store,
            audit,
            policy,
            hasher,
        }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Register a principal. All validation happens before anything is written.
    pub async fn create(&self, new: NewPrincipal, created_by: Option<Uuid>) -> IdentityResult<Uuid> {
        let username = new.username.trim().to_string();
        let email = new.email.trim().to_lowercase();
        validate_username(&username)?;
        validate_email(&email)?;
        if let Some(password) = &new.password {
            self.policy.validate(password, &username, &email)?;
        }

        let role_id = new
            .role
            .clone()
            .unwrap_or_else(|| DEFAULT_PRINCIPAL_ROLE.to_string());
        if !roles::exists(self.store.pool(), &role_id).await? {
            return Err(IdentityError::UnknownRole(role_id));
        }
        if users::identity_taken(self.store.pool(), &username, &email, None).await? {
            return Err(IdentityError::IdentityTaken);
        }

        let password_hash = match &new.password {
            Some(password) => Some(self.hasher.hash(password).await?),
            None => None,
        };

        let record = NewPrincipalRecord {
            id: Uuid::new_v4(),
            username: username.clone(),
            email,
            password_hash,
            role_id: role_id.clone(),
            is_verified: false,
            settings: new.settings,
        };

        let mut tx = self.store.begin().await?;
        if let Err(e) = users::insert(&mut tx, &record).await {
            // Lost a race with a concurrent registration
            if e.is_unique_violation() {
                return Err(IdentityError::IdentityTaken);
            }
            return Err(e.into());
        }
        self.audit
            .record_in(
                &mut tx,
                AuditEvent::success(actions::PRINCIPAL_CREATE)
                    .principal(record.id)
                    .resource(principal_resource(&username))
                    .detail("role", role_id.as_str())
                    .detail("created_by", created_by.map(|id| id.to_string())),
            )
            .await;
        tx.commit().await.map_err(database_layer::DatabaseError::from)?;

        info!(principal_id = %record.id, username = %username, role = %role_id, "Principal created");
        Ok(record.id)
    }

    /// Check a password, maintaining the failure counter and lockout
    pub async fn verify(&self, id: Uuid, password: &str) -> IdentityResult<PasswordVerification> {
        let principal = self.load_active(id).await?;
        let now = Utc::now();

        if let Some(locked_until) = principal.locked_until.filter(|until| *until > now) {
            debug!(principal_id = %id, "Password attempt while locked");
            return Ok(PasswordVerification::Locked {
                locked_until,
                newly_locked: false,
            });
        }

        let Some(hash) = principal.password_hash.as_deref() else {
            return Err(IdentityError::InvalidCredentials(FailureReason::NoPasswordSet));
        };

        if self.hasher.verify(password, hash).await? {
            if principal.failed_password_attempts > 0 || principal.locked_until.is_some() {
                users::clear_password_failures(self.store.pool(), id).await?;
            }
            return Ok(PasswordVerification::Success {
                requires_change: self.requires_change(&principal, now),
            });
        }

        self.record_failure(&principal, now).await
    }

    async fn record_failure(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> IdentityResult<PasswordVerification> {
        let threshold = i64::from(self.policy.max_failed_attempts.max(1));
        let lockout = ChronoDuration::from_std(self.policy.lockout_duration)
            .unwrap_or_else(|_| ChronoDuration::minutes(15));

        let mut tx = self.store.begin().await?;
        let state = users::record_password_failure(&mut *tx, principal.id, threshold, now + lockout).await?;
        let remaining = u32::try_from((threshold - state.failed_attempts).max(0)).unwrap_or(0);

        self.audit
            .record_in(
                &mut tx,
                AuditEvent::failure(actions::PASSWORD_VERIFY)
                    .principal(principal.id)
                    .resource(principal_resource(&principal.username))
                    .detail("reason", FailureReason::WrongPassword.as_str())
                    .detail("remaining_attempts", remaining),
            )
            .await;
        if let Some(locked_until) = state.locked_until {
            self.audit
                .record_in(
                    &mut tx,
                    AuditEvent::blocked(actions::ACCOUNT_LOCKOUT)
                        .principal(principal.id)
                        .resource(principal_resource(&principal.username))
                        .detail("locked_until", locked_until.to_rfc3339()),
                )
                .await;
        }
        tx.commit().await.map_err(database_layer::DatabaseError::from)?;

        Ok(match state.locked_until {
            Some(locked_until) => {
                warn!(principal_id = %principal.id, locked_until = %locked_until, "Account locked after repeated password failures");
                PasswordVerification::Locked {
                    locked_until,
                    newly_locked: true,
                }
            }
            None => PasswordVerification::Failure {
                remaining_attempts: remaining,
            },
        })
    }

    fn requires_change(&self, principal: &Principal, now: DateTime<Utc>) -> bool {
        if principal.must_change_password {
            return true;
        }
        match (self.policy.max_age_days, principal.password_changed_at) {
            (Some(days), Some(changed_at)) => now - changed_at > ChronoDuration::days(i64::from(days)),
            _ => false,
        }
    }

    pub async fn change(&self, id: Uuid, change: PasswordChange, new_password: &str) -> IdentityResult<()> {
        let principal = self.load_active(id).await?;

        let (mode, changed_by) = match &change {
            PasswordChange::SelfService { current } => {
                match self.verify(id, current).await? {
                    PasswordVerification::Success { .. } => {}
                    PasswordVerification::Failure { .. } => {
                        return Err(IdentityError::InvalidCredentials(FailureReason::WrongPassword))
                    }
                    PasswordVerification::Locked { locked_until, .. } => {
                        return Err(IdentityError::Locked(locked_until))
                    }
                }
                ("self_service", id)
            }
            PasswordChange::Administrative { changed_by } => ("administrative", *changed_by),
        };

        self.policy
            .validate(new_password, &principal.username, &principal.email)?;
        let history =
            users::recent_password_hashes(self.store.pool(), id, self.policy.history_depth).await?;
        if self.hasher.matches_any(new_password, &history).await? {
            return Err(IdentityError::PasswordReused);
        }

        let hash = self.hasher.hash(new_password).await?;
        self.write_password(&principal, &hash, false, actions::PASSWORD_CHANGE, changed_by, mode)
            .await
    }

    /// Replace the password with a random temporary one that must be changed
    pub async fn reset(&self, id: Uuid, reset_by: Uuid) -> IdentityResult<SecretString> {
        let principal = self.load_active(id).await?;
        let temporary = self
            .policy
            .generate_temporary(&principal.username, &principal.email);
        let hash = self.hasher.hash(&temporary).await?;

        self.write_password(&principal, &hash, true, actions::PASSWORD_RESET, reset_by, "reset")
            .await?;
        Ok(SecretString::new(temporary))
    }

    /// Give a passcode-only principal its first password
    pub async fn set_password(&self, id: Uuid, password: &str, set_by: Uuid) -> IdentityResult<()> {
        let principal = self.load_active(id).await?;
        if principal.password_hash.is_some() {
            return Err(IdentityError::PasswordAlreadySet);
        }
        self.policy
            .validate(password, &principal.username, &principal.email)?;
        let hash = self.hasher.hash(password).await?;
        self.write_password(&principal, &hash, false, actions::PASSWORD_CHANGE, set_by, "initial")
            .await
    }

    /// Clear the failure counter and any lock
    pub async fn unlock(&self, id: Uuid, unlocked_by: Uuid) -> IdentityResult<()> {
        let principal = users::find_by_id(self.store.pool(), id)
            .await?
            .ok_or(IdentityError::PrincipalNotFound)?;

        let mut tx = self.store.begin().await?;
        users::clear_password_failures(&mut *tx, id).await?;
        self.audit
            .record_in(
                &mut tx,
                AuditEvent::success(actions::ACCOUNT_UNLOCK)
                    .principal(id)
                    .resource(principal_resource(&principal.username))
                    .detail("unlocked_by", unlocked_by.to_string()),
            )
            .await;
        tx.commit().await.map_err(database_layer::DatabaseError::from)?;

        info!(principal_id = %id, unlocked_by = %unlocked_by, "Account unlocked");
        Ok(())
    }

    async fn write_password(
        &self,
        principal: &Principal,
        hash: &str,
        must_change: bool,
        action: &str,
        by: Uuid,
        mode: &str,
    ) -> IdentityResult<()> {
        let mut tx = self.store.begin().await?;
        if !users::update_password(&mut tx, principal.id, hash, must_change).await? {
            return Err(IdentityError::PrincipalNotFound);
        }
        self.audit
            .record_in(
                &mut tx,
                AuditEvent::success(action)
                    .principal(principal.id)
                    .resource(principal_resource(&principal.username))
                    .detail("mode", mode)
                    .detail("by", by.to_string()),
            )
            .await;
        tx.commit().await.map_err(database_layer::DatabaseError::from)?;

        info!(principal_id = %principal.id, mode = %mode, "Password updated");
        Ok(())
    }

    async fn load_active(&self, id: Uuid) -> IdentityResult<Principal> {
        let principal = users::find_by_id(self.store.pool(), id)
            .await?
            .ok_or(IdentityError::PrincipalNotFound)?;
        if !principal.is_active {
            return Err(IdentityError::PrincipalInactive);
        }
        Ok(principal)
    }
}
