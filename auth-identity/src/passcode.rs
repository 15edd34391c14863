//! Short numeric passcodes with escalating lockout
//!
//! Passcodes are low-entropy, so attempts are throttled harder than
//! passwords. Once the failure count reaches the threshold each further
//! failure lengthens the lockout, which is always measured from the most
//! recent failed attempt.

use audit_engine::{actions, principal_resource, AuditEvent, AuditLogger};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use database_layer::repository::{passcodes, users, NewPasscodeRecord};
use database_layer::{CredentialStore, DatabaseError, PasscodeCredential, Principal};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PasscodePolicy;
use crate::error::{IdentityError, IdentityResult};
use crate::hashing::PasscodeHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasscodeVerification {
    Success,
    Failure {
        remaining_attempts: u32,
    },
    Locked {
        locked_until: DateTime<Utc>,
        newly_locked: bool,
    },
    NoPasscode,
    Expired,
}

pub struct PasscodeAuthenticator {
    store: CredentialStore,
    audit: AuditLogger,
    policy: PasscodePolicy,
    hasher: PasscodeHasher,
}

impl PasscodeAuthenticator {
    pub fn new(store: CredentialStore, audit: AuditLogger, policy: PasscodePolicy) -> IdentityResult<Self> {
        Ok(Self {
            store,
            audit,
            policy,
            hasher: PasscodeHasher::new()?,
        })
    }

    pub fn policy(&self) -> &PasscodePolicy {
        &self.policy
    }

    /// Lockout length for a failure count under the configured policy
    pub fn lockout_duration(&self, failed_attempts: i64) -> std::time::Duration {
        self.policy.lockout_duration(failed_attempts)
    }

    /// Lockouts follow the limit stored on the credential, not the current policy
    fn locked_until(&self, credential: &PasscodeCredential, failed_attempts: i64, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let duration = self.policy.lockout_after(credential.max_attempts, failed_attempts);
        if duration.is_zero() {
            return None;
        }
        ChronoDuration::from_std(duration).ok().map(|d| from + d)
    }

    /// Set a new passcode, replacing any active one
    pub async fn create(&self, id: Uuid, passcode: &str, created_by: Option<Uuid>) -> IdentityResult<()> {
        self.policy.validate(passcode)?;
        let principal = self.load_active(id).await?;

        let history = passcodes::recent_hashes(self.store.pool(), id, self.policy.history_depth).await?;
        if self.hasher.matches_any(passcode, &history).await? {
            return Err(IdentityError::PasscodeReused);
        }

        if self.policy.require_unique {
            // Linear in the number of active principals
            let others = passcodes::other_active_hashes(self.store.pool(), id).await?;
            if self.hasher.matches_any(passcode, &others).await? {
                return Err(IdentityError::PasscodeNotUnique);
            }
        }

        let digest = self.hasher.hash(passcode).await?;
        let expires_at = self
            .policy
            .validity
            .and_then(|validity| ChronoDuration::from_std(validity).ok())
            .map(|validity| Utc::now() + validity);
        let record = NewPasscodeRecord {
            principal_id: id,
            passcode_hash: digest.hash,
            salt: digest.salt,
            max_attempts: i64::from(self.policy.max_attempts),
            expires_at,
        };

        let mut tx = self.store.begin().await?;
        let replaced = passcodes::deactivate_for_principal(&mut *tx, id).await?;
        passcodes::insert(&mut *tx, &record).await?;
        self.audit
            .record_in(
                &mut tx,
                AuditEvent::success(actions::PASSCODE_CREATE)
                    .principal(id)
                    .resource(principal_resource(&principal.username))
                    .detail("replaced", replaced > 0)
                    .detail("created_by", created_by.map(|by| by.to_string())),
            )
            .await;
        tx.commit().await.map_err(DatabaseError::from)?;

        info!(principal_id = %id, replaced = replaced > 0, "Passcode set");
        Ok(())
    }

    pub async fn verify(&self, id: Uuid, passcode: &str) -> IdentityResult<PasscodeVerification> {
        let principal = self.load_active(id).await?;
        let Some(credential) = passcodes::find_active(self.store.pool(), id).await? else {
            return Ok(PasscodeVerification::NoPasscode);
        };

        let now = Utc::now();
        if credential.is_expired_at(now) {
            return Ok(PasscodeVerification::Expired);
        }

        let last_failure = credential.last_used_at.unwrap_or(credential.created_at);
        if let Some(until) = self.locked_until(&credential, credential.failed_attempts, last_failure) {
            if now < until {
                // Guessing during a lockout only extends it
                return self.record_failure(&principal, &credential, now, true).await;
            }
        }

        if self.hasher.verify(passcode, &credential.passcode_hash).await? {
            passcodes::record_success(self.store.pool(), credential.id, now).await?;
            return Ok(PasscodeVerification::Success);
        }

        self.record_failure(&principal, &credential, now, false).await
    }

    async fn record_failure(
        &self,
        principal: &Principal,
        credential: &PasscodeCredential,
        now: DateTime<Utc>,
        while_locked: bool,
    ) -> IdentityResult<PasscodeVerification> {
        let mut tx = self.store.begin().await?;
        let failed = passcodes::record_failure(&mut *tx, credential.id, now).await?;
        let locked_until = self.locked_until(credential, failed, now);

        self.audit
            .record_in(
                &mut tx,
                AuditEvent::failure(actions::PASSCODE_VERIFY)
                    .principal(principal.id)
                    .resource(principal_resource(&principal.username))
                    .detail("reason", if while_locked { "locked" } else { "wrong_passcode" })
                    .detail("failed_attempts", failed),
            )
            .await;
        if let (Some(until), false) = (locked_until, while_locked) {
            self.audit
                .record_in(
                    &mut tx,
                    AuditEvent::blocked(actions::PASSCODE_LOCKOUT)
                        .principal(principal.id)
                        .resource(principal_resource(&principal.username))
                        .detail("locked_until", until.to_rfc3339())
                        .detail("failed_attempts", failed),
                )
                .await;
        }
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(match locked_until {
            Some(until) => {
                if !while_locked {
                    warn!(principal_id = %principal.id, failed, locked_until = %until, "Passcode locked");
                }
                PasscodeVerification::Locked {
                    locked_until: until,
                    newly_locked: !while_locked,
                }
            }
            None => {
                let remaining = (credential.max_attempts - failed).max(0);
                PasscodeVerification::Failure {
                    remaining_attempts: u32::try_from(remaining).unwrap_or(0),
                }
            }
        })
    }

    /// Deactivate the principal's passcode; returns false when there was none
    pub async fn disable(&self, id: Uuid, disabled_by: Uuid) -> IdentityResult<bool> {
        let mut tx = self.store.begin().await?;
        let disabled = passcodes::deactivate_for_principal(&mut *tx, id).await? > 0;
        if disabled {
            self.audit
                .record_in(
                    &mut tx,
                    AuditEvent::success(actions::PASSCODE_DISABLE)
                        .principal(id)
                        .detail("by", disabled_by.to_string()),
                )
                .await;
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(disabled)
    }

    pub async fn reset_failed_attempts(&self, id: Uuid, reset_by: Uuid) -> IdentityResult<bool> {
        let mut tx = self.store.begin().await?;
        let reset = passcodes::reset_attempts(&mut *tx, id).await?;
        if reset {
            self.audit
                .record_in(
                    &mut tx,
                    AuditEvent::success(actions::PASSCODE_RESET_ATTEMPTS)
                        .principal(id)
                        .detail("by", reset_by.to_string()),
                )
                .await;
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(reset)
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
