//! The gateway: one owner for the store, the authenticators, the permission
//! engine, the session index and the throttles

use std::sync::Arc;
use std::time::Duration;

use audit_engine::{
    actions, principal_resource, AuditEvent, AuditLogger, RateAction, RateLimitDecision, RateLimiter,
    SecurityEvent, SecurityEventKind, SecurityMonitor,
};
use auth_identity::{
    IdentityError, NewPrincipal, PasscodeAuthenticator, PasscodeVerification, PasswordAuthenticator,
    PasswordChange, PasswordVerification,
};
use auth_rbac::{AccessContext, AccessDecision, DecisionReason, NewRole, Permission, RbacEngine, StoreRoleDirectory};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use database_layer::repository::users;
use database_layer::{
    AuthMethod, AuthSession, CredentialStore, DeviceInfo, Principal, SessionMetadata, SessionType, DEFAULT_PRINCIPAL_ROLE,
};
use error_common::{CoreError, FailureReason};
use logger_redacted::PiiRedactor;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::models::{AuthOutcome, AuthRequest, AuthStatus, Credentials, FederatedLogin, PrincipalRef};
use crate::session::{GatewayResult, SessionManager};
use crate::token::mint_session_token;

const GUEST_ROLE: &str = "guest";

/// Permission an SSO adapter session needs to open sessions for others
pub const SSO_ASSERT_PERMISSION: &str = "sso.assert";

/// Denial reason when the target holds grants the caller lacks
const TARGET_PRIVILEGED: &str = "target_privileged";

/// Result of checking the offered proof against the stored credential
enum CredentialCheck {
    Accepted { requires_change: bool },
    Rejected(FailureReason),
    Locked {
        until: DateTime<Utc>,
        newly_locked: bool,
        kind: SecurityEventKind,
    },
}

/// What the failure paths need to know about the attempt
struct Attempt<'a> {
    action: &'static str,
    identifier: &'a str,
    ip: Option<&'a str>,
    user_agent: Option<&'a str>,
}

pub struct AuthGateway {
    store: CredentialStore,
    config: GatewayConfig,
    audit: AuditLogger,
    passwords: PasswordAuthenticator,
    passcodes: PasscodeAuthenticator,
    rbac: RbacEngine,
    sessions: SessionManager,
    rate_limiter: RateLimiter,
    monitor: SecurityMonitor,
}

impl AuthGateway {
    pub fn new(store: CredentialStore, config: GatewayConfig, redactor: PiiRedactor) -> GatewayResult<Self> {
        let audit = AuditLogger::new(store.clone(), redactor, config.audit.clone());
        let passwords = PasswordAuthenticator::new(store.clone(), audit.clone(), config.password.clone());
        let passcodes = PasscodeAuthenticator::new(store.clone(), audit.clone(), config.passcode.clone())?;
        let rbac = RbacEngine::new(Arc::new(StoreRoleDirectory::new(store.clone())), config.rbac.clone())
            .with_audit(audit.clone());
        let monitor = SecurityMonitor::new(store.clone(), audit.clone(), config.monitor.clone());

        Ok(Self {
            sessions: SessionManager::new(store.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            store,
            config,
            audit,
            passwords,
            passcodes,
            rbac,
            monitor,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn rbac(&self) -> &RbacEngine {
        &self.rbac
    }

    pub fn passwords(&self) -> &PasswordAuthenticator {
        &self.passwords
    }

    pub fn passcodes(&self) -> &PasscodeAuthenticator {
        &self.passcodes
    }

    /// Log in and open a session.
    ///
    /// Unknown principals, inactive principals and wrong credentials all
    /// surface as the same `AuthenticationFailed`; the reason only reaches
    /// the audit log.
    pub async fn authenticate(&self, request: AuthRequest) -> GatewayResult<AuthOutcome> {
        let method = request.credentials.method();
        let session_type = request.credentials.session_type();
        let identifier = request.principal.identifier();
        let ip = request.ip_address.as_deref();
        let attempt = Attempt {
            action: login_action(method),
            identifier: &identifier,
            ip,
            user_agent: request.user_agent.as_deref(),
        };

        let throttle_action = rate_action(method);
        let rate_key = self.rate_limiter.key_for(throttle_action, ip, Some(&identifier));
        self.throttle(throttle_action, &rate_key, ip, None).await?;

        let Some(principal) = self.resolve(&request.principal).await? else {
            return Err(self.reject(&attempt, None, FailureReason::UnknownPrincipal).await);
        };
        if !principal.is_active {
            return Err(self.reject(&attempt, Some(&principal), FailureReason::InactivePrincipal).await);
        }

        let policy = self.config.sessions.get(session_type);
        if !policy.allows(method) {
            return Err(self.reject(&attempt, Some(&principal), FailureReason::MethodNotAllowed).await);
        }

        let requires_change = match self.verify_credentials(&principal, &request.credentials).await? {
            CredentialCheck::Accepted { requires_change } => requires_change,
            CredentialCheck::Rejected(reason) => {
                return Err(self.reject(&attempt, Some(&principal), reason).await);
            }
            CredentialCheck::Locked {
                until,
                newly_locked,
                kind,
            } => {
                return Err(self.locked_out(&attempt, &principal, until, newly_locked, kind).await);
            }
        };

        let outcome = self
            .open_session(&attempt, &principal, method, session_type, request.device, requires_change, None)
            .await?;
        self.rate_limiter.reset(throttle_action, &rate_key);
        Ok(outcome)
    }

    /// Open an SSO session on behalf of an adapter.
    ///
    /// The caller is the adapter's own session and must hold `sso.assert`;
    /// the principal must already be linked to `subject` at `provider`
    /// through its `sso.<provider>` setting.
    pub async fn authenticate_federated(&self, caller: &str, login: FederatedLogin) -> GatewayResult<AuthOutcome> {
        let adapter = self.authorize(caller, SSO_ASSERT_PERMISSION).await?;
        let identifier = login.principal.identifier();
        let ip = login.ip_address.as_deref();
        let attempt = Attempt {
            action: actions::SSO_LOGIN,
            identifier: &identifier,
            ip,
            user_agent: login.user_agent.as_deref(),
        };

        let rate_key = self.rate_limiter.key_for(RateAction::Login, ip, Some(&identifier));
        self.throttle(RateAction::Login, &rate_key, ip, Some(adapter.principal_id))
            .await?;

        let Some(principal) = self.resolve(&login.principal).await? else {
            return Err(self.reject(&attempt, None, FailureReason::UnknownPrincipal).await);
        };
        if !principal.is_active {
            return Err(self.reject(&attempt, Some(&principal), FailureReason::InactivePrincipal).await);
        }
        if !self.config.sessions.get(SessionType::Sso).allows(AuthMethod::Federated) {
            return Err(self.reject(&attempt, Some(&principal), FailureReason::MethodNotAllowed).await);
        }
        let linked = principal
            .settings
            .get(login.link_key().as_str())
            .and_then(JsonValue::as_str);
        if linked != Some(login.subject.as_str()) {
            return Err(self.reject(&attempt, Some(&principal), FailureReason::FederatedMismatch).await);
        }

        let outcome = self
            .open_session(
                &attempt,
                &principal,
                AuthMethod::Federated,
                SessionType::Sso,
                login.device,
                false,
                Some(adapter.principal_id),
            )
            .await?;
        self.rate_limiter.reset(RateAction::Login, &rate_key);
        Ok(outcome)
    }

    /// Cap check, permission snapshot, persist and audit for a verified login
    #[allow(clippy::too_many_arguments)]
    async fn open_session(
        &self,
        attempt: &Attempt<'_>,
        principal: &Principal,
        method: AuthMethod,
        session_type: SessionType,
        device: DeviceInfo,
        requires_change: bool,
        asserted_by: Option<Uuid>,
    ) -> GatewayResult<AuthOutcome> {
        let policy = self.config.sessions.get(session_type);
        let now = Utc::now();
        let open = self.sessions.count_valid(principal.id, session_type, now).await?;
        if open >= policy.max_concurrent {
            warn!(principal_id = %principal.id, session_type = %session_type, open, "Session limit reached");
            self.audit
                .record(
                    AuditEvent::failure(attempt.action)
                        .principal(principal.id)
                        .resource(principal_resource(&principal.username))
                        .ip(attempt.ip)
                        .detail("reason", "session_limit_reached")
                        .detail("open_sessions", open),
                )
                .await;
            return Err(CoreError::permission_denied("session_limit_reached"));
        }

        let (role_id, permissions) = self.rbac.snapshot(principal.id).await?;
        let session = AuthSession {
            id: mint_session_token(),
            principal_id: principal.id,
            session_type,
            auth_method: method,
            device,
            created_at: now,
            last_activity_at: now,
            expires_at: now + chrono_duration(policy.lifetime),
            is_active: true,
            permissions,
            role_id,
            metadata: SessionMetadata {
                ip_address: attempt.ip.map(str::to_string),
                user_agent: attempt.user_agent.map(str::to_string),
                ..SessionMetadata::default()
            },
        };
        self.sessions.insert(session.clone()).await?;

        let mut event = AuditEvent::success(attempt.action)
            .principal(principal.id)
            .resource(principal_resource(&principal.username))
            .ip(attempt.ip)
            .user_agent(attempt.user_agent)
            .detail("session_type", session_type.as_str())
            .detail("device_type", session.device.device_type.as_str());
        if let Some(adapter) = asserted_by {
            event = event.detail("asserted_by", adapter.to_string());
        }
        self.audit.record(event).await;
        info!(
            principal_id = %principal.id,
            session_type = %session_type,
            device_type = %session.device.device_type,
            "Session opened"
        );

        Ok(AuthOutcome {
            session,
            requires_password_change: requires_change,
        })
    }

    /// The live session behind `token`, or `None`
    pub async fn validate(&self, token: &str) -> GatewayResult<Option<AuthSession>> {
        self.sessions.get(token, Utc::now()).await
    }

    /// Whether the session behind `token` may perform `permission`.
    ///
    /// An invalid session is simply `false`.
    pub async fn check_permission(
        &self,
        token: &str,
        permission: &str,
        resource_owner: Option<Uuid>,
    ) -> GatewayResult<bool> {
        Ok(self
            .decide(token, permission, resource_owner)
            .await?
            .is_some_and(|(_, decision)| decision.granted))
    }

    /// Require `permission` on the caller's session, auditing the denial
    pub async fn authorize(&self, token: &str, permission: &str) -> GatewayResult<AuthSession> {
        match self.decide(token, permission, None).await? {
            None => Err(CoreError::SessionNotFound),
            Some((session, decision)) if decision.granted => Ok(session),
            Some((session, decision)) => Err(self.refuse(&session, permission, decision.reason.as_str(), None).await),
        }
    }

    /// [`authorize`](Self::authorize) for an operation on another principal.
    ///
    /// The caller must also hold every permission the target holds, so a
    /// delegated permission such as `users.update` never reaches an account
    /// more privileged than the caller's own.
    pub async fn authorize_over(&self, token: &str, permission: &str, target: Uuid) -> GatewayResult<AuthSession> {
        let session = self.authorize(token, permission).await?;
        if session.principal_id != target && !self.rbac.covers_principal(session.principal_id, target).await? {
            return Err(self.refuse(&session, permission, TARGET_PRIVILEGED, Some(target)).await);
        }
        Ok(session)
    }

    async fn refuse(&self, session: &AuthSession, permission: &str, reason: &str, target: Option<Uuid>) -> CoreError {
        let mut event = AuditEvent::failure(actions::PERMISSION_DENIED)
            .principal(session.principal_id)
            .ip(session.metadata.ip_address.as_deref())
            .detail("permission", permission)
            .detail("reason", reason);
        if let Some(target) = target {
            event = event.resource(principal_resource(&target.to_string()));
        }
        self.audit.record(event).await;
        CoreError::permission_denied(reason)
    }

    async fn decide(
        &self,
        token: &str,
        permission: &str,
        resource_owner: Option<Uuid>,
    ) -> GatewayResult<Option<(AuthSession, AccessDecision)>> {
        let Some(session) = self.validate(token).await? else {
            return Ok(None);
        };

        if self
            .config
            .sessions
            .get(session.session_type)
            .requires_escalation(permission)
        {
            debug!(
                principal_id = %session.principal_id,
                permission,
                session_type = %session.session_type,
                "Permission needs an escalated session"
            );
            return Ok(Some((session, AccessDecision::deny(DecisionReason::SessionLimited))));
        }

        let context = AccessContext::for_session(session.session_type, session.device.device_type)
            .with_ip(session.metadata.ip_address.clone())
            .with_owner(resource_owner);
        let decision = self.rbac.check(session.principal_id, permission, &context).await?;
        Ok(Some((session, decision)))
    }

    /// Upgrade a passcode session to a standard one after a password check.
    ///
    /// The token is unchanged. Returns `false` when the session's tier cannot
    /// be escalated or the password is wrong.
    pub async fn escalate(&self, token: &str, password: &str) -> GatewayResult<bool> {
        let now = Utc::now();
        let Some(session) = self.sessions.get(token, now).await? else {
            return Err(CoreError::SessionNotFound);
        };
        if session.session_type != SessionType::Passcode
            || !self.config.sessions.get(session.session_type).escalation_allowed
        {
            debug!(principal_id = %session.principal_id, session_type = %session.session_type, "Escalation not available");
            return Ok(false);
        }

        let ip = session.metadata.ip_address.as_deref();
        let principal_key = session.principal_id.to_string();
        let rate_key = self
            .rate_limiter
            .key_for(RateAction::Escalation, ip, Some(&principal_key));
        self.throttle(RateAction::Escalation, &rate_key, ip, Some(session.principal_id))
            .await?;

        let principal = users::find_by_id(self.store.pool(), session.principal_id)
            .await
            .map_err(CoreError::unavailable)?
            .ok_or(CoreError::SessionNotFound)?;
        let attempt = Attempt {
            action: actions::SESSION_ESCALATE,
            identifier: &principal.username,
            ip,
            user_agent: session.metadata.user_agent.as_deref(),
        };

        match self.check_password(principal.id, password).await? {
            CredentialCheck::Accepted { .. } => {}
            CredentialCheck::Rejected(reason) => {
                self.record_failure(&attempt, Some(&principal), reason).await;
                return Ok(false);
            }
            CredentialCheck::Locked {
                until,
                newly_locked,
                kind,
            } => {
                return Err(self.locked_out(&attempt, &principal, until, newly_locked, kind).await);
            }
        }

        let standard_lifetime = chrono_duration(self.config.sessions.standard.lifetime);
        let expires_at = session.expires_at.max(now + standard_lifetime);
        let mut metadata = session.metadata.clone();
        metadata.escalated_at = Some(now);
        metadata.escalated_from = Some(session.session_type);

        let Some(new_expiry) = self
            .sessions
            .escalate(token, SessionType::Standard, expires_at, metadata, now)
            .await?
        else {
            return Err(CoreError::SessionNotFound);
        };
        self.rate_limiter.reset(RateAction::Escalation, &rate_key);

        self.audit
            .record(
                AuditEvent::success(actions::SESSION_ESCALATE)
                    .principal(principal.id)
                    .resource(principal_resource(&principal.username))
                    .ip(ip)
                    .detail("from", session.session_type.as_str())
                    .detail("expires_at", new_expiry.to_rfc3339()),
            )
            .await;
        info!(principal_id = %principal.id, "Passcode session escalated");
        Ok(true)
    }

    /// Push the session's expiry a full lifetime past now
    pub async fn refresh(&self, token: &str) -> GatewayResult<AuthSession> {
        let now = Utc::now();
        let Some(mut session) = self.sessions.get(token, now).await? else {
            return Err(CoreError::SessionNotFound);
        };
        let lifetime = chrono_duration(self.config.sessions.get(session.session_type).lifetime);
        let Some(new_expiry) = self.sessions.extend(token, now + lifetime, now).await? else {
            return Err(CoreError::SessionNotFound);
        };
        session.expires_at = new_expiry;
        session.last_activity_at = now;

        self.audit
            .record(
                AuditEvent::success(actions::SESSION_REFRESH)
                    .principal(session.principal_id)
                    .ip(session.metadata.ip_address.as_deref())
                    .detail("expires_at", new_expiry.to_rfc3339()),
            )
            .await;
        Ok(session)
    }

    /// Log out. `false` if there was nothing to end.
    pub async fn invalidate(&self, token: &str) -> GatewayResult<bool> {
        let session = self.sessions.get(token, Utc::now()).await?;
        let ended = self.sessions.deactivate(token).await?;
        if let Some(session) = session.filter(|_| ended) {
            self.audit
                .record(
                    AuditEvent::success(actions::LOGOUT)
                        .principal(session.principal_id)
                        .ip(session.metadata.ip_address.as_deref())
                        .detail("session_type", session.session_type.as_str()),
                )
                .await;
            info!(principal_id = %session.principal_id, "Session closed");
        }
        Ok(ended)
    }

    /// End every session the principal holds
    pub async fn invalidate_all_for_principal(&self, principal: Uuid, revoked_by: Option<Uuid>) -> GatewayResult<usize> {
        let count = self.sessions.deactivate_for_principal(principal).await?;
        self.audit
            .record(
                AuditEvent::success(actions::SESSION_REVOKE)
                    .maybe_principal(revoked_by)
                    .resource(principal_resource(&principal.to_string()))
                    .detail("sessions", count),
            )
            .await;
        info!(principal_id = %principal, count, "Sessions revoked");
        Ok(count)
    }

    /// Summary of the principal's sessions. Store failures report `Error`.
    pub async fn get_auth_status(&self, principal: Uuid) -> AuthStatus {
        match self.sessions.list_for_principal(principal).await {
            Ok(sessions) if sessions.is_empty() => AuthStatus::NotConnected,
            Ok(sessions) => {
                let now = Utc::now();
                if sessions.iter().any(|session| session.is_valid_at(now)) {
                    AuthStatus::Connected
                } else {
                    AuthStatus::Expired
                }
            }
            Err(e) => {
                warn!(principal_id = %principal, error = %e, "Auth status lookup failed");
                AuthStatus::Error
            }
        }
    }

    pub async fn register_principal(&self, caller: &str, new: NewPrincipal) -> GatewayResult<Uuid> {
        let admin = self.authorize(caller, "users.create").await?;
        let role = new.role.as_deref().unwrap_or(DEFAULT_PRINCIPAL_ROLE);
        self.require_role_coverage(&admin, "users.create", role).await?;
        Ok(self.passwords.create(new, Some(admin.principal_id)).await?)
    }

    /// Create the first administrator when the store holds no principals.
    ///
    /// Returns `None` if anyone already exists.
    pub async fn bootstrap_admin(&self, mut new: NewPrincipal) -> GatewayResult<Option<Uuid>> {
        let existing = users::count(self.store.pool())
            .await
            .map_err(CoreError::unavailable)?;
        if existing > 0 {
            return Ok(None);
        }
        new.role = Some("admin".into());
        let id = self.passwords.create(new, None).await?;
        warn!(principal_id = %id, "Bootstrap administrator created");
        Ok(Some(id))
    }

    pub async fn assign_role(&self, caller: &str, principal: Uuid, role_id: &str) -> GatewayResult<()> {
        let admin = self.authorize_over(caller, "roles.assign", principal).await?;
        self.require_role_coverage(&admin, "roles.assign", role_id).await?;
        self.rbac.assign_role(principal, role_id, admin.principal_id).await?;
        Ok(())
    }

    /// Issue a temporary password and end the principal's sessions
    pub async fn reset_password(&self, caller: &str, principal: Uuid) -> GatewayResult<SecretString> {
        let admin = self.authorize_over(caller, "users.reset_password", principal).await?;
        let temporary = self.passwords.reset(principal, admin.principal_id).await?;
        self.invalidate_all_for_principal(principal, Some(admin.principal_id))
            .await?;
        self.rbac.invalidate(principal);
        Ok(temporary)
    }

    /// Set another principal's password without knowing the current one
    pub async fn change_password(&self, caller: &str, principal: Uuid, new_password: &str) -> GatewayResult<()> {
        let admin = self.authorize_over(caller, "users.update", principal).await?;
        self.passwords
            .change(
                principal,
                PasswordChange::Administrative {
                    changed_by: admin.principal_id,
                },
                new_password,
            )
            .await?;
        Ok(())
    }

    pub async fn change_own_password(&self, caller: &str, current: &str, new_password: &str) -> GatewayResult<()> {
        let session = self.validate(caller).await?.ok_or(CoreError::SessionNotFound)?;
        self.passwords
            .change(
                session.principal_id,
                PasswordChange::SelfService {
                    current: current.to_string(),
                },
                new_password,
            )
            .await?;
        Ok(())
    }

    pub async fn unlock_account(&self, caller: &str, principal: Uuid) -> GatewayResult<()> {
        let admin = self.authorize_over(caller, "users.unlock", principal).await?;
        self.passwords.unlock(principal, admin.principal_id).await?;
        self.rbac.invalidate(principal);
        Ok(())
    }

    pub async fn reset_passcode_attempts(&self, caller: &str, principal: Uuid) -> GatewayResult<bool> {
        let admin = self.authorize_over(caller, "passcodes.reset", principal).await?;
        Ok(self
            .passcodes
            .reset_failed_attempts(principal, admin.principal_id)
            .await?)
    }

    /// Set a passcode. Principals may set their own from an unrestricted
    /// session; setting someone else's takes `passcodes.manage`.
    pub async fn set_passcode(&self, caller: &str, principal: Uuid, passcode: &str) -> GatewayResult<()> {
        let actor = self.authorize_passcode_write(caller, principal).await?;
        self.passcodes
            .create(principal, passcode, Some(actor.principal_id))
            .await?;
        Ok(())
    }

    /// Turn off a principal's passcode. Same rules as [`set_passcode`](Self::set_passcode).
    ///
    /// `false` when there was no active passcode.
    pub async fn disable_passcode(&self, caller: &str, principal: Uuid) -> GatewayResult<bool> {
        let actor = self.authorize_passcode_write(caller, principal).await?;
        Ok(self.passcodes.disable(principal, actor.principal_id).await?)
    }

    async fn authorize_passcode_write(&self, caller: &str, principal: Uuid) -> GatewayResult<AuthSession> {
        let session = self.validate(caller).await?.ok_or(CoreError::SessionNotFound)?;
        if session.principal_id != principal {
            return self.authorize_over(caller, "passcodes.manage", principal).await;
        }
        if self
            .config
            .sessions
            .get(session.session_type)
            .requires_escalation("passcodes.update")
        {
            return Err(CoreError::permission_denied(DecisionReason::SessionLimited.as_str()));
        }
        self.authorize(caller, "profile.update").await
    }

    /// Give a passcode-only principal its first password
    pub async fn set_initial_password(&self, caller: &str, principal: Uuid, password: &str) -> GatewayResult<()> {
        let admin = self.authorize_over(caller, "users.update", principal).await?;
        self.passwords
            .set_password(principal, password, admin.principal_id)
            .await?;
        Ok(())
    }

    pub async fn create_role(&self, caller: &str, role: NewRole) -> GatewayResult<()> {
        let admin = self.authorize(caller, "roles.create").await?;
        for permission in &role.permissions {
            Permission::parse(permission)?;
        }
        if !self.rbac.covers_permissions(admin.principal_id, &role.permissions).await? {
            return Err(self.refuse(&admin, "roles.create", TARGET_PRIVILEGED, None).await);
        }
        if let Some(parent) = role.inherits_from.as_deref() {
            self.require_role_coverage(&admin, "roles.create", parent).await?;
        }
        self.rbac.create_role(role, admin.principal_id).await?;
        Ok(())
    }

    pub async fn grant_permission(&self, caller: &str, role_id: &str, permission: &str) -> GatewayResult<bool> {
        let admin = self.authorize(caller, "roles.update").await?;
        Permission::parse(permission)?;
        if !self
            .rbac
            .covers_permissions(admin.principal_id, &[permission.to_string()])
            .await?
        {
            return Err(self.refuse(&admin, "roles.update", TARGET_PRIVILEGED, None).await);
        }
        Ok(self
            .rbac
            .grant_permission(role_id, permission, admin.principal_id)
            .await?)
    }

    pub async fn revoke_permission(&self, caller: &str, role_id: &str, permission: &str) -> GatewayResult<bool> {
        let admin = self.authorize(caller, "roles.update").await?;
        Ok(self
            .rbac
            .revoke_permission(role_id, permission, admin.principal_id)
            .await?)
    }

    pub async fn revoke_principal_sessions(&self, caller: &str, principal: Uuid) -> GatewayResult<usize> {
        let admin = self.authorize_over(caller, "sessions.revoke", principal).await?;
        self.invalidate_all_for_principal(principal, Some(admin.principal_id))
            .await
    }

    /// Deactivate a principal and end its sessions
    pub async fn deactivate_principal(&self, caller: &str, principal: Uuid) -> GatewayResult<bool> {
        let admin = self.authorize_over(caller, "users.delete", principal).await?;
        let changed = users::set_active(self.store.pool(), principal, false)
            .await
            .map_err(CoreError::unavailable)?;
        if changed {
            self.invalidate_all_for_principal(principal, Some(admin.principal_id))
                .await?;
            self.rbac.invalidate(principal);
        }
        Ok(changed)
    }

    /// Refuse to hand out a role whose grants the caller does not hold itself
    async fn require_role_coverage(&self, caller: &AuthSession, permission: &str, role_id: &str) -> GatewayResult<()> {
        if self.rbac.covers_role(caller.principal_id, role_id).await? {
            Ok(())
        } else {
            Err(self.refuse(caller, permission, TARGET_PRIVILEGED, None).await)
        }
    }

    pub fn sweep_permission_cache(&self) -> usize {
        self.rbac.sweep_expired()
    }

    pub async fn reap_expired_sessions(&self) -> GatewayResult<usize> {
        self.sessions.reap_expired(Utc::now()).await
    }

    pub fn evict_rate_limits(&self) -> usize {
        let evicted = self.rate_limiter.evict_idle();
        self.monitor.prune_cooldowns();
        evicted
    }

    pub async fn purge_audit(&self) -> u64 {
        self.audit.purge_expired().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.store.is_healthy().await
    }

    async fn resolve(&self, principal: &PrincipalRef) -> GatewayResult<Option<Principal>> {
        let found = match principal {
            PrincipalRef::Id(id) => users::find_by_id(self.store.pool(), *id).await,
            PrincipalRef::Username(username) => users::find_by_username(self.store.pool(), username.trim()).await,
        };
        found.map_err(CoreError::unavailable)
    }

    async fn verify_credentials(&self, principal: &Principal, credentials: &Credentials) -> GatewayResult<CredentialCheck> {
        match credentials {
            Credentials::Password { password } => self.check_password(principal.id, password.expose_secret()).await,
            Credentials::ApiKey { secret } => self.check_password(principal.id, secret.expose_secret()).await,
            Credentials::Passcode { passcode } => {
                let verification = match self.passcodes.verify(principal.id, passcode.expose_secret()).await {
                    Ok(verification) => verification,
                    Err(e) => return identity_check(e),
                };
                Ok(match verification {
                    PasscodeVerification::Success => CredentialCheck::Accepted { requires_change: false },
                    PasscodeVerification::Failure { .. } => CredentialCheck::Rejected(FailureReason::WrongPasscode),
                    PasscodeVerification::NoPasscode => CredentialCheck::Rejected(FailureReason::NoPasscodeSet),
                    PasscodeVerification::Expired => CredentialCheck::Rejected(FailureReason::PasscodeExpired),
                    PasscodeVerification::Locked {
                        locked_until,
                        newly_locked,
                    } => CredentialCheck::Locked {
                        until: locked_until,
                        newly_locked,
                        kind: SecurityEventKind::PasscodeLockout,
                    },
                })
            }
            Credentials::Guest => Ok(if principal.role_id == GUEST_ROLE {
                CredentialCheck::Accepted { requires_change: false }
            } else {
                CredentialCheck::Rejected(FailureReason::MethodNotAllowed)
            }),
        }
    }

    async fn check_password(&self, principal: Uuid, password: &str) -> GatewayResult<CredentialCheck> {
        let verification = match self.passwords.verify(principal, password).await {
            Ok(verification) => verification,
            Err(e) => return identity_check(e),
        };
        Ok(match verification {
            PasswordVerification::Success { requires_change } => CredentialCheck::Accepted { requires_change },
            PasswordVerification::Failure { .. } => CredentialCheck::Rejected(FailureReason::WrongPassword),
            PasswordVerification::Locked {
                locked_until,
                newly_locked,
            } => CredentialCheck::Locked {
                until: locked_until,
                newly_locked,
                kind: SecurityEventKind::AccountLockout,
            },
        })
    }

    async fn throttle(&self, action: RateAction, key: &str, ip: Option<&str>, principal: Option<Uuid>) -> GatewayResult<()> {
        match self.rate_limiter.check(action, key) {
            RateLimitDecision::Allowed { .. } => Ok(()),
            RateLimitDecision::Limited {
                retry_after,
                newly_blocked,
            } => {
                if newly_blocked {
                    self.monitor
                        .record_event(
                            SecurityEvent::new(
                                SecurityEventKind::RateLimitExceeded,
                                format!("{} attempts blocked", action.as_str()),
                            )
                            .with_ip(ip)
                            .with_principal(principal)
                            .with_target(key),
                        )
                        .await;
                    self.audit
                        .record(
                            AuditEvent::blocked(actions::RATE_LIMITED)
                                .maybe_principal(principal)
                                .ip(ip)
                                .detail("action", action.as_str())
                                .detail("retry_after_secs", retry_after.as_secs()),
                        )
                        .await;
                } else {
                    debug!(action = action.as_str(), key, "Attempt refused while blocked");
                }
                Err(CoreError::RateLimited { retry_after })
            }
        }
    }

    /// Audit the failure, look for attack patterns, and build the uniform error
    async fn reject(&self, attempt: &Attempt<'_>, principal: Option<&Principal>, reason: FailureReason) -> CoreError {
        self.record_failure(attempt, principal, reason).await;
        CoreError::authentication_failed(reason)
    }

    async fn record_failure(&self, attempt: &Attempt<'_>, principal: Option<&Principal>, reason: FailureReason) {
        let resource = principal_resource(principal.map_or(attempt.identifier, |p| p.username.as_str()));
        self.audit
            .record(
                AuditEvent::failure(attempt.action)
                    .maybe_principal(principal.map(|p| p.id))
                    .resource(resource.clone())
                    .ip(attempt.ip)
                    .user_agent(attempt.user_agent)
                    .detail("reason", reason.as_str()),
            )
            .await;
        debug!(action = attempt.action, reason = reason.as_str(), "Credential attempt rejected");

        let detected = self.monitor.inspect(attempt.ip, Some(&resource)).await;
        if !detected.is_empty() {
            debug!(count = detected.len(), "Security patterns detected");
        }
    }

    async fn locked_out(
        &self,
        attempt: &Attempt<'_>,
        principal: &Principal,
        until: DateTime<Utc>,
        newly_locked: bool,
        kind: SecurityEventKind,
    ) -> CoreError {
        let resource = principal_resource(&principal.username);
        self.audit
            .record(
                AuditEvent::blocked(attempt.action)
                    .principal(principal.id)
                    .resource(resource.clone())
                    .ip(attempt.ip)
                    .detail("reason", "locked")
                    .detail("locked_until", until.to_rfc3339()),
            )
            .await;

        if newly_locked {
            self.monitor
                .record_event(
                    SecurityEvent::new(kind, format!("{} locked after repeated failures", principal.username))
                        .with_ip(attempt.ip)
                        .with_principal(Some(principal.id))
                        .with_target(resource),
                )
                .await;
            if kind == SecurityEventKind::AccountLockout {
                self.rbac.invalidate(principal.id);
            }
        }
        CoreError::AccountLocked { locked_until: until }
    }
}

/// Identity errors that describe the attempt rather than a broken store
fn identity_check(err: IdentityError) -> GatewayResult<CredentialCheck> {
    match err {
        IdentityError::InvalidCredentials(reason) => Ok(CredentialCheck::Rejected(reason)),
        IdentityError::PrincipalNotFound => Ok(CredentialCheck::Rejected(FailureReason::UnknownPrincipal)),
        IdentityError::PrincipalInactive => Ok(CredentialCheck::Rejected(FailureReason::InactivePrincipal)),
        IdentityError::Locked(until) => Ok(CredentialCheck::Locked {
            until,
            newly_locked: false,
            kind: SecurityEventKind::AccountLockout,
        }),
        other => Err(other.into()),
    }
}

fn login_action(method: AuthMethod) -> &'static str {
    match method {
        AuthMethod::Password => actions::LOGIN,
        AuthMethod::Passcode => actions::PASSCODE_LOGIN,
        AuthMethod::Guest => actions::GUEST_LOGIN,
        AuthMethod::ApiKey => actions::API_LOGIN,
        AuthMethod::Federated => actions::SSO_LOGIN,
    }
}

fn rate_action(method: AuthMethod) -> RateAction {
    match method {
        AuthMethod::Passcode => RateAction::Passcode,
        AuthMethod::ApiKey => RateAction::Api,
        AuthMethod::Password | AuthMethod::Guest | AuthMethod::Federated => RateAction::Login,
    }
}

fn chrono_duration(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(365))
}
