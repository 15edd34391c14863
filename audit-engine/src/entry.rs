// Audit entry types and builders
use database_layer::{AuditResult, NewAuditEntry};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

/// Action names written to the audit log
pub mod actions {
    pub const LOGIN: &str = "login";
    pub const PASSCODE_LOGIN: &str = "passcode_login";
    pub const GUEST_LOGIN: &str = "guest_login";
    pub const API_LOGIN: &str = "api_login";
    pub const SSO_LOGIN: &str = "sso_login";
    pub const LOGOUT: &str = "logout";
    pub const SESSION_REFRESH: &str = "session_refresh";
    pub const SESSION_ESCALATE: &str = "session_escalate";
    pub const SESSION_REVOKE: &str = "session_revoke";
    pub const PRINCIPAL_CREATE: &str = "principal_create";
    pub const PASSWORD_VERIFY: &str = "password_verify";
    pub const PASSWORD_CHANGE: &str = "password_change";
    pub const PASSWORD_RESET: &str = "password_reset";
    pub const ACCOUNT_LOCKOUT: &str = "account_lockout";
    pub const ACCOUNT_UNLOCK: &str = "account_unlock";
    pub const PASSCODE_VERIFY: &str = "passcode_verify";
    pub const PASSCODE_LOCKOUT: &str = "passcode_lockout";
    pub const PASSCODE_CREATE: &str = "passcode_create";
    pub const PASSCODE_DISABLE: &str = "passcode_disable";
    pub const PASSCODE_RESET_ATTEMPTS: &str = "passcode_reset_attempts";
    pub const ROLE_CREATE: &str = "role_create";
    pub const ROLE_ASSIGN: &str = "role_assign";
    pub const PERMISSION_GRANT: &str = "permission_grant";
    pub const PERMISSION_REVOKE: &str = "permission_revoke";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const SECURITY_EVENT: &str = "security_event";

    /// Credential-checking actions the pattern analyzer looks at
    pub const CREDENTIAL_ATTEMPTS: &[&str] = &[LOGIN, PASSCODE_LOGIN, API_LOGIN, SESSION_ESCALATE];
}

/// Audit resource naming a login target, whether or not it exists
pub fn principal_resource(identifier: &str) -> String {
    format!("principal/{}", identifier.trim().to_lowercase())
}

/// Builder for one audit row
#[derive(Debug, Clone)]
pub struct AuditEvent {
    entry: NewAuditEntry,
}

impl AuditEvent {
    pub fn new(action: &str, result: AuditResult) -> Self {
        Self {
            entry: NewAuditEntry {
                principal_id: None,
                action: action.to_string(),
                resource: None,
                result,
                ip_address: None,
                user_agent: None,
                details: json!({}),
            },
        }
    }

    pub fn success(action: &str) -> Self {
        Self::new(action, AuditResult::Success)
    }

    pub fn failure(action: &str) -> Self {
        Self::new(action, AuditResult::Failure)
    }

    pub fn blocked(action: &str) -> Self {
        Self::new(action, AuditResult::Blocked)
    }

    pub fn principal(mut self, id: Uuid) -> Self {
        self.entry.principal_id = Some(id);
        self
    }

    pub fn maybe_principal(mut self, id: Option<Uuid>) -> Self {
        self.entry.principal_id = id;
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.entry.resource = Some(resource.into());
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.entry.ip_address = ip.map(str::to_string);
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.entry.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Add one key to the details object
    pub fn detail(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        if let JsonValue::Object(map) = &mut self.entry.details {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn action(&self) -> &str {
        &self.entry.action
    }

    pub fn into_entry(self) -> NewAuditEntry {
        self.entry
    }

    pub fn entry(&self) -> &NewAuditEntry {
        &self.entry
    }
}

impl From<NewAuditEntry> for AuditEvent {
    fn from(entry: NewAuditEntry) -> Self {
        Self { entry }
    }
}
