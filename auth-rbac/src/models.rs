use chrono::{DateTime, Utc};
use database_layer::{DeviceType, Principal, SessionType};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Request context that can deny an otherwise granted permission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessContext {
    #[serde(default)]
    pub session_type: Option<SessionType>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Owner of the resource being acted on, if any
    #[serde(default)]
    pub resource_owner: Option<Uuid>,
    /// Evaluation time; now when unset
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl AccessContext {
    pub fn for_session(session_type: SessionType, device_type: DeviceType) -> Self {
        Self {
            session_type: Some(session_type),
            device_type: Some(device_type),
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner: Option<Uuid>) -> Self {
        self.resource_owner = owner;
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    DirectMatch,
    WildcardMatch,
    ResourceOwner,
    TimeViolation,
    SessionLimited,
    DeviceRestricted,
    NoMatch,
    PrincipalInactive,
    PrincipalLocked,
    InvalidPermission,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMatch => "direct_match",
            Self::WildcardMatch => "wildcard_match",
            Self::ResourceOwner => "resource_owner",
            Self::TimeViolation => "time_violation",
            Self::SessionLimited => "session_limited",
            Self::DeviceRestricted => "device_restricted",
            Self::NoMatch => "no_match",
            Self::PrincipalInactive => "principal_inactive",
            Self::PrincipalLocked => "principal_locked",
            Self::InvalidPermission => "invalid_permission",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: DecisionReason,
    /// The role pattern that matched, when one did
    pub matched: Option<String>,
}

impl AccessDecision {
    pub fn grant(reason: DecisionReason, matched: impl Into<String>) -> Self {
        Self {
            granted: true,
            reason,
            matched: Some(matched.into()),
        }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            granted: false,
            reason,
            matched: None,
        }
    }
}

/// Input for a custom role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
}

/// The parts of a principal the permission engine looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalGrant {
    pub id: Uuid,
    pub role_id: String,
    pub is_active: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl PrincipalGrant {
    pub fn new(id: Uuid, role_id: impl Into<String>) -> Self {
        Self {
            id,
            role_id: role_id.into(),
            is_active: true,
            locked_until: None,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

impl From<&Principal> for PrincipalGrant {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id,
            role_id: principal.role_id.clone(),
            is_active: principal.is_active,
            locked_until: principal.locked_until,
        }
    }
}
