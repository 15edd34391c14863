use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    BruteForce,
    Enumeration,
    CredentialStuffing,
    RateLimitExceeded,
    AccountLockout,
    PasscodeLockout,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BruteForce => "brute_force",
            Self::Enumeration => "enumeration",
            Self::CredentialStuffing => "credential_stuffing",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::AccountLockout => "account_lockout",
            Self::PasscodeLockout => "passcode_lockout",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::CredentialStuffing => Severity::Critical,
            Self::BruteForce | Self::Enumeration => Severity::High,
            Self::RateLimitExceeded | Self::AccountLockout | Self::PasscodeLockout => Severity::Medium,
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected attack pattern or protective action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub principal_id: Option<Uuid>,
    /// Audit resource the event is about, e.g. `principal/alice`
    pub target: Option<String>,
    /// Observed count that crossed the threshold
    pub observed: i64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            ip_address: None,
            principal_id: None,
            target: None,
            observed: 0,
            description: description.into(),
            detected_at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(str::to_string);
        self
    }

    pub fn with_principal(mut self, principal_id: Option<Uuid>) -> Self {
        self.principal_id = principal_id;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_observed(mut self, observed: i64) -> Self {
        self.observed = observed;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Key used to suppress repeated reports of the same condition
    pub(crate) fn dedupe_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.kind,
            self.ip_address.as_deref().unwrap_or("-"),
            self.target.as_deref().unwrap_or("-")
        )
    }
}
