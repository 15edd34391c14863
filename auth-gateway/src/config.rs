use audit_engine::{AuditConfig, MonitorConfig, RateLimitConfig};
use auth_identity::{PasscodePolicy, PasswordPolicy};
use auth_rbac::RbacConfig;
use config_engine::{duration_secs, ConfigError, ValidateConfig};
use database_layer::{AuthMethod, SessionType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rules for one session tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicy {
    #[serde(with = "duration_secs")]
    pub lifetime: Duration,
    /// Whether the tier may be upgraded to a standard session
    #[serde(default)]
    pub escalation_allowed: bool,
    /// Permission prefixes denied until the session is escalated
    #[serde(default)]
    pub escalation_required: Vec<String>,
    pub max_concurrent: u32,
    pub allowed_methods: Vec<AuthMethod>,
}

impl SessionPolicy {
    fn new(lifetime: Duration, max_concurrent: u32, method: AuthMethod) -> Self {
        Self {
            lifetime,
            escalation_allowed: false,
            escalation_required: Vec::new(),
            max_concurrent,
            allowed_methods: vec![method],
        }
    }

    pub fn requires_escalation(&self, permission: &str) -> bool {
        self.escalation_required
            .iter()
            .any(|prefix| permission.starts_with(prefix.as_str()))
    }

    pub fn allows(&self, method: AuthMethod) -> bool {
        self.allowed_methods.contains(&method)
    }
}

const HOUR: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicies {
    #[serde(default = "default_standard")]
    pub standard: SessionPolicy,
    #[serde(default = "default_passcode")]
    pub passcode: SessionPolicy,
    #[serde(default = "default_guest")]
    pub guest: SessionPolicy,
    #[serde(default = "default_api")]
    pub api: SessionPolicy,
    #[serde(default = "default_sso")]
    pub sso: SessionPolicy,
}

impl SessionPolicies {
    pub fn get(&self, session_type: SessionType) -> &SessionPolicy {
        match session_type {
            SessionType::Standard => &self.standard,
            SessionType::Passcode => &self.passcode,
            SessionType::Guest => &self.guest,
            SessionType::Api => &self.api,
            SessionType::Sso => &self.sso,
        }
    }
}

impl Default for SessionPolicies {
    fn default() -> Self {
        Self {
            standard: default_standard(),
            passcode: default_passcode(),
            guest: default_guest(),
            api: default_api(),
            sso: default_sso(),
        }
    }
}

fn default_standard() -> SessionPolicy {
    SessionPolicy::new(Duration::from_secs(24 * HOUR), 5, AuthMethod::Password)
}

fn default_passcode() -> SessionPolicy {
    SessionPolicy {
        escalation_allowed: true,
        escalation_required: ["users.", "roles.", "passcodes.", "security.", "finance."]
            .into_iter()
            .map(String::from)
            .collect(),
        ..SessionPolicy::new(Duration::from_secs(4 * HOUR), 5, AuthMethod::Passcode)
    }
}

fn default_guest() -> SessionPolicy {
    SessionPolicy::new(Duration::from_secs(2 * HOUR), 2, AuthMethod::Guest)
}

fn default_api() -> SessionPolicy {
    SessionPolicy::new(Duration::from_secs(30 * 24 * HOUR), 10, AuthMethod::ApiKey)
}

fn default_sso() -> SessionPolicy {
    SessionPolicy::new(Duration::from_secs(12 * HOUR), 5, AuthMethod::Federated)
}

/// Intervals for the background maintenance loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_cache_sweep", with = "duration_secs")]
    pub cache_sweep_interval: Duration,
    #[serde(default = "default_session_reap", with = "duration_secs")]
    pub session_reap_interval: Duration,
    #[serde(default = "default_rate_limit_evict", with = "duration_secs")]
    pub rate_limit_evict_interval: Duration,
    #[serde(default = "default_audit_retention", with = "duration_secs")]
    pub audit_retention_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cache_sweep_interval: default_cache_sweep(),
            session_reap_interval: default_session_reap(),
            rate_limit_evict_interval: default_rate_limit_evict(),
            audit_retention_interval: default_audit_retention(),
        }
    }
}

fn default_cache_sweep() -> Duration {
    Duration::from_secs(60)
}

fn default_session_reap() -> Duration {
    Duration::from_secs(300)
}

fn default_rate_limit_evict() -> Duration {
    Duration::from_secs(120)
}

fn default_audit_retention() -> Duration {
    Duration::from_secs(24 * HOUR)
}

/// Everything the gateway and the components it owns are configured with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub sessions: SessionPolicies,
    #[serde(default)]
    pub password: PasswordPolicy,
    #[serde(default)]
    pub passcode: PasscodePolicy,
    #[serde(default)]
    pub rbac: RbacConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ValidateConfig for GatewayConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for session_type in SessionType::ALL {
            let policy = self.sessions.get(session_type);
            if policy.lifetime.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "sessions.{session_type}.lifetime must be positive"
                )));
            }
            if policy.max_concurrent == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "sessions.{session_type}.max_concurrent must be at least 1"
                )));
            }
        }
        if self.password.min_length > self.password.max_length {
            return Err(ConfigError::ValidationError(
                "password.min_length exceeds password.max_length".into(),
            ));
        }
        if self.passcode.min_length < 4 || self.passcode.max_length > 8 || self.passcode.min_length > self.passcode.max_length {
            return Err(ConfigError::ValidationError(
                "passcode length bounds must lie within 4..=8".into(),
            ));
        }
        Ok(())
    }
}
