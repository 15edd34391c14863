use config_engine::duration_secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rate_limiter::{RateAction, RateScope};

/// One throttling rule: at most `max_attempts` per trailing `window`,
/// then the key is blocked for `block_duration`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
    #[serde(with = "duration_secs")]
    pub block_duration: Duration,
    pub scope: RateScope,
}

impl RateLimitRule {
    pub fn new(max_attempts: u32, window: Duration, block_duration: Duration, scope: RateScope) -> Self {
        Self {
            max_attempts,
            window,
            block_duration,
            scope,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_login_rule")]
    pub login: RateLimitRule,
    #[serde(default = "default_passcode_rule")]
    pub passcode: RateLimitRule,
    #[serde(default = "default_api_rule")]
    pub api: RateLimitRule,
    #[serde(default = "default_escalation_rule")]
    pub escalation: RateLimitRule,
}

fn default_true() -> bool {
    true
}

fn default_login_rule() -> RateLimitRule {
    RateLimitRule::new(5, Duration::from_secs(5 * 60), Duration::from_secs(15 * 60), RateScope::Ip)
}

fn default_passcode_rule() -> RateLimitRule {
    RateLimitRule::new(3, Duration::from_secs(3 * 60), Duration::from_secs(10 * 60), RateScope::Ip)
}

fn default_api_rule() -> RateLimitRule {
    RateLimitRule::new(100, Duration::from_secs(60), Duration::from_secs(60), RateScope::Principal)
}

fn default_escalation_rule() -> RateLimitRule {
    RateLimitRule::new(5, Duration::from_secs(5 * 60), Duration::from_secs(15 * 60), RateScope::Principal)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: default_login_rule(),
            passcode: default_passcode_rule(),
            api: default_api_rule(),
            escalation: default_escalation_rule(),
        }
    }
}

impl RateLimitConfig {
    pub fn rule(&self, action: RateAction) -> &RateLimitRule {
        match action {
            RateAction::Login => &self.login,
            RateAction::Passcode => &self.passcode,
            RateAction::Api => &self.api,
            RateAction::Escalation => &self.escalation,
        }
    }
}

/// Thresholds for the audit-history pattern analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Failures from one ip that count as brute force
    #[serde(default = "default_brute_force_threshold")]
    pub brute_force_threshold: i64,
    #[serde(default = "default_brute_force_window", with = "duration_secs")]
    pub brute_force_window: Duration,

    /// Distinct principals probed from one ip that count as enumeration
    #[serde(default = "default_enumeration_threshold")]
    pub enumeration_threshold: i64,
    #[serde(default = "default_wide_window", with = "duration_secs")]
    pub enumeration_window: Duration,

    /// Distinct ips failing against one principal that count as credential stuffing
    #[serde(default = "default_stuffing_threshold")]
    pub stuffing_threshold: i64,
    #[serde(default = "default_wide_window", with = "duration_secs")]
    pub stuffing_window: Duration,

    /// The same event for the same key is reported at most once per cooldown
    #[serde(default = "default_alert_cooldown", with = "duration_secs")]
    pub alert_cooldown: Duration,
}

fn default_brute_force_threshold() -> i64 {
    10
}

fn default_brute_force_window() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_enumeration_threshold() -> i64 {
    5
}

fn default_stuffing_threshold() -> i64 {
    4
}

fn default_wide_window() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_alert_cooldown() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brute_force_threshold: default_brute_force_threshold(),
            brute_force_window: default_brute_force_window(),
            enumeration_threshold: default_enumeration_threshold(),
            enumeration_window: default_wide_window(),
            stuffing_threshold: default_stuffing_threshold(),
            stuffing_window: default_wide_window(),
            alert_cooldown: default_alert_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entries older than this are purged by the retention task
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    365
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}
