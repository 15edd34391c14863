use chrono::Weekday;
use config_engine::duration_secs;
use database_layer::DeviceType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacConfig {
    /// How long a resolved permission set stays cached
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Longest role inheritance chain followed before giving up
    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,
    #[serde(default)]
    pub context: ContextPolicy,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            max_inheritance_depth: default_max_inheritance_depth(),
            context: ContextPolicy::default(),
        }
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_max_inheritance_depth() -> usize {
    10
}

/// Denials applied on top of role grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Offset of household local time from UTC, used by time windows
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_time_windows")]
    pub time_windows: Vec<TimeWindowRule>,
    /// Patterns a passcode session may use; anything else is `session_limited`
    #[serde(default = "default_passcode_allowed")]
    pub passcode_allowed: Vec<String>,
    /// Device types that may not use administrative permissions
    #[serde(default = "default_restricted_devices")]
    pub restricted_devices: Vec<DeviceType>,
    #[serde(default = "default_admin_prefixes")]
    pub admin_prefixes: Vec<String>,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            time_windows: default_time_windows(),
            passcode_allowed: default_passcode_allowed(),
            restricted_devices: default_restricted_devices(),
            admin_prefixes: default_admin_prefixes(),
        }
    }
}

/// Restricts a role to local hours `[start_hour, end_hour)`
///
/// A window whose end is before its start wraps past midnight. When `days`
/// is set the window only restricts on those local weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowRule {
    pub role: String,
    pub start_hour: u32,
    pub end_hour: u32,
    /// Weekdays the window is enforced on; empty means every day
    #[serde(default)]
    pub days: Vec<Weekday>,
    /// Permission patterns the window applies to; empty means all
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl TimeWindowRule {
    pub fn applies_on(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

fn default_time_windows() -> Vec<TimeWindowRule> {
    vec![TimeWindowRule {
        role: "child".to_string(),
        start_hour: 7,
        end_hour: 21,
        days: Vec::new(),
        permissions: vec!["music.*".to_string(), "tasks.*".to_string(), "lists.*".to_string()],
    }]
}

fn default_passcode_allowed() -> Vec<String> {
    [
        "profile.*",
        "calendar.*",
        "tasks.*",
        "lists.*",
        "music.*",
        "home.*",
        "family.read",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_restricted_devices() -> Vec<DeviceType> {
    vec![DeviceType::SmartSpeaker, DeviceType::TouchPanel]
}

fn default_admin_prefixes() -> Vec<String> {
    ["users.", "roles.", "passcodes.", "security.", "sessions."]
        .into_iter()
        .map(String::from)
        .collect()
}
