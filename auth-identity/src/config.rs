use config_engine::{duration_secs, option_duration_secs};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_true")]
    pub require_uppercase: bool,
    #[serde(default = "default_true")]
    pub require_lowercase: bool,
    #[serde(default = "default_true")]
    pub require_digit: bool,
    #[serde(default = "default_true")]
    pub require_special: bool,
    /// Reject passwords on the built-in common-password list
    #[serde(default = "default_true")]
    pub block_common: bool,
    /// Reject passwords containing the username or email local part
    #[serde(default = "default_true")]
    pub forbid_identity: bool,
    /// How many previous passwords may not be reused
    #[serde(default = "default_history_depth")]
    pub history_depth: u32,
    /// Passwords older than this must be changed after the next login
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_lockout_duration", with = "duration_secs")]
    pub lockout_duration: Duration,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_true() -> bool {
    true
}

fn default_min_length() -> usize {
    8
}

fn default_max_length() -> usize {
    128
}

fn default_history_depth() -> u32 {
    5
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_bcrypt_cost() -> u32 {
    12
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            block_common: true,
            forbid_identity: true,
            history_depth: default_history_depth(),
            max_age_days: None,
            max_failed_attempts: default_max_failed_attempts(),
            lockout_duration: default_lockout_duration(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasscodePolicy {
    #[serde(default = "default_passcode_min")]
    pub min_length: usize,
    #[serde(default = "default_passcode_max")]
    pub max_length: usize,
    /// Failures allowed before the first lockout
    #[serde(default = "default_passcode_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_base", with = "duration_secs")]
    pub lockout_base: Duration,
    /// Upper bound on the lockout multiplier
    #[serde(default = "default_lockout_cap")]
    pub lockout_cap: u32,
    #[serde(default = "default_passcode_history")]
    pub history_depth: u32,
    /// Reject a passcode another active principal already uses
    #[serde(default = "default_true")]
    pub require_unique: bool,
    #[serde(default, with = "option_duration_secs")]
    pub validity: Option<Duration>,
}

fn default_passcode_min() -> usize {
    4
}

fn default_passcode_max() -> usize {
    8
}

fn default_passcode_attempts() -> u32 {
    3
}

fn default_lockout_base() -> Duration {
    Duration::from_secs(60)
}

fn default_lockout_cap() -> u32 {
    15
}

fn default_passcode_history() -> u32 {
    3
}

impl Default for PasscodePolicy {
    fn default() -> Self {
        Self {
            min_length: default_passcode_min(),
            max_length: default_passcode_max(),
            max_attempts: default_passcode_attempts(),
            lockout_base: default_lockout_base(),
            lockout_cap: default_lockout_cap(),
            history_depth: default_passcode_history(),
            require_unique: true,
            validity: None,
        }
    }
}

impl PasscodePolicy {
    /// Lockout length after `failed_attempts` consecutive failures.
    ///
    /// Zero below the threshold; at and beyond it the base is multiplied by
    /// the number of failures past the threshold, capped at `lockout_cap`.
    pub fn lockout_duration(&self, failed_attempts: i64) -> Duration {
        self.lockout_after(i64::from(self.max_attempts), failed_attempts)
    }

    /// Same as [`lockout_duration`](Self::lockout_duration) against an explicit
    /// threshold, for credentials that stored their own limit when created
    pub fn lockout_after(&self, max_attempts: i64, failed_attempts: i64) -> Duration {
        let beyond = failed_attempts - max_attempts + 1;
        if beyond <= 0 {
            return Duration::ZERO;
        }
        let multiplier = u32::try_from(beyond).unwrap_or(u32::MAX).min(self.lockout_cap);
        self.lockout_base.saturating_mul(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_grows_linearly_then_caps() {
        let policy = PasscodePolicy {
            max_attempts: 3,
            lockout_base: Duration::from_secs(30),
            lockout_cap: 4,
            ..Default::default()
        };

        assert_eq!(policy.lockout_duration(0), Duration::ZERO);
        assert_eq!(policy.lockout_duration(2), Duration::ZERO);
        assert_eq!(policy.lockout_duration(3), Duration::from_secs(30));
        assert_eq!(policy.lockout_duration(4), Duration::from_secs(60));
        assert_eq!(policy.lockout_duration(6), Duration::from_secs(120));
        assert_eq!(policy.lockout_duration(50), Duration::from_secs(120));
    }

    #[test]
    fn test_stored_threshold_overrides_policy() {
        let policy = PasscodePolicy {
            max_attempts: 3,
            lockout_base: Duration::from_secs(30),
            ..Default::default()
        };
        // A credential created when the limit was 5
        assert_eq!(policy.lockout_after(5, 3), Duration::ZERO);
        assert_eq!(policy.lockout_after(5, 5), Duration::from_secs(30));
    }

    #[test]
    fn test_password_policy_deserializes_with_defaults() {
        let policy: PasswordPolicy =
            serde_json::from_str(r#"{ "min_length": 12, "lockout_duration": 60 }"#).unwrap();
        assert_eq!(policy.min_length, 12);
        assert_eq!(policy.lockout_duration, Duration::from_secs(60));
        assert_eq!(policy.max_failed_attempts, 5);
        assert!(policy.require_special);
    }
}
