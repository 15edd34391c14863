//! Sliding-window rate limiting for authentication attempts
//!
//! Every `(action, key)` pair keeps the timestamps of its attempts inside the
//! trailing window. Reaching the rule's threshold blocks the key for the
//! rule's cooldown. Windows live in memory only and are lost on restart.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{RateLimitConfig, RateLimitRule};

/// Throttled operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateAction {
    Login,
    Passcode,
    Api,
    Escalation,
}

impl RateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Passcode => "passcode",
            Self::Api => "api",
            Self::Escalation => "escalation",
        }
    }
}

impl fmt::Display for RateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rule's window is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    Ip,
    Principal,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        remaining: u32,
    },
    Limited {
        retry_after: Duration,
        /// True only for the attempt that tripped the block
        newly_blocked: bool,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Default)]
struct Window {
    attempts: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    last_seen: Option<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.attempts.front() {
            if now.duration_since(*oldest) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&self, now: Instant, window: Duration) -> bool {
        let blocked = self.blocked_until.map(|until| now < until).unwrap_or(false);
        let recent = self
            .last_seen
            .map(|seen| now.duration_since(seen) < window)
            .unwrap_or(false);
        !blocked && !recent
    }
}

/// In-memory sliding-window limiter shared by every request
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(RateAction, String), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn rule(&self, action: RateAction) -> &RateLimitRule {
        self.config.rule(action)
    }

    /// Scope key for an attempt under the rule for `action`
    pub fn key_for(&self, action: RateAction, ip: Option<&str>, principal: Option<&str>) -> String {
        match self.rule(action).scope {
            RateScope::Ip => format!("ip:{}", ip.unwrap_or("unknown")),
            RateScope::Principal => format!("principal:{}", principal.unwrap_or("anonymous")),
            RateScope::Global => "global".to_string(),
        }
    }

    /// Count one attempt against `key` and decide whether it may proceed
    pub fn check(&self, action: RateAction, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed { remaining: u32::MAX };
        }
        let rule = self.config.rule(action).clone();
        let now = Instant::now();

        let mut windows = self.windows.lock();
        let window = windows.entry((action, key.to_string())).or_default();
        window.last_seen = Some(now);

        if let Some(until) = window.blocked_until {
            if now < until {
                return RateLimitDecision::Limited {
                    retry_after: until - now,
                    newly_blocked: false,
                };
            }
            // Block served: start over with an empty window
            window.blocked_until = None;
            window.attempts.clear();
        }

        window.prune(now, rule.window);

        if window.attempts.len() >= rule.max_attempts as usize {
            window.blocked_until = Some(now + rule.block_duration);
            warn!(
                action = %action,
                key = %key,
                attempts = window.attempts.len(),
                block_secs = rule.block_duration.as_secs(),
                "Rate limit threshold reached, blocking key"
            );
            return RateLimitDecision::Limited {
                retry_after: rule.block_duration,
                newly_blocked: true,
            };
        }

        window.attempts.push_back(now);
        let used = u32::try_from(window.attempts.len()).unwrap_or(u32::MAX);
        RateLimitDecision::Allowed {
            remaining: rule.max_attempts.saturating_sub(used),
        }
    }

    /// Forget the window for `key`, used after a successful login
    pub fn reset(&self, action: RateAction, key: &str) {
        self.windows.lock().remove(&(action, key.to_string()));
    }

    /// Drop windows that are neither blocked nor recently used
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|(action, _), window| {
            let rule = self.config.rule(*action);
            !window.is_idle(now, rule.window)
        });
        let evicted = before - windows.len();
        if evicted > 0 {
            debug!(evicted, remaining = windows.len(), "Evicted idle rate-limit windows");
        }
        evicted
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}
