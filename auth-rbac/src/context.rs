//! Contextual denials applied after a role grant

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use database_layer::{DeviceType, SessionType};

use crate::config::{ContextPolicy, TimeWindowRule};
use crate::models::{AccessContext, DecisionReason};
use crate::permission::PermissionMatcher;

/// [`ContextPolicy`] with its patterns compiled
pub struct ContextRules {
    offset: FixedOffset,
    windows: Vec<(TimeWindowRule, Option<PermissionMatcher>)>,
    passcode_allowed: PermissionMatcher,
    restricted_devices: Vec<DeviceType>,
    admin_prefixes: Vec<String>,
}

impl ContextRules {
    pub fn compile(policy: &ContextPolicy) -> Self {
        let offset = policy
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(minutes = policy.utc_offset_minutes, "Invalid UTC offset, using UTC");
                Utc.fix()
            });

        let windows = policy
            .time_windows
            .iter()
            .map(|rule| {
                let scope = (!rule.permissions.is_empty())
                    .then(|| PermissionMatcher::compile(&rule.permissions));
                (rule.clone(), scope)
            })
            .collect();

        Self {
            offset,
            windows,
            passcode_allowed: PermissionMatcher::compile(&policy.passcode_allowed),
            restricted_devices: policy.restricted_devices.clone(),
            admin_prefixes: policy.admin_prefixes.clone(),
        }
    }

    /// The first rule that denies `permission`, if any
    pub fn denial(
        &self,
        role_id: &str,
        permission: &str,
        context: &AccessContext,
        now: DateTime<Utc>,
    ) -> Option<DecisionReason> {
        let local = now.with_timezone(&self.offset);
        let outside_window = self.windows.iter().any(|(rule, scope)| {
            rule.role == role_id
                && rule.applies_on(local.weekday())
                && scope.as_ref().map_or(true, |m| m.matches(permission).is_some())
                && !rule.contains_hour(local.hour())
        });
        if outside_window {
            return Some(DecisionReason::TimeViolation);
        }

        if context.session_type == Some(SessionType::Passcode)
            && self.passcode_allowed.matches(permission).is_none()
        {
            return Some(DecisionReason::SessionLimited);
        }

        let restricted_device = context
            .device_type
            .is_some_and(|device| self.restricted_devices.contains(&device));
        if restricted_device && self.admin_prefixes.iter().any(|p| permission.starts_with(p.as_str())) {
            return Some(DecisionReason::DeviceRestricted);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_child_music_outside_hours() {
        let rules = ContextRules::compile(&ContextPolicy::default());
        let ctx = AccessContext::default();

        assert_eq!(rules.denial("child", "music.play", &ctx, at_hour(12)), None);
        assert_eq!(
            rules.denial("child", "music.play", &ctx, at_hour(22)),
            Some(DecisionReason::TimeViolation)
        );
        // Window is scoped to music, tasks and lists
        assert_eq!(rules.denial("child", "calendar.read", &ctx, at_hour(22)), None);
        // And to the child role only
        assert_eq!(rules.denial("member", "music.play", &ctx, at_hour(22)), None);
    }

    #[test]
    fn test_utc_offset_shifts_window() {
        let rules = ContextRules::compile(&ContextPolicy {
            utc_offset_minutes: -300,
            ..ContextPolicy::default()
        });
        // 23:30 UTC is 18:30 local
        assert_eq!(rules.denial("child", "music.play", &AccessContext::default(), at_hour(23)), None);
    }

    #[test]
    fn test_school_night_window_skips_weekends() {
        let rules = ContextRules::compile(&ContextPolicy {
            time_windows: vec![TimeWindowRule {
                role: "child".into(),
                start_hour: 7,
                end_hour: 20,
                days: vec![Weekday::Sun, Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu],
                permissions: vec!["music.*".into()],
            }],
            ..ContextPolicy::default()
        });
        let ctx = AccessContext::default();
        // 2026-03-12 is a Thursday, 2026-03-13 a Friday
        let thursday_night = Utc.with_ymd_and_hms(2026, 3, 12, 20, 30, 0).unwrap();
        let friday_night = Utc.with_ymd_and_hms(2026, 3, 13, 20, 30, 0).unwrap();

        assert_eq!(
            rules.denial("child", "music.play", &ctx, thursday_night),
            Some(DecisionReason::TimeViolation)
        );
        assert_eq!(rules.denial("child", "music.play", &ctx, friday_night), None);
    }

    #[test]
    fn test_passcode_session_allow_list() {
        let rules = ContextRules::compile(&ContextPolicy::default());
        let ctx = AccessContext::for_session(SessionType::Passcode, DeviceType::Phone);

        assert_eq!(rules.denial("parent", "calendar.delete", &ctx, at_hour(12)), None);
        assert_eq!(
            rules.denial("parent", "family.update", &ctx, at_hour(12)),
            Some(DecisionReason::SessionLimited)
        );
    }

    #[test]
    fn test_shared_devices_cannot_administer() {
        let rules = ContextRules::compile(&ContextPolicy::default());
        let speaker = AccessContext::for_session(SessionType::Standard, DeviceType::SmartSpeaker);
        let laptop = AccessContext::for_session(SessionType::Standard, DeviceType::Desktop);

        assert_eq!(
            rules.denial("admin", "users.delete", &speaker, at_hour(12)),
            Some(DecisionReason::DeviceRestricted)
        );
        assert_eq!(rules.denial("admin", "music.play", &speaker, at_hour(12)), None);
        assert_eq!(rules.denial("admin", "users.delete", &laptop, at_hour(12)), None);
    }
}
