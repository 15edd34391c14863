//! Permission tokens and the compiled matcher
//!
//! A permission is a dotted `resource.action` token. A trailing `.*` grants
//! everything below a prefix and a bare `*` grants everything.
//!
//! ```rust
//! use auth_rbac::{Permission, PermissionMatcher};
//!
//! let matcher = PermissionMatcher::compile(["calendar.*", "tasks.read"]);
//! assert!(matcher.matches("calendar.delete").is_some());
//! assert!(matcher.matches("tasks.delete").is_none());
//! assert!(Permission::parse("Tasks.Read").is_err());
//! ```

use std::collections::HashSet;
use std::fmt;

use crate::error::{RbacError, RbacResult};

/// A validated permission or permission pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    /// `*`
    All,
    /// `calendar.*`, stored with its trailing dot (`calendar.`)
    Prefix(String),
    /// `calendar.read`
    Exact(String),
}

impl Permission {
    pub fn parse(raw: &str) -> RbacResult<Self> {
        if raw == "*" {
            return Ok(Self::All);
        }
        let (body, wildcard) = match raw.strip_suffix(".*") {
            Some(body) => (body, true),
            None => (raw, false),
        };
        if body.is_empty() || !body.split('.').all(valid_segment) {
            return Err(RbacError::InvalidPermission(raw.to_string()));
        }
        Ok(if wildcard {
            Self::Prefix(format!("{body}."))
        } else {
            Self::Exact(body.to_string())
        })
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Whether this pattern covers a concrete permission
    pub fn covers(&self, permission: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => permission.starts_with(prefix.as_str()),
            Self::Exact(exact) => exact == permission,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// How a permission was matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionMatch {
    Direct(String),
    Wildcard(String),
}

impl PermissionMatch {
    pub fn pattern(&self) -> &str {
        match self {
            Self::Direct(p) | Self::Wildcard(p) => p,
        }
    }
}

/// A resolved permission set compiled for lookups
///
/// Exact grants go into a hash set; wildcard prefixes are kept longest first
/// so the most specific pattern is reported as the match.
#[derive(Debug, Clone, Default)]
pub struct PermissionMatcher {
    exact: HashSet<String>,
    prefixes: Vec<String>,
    all: bool,
}

impl PermissionMatcher {
    /// Compile a set of patterns. Entries that fail to parse are skipped.
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for raw in patterns {
            match Permission::parse(raw.as_ref()) {
                Ok(Permission::All) => matcher.all = true,
                Ok(Permission::Prefix(prefix)) => matcher.prefixes.push(prefix),
                Ok(Permission::Exact(exact)) => {
                    matcher.exact.insert(exact);
                }
                Err(_) => {
                    tracing::warn!(permission = raw.as_ref(), "Skipping malformed stored permission");
                }
            }
        }
        matcher.prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        matcher.prefixes.dedup();
        matcher
    }

    pub fn matches(&self, permission: &str) -> Option<PermissionMatch> {
        if self.exact.contains(permission) {
            return Some(PermissionMatch::Direct(permission.to_string()));
        }
        if let Some(prefix) = self.prefixes.iter().find(|p| permission.starts_with(p.as_str())) {
            return Some(PermissionMatch::Wildcard(format!("{prefix}*")));
        }
        self.all.then(|| PermissionMatch::Wildcard("*".to_string()))
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.exact.is_empty() && self.prefixes.is_empty()
    }

    /// Whether every grant in `patterns` is also granted by this set.
    ///
    /// A wildcard is only covered by an equal or broader wildcard. Malformed
    /// entries are never covered.
    pub fn covers_all<I, S>(&self, patterns: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns.into_iter().all(|raw| match Permission::parse(raw.as_ref()) {
            Ok(Permission::All) => self.all,
            Ok(Permission::Prefix(prefix)) => {
                self.all || self.prefixes.iter().any(|p| prefix.starts_with(p.as_str()))
            }
            Ok(Permission::Exact(exact)) => self.matches(&exact).is_some(),
            Err(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar() {
        assert_eq!(Permission::parse("*").unwrap(), Permission::All);
        assert_eq!(
            Permission::parse("calendar.*").unwrap(),
            Permission::Prefix("calendar.".into())
        );
        assert_eq!(
            Permission::parse("home.lights_2.toggle").unwrap(),
            Permission::Exact("home.lights_2.toggle".into())
        );

        for bad in ["", ".*", "calendar.", "calendar..read", "Calendar.read", "cal*", "*.read", "a.*.b", "tasks read"] {
            assert!(Permission::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_display_round_trips_patterns() {
        for raw in ["*", "calendar.*", "tasks.read"] {
            assert_eq!(Permission::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_matcher_prefers_exact_then_longest_prefix() {
        let matcher = PermissionMatcher::compile(["calendar.*", "calendar.events.*", "tasks.read", "*"]);

        assert_eq!(
            matcher.matches("tasks.read"),
            Some(PermissionMatch::Direct("tasks.read".into()))
        );
        assert_eq!(
            matcher.matches("calendar.events.delete"),
            Some(PermissionMatch::Wildcard("calendar.events.*".into()))
        );
        assert_eq!(
            matcher.matches("users.delete"),
            Some(PermissionMatch::Wildcard("*".into()))
        );
    }

    #[test]
    fn test_coverage_of_another_set() {
        let parent = PermissionMatcher::compile(["family.*", "users.update", "calendar.*"]);

        assert!(parent.covers_all(["family.*", "calendar.events.*", "users.update"]));
        assert!(parent.covers_all(Vec::<String>::new()));
        assert!(!parent.covers_all(["*"]));
        assert!(!parent.covers_all(["users.*"]));
        assert!(!parent.covers_all(["roles.assign"]));
        assert!(PermissionMatcher::compile(["*"]).covers_all(["*", "users.*"]));
    }

    #[test]
    fn test_prefix_does_not_match_bare_resource() {
        let matcher = PermissionMatcher::compile(["calendar.*"]);
        assert!(matcher.matches("calendar").is_none());
        assert!(matcher.matches("calendarx.read").is_none());
        assert!(PermissionMatcher::compile(Vec::<String>::new()).is_empty());
    }
}
