//! Attack-pattern detection over the audit history
//!
//! The monitor never blocks anything itself. It reads failure aggregates back
//! out of the audit log, and each pattern that crosses its threshold becomes a
//! severity-tagged [`SecurityEvent`] that is traced and written back to the log.

use chrono::{Duration as ChronoDuration, Utc};
use database_layer::repository::audit;
use database_layer::CredentialStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::entry::{actions, AuditEvent};
use crate::events::{SecurityEvent, SecurityEventKind, Severity};
use crate::logger::AuditLogger;

pub struct SecurityMonitor {
    store: CredentialStore,
    audit: AuditLogger,
    config: MonitorConfig,
    last_reported: Mutex<HashMap<String, Instant>>,
}

fn window_start(window: Duration) -> chrono::DateTime<Utc> {
    let window = ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::minutes(10));
    Utc::now() - window
}

impl SecurityMonitor {
    pub fn new(store: CredentialStore, audit: AuditLogger, config: MonitorConfig) -> Self {
        Self {
            store,
            audit,
            config,
            last_reported: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run the pattern queries for a failed attempt from `ip` against `target`.
    ///
    /// Returns the events that were reported by this call; conditions already
    /// reported within the cooldown are not repeated.
    pub async fn inspect(&self, ip: Option<&str>, target: Option<&str>) -> Vec<SecurityEvent> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut detected = Vec::new();

        if let Some(ip) = ip {
            match audit::count_failures_from_ip(
                self.store.pool(),
                ip,
                actions::CREDENTIAL_ATTEMPTS,
                window_start(self.config.brute_force_window),
            )
            .await
            {
                Ok(failures) if failures >= self.config.brute_force_threshold => detected.push(
                    SecurityEvent::new(
                        SecurityEventKind::BruteForce,
                        format!("{failures} failed attempts from one address"),
                    )
                    .with_ip(Some(ip))
                    .with_observed(failures),
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Brute-force query failed"),
            }

            match audit::count_distinct_targets_from_ip(
                self.store.pool(),
                ip,
                actions::CREDENTIAL_ATTEMPTS,
                window_start(self.config.enumeration_window),
            )
            .await
            {
                Ok(targets) if targets >= self.config.enumeration_threshold => detected.push(
                    SecurityEvent::new(
                        SecurityEventKind::Enumeration,
                        format!("{targets} distinct principals probed from one address"),
                    )
                    .with_ip(Some(ip))
                    .with_observed(targets),
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Enumeration query failed"),
            }
        }

        if let Some(target) = target {
            match audit::count_distinct_ips_for_target(
                self.store.pool(),
                target,
                actions::CREDENTIAL_ATTEMPTS,
                window_start(self.config.stuffing_window),
            )
            .await
            {
                Ok(ips) if ips >= self.config.stuffing_threshold => detected.push(
                    SecurityEvent::new(
                        SecurityEventKind::CredentialStuffing,
                        format!("one principal failing from {ips} distinct addresses"),
                    )
                    .with_target(target)
                    .with_observed(ips),
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Credential-stuffing query failed"),
            }
        }

        let mut reported = Vec::with_capacity(detected.len());
        for event in detected {
            if self.should_report(&event) {
                self.emit(&event).await;
                reported.push(event);
            }
        }
        reported
    }

    /// Report an event raised elsewhere, such as a rate-limit block or lockout
    pub async fn record_event(&self, event: SecurityEvent) {
        self.emit(&event).await;
    }

    /// Forget cooldown entries that no longer suppress anything
    pub fn prune_cooldowns(&self) {
        let cooldown = self.config.alert_cooldown;
        self.last_reported
            .lock()
            .retain(|_, at| at.elapsed() < cooldown);
    }

    fn should_report(&self, event: &SecurityEvent) -> bool {
        let now = Instant::now();
        let mut last = self.last_reported.lock();
        let key = event.dedupe_key();
        match last.get(&key) {
            Some(at) if now.duration_since(*at) < self.config.alert_cooldown => false,
            _ => {
                last.insert(key, now);
                true
            }
        }
    }

    async fn emit(&self, event: &SecurityEvent) {
        match event.severity {
            Severity::Critical => error!(
                target: "security",
                kind = %event.kind,
                severity = %event.severity,
                ip = ?event.ip_address,
                target_resource = ?event.target,
                observed = event.observed,
                "{}",
                event.description
            ),
            Severity::High | Severity::Medium => warn!(
                target: "security",
                kind = %event.kind,
                severity = %event.severity,
                ip = ?event.ip_address,
                target_resource = ?event.target,
                observed = event.observed,
                "{}",
                event.description
            ),
            Severity::Low => info!(
                target: "security",
                kind = %event.kind,
                ip = ?event.ip_address,
                "{}",
                event.description
            ),
        }

        let mut audit_event = AuditEvent::blocked(actions::SECURITY_EVENT)
            .maybe_principal(event.principal_id)
            .ip(event.ip_address.as_deref())
            .detail("kind", event.kind.as_str())
            .detail("severity", event.severity.as_str())
            .detail("observed", event.observed)
            .detail("description", event.description.clone());
        if let Some(target) = &event.target {
            audit_event = audit_event.resource(target.clone());
        }
        self.audit.record(audit_event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::entry::principal_resource;
    use database_layer::DatabaseConfig;
    use logger_redacted::PiiRedactor;

    async fn monitor(config: MonitorConfig) -> (tempfile::TempDir, CredentialStore, AuditLogger, SecurityMonitor) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(&DatabaseConfig::for_path(&dir.path().join("monitor.db")))
            .await
            .unwrap();
        let logger = AuditLogger::new(store.clone(), PiiRedactor::default(), AuditConfig::default());
        let monitor = SecurityMonitor::new(store.clone(), logger.clone(), config);
        (dir, store, logger, monitor)
    }

    async fn fail_login(logger: &AuditLogger, ip: &str, target: &str) {
        logger
            .record(
                AuditEvent::failure(actions::LOGIN)
                    .resource(principal_resource(target))
                    .ip(Some(ip)),
            )
            .await;
    }

    #[tokio::test]
    async fn test_brute_force_detected_once_per_cooldown() {
        let (_dir, _store, logger, monitor) = monitor(MonitorConfig {
            brute_force_threshold: 3,
            ..Default::default()
        })
        .await;

        for _ in 0..3 {
            fail_login(&logger, "10.9.9.9", "alice").await;
        }

        let events = monitor.inspect(Some("10.9.9.9"), None).await;
        assert_eq!(events.len(), 1);
        let event = events.first().unwrap();
        assert_eq!(event.kind, SecurityEventKind::BruteForce);
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.observed, 3);

        assert!(monitor.inspect(Some("10.9.9.9"), None).await.is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_and_stuffing() {
        let (_dir, store, logger, monitor) = monitor(MonitorConfig {
            enumeration_threshold: 3,
            stuffing_threshold: 2,
            ..Default::default()
        })
        .await;

        for target in ["alice", "bob", "carol"] {
            fail_login(&logger, "10.1.1.1", target).await;
        }
        fail_login(&logger, "10.2.2.2", "alice").await;

        let events = monitor
            .inspect(Some("10.1.1.1"), Some(&principal_resource("alice")))
            .await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&SecurityEventKind::Enumeration));
        assert!(kinds.contains(&SecurityEventKind::CredentialStuffing));
        assert!(!kinds.contains(&SecurityEventKind::BruteForce));

        let stuffing = events
            .iter()
            .find(|e| e.kind == SecurityEventKind::CredentialStuffing)
            .unwrap();
        assert_eq!(stuffing.severity, Severity::Critical);

        let logged = audit::recent(store.pool(), Some(actions::SECURITY_EVENT), 10)
            .await
            .unwrap();
        assert_eq!(logged.len(), 2);
    }

    #[tokio::test]
    async fn test_successes_do_not_count() {
        let (_dir, _store, logger, monitor) = monitor(MonitorConfig {
            brute_force_threshold: 1,
            ..Default::default()
        })
        .await;

        logger
            .record(AuditEvent::success(actions::LOGIN).ip(Some("10.3.3.3")))
            .await;
        assert!(monitor.inspect(Some("10.3.3.3"), None).await.is_empty());
    }
}
