//! Audit trail writer
//!
//! Audit writes never decide the outcome of the operation they describe: a
//! store failure here is logged and dropped.

use chrono::{Duration as ChronoDuration, Utc};
use database_layer::repository::audit;
use database_layer::{AuditResult, CredentialStore, SqliteConnection};
use logger_redacted::PiiRedactor;
use sqlx::Connection;
use tracing::{error, info, warn};

use crate::config::AuditConfig;
use crate::entry::AuditEvent;

#[derive(Clone)]
pub struct AuditLogger {
    store: CredentialStore,
    redactor: PiiRedactor,
    config: AuditConfig,
}

impl AuditLogger {
    pub fn new(store: CredentialStore, redactor: PiiRedactor, config: AuditConfig) -> Self {
        Self {
            store,
            redactor,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Write one entry on its own connection
    pub async fn record(&self, event: AuditEvent) {
        if !self.config.enabled {
            return;
        }
        let event = self.prepare(event);
        self.trace(&event);

        if let Err(e) = audit::insert(self.store.pool(), event.entry(), Utc::now()).await {
            error!(
                target: "audit",
                action = %event.action(),
                error = %e,
                "Failed to store audit entry"
            );
        }
    }

    /// Write one entry inside the caller's transaction.
    ///
    /// The insert runs under a savepoint so a failed audit write rolls back
    /// alone and the caller's transaction stays usable.
    pub async fn record_in(&self, conn: &mut SqliteConnection, event: AuditEvent) {
        if !self.config.enabled {
            return;
        }
        let event = self.prepare(event);
        self.trace(&event);

        let mut savepoint = match conn.begin().await {
            Ok(savepoint) => savepoint,
            Err(e) => {
                warn!(target: "audit", action = %event.action(), error = %e, "Could not open audit savepoint");
                return;
            }
        };

        match audit::insert(&mut *savepoint, event.entry(), Utc::now()).await {
            Ok(_) => {
                if let Err(e) = savepoint.commit().await {
                    warn!(target: "audit", action = %event.action(), error = %e, "Failed to release audit savepoint");
                }
            }
            Err(e) => {
                warn!(target: "audit", action = %event.action(), error = %e, "Failed to store audit entry, rolling back savepoint");
                if let Err(e) = savepoint.rollback().await {
                    warn!(target: "audit", error = %e, "Failed to roll back audit savepoint");
                }
            }
        }
    }

    /// Delete entries older than the configured retention
    pub async fn purge_expired(&self) -> u64 {
        self.purge_older_than(ChronoDuration::days(i64::from(self.config.retention_days)))
            .await
    }

    pub async fn purge_older_than(&self, retention: ChronoDuration) -> u64 {
        let cutoff = Utc::now() - retention;
        match audit::delete_older_than(self.store.pool(), cutoff).await {
            Ok(purged) => {
                if purged > 0 {
                    info!(target: "audit", purged, cutoff = %cutoff, "Purged expired audit entries");
                }
                purged
            }
            Err(e) => {
                error!(target: "audit", error = %e, "Audit retention purge failed");
                0
            }
        }
    }

    fn prepare(&self, event: AuditEvent) -> AuditEvent {
        let mut entry = event.into_entry();
        entry.details = self.redactor.redact_json(&entry.details);
        AuditEvent::from(entry)
    }

    fn trace(&self, event: &AuditEvent) {
        let entry = event.entry();
        let ip = entry.ip_address.as_deref().map(|ip| self.redactor.redact(ip));
        match entry.result {
            AuditResult::Success => info!(
                target: "audit",
                action = %entry.action,
                principal_id = ?entry.principal_id,
                resource = ?entry.resource,
                ip = ?ip,
                "audit success"
            ),
            AuditResult::Failure | AuditResult::Blocked => warn!(
                target: "audit",
                action = %entry.action,
                result = %entry.result,
                principal_id = ?entry.principal_id,
                resource = ?entry.resource,
                ip = ?ip,
                details = %entry.details,
                "audit {}",
                entry.result
            ),
        }
    }
}
