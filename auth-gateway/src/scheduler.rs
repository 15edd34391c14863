//! Periodic maintenance: permission-cache sweep, session reaper,
//! rate-limit eviction and audit retention

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::service::AuthGateway;

const MIN_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
enum Job {
    CacheSweep,
    SessionReap,
    RateLimitEvict,
    AuditRetention,
}

impl Job {
    fn name(self) -> &'static str {
        match self {
            Self::CacheSweep => "permission_cache_sweep",
            Self::SessionReap => "session_reaper",
            Self::RateLimitEvict => "rate_limit_eviction",
            Self::AuditRetention => "audit_retention",
        }
    }

    async fn run(self, gateway: &AuthGateway) {
        match self {
            Self::CacheSweep => {
                let swept = gateway.sweep_permission_cache();
                if swept > 0 {
                    debug!(swept, "Expired permission sets dropped");
                }
            }
            Self::SessionReap => {
                if let Err(e) = gateway.reap_expired_sessions().await {
                    warn!(error = %e, "Session reaper pass failed");
                }
            }
            Self::RateLimitEvict => {
                let evicted = gateway.evict_rate_limits();
                if evicted > 0 {
                    debug!(evicted, "Idle rate-limit windows evicted");
                }
            }
            Self::AuditRetention => {
                let purged = gateway.purge_audit().await;
                if purged > 0 {
                    info!(purged, "Audit entries past retention removed");
                }
            }
        }
    }
}

/// Handles to the maintenance loops. Owned by the entry point, which calls
/// [`BackgroundTasks::shutdown`] before exiting.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Start one loop per job. Must be called inside a Tokio runtime.
    pub fn spawn(gateway: Arc<AuthGateway>, config: &SchedulerConfig) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let jobs = [
            (Job::CacheSweep, config.cache_sweep_interval),
            (Job::SessionReap, config.session_reap_interval),
            (Job::RateLimitEvict, config.rate_limit_evict_interval),
            (Job::AuditRetention, config.audit_retention_interval),
        ];

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(job, period)| tokio::spawn(run_loop(job, period, Arc::clone(&gateway), receiver.clone())))
            .collect();
        info!(tasks = handles.len(), "Background maintenance started");

        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every loop to stop and wait for them to finish
    pub async fn shutdown(self) {
        // Receivers may already be gone if a loop exited early
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Background maintenance stopped");
    }
}

async fn run_loop(job: Job, period: Duration, gateway: Arc<AuthGateway>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup stays quiet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => job.run(&gateway).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(job = job.name(), "Background task stopping");
                    break;
                }
            }
        }
    }
}
