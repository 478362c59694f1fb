// ── Startup synchronization ──
//
// Right after a session comes up the client asks every device on the
// current page for its settings and then its live status. The guard
// makes sure that handshake happens once, no matter how many connect
// triggers fire.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncPolicy;
use crate::error::CoreError;
use crate::page::{DeviceRef, PageInfo};

// ── Collaborator contract ────────────────────────────────────────────

/// Issues the two startup requests for one device.
pub trait SyncTarget: Send + Sync {
    fn request_settings(&self, device: &DeviceRef)
        -> impl Future<Output = Result<(), CoreError>> + Send;

    fn request_status(&self, device: &DeviceRef)
        -> impl Future<Output = Result<(), CoreError>> + Send;
}

// ── Guard ────────────────────────────────────────────────────────────

/// Why a synchronization run did not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncRefusal {
    #[error("startup sync already completed")]
    AlreadyCompleted,

    #[error("last attempt was {elapsed:?} ago, cooldown is {cooldown:?}")]
    CoolingDown { elapsed: Duration, cooldown: Duration },

    #[error("attempt limit of {max} reached")]
    AttemptsExhausted { max: u32 },

    #[error("page '{page}' is blacklisted: {reason}")]
    Blacklisted { page: String, reason: String },

    #[error("page '{page}' has no devices to synchronize")]
    NoDevices { page: String },

    #[error("sync interrupted before completion")]
    Interrupted,

    #[error("no startup request could be sent ({failures} failures)")]
    Undelivered { failures: usize },
}

/// Exactly-once bookkeeping for the startup handshake.
#[derive(Debug, Clone)]
pub struct SyncGuard {
    pub attempt_count: u32,
    pub last_attempt: Option<Instant>,
    pub completed: bool,
    /// Page key to the reason it was excluded.
    pub blacklist: BTreeMap<String, String>,
    pub policy: SyncPolicy,
}

impl SyncGuard {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            attempt_count: 0,
            last_attempt: None,
            completed: false,
            blacklist: BTreeMap::new(),
            policy,
        }
    }

    /// Admit a run for `page_key` at `now`, recording the attempt.
    pub fn admit(&mut self, page_key: &str, now: Instant) -> Result<(), SyncRefusal> {
        if self.policy.enabled {
            self.check(page_key, now)?;
        }
        self.attempt_count += 1;
        self.last_attempt = Some(now);
        Ok(())
    }

    fn check(&self, page_key: &str, now: Instant) -> Result<(), SyncRefusal> {
        if self.completed {
            return Err(SyncRefusal::AlreadyCompleted);
        }
        if let Some(last) = self.last_attempt {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.policy.cooldown {
                return Err(SyncRefusal::CoolingDown {
                    elapsed,
                    cooldown: self.policy.cooldown,
                });
            }
        }
        if self.attempt_count >= self.policy.max_attempts {
            return Err(SyncRefusal::AttemptsExhausted {
                max: self.policy.max_attempts,
            });
        }
        if let Some(reason) = self.blacklist.get(page_key) {
            return Err(SyncRefusal::Blacklisted {
                page: page_key.to_owned(),
                reason: reason.clone(),
            });
        }
        Ok(())
    }

    /// Clear completion, attempts, and the blacklist.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_attempt = None;
        self.completed = false;
        self.blacklist.clear();
    }
}

// ── Synchronizer ─────────────────────────────────────────────────────

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub page: String,
    pub settings_requested: usize,
    pub status_requested: usize,
    pub failures: usize,
}

#[derive(Debug)]
pub struct StartupSynchronizer {
    guard: Mutex<SyncGuard>,
}

impl StartupSynchronizer {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            guard: Mutex::new(SyncGuard::new(policy)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the guard.
    pub fn guard(&self) -> SyncGuard {
        self.lock().clone()
    }

    /// Run the handshake for `page`, timed from the moment of the call.
    ///
    /// Settings go out at `settings_delay`, status at `status_delay`.
    /// Individual request failures are logged and counted but do not
    /// abort the run. A run where every request failed is not marked
    /// completed, so the next connect can try again.
    pub async fn run<S: SyncTarget>(
        &self,
        target: &S,
        page: &PageInfo,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncRefusal> {
        let devices = page.devices();
        if devices.is_empty() {
            return Err(self.refused(SyncRefusal::NoDevices {
                page: page.key.clone(),
            }));
        }

        let start = Instant::now();
        let policy = {
            let mut guard = self.lock();
            guard.admit(&page.key, start).map_err(|r| self.refused(r))?;
            guard.policy.clone()
        };
        info!(page = %page.key, devices = devices.len(), "starting startup sync");

        let mut report = SyncReport {
            page: page.key.clone(),
            settings_requested: 0,
            status_requested: 0,
            failures: 0,
        };

        sleep_until(start + policy.settings_delay, cancel).await?;
        for device in devices {
            match target.request_settings(device).await {
                Ok(()) => report.settings_requested += 1,
                Err(e) => {
                    warn!(device = %device.device_id, error = %e, "settings request failed");
                    report.failures += 1;
                }
            }
        }

        sleep_until(start + policy.status_delay, cancel).await?;
        for device in devices {
            match target.request_status(device).await {
                Ok(()) => report.status_requested += 1,
                Err(e) => {
                    warn!(device = %device.device_id, error = %e, "status request failed");
                    report.failures += 1;
                }
            }
        }

        if report.settings_requested + report.status_requested == 0 {
            warn!(page = %report.page, failures = report.failures, "startup sync sent nothing");
            return Err(SyncRefusal::Undelivered {
                failures: report.failures,
            });
        }

        self.lock().completed = true;
        info!(
            page = %report.page,
            settings = report.settings_requested,
            status = report.status_requested,
            failures = report.failures,
            "startup sync completed"
        );
        Ok(report)
    }

    fn refused(&self, refusal: SyncRefusal) -> SyncRefusal {
        debug!(reason = %refusal, "startup sync skipped");
        refusal
    }

    // ── Administration ───────────────────────────────────────────────

    pub fn reset(&self) {
        self.lock().reset();
        info!("startup sync guard reset");
    }

    pub fn add_to_blacklist(&self, page_key: impl Into<String>, reason: impl Into<String>) {
        self.lock().blacklist.insert(page_key.into(), reason.into());
    }

    pub fn remove_from_blacklist(&self, page_key: &str) -> bool {
        self.lock().blacklist.remove(page_key).is_some()
    }

    pub fn update_settings(&self, policy: SyncPolicy) {
        self.lock().policy = policy;
    }
}

async fn sleep_until(deadline: Instant, cancel: &CancellationToken) -> Result<(), SyncRefusal> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SyncRefusal::Interrupted),
        () = tokio::time::sleep_until(deadline) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageContext;
    use pretty_assertions::assert_eq;

    fn page(key: &str) -> PageInfo {
        PageInfo::new(
            key,
            PageContext::SingleDevice {
                device: DeviceRef::new("alice", "ab12cd34ef56"),
            },
        )
    }

    #[test]
    fn guard_refusal_order() {
        let mut guard = SyncGuard::new(SyncPolicy::default());
        let t0 = Instant::now();
        guard.admit("main", t0).unwrap();

        assert!(matches!(
            guard.admit("main", t0 + Duration::from_secs(1)),
            Err(SyncRefusal::CoolingDown { .. })
        ));

        guard.admit("main", t0 + Duration::from_secs(6)).unwrap();
        guard.admit("main", t0 + Duration::from_secs(12)).unwrap();
        assert_eq!(
            guard.admit("main", t0 + Duration::from_secs(18)),
            Err(SyncRefusal::AttemptsExhausted { max: 3 })
        );

        guard.completed = true;
        assert_eq!(
            guard.admit("main", t0 + Duration::from_secs(24)),
            Err(SyncRefusal::AlreadyCompleted)
        );
    }

    #[test]
    fn blacklist_and_reset() {
        let mut guard = SyncGuard::new(SyncPolicy::default());
        guard.blacklist.insert("setting".into(), "manual".into());
        assert!(matches!(
            guard.admit("setting", Instant::now()),
            Err(SyncRefusal::Blacklisted { .. })
        ));

        guard.completed = true;
        guard.reset();
        assert!(guard.blacklist.is_empty());
        assert!(guard.admit("setting", Instant::now()).is_ok());
    }

    #[test]
    fn disabled_guard_admits_everything() {
        let mut guard = SyncGuard::new(SyncPolicy {
            enabled: false,
            ..SyncPolicy::default()
        });
        guard.completed = true;
        let now = Instant::now();
        assert!(guard.admit("main", now).is_ok());
        assert!(guard.admit("main", now).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn pages_without_devices_are_refused() {
        struct Nothing;
        impl SyncTarget for Nothing {
            async fn request_settings(&self, _: &DeviceRef) -> Result<(), CoreError> {
                Ok(())
            }
            async fn request_status(&self, _: &DeviceRef) -> Result<(), CoreError> {
                Ok(())
            }
        }

        let sync = StartupSynchronizer::new(SyncPolicy::default());
        let other = PageInfo::new("login", PageContext::Other);
        let result = sync.run(&Nothing, &other, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncRefusal::NoDevices { .. })));
        assert_eq!(sync.guard().attempt_count, 0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sync.run(&Nothing, &page("chart"), &cancel).await;
        assert_eq!(result, Err(SyncRefusal::Interrupted));
        assert!(!sync.guard().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn run_with_every_request_failing_stays_open() {
        struct Offline;
        impl SyncTarget for Offline {
            async fn request_settings(&self, _: &DeviceRef) -> Result<(), CoreError> {
                Err(CoreError::NotConnected)
            }
            async fn request_status(&self, _: &DeviceRef) -> Result<(), CoreError> {
                Err(CoreError::NotConnected)
            }
        }

        let sync = StartupSynchronizer::new(SyncPolicy::default());
        let result = sync.run(&Offline, &page("chart"), &CancellationToken::new()).await;
        assert_eq!(result, Err(SyncRefusal::Undelivered { failures: 2 }));
        assert!(!sync.guard().completed);
        assert_eq!(sync.guard().attempt_count, 1);

        // After the cooldown the next trigger is admitted again.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let result = sync.run(&Offline, &page("chart"), &CancellationToken::new()).await;
        assert_eq!(result, Err(SyncRefusal::Undelivered { failures: 2 }));
        assert_eq!(sync.guard().attempt_count, 2);
    }
}
