mod task;

pub use task::{CheckGuard, CheckSource, CheckStatus, CheckTask, TaskTable};

use chrono::Utc;
use log::{debug, error, info, warn, Level};
use logging_timer::timer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::AutoCheckConfig;
use crate::database::Database;
use crate::domains::DomainRecord;
use crate::error::DomainWatchError;
use crate::reputation::{parse_check_url, ReputationChecker};
use crate::settings::AutoCheckSetting;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub sweep_interval: Duration,
    pub max_concurrent_checks: usize,
}

impl From<&AutoCheckConfig> for SchedulerSettings {
    fn from(config: &AutoCheckConfig) -> Self {
        SchedulerSettings {
            sweep_interval: config.sweep_interval(),
            max_concurrent_checks: config.max_concurrent_checks,
        }
    }
}

struct SweepHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Coordinates manual checks and the recurring auto-check sweep.
///
/// Both kinds of check claim a domain through the same [`TaskTable`], so a
/// domain never has more than one reputation lookup in flight. At most one
/// sweep loop exists at a time; it is started and stopped together with the
/// persisted auto-check flag while holding the `sweep` lock.
pub struct CheckScheduler {
    db: Database,
    checker: ReputationChecker,
    settings: SchedulerSettings,
    tasks: TaskTable,
    permits: Semaphore,
    sweep: Mutex<Option<SweepHandle>>,
    sweeps_started: AtomicU64,
}

impl CheckScheduler {
    pub fn new(db: Database, checker: ReputationChecker, settings: SchedulerSettings) -> Arc<Self> {
        let permits = Semaphore::new(settings.max_concurrent_checks.max(1));
        Arc::new(CheckScheduler {
            db,
            checker,
            settings,
            tasks: TaskTable::new(),
            permits,
            sweep: Mutex::new(None),
            sweeps_started: AtomicU64::new(0),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn lock_sweep(&self) -> MutexGuard<'_, Option<SweepHandle>> {
        self.sweep.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restores auto mode from the database.
    /// Should be called once at server startup
    pub fn init_auto_mode(self: &Arc<Self>) -> Result<(), DomainWatchError> {
        let mut sweep = self.lock_sweep();

        let setting = {
            let conn = self.db.get_connection()?;
            AutoCheckSetting::get(&conn)?
        };

        if setting.is_auto_enabled {
            info!("Initialized: auto-check is enabled");
            self.start_sweep_locked(&mut sweep);
        } else {
            info!("Initialized: auto-check is disabled");
        }

        Ok(())
    }

    pub fn is_auto_enabled(&self) -> Result<bool, DomainWatchError> {
        let conn = self.db.get_connection()?;
        Ok(AutoCheckSetting::get(&conn)?.is_auto_enabled)
    }

    /// Persists the auto-check flag and starts or stops the sweep to match.
    ///
    /// Enabling while a sweep is already running leaves it alone. Disabling
    /// stops the sweep from reserving more domains; checks that are already
    /// running complete normally.
    pub fn set_auto_enabled(self: &Arc<Self>, enabled: bool) -> Result<(), DomainWatchError> {
        let mut sweep = self.lock_sweep();

        {
            let conn = self.db.get_connection()?;
            AutoCheckSetting::set(&conn, enabled)?;
        }

        if enabled {
            self.start_sweep_locked(&mut sweep);
        } else if Self::stop_sweep_locked(&mut sweep).is_some() {
            info!("Auto-check disabled, sweep stopping");
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn is_sweep_running(&self) -> bool {
        self.lock_sweep()
            .as_ref()
            .is_some_and(|sweep| !sweep.handle.is_finished())
    }

    /// Number of sweep loops started over the scheduler's lifetime
    #[cfg(test)]
    pub fn sweeps_started(&self) -> u64 {
        self.sweeps_started.load(Ordering::Acquire)
    }

    pub fn check_statuses(&self) -> Vec<CheckTask> {
        self.tasks.snapshot()
    }

    #[cfg(test)]
    pub fn check_status(&self, domain_id: i64) -> Option<CheckTask> {
        self.tasks.get(domain_id)
    }

    /// Entry point 1: manual check from the UI.
    ///
    /// If the domain already has a check pending or running, no second check
    /// is started and the currently stored record is returned as-is.
    pub async fn manual_check(
        &self,
        domain_id: i64,
        url: &str,
    ) -> Result<DomainRecord, DomainWatchError> {
        let record = {
            let conn = self.db.get_connection()?;
            DomainRecord::get_by_id(&conn, domain_id)?
        }
        .ok_or(DomainWatchError::DomainNotFound(domain_id))?;

        ensure_url_matches_domain(url, &record.domain)?;

        let Some(guard) = self
            .tasks
            .try_begin(domain_id, CheckSource::Manual, CheckStatus::Running)
        else {
            let running = self.tasks.get(domain_id).map(|task| task.source);
            info!(
                "Check already in progress for {} (id: {}, {:?}), returning current state",
                record.domain, domain_id, running
            );
            return Ok(record);
        };

        match self.run_check(guard, url).await? {
            Some(updated) => Ok(updated),
            None => Err(DomainWatchError::DomainNotFound(domain_id)),
        }
    }

    /// Deletes a domain from the registry and drops its finished task state.
    /// A check still in flight for it runs to completion and its result is
    /// discarded.
    pub fn delete_domain(&self, domain_id: i64) -> Result<(), DomainWatchError> {
        {
            let conn = self.db.get_connection()?;
            DomainRecord::delete(&conn, domain_id)?;
        }
        self.tasks.forget(domain_id);
        Ok(())
    }

    /// Stops the sweep and waits for its loop to exit
    pub async fn shutdown(&self) {
        let handle = {
            let mut sweep = self.lock_sweep();
            Self::stop_sweep_locked(&mut sweep)
        };

        if let Some(handle) = handle {
            log::info!("Waiting for auto-check sweep to stop...");
            let _ = handle.await;
            log::info!("Auto-check sweep stopped");
        }
    }

    /// Runs one check for a claimed domain and stores the verdict.
    ///
    /// Returns `Ok(None)` when the domain was deleted while the check ran; the
    /// verdict is then dropped. On failure the stored result is left untouched.
    async fn run_check(
        &self,
        guard: CheckGuard,
        url: &str,
    ) -> Result<Option<DomainRecord>, DomainWatchError> {
        let domain_id = guard.domain_id();

        let verdict = match self.checker.check(url).await {
            Ok(verdict) => verdict,
            Err(e) => {
                guard.finish(CheckStatus::Failed, Some(e.to_string()));
                return Err(e.into());
            }
        };

        let stored = self.db.get_connection().and_then(|conn| {
            DomainRecord::update_result(&conn, domain_id, verdict, Utc::now())
        });

        match stored {
            Ok(record) => {
                info!(
                    "Checked {} (id: {}): {}",
                    record.domain,
                    domain_id,
                    verdict.kind().as_str()
                );
                guard.finish(CheckStatus::Done, None);
                Ok(Some(record))
            }
            Err(DomainWatchError::DomainNotFound(_)) => {
                info!(
                    "Domain {} was deleted during its check, discarding result",
                    domain_id
                );
                guard.discard();
                Ok(None)
            }
            Err(e) => {
                error!("Failed to store check result for domain {}: {}", domain_id, e);
                guard.finish(CheckStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn start_sweep_locked(self: &Arc<Self>, sweep: &mut Option<SweepHandle>) {
        if let Some(existing) = sweep.as_ref() {
            if !existing.handle.is_finished() {
                debug!("Auto-check sweep already running");
                return;
            }
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).run_sweep(token.clone()));
        let n = self.sweeps_started.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            "Auto-check sweep #{} started (interval {:?}, {} concurrent checks)",
            n, self.settings.sweep_interval, self.settings.max_concurrent_checks
        );

        *sweep = Some(SweepHandle { token, handle });
    }

    fn stop_sweep_locked(sweep: &mut Option<SweepHandle>) -> Option<JoinHandle<()>> {
        sweep.take().map(|sweep| {
            sweep.token.cancel();
            sweep.handle
        })
    }

    /// Entry point 2: the recurring sweep loop
    async fn run_sweep(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    match self.sweep_once(&token) {
                        Ok(scheduled) => debug!("Sweep tick scheduled {} checks", scheduled),
                        Err(e) => error!("Auto-check sweep error: {}", e),
                    }
                }
            }
        }

        debug!("Auto-check sweep loop exited");
    }

    /// Reserves every idle domain and spawns a check for it.
    /// Domains with a pending or running check are skipped.
    fn sweep_once(self: &Arc<Self>, token: &CancellationToken) -> Result<usize, DomainWatchError> {
        let _tmr = timer!(Level::Trace; "CheckScheduler::sweep_once");

        let domains = {
            let conn = self.db.get_connection()?;
            DomainRecord::list(&conn)?
        };

        let mut scheduled = 0;
        for record in domains {
            if token.is_cancelled() {
                break;
            }

            let Some(guard) = self
                .tasks
                .try_begin(record.id, CheckSource::Sweep, CheckStatus::Pending)
            else {
                debug!("Skipping {}: check already in progress", record.domain);
                continue;
            };

            let scheduler = Arc::clone(self);
            let token = token.clone();
            let url = format!("https://{}/", record.domain);
            tokio::spawn(async move {
                scheduler.run_sweep_check(guard, url, token).await;
            });
            scheduled += 1;
        }

        Ok(scheduled)
    }

    async fn run_sweep_check(&self, guard: CheckGuard, url: String, token: CancellationToken) {
        let _permit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Sweep stopped before {} was checked", url);
                guard.release();
                return;
            }
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    guard.release();
                    return;
                }
            },
        };

        guard.mark_running();

        match self.run_check(guard, &url).await {
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => warn!("Auto-check of {} failed: {}", url, e),
        }
    }
}

/// A manual check must analyze the registered domain itself, so the URL's
/// host has to equal the domain name (ignoring case and a trailing dot).
fn ensure_url_matches_domain(url: &str, domain: &str) -> Result<(), DomainWatchError> {
    let parsed = parse_check_url(url).map_err(|e| DomainWatchError::InvalidInput(e.to_string()))?;
    let host = parsed.host_str().unwrap_or_default().trim_end_matches('.');

    if !host.eq_ignore_ascii_case(domain) {
        return Err(DomainWatchError::InvalidInput(format!(
            "URL host '{}' does not match domain '{}'",
            host, domain
        )));
    }

    Ok(())
}
