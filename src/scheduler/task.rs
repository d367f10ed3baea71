use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domains::format_timestamp;

/// Lifecycle state of a check task.
///
/// `Pending` and `Running` are the non-terminal states; a domain with a task
/// in either state is considered busy and no second check is started for it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending, // Reserved by a sweep, waiting for a free check slot
    Running, // Reputation check in flight
    Done,    // Result stored
    Failed,  // Check failed, previous result kept
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckStatus::Done | CheckStatus::Failed)
    }
}

/// What started a check
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSource {
    Manual,
    Sweep,
}

/// Latest check task for one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckTask {
    pub domain_id: i64,
    pub status: CheckStatus,
    pub source: CheckSource,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

/// Per-domain task state shared by manual checks and the sweep.
#[derive(Clone, Default)]
pub struct TaskTable {
    inner: Arc<Mutex<HashMap<i64, CheckTask>>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, CheckTask>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically moves `domain_id` from idle to `status`.
    ///
    /// Returns `None` if the domain already has a pending or running task.
    /// `status` must be non-terminal.
    pub fn try_begin(
        &self,
        domain_id: i64,
        source: CheckSource,
        status: CheckStatus,
    ) -> Option<CheckGuard> {
        debug_assert!(!status.is_terminal());

        let mut tasks = self.lock();
        if let Some(existing) = tasks.get(&domain_id) {
            if !existing.status.is_terminal() {
                return None;
            }
        }

        let previous = tasks.insert(
            domain_id,
            CheckTask {
                domain_id,
                status,
                source,
                started_at: format_timestamp(Utc::now()),
                finished_at: None,
                error: None,
            },
        );

        Some(CheckGuard {
            table: self.clone(),
            domain_id,
            previous,
            settled: false,
        })
    }

    pub fn get(&self, domain_id: i64) -> Option<CheckTask> {
        self.lock().get(&domain_id).cloned()
    }

    #[cfg(test)]
    pub fn is_busy(&self, domain_id: i64) -> bool {
        self.lock()
            .get(&domain_id)
            .is_some_and(|task| !task.status.is_terminal())
    }

    /// All known tasks ordered by domain id
    pub fn snapshot(&self) -> Vec<CheckTask> {
        let mut tasks: Vec<CheckTask> = self.lock().values().cloned().collect();
        tasks.sort_by_key(|task| task.domain_id);
        tasks
    }

    /// Drops the task of a deleted domain unless a check is still in flight;
    /// an in-flight task removes itself once its result is discarded.
    pub fn forget(&self, domain_id: i64) {
        let mut tasks = self.lock();
        if tasks
            .get(&domain_id)
            .is_some_and(|task| task.status.is_terminal())
        {
            tasks.remove(&domain_id);
        }
    }
}

/// Exclusive claim on a domain's check slot.
///
/// Exactly one settling call (`finish`, `release` or `discard`) is expected.
/// A guard dropped without one, for example because the request future was
/// cancelled, marks the task failed so the domain becomes idle again.
pub struct CheckGuard {
    table: TaskTable,
    domain_id: i64,
    previous: Option<CheckTask>,
    settled: bool,
}

impl CheckGuard {
    pub fn domain_id(&self) -> i64 {
        self.domain_id
    }

    pub fn mark_running(&self) {
        if let Some(task) = self.table.lock().get_mut(&self.domain_id) {
            task.status = CheckStatus::Running;
        }
    }

    /// Records a terminal outcome
    pub fn finish(mut self, status: CheckStatus, error: Option<String>) {
        self.settle(status, error);
    }

    /// Returns the domain to idle without recording an attempt, restoring
    /// whatever outcome was visible before this claim.
    pub fn release(mut self) {
        let mut tasks = self.table.lock();
        match self.previous.take() {
            Some(previous) => {
                tasks.insert(self.domain_id, previous);
            }
            None => {
                tasks.remove(&self.domain_id);
            }
        }
        self.settled = true;
    }

    /// Removes the task entirely; used once the domain no longer exists
    pub fn discard(mut self) {
        self.table.lock().remove(&self.domain_id);
        self.settled = true;
    }

    fn settle(&mut self, status: CheckStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        if let Some(task) = self.table.lock().get_mut(&self.domain_id) {
            task.status = status;
            task.finished_at = Some(format_timestamp(Utc::now()));
            task.error = error;
        }
        self.settled = true;
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                "Check for domain {} was abandoned before completing",
                self.domain_id
            );
            self.settle(CheckStatus::Failed, Some("check abandoned".to_string()));
        }
    }
}
