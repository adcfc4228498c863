//! In-memory store of every job created during the life of the process.
//!
//! Each job sits behind its own mutex so a status read never observes a
//! record halfway through a write. The outer map lock is only held long
//! enough to look up or insert an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::pipeline::{Job, StageDefinition, StatusReport, catalog};

/// How long settled jobs are kept around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// `None` keeps every job for the lifetime of the process.
    pub max_age: Option<Duration>,
}

type JobCell = Arc<Mutex<Job>>;

pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobCell>>,
    definitions: Vec<StageDefinition>,
    retention: RetentionPolicy,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(catalog().to_vec(), RetentionPolicy::default())
    }
}

impl JobRegistry {
    pub fn new(definitions: Vec<StageDefinition>, retention: RetentionPolicy) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            definitions,
            retention,
        }
    }

    pub fn definitions(&self) -> &[StageDefinition] {
        &self.definitions
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Store a fresh job with every stage pending and return its id.
    pub fn create(&self, theme: impl Into<String>) -> String {
        let job = Job::new(theme.into(), &self.definitions);
        let id = job.id.clone();
        self.write_map()
            .insert(id.clone(), Arc::new(Mutex::new(job)));
        id
    }

    /// Copy of the job as it is right now.
    pub fn get(&self, id: &str) -> Option<Job> {
        let cell = self.cell(id)?;
        let job = lock_job(&cell);
        Some(job.clone())
    }

    /// Snapshot of the stages and derived flags, taken under the job's lock.
    pub fn status(&self, id: &str) -> Option<StatusReport> {
        let cell = self.cell(id)?;
        let job = lock_job(&cell);
        Some(job.status_report())
    }

    /// Raise the cancellation flag.
    ///
    /// Unknown ids, finished jobs and repeat calls are silently ignored.
    /// Returns `true` only when this call flipped the flag.
    pub fn mark_cancelled(&self, id: &str) -> bool {
        match self.cell(id) {
            Some(cell) => lock_job(&cell).cancel(),
            None => false,
        }
    }

    /// Whether the job's cancellation flag is up. A pruned job counts as
    /// cancelled, since only settled jobs are ever pruned.
    pub fn is_cancelled(&self, id: &str) -> bool {
        self.cell(id).is_none_or(|cell| lock_job(&cell).cancelled)
    }

    /// Run `f` against the live record while holding its lock.
    ///
    /// Returns `None` if the job does not exist (or was pruned). `f` must
    /// not block; it runs with the job's mutex held.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let cell = self.cell(id)?;
        let mut job = lock_job(&cell);
        Some(f(&mut job))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_map().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop settled jobs whose last change is older than the retention window.
    ///
    /// Jobs that can still change (not cancelled, not failed, not complete)
    /// are always kept. Returns the number of jobs removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let Some(max_age) = self.retention.max_age else {
            return 0;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };

        let mut jobs = self.write_map();
        let before = jobs.len();
        jobs.retain(|_, cell| {
            let job = lock_job(cell);
            !(job.is_settled() && now - job.updated_at > max_age)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::info!(removed, remaining = jobs.len(), "Pruned settled pipelines");
        }
        removed
    }

    fn cell(&self, id: &str) -> Option<JobCell> {
        self.read_map().get(id).cloned()
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, JobCell>> {
        self.jobs.read().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned reading jobs map: {e}");
            e.into_inner()
        })
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, JobCell>> {
        self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing jobs map: {e}");
            e.into_inner()
        })
    }
}

fn lock_job(cell: &Mutex<Job>) -> MutexGuard<'_, Job> {
    cell.lock().unwrap_or_else(|e| {
        tracing::error!("Mutex poisoned on job record: {e}");
        e.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageStatus;

    fn retaining(secs: u64) -> JobRegistry {
        JobRegistry::new(
            catalog().to_vec(),
            RetentionPolicy {
                max_age: Some(Duration::from_secs(secs)),
            },
        )
    }

    #[test]
    fn create_stores_pending_job() {
        let registry = JobRegistry::default();
        let id = registry.create("space opera");

        let job = registry.get(&id).unwrap();
        assert_eq!(job.theme, "space opera");
        assert_eq!(job.stages.len(), 5);
        assert!(job.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert!(!job.cancelled);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_returns_none() {
        let registry = JobRegistry::default();
        assert!(registry.get("nope").is_none());
        assert!(registry.status("nope").is_none());
    }

    #[test]
    fn mark_cancelled_is_idempotent() {
        let registry = JobRegistry::default();
        let id = registry.create("noir");

        assert!(registry.mark_cancelled(&id));
        assert!(!registry.mark_cancelled(&id));
        assert!(registry.get(&id).unwrap().cancelled);
    }

    #[test]
    fn is_cancelled_tracks_flag_and_missing_jobs() {
        let registry = JobRegistry::default();
        let id = registry.create("noir");

        assert!(!registry.is_cancelled(&id));
        registry.mark_cancelled(&id);
        assert!(registry.is_cancelled(&id));
        assert!(registry.is_cancelled("missing"));
    }

    #[test]
    fn mark_cancelled_unknown_is_noop() {
        let registry = JobRegistry::default();
        assert!(!registry.mark_cancelled("missing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn update_mutates_live_record() {
        let registry = JobRegistry::default();
        let id = registry.create("western");

        registry
            .update(&id, |job| job.advance(0, StageStatus::Running))
            .unwrap()
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().running_stage(), Some(0));
        assert!(registry.update("missing", |_| ()).is_none());
    }

    #[test]
    fn prune_without_policy_keeps_everything() {
        let registry = JobRegistry::default();
        let id = registry.create("keep me");
        registry.mark_cancelled(&id);

        let later = Utc::now() + chrono::Duration::days(365);
        assert_eq!(registry.prune(later), 0);
        assert!(registry.contains(&id));
    }

    #[test]
    fn prune_removes_only_old_settled_jobs() {
        let registry = retaining(60);
        let cancelled = registry.create("cancelled");
        let active = registry.create("active");
        registry.mark_cancelled(&cancelled);

        // Inside the window nothing goes.
        assert_eq!(registry.prune(Utc::now()), 0);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(registry.prune(later), 1);
        assert!(!registry.contains(&cancelled));
        assert!(registry.contains(&active));
    }
}
