//! Job status registry.
//!
//! Each job owns a `watch` channel carrying its latest [`JobStatus`]
//! plus an append-only log of every published state. Pollers read the
//! snapshot; `wait`ers subscribe to the channel. Finished jobs are
//! dropped with [`JobRegistry::forget`] once their status has expired.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tremor_model::{JobId, JobStatus, JobTransition};

struct JobEntry {
    status: watch::Sender<JobStatus>,
    transitions: Vec<JobTransition>,
}

/// Shared table of job statuses.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted job in the PENDING state.
    pub fn insert(&self, id: JobId) -> JobStatus {
        let status = JobStatus::pending(id);
        let (sender, _) = watch::channel(status.clone());
        let entry = JobEntry {
            status: sender,
            transitions: vec![JobTransition::from(&status)],
        };
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
        status
    }

    /// Apply a change to a job's status and publish it.
    ///
    /// Returns the published status, or `None` for unknown jobs.
    pub fn update(&self, id: JobId, change: impl FnOnce(&mut JobStatus)) -> Option<JobStatus> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let entry = jobs.get_mut(&id)?;

        let mut status = entry.status.borrow().clone();
        change(&mut status);
        status.updated_at = Utc::now();

        entry.transitions.push(JobTransition::from(&status));
        entry.status.send_replace(status.clone());
        Some(status)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
    }

    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.status.subscribe())
    }

    /// Every state the job has published, oldest first.
    pub fn transitions(&self, id: JobId) -> Vec<JobTransition> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.transitions.clone())
            .unwrap_or_default()
    }

    /// Drop a finished job with its channel and transition log.
    ///
    /// Jobs still in flight are kept. Returns whether the job was removed.
    pub fn forget(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let finished = jobs
            .get(&id)
            .is_some_and(|entry| entry.status.borrow().is_terminal());
        if finished {
            jobs.remove(&id);
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tremor_model::{JobOutcome, JobStage, JobState};

    #[test]
    fn test_insert_publishes_pending() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        registry.insert(id);

        let status = registry.status(id).unwrap();
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(registry.transitions(id).len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_is_visible_to_subscribers() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        registry.insert(id);
        let mut rx = registry.subscribe(id).unwrap();

        registry.update(id, |s| {
            s.state = JobStage::AnalyzingFrames.state();
            s.progress_percent = JobStage::AnalyzingFrames.percent();
        });

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().progress_percent, 25);
        assert_eq!(registry.transitions(id).len(), 2);
    }

    #[test]
    fn test_forget_drops_only_finished_jobs() {
        let registry = JobRegistry::new();
        let running = JobId::new();
        let finished = JobId::new();
        registry.insert(running);
        registry.insert(finished);
        registry.update(running, |s| {
            s.state = JobStage::AnalyzingFrames.state();
            s.progress_percent = JobStage::AnalyzingFrames.percent();
        });
        registry.update(finished, |s| {
            s.state = JobState::Failure;
            s.outcome = Some(JobOutcome::Failed {
                error: "storage unavailable".to_string(),
                attempts: 3,
            });
        });

        assert!(!registry.forget(running));
        assert!(registry.forget(finished));
        assert!(!registry.forget(finished));

        assert!(registry.status(finished).is_none());
        assert!(registry.transitions(finished).is_empty());
        assert!(registry.status(running).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert!(registry.status(id).is_none());
        assert!(registry.update(id, |_| {}).is_none());
        assert!(registry.transitions(id).is_empty());
        assert!(registry.is_empty());
    }
}
