//! Job submission and status types.
//!
//! A job moves through `PENDING -> PROGRESS(25) -> PROGRESS(75) -> SUCCESS`
//! on the happy path. A failed attempt publishes `FAILURE` and, while the
//! retry budget lasts, re-enters `PENDING` for the next attempt. The job is
//! terminal once it carries a [`JobOutcome`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::ResultId;

/// Identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A video submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub video_path: PathBuf,
    pub patient_age: u32,
    pub patient_id: String,
}

impl JobRequest {
    pub fn new(video_path: impl AsRef<Path>, patient_age: u32, patient_id: impl Into<String>) -> Self {
        Self {
            video_path: video_path.as_ref().to_path_buf(),
            patient_age,
            patient_id: patient_id.into(),
        }
    }

    /// File name recorded on the result.
    pub fn file_name(&self) -> String {
        self.video_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.video_path.to_string_lossy().into_owned())
    }
}

/// Externally visible job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Checkpoints of one attempt, each with a fixed progress percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStage {
    Queued,
    AnalyzingFrames,
    SavingResults,
    Completed,
}

impl JobStage {
    pub fn percent(&self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::AnalyzingFrames => 25,
            JobStage::SavingResults => 75,
            JobStage::Completed => 100,
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobStage::Queued => JobState::Pending,
            JobStage::AnalyzingFrames | JobStage::SavingResults => JobState::Progress,
            JobStage::Completed => JobState::Success,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JobStage::Queued => "Queued",
            JobStage::AnalyzingFrames => "Analyzing video frames",
            JobStage::SavingResults => "Saving analysis results",
            JobStage::Completed => "Analysis complete",
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Stored { result_id: ResultId },
    Failed { error: String, attempts: u32 },
}

/// Snapshot of a job as seen by pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub progress_percent: u8,
    pub status_message: String,
    /// Current attempt, starting at 1.
    pub attempt: u32,
    /// Attempts that failed and were retried.
    pub retry_count: u32,
    /// When the next attempt starts, while one is scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// Status of a job that was just accepted.
    pub fn pending(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Pending,
            progress_percent: JobStage::Queued.percent(),
            status_message: JobStage::Queued.message().to_string(),
            attempt: 1,
            retry_count: 0,
            next_retry_at: None,
            outcome: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the job reached SUCCESS or exhausted its retries.
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn result_id(&self) -> Option<ResultId> {
        match &self.outcome {
            Some(JobOutcome::Stored { result_id }) => Some(*result_id),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Failed { error, .. }) => Some(error),
            _ => None,
        }
    }
}

/// One recorded state change of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransition {
    pub attempt: u32,
    pub state: JobState,
    pub progress_percent: u8,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&JobStatus> for JobTransition {
    fn from(status: &JobStatus) -> Self {
        Self {
            attempt: status.attempt,
            state: status.state,
            progress_percent: status.progress_percent,
            message: status.status_message.clone(),
            at: status.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            JobStage::Queued,
            JobStage::AnalyzingFrames,
            JobStage::SavingResults,
            JobStage::Completed,
        ];
        let percents: Vec<u8> = stages.iter().map(JobStage::percent).collect();
        assert_eq!(percents, vec![0, 25, 75, 100]);
        assert_eq!(JobStage::Completed.state(), JobState::Success);
    }

    #[test]
    fn test_state_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&JobState::Progress).unwrap(),
            "\"PROGRESS\""
        );
    }

    #[test]
    fn test_pending_status_is_not_terminal() {
        let status = JobStatus::pending(JobId::new());
        assert!(!status.is_terminal());
        assert_eq!(status.attempt, 1);
        assert_eq!(status.progress_percent, 0);
        assert!(status.result_id().is_none());
    }

    #[test]
    fn test_file_name_from_path() {
        let request = JobRequest::new("/uploads/visit_03.mp4", 62, "p-7");
        assert_eq!(request.file_name(), "visit_03.mp4");
    }
}
