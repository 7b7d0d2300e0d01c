//! Retrying job runner.
//!
//! Jobs wait in an unbounded queue drained by a fixed pool of workers.
//! One attempt runs the analyzer and the persistence step on the blocking
//! pool, under the hard time limit, and yields an [`AttemptOutcome`].
//! A retryable failure publishes FAILURE with `next_retry_at`, and after
//! the retry delay the job re-enters PENDING at the back of the queue.
//! The job is terminal once it succeeds, fails fatally, or exhausts
//! `max_attempts`. Terminal statuses stay queryable for `result_expiry`.
//!
//! ```text
//! PENDING(0) ─▶ PROGRESS(25) ─▶ PROGRESS(75) ─▶ SUCCESS(100)
//!     ▲              │               │
//!     │              └──── error ────┴─▶ FAILURE ─(retry_delay)─┐
//!     └─────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tremor_common::{TimeLimits, TremorError, TremorResult, WorkerConfig};
use tremor_model::{
    JobId, JobOutcome, JobRequest, JobStage, JobState, JobStatus, JobTransition, ResultId,
};
use tremor_store::{validate_patient_id, ResultStore};

use crate::pipeline::{persist_unless_abandoned, Analyzer};
use crate::registry::JobRegistry;

/// Worker pool and retry settings.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub concurrency: usize,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub limits: TimeLimits,
    /// How long a finished job's status is kept.
    pub result_expiry: Duration,
}

impl From<&WorkerConfig> for RunnerConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
            limits: TimeLimits::new(config.soft_time_limit(), config.hard_time_limit()),
            result_expiry: config.result_expiry(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// How one attempt ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(ResultId),
    /// Worth another attempt while the budget lasts.
    Retryable(TremorError),
    /// Ends the job immediately.
    Fatal(TremorError),
}

impl AttemptOutcome {
    pub fn from_error(err: TremorError) -> Self {
        if err.is_retryable() {
            Self::Retryable(err)
        } else {
            Self::Fatal(err)
        }
    }
}

struct QueuedJob {
    id: JobId,
    request: JobRequest,
    attempt: u32,
}

struct Shared {
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn ResultStore>,
    registry: Arc<JobRegistry>,
    config: RunnerConfig,
    runtime: tokio::runtime::Handle,
    /// Taken on shutdown, which closes the queue.
    queue: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
}

impl Shared {
    fn enqueue(&self, job: QueuedJob) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|queue| queue.send(job).is_ok())
    }

    fn publish_stage(&self, id: JobId, stage: JobStage) {
        self.registry.update(id, |status| {
            status.state = stage.state();
            status.progress_percent = stage.percent();
            status.status_message = stage.message().to_string();
        });
        tracing::debug!(job_id = %id, percent = stage.percent(), "{}", stage.message());
    }

    fn complete(&self, id: JobId, attempt: u32, result_id: ResultId) {
        self.registry.update(id, |status| {
            status.state = JobStage::Completed.state();
            status.progress_percent = JobStage::Completed.percent();
            status.status_message = JobStage::Completed.message().to_string();
            status.next_retry_at = None;
            status.outcome = Some(JobOutcome::Stored { result_id });
        });
        tracing::info!(job_id = %id, attempt, result_id = %result_id, "Job succeeded");
        self.expire_later(id);
    }

    fn fail(&self, id: JobId, attempts: u32, error: &TremorError) {
        self.registry.update(id, |status| {
            status.state = JobState::Failure;
            status.status_message = format!("Analysis failed: {error}");
            status.next_retry_at = None;
            status.outcome = Some(JobOutcome::Failed {
                error: error.to_string(),
                attempts,
            });
        });
        tracing::error!(job_id = %id, attempts, error = %error, "Job failed");
        self.expire_later(id);
    }

    fn expire_later(&self, id: JobId) {
        let registry = self.registry.clone();
        let expiry = self.config.result_expiry;
        self.runtime.spawn(async move {
            tokio::time::sleep(expiry).await;
            if registry.forget(id) {
                tracing::debug!(job_id = %id, "Expired job status");
            }
        });
    }
}

/// Background executor for analysis jobs.
pub struct JobRunner {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobRunner {
    /// Start the worker pool. Must be called inside a Tokio runtime.
    pub fn start(
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn ResultStore>,
        config: RunnerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared {
            analyzer,
            store,
            registry: Arc::new(JobRegistry::new()),
            config,
            runtime: tokio::runtime::Handle::current(),
            queue: Mutex::new(Some(sender)),
        });

        let concurrency = config.concurrency.max(1);
        let workers = (0..concurrency)
            .map(|worker| tokio::spawn(worker_loop(worker, receiver.clone(), shared.clone())))
            .collect();

        tracing::info!(
            concurrency,
            max_attempts = config.max_attempts,
            retry_delay_secs = config.retry_delay.as_secs_f64(),
            soft_limit_secs = config.limits.soft.as_secs(),
            hard_limit_secs = config.limits.hard.as_secs(),
            result_expiry_secs = config.result_expiry.as_secs(),
            "Job runner started"
        );

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Accept a request and queue it. Returns as soon as the job is queued.
    pub fn submit(&self, request: JobRequest) -> TremorResult<JobId> {
        if !request.video_path.exists() {
            return Err(TremorError::FileNotFound {
                path: request.video_path.clone(),
            });
        }
        validate_patient_id(&request.patient_id)?;

        let id = JobId::new();
        self.shared.registry.insert(id);
        let file = request.file_name();
        let patient_age = request.patient_age;

        if !self.shared.enqueue(QueuedJob {
            id,
            request,
            attempt: 1,
        }) {
            let err = TremorError::job("job runner is shut down");
            self.shared.fail(id, 0, &err);
            return Err(err);
        }

        tracing::info!(job_id = %id, file = %file, patient_age, "Job submitted");
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.shared.registry.status(id)
    }

    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.shared.registry.subscribe(id)
    }

    /// Every state the job has published, oldest first.
    pub fn transitions(&self, id: JobId) -> Vec<JobTransition> {
        self.shared.registry.transitions(id)
    }

    /// Wait until the job is terminal and return its final status.
    pub async fn wait(&self, id: JobId) -> TremorResult<JobStatus> {
        let mut receiver = self
            .subscribe(id)
            .ok_or_else(|| TremorError::job(format!("unknown job {id}")))?;
        loop {
            {
                let status = receiver.borrow_and_update();
                if status.is_terminal() {
                    return Ok(status.clone());
                }
            }
            receiver
                .changed()
                .await
                .map_err(|_| TremorError::job(format!("status channel of job {id} closed")))?;
        }
    }

    /// Stop accepting jobs and wait for queued work to drain.
    ///
    /// Retries still waiting on their delay fail instead of re-entering
    /// the queue.
    pub async fn shutdown(&self) {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Worker ended abnormally");
            }
        }
        tracing::info!("Job runner stopped");
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    shared: Arc<Shared>,
) {
    tracing::debug!(worker, "Worker started");
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        process(&shared, job).await;
    }
    tracing::debug!(worker, "Worker stopped");
}

async fn process(shared: &Arc<Shared>, job: QueuedJob) {
    let QueuedJob {
        id,
        request,
        attempt,
    } = job;
    let max_attempts = shared.config.max_attempts;
    tracing::info!(job_id = %id, attempt, max_attempts, "Starting attempt");

    match run_attempt(shared, id, &request).await {
        AttemptOutcome::Success(result_id) => shared.complete(id, attempt, result_id),
        AttemptOutcome::Fatal(error) => shared.fail(id, attempt, &error),
        AttemptOutcome::Retryable(error) if attempt < max_attempts => {
            schedule_retry(shared, id, request, attempt, error)
        }
        AttemptOutcome::Retryable(error) => shared.fail(id, attempt, &error),
    }
}

async fn run_attempt(shared: &Arc<Shared>, id: JobId, request: &JobRequest) -> AttemptOutcome {
    let limits = shared.config.limits;
    let deadline = limits.start();

    shared.publish_stage(id, JobStage::AnalyzingFrames);
    let analyzer = shared.analyzer.clone();
    let job_request = request.clone();
    let result = match run_blocking(limits.hard, "analysis", move |_| {
        analyzer.analyze(&job_request, &deadline)
    })
    .await
    {
        Ok(result) => result,
        Err(outcome) => return outcome,
    };

    shared.publish_stage(id, JobStage::SavingResults);
    let store = shared.store.clone();
    let patient_id = request.patient_id.clone();
    let remaining = limits.hard.saturating_sub(deadline.elapsed());
    match run_blocking(remaining, "persistence", move |abandoned| {
        persist_unless_abandoned(store.as_ref(), &patient_id, &result, abandoned)
    })
    .await
    {
        Ok(result_id) => AttemptOutcome::Success(result_id),
        Err(outcome) => outcome,
    }
}

/// Run blocking work on the blocking pool under a time limit.
///
/// An expired limit abandons the work and raises the flag passed to it.
/// The thread itself cannot be killed; it stops at its next deadline or
/// flag check. A link already in flight when the limit fires still lands.
async fn run_blocking<T, F>(limit: Duration, stage: &'static str, work: F) -> Result<T, AttemptOutcome>
where
    T: Send + 'static,
    F: FnOnce(&AtomicBool) -> TremorResult<T> + Send + 'static,
{
    let abandoned = Arc::new(AtomicBool::new(false));
    let flag = abandoned.clone();
    let task = tokio::task::spawn_blocking(move || work(&flag));
    match tokio::time::timeout(limit, task).await {
        Err(_) => {
            abandoned.store(true, Ordering::SeqCst);
            Err(AttemptOutcome::Fatal(TremorError::time_limit(format!(
                "hard time limit reached during {stage}"
            ))))
        }
        Ok(Err(join_err)) => Err(AttemptOutcome::Retryable(TremorError::job(format!(
            "{stage} task failed: {join_err}"
        )))),
        Ok(Ok(Err(err))) => Err(AttemptOutcome::from_error(err)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

fn schedule_retry(
    shared: &Arc<Shared>,
    id: JobId,
    request: JobRequest,
    attempt: u32,
    error: TremorError,
) {
    let delay = shared.config.retry_delay;
    let max_attempts = shared.config.max_attempts;
    let next_retry_at = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay));

    shared.registry.update(id, |status| {
        status.state = JobState::Failure;
        status.status_message = format!("Attempt {attempt} failed: {error}");
        status.retry_count = attempt;
        status.next_retry_at = next_retry_at;
    });
    tracing::warn!(
        job_id = %id,
        attempt,
        max_attempts,
        retry_in_secs = delay.as_secs_f64(),
        error = %error,
        "Attempt failed, retry scheduled"
    );

    let shared = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let next = attempt + 1;
        shared.registry.update(id, |status| {
            status.state = JobStage::Queued.state();
            status.progress_percent = JobStage::Queued.percent();
            status.status_message = format!("Retrying (attempt {next} of {max_attempts})");
            status.attempt = next;
            status.next_retry_at = None;
        });
        if !shared.enqueue(QueuedJob {
            id,
            request,
            attempt: next,
        }) {
            shared.fail(
                id,
                attempt,
                &TremorError::job(format!("job runner shut down before retry; last error: {error}")),
            );
        }
    });
}
