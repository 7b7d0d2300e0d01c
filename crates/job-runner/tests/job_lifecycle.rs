//! Retry state machine of the job runner, driven by scripted analyzers
//! and a store whose writes can be made to fail.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::NamedTempFile;
use tremor_common::{Deadline, TimeLimits, TremorError, TremorResult};
use tremor_jobs::{Analyzer, JobRunner, RunnerConfig};
use tremor_model::{
    AnalysisResult, ClassificationResult, DetectedFindings, Interpretation, JobId, JobOutcome,
    JobRequest, JobState, JobStatus, ResultId, Severity, TremorType,
};
use tremor_store::{MemoryStore, ResultStore, StoredResult};

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        concurrency: 2,
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
        limits: TimeLimits::new(Duration::from_secs(5), Duration::from_secs(10)),
        result_expiry: Duration::from_secs(60),
    }
}

fn clip() -> NamedTempFile {
    tempfile::Builder::new()
        .suffix(".mp4")
        .tempfile()
        .expect("temp clip")
}

fn sample_result(request: &JobRequest) -> AnalysisResult {
    let recorded_at = NaiveDate::from_ymd_opt(2025, 3, 14)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid test date");
    AnalysisResult::detected(
        request.file_name(),
        &request.patient_id,
        recorded_at,
        DetectedFindings {
            amplitude: 0.0031,
            dominant_frequency_hz: 5.2,
            classification: ClassificationResult {
                tremor_type: TremorType::Parkinsonian,
                severity: Severity::Moderate,
            },
            graph: None,
            interpretation: Interpretation {
                text: "4–6 Hz oscillation: possible pathological tremor".to_string(),
                alert: Some("suspected tremor detected".to_string()),
            },
        },
    )
}

/// Fails the first `failures` calls with the error built by `error`.
struct ScriptedAnalyzer {
    calls: AtomicU32,
    failures: u32,
    error: fn(u32) -> TremorError,
    delay: Duration,
}

impl ScriptedAnalyzer {
    fn succeeding() -> Self {
        Self::failing(0, |_| TremorError::signal("unused"))
    }

    fn failing(failures: u32, error: fn(u32) -> TremorError) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            error,
            delay: Duration::ZERO,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&self, request: &JobRequest, _deadline: &Deadline) -> TremorResult<AnalysisResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if call <= self.failures {
            return Err((self.error)(call));
        }
        Ok(sample_result(request))
    }
}

/// Memory store whose first `save_failures` saves and `link_failures`
/// links fail. Every save takes at least `save_delay`.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    save_failures: AtomicU32,
    link_failures: AtomicU32,
    save_delay: Duration,
}

impl FlakyStore {
    fn failing_saves(n: u32) -> Self {
        let store = Self::default();
        store.save_failures.store(n, Ordering::SeqCst);
        store
    }

    fn failing_links(n: u32) -> Self {
        let store = Self::default();
        store.link_failures.store(n, Ordering::SeqCst);
        store
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ResultStore for FlakyStore {
    fn save_result(&self, patient_id: &str, result: &AnalysisResult) -> TremorResult<ResultId> {
        if !self.save_delay.is_zero() {
            std::thread::sleep(self.save_delay);
        }
        if Self::take_failure(&self.save_failures) {
            return Err(TremorError::storage("database unavailable"));
        }
        self.inner.save_result(patient_id, result)
    }

    fn link(&self, patient_id: &str, result_id: ResultId) -> TremorResult<()> {
        if Self::take_failure(&self.link_failures) {
            return Err(TremorError::storage("patient record update failed"));
        }
        self.inner.link(patient_id, result_id)
    }

    fn discard(&self, result_id: ResultId) -> TremorResult<()> {
        self.inner.discard(result_id)
    }

    fn get(&self, result_id: ResultId) -> TremorResult<Option<AnalysisResult>> {
        self.inner.get(result_id)
    }

    fn results_for_patient(&self, patient_id: &str) -> TremorResult<Vec<StoredResult>> {
        self.inner.results_for_patient(patient_id)
    }
}

async fn finish(runner: &JobRunner, id: JobId) -> JobStatus {
    tokio::time::timeout(Duration::from_secs(10), runner.wait(id))
        .await
        .expect("job finished in time")
        .expect("job is known")
}

#[tokio::test]
async fn storage_failing_twice_succeeds_on_third_attempt() {
    let clip = clip();
    let analyzer = Arc::new(ScriptedAnalyzer::succeeding());
    let store = Arc::new(FlakyStore::failing_saves(2));
    let runner = JobRunner::start(analyzer.clone(), store.clone(), fast_config());

    let id = runner
        .submit(JobRequest::new(clip.path(), 62, "p-1"))
        .unwrap();
    let status = finish(&runner, id).await;

    assert_eq!(status.state, JobState::Success);
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.retry_count, 2);
    assert_eq!(status.attempt, 3);
    assert_eq!(status.next_retry_at, None);
    assert_eq!(analyzer.calls(), 3);

    let result_id = status.result_id().expect("stored");
    let history = store.results_for_patient("p-1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, result_id);

    runner.shutdown().await;
}

#[tokio::test]
async fn always_failing_job_keeps_last_error() {
    let clip = clip();
    let analyzer = Arc::new(ScriptedAnalyzer::failing(u32::MAX, |call| {
        TremorError::signal(format!("filter diverged on call {call}"))
    }));
    let store = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(analyzer.clone(), store.clone(), fast_config());

    let id = runner
        .submit(JobRequest::new(clip.path(), 45, "p-2"))
        .unwrap();
    let status = finish(&runner, id).await;

    assert_eq!(status.state, JobState::Failure);
    assert_eq!(analyzer.calls(), 3);
    assert_eq!(status.retry_count, 2);
    match status.outcome {
        Some(JobOutcome::Failed { error, attempts }) => {
            assert_eq!(attempts, 3);
            assert!(error.contains("call 3"), "error was {error}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(store.result_count(), 0);

    runner.shutdown().await;
}

#[tokio::test]
async fn progress_never_regresses_within_an_attempt() {
    let clip = clip();
    let analyzer = Arc::new(ScriptedAnalyzer::succeeding());
    let store = Arc::new(FlakyStore::failing_saves(1));
    let runner = JobRunner::start(analyzer, store, fast_config());

    let id = runner
        .submit(JobRequest::new(clip.path(), 30, "p-3"))
        .unwrap();
    finish(&runner, id).await;

    let transitions = runner.transitions(id);
    for attempt in 1..=2 {
        let percents: Vec<u8> = transitions
            .iter()
            .filter(|t| t.attempt == attempt)
            .map(|t| t.progress_percent)
            .collect();
        assert!(!percents.is_empty());
        assert_eq!(percents[0], 0);
        assert!(
            percents.windows(2).all(|w| w[0] <= w[1]),
            "attempt {attempt} regressed: {percents:?}"
        );
    }

    let first: Vec<JobState> = transitions
        .iter()
        .filter(|t| t.attempt == 1)
        .map(|t| t.state)
        .collect();
    assert_eq!(
        first,
        vec![
            JobState::Pending,
            JobState::Progress,
            JobState::Progress,
            JobState::Failure
        ]
    );

    let last: Vec<(JobState, u8)> = transitions
        .iter()
        .filter(|t| t.attempt == 2)
        .map(|t| (t.state, t.progress_percent))
        .collect();
    assert_eq!(
        last,
        vec![
            (JobState::Pending, 0),
            (JobState::Progress, 25),
            (JobState::Progress, 75),
            (JobState::Success, 100)
        ]
    );

    runner.shutdown().await;
}

#[tokio::test]
async fn fatal_error_ends_job_after_one_attempt() {
    let clip = clip();
    let analyzer = Arc::new(ScriptedAnalyzer::failing(u32::MAX, |_| {
        TremorError::time_limit("soft limit of 240s reached during frame tracking")
    }));
    let runner = JobRunner::start(analyzer.clone(), Arc::new(MemoryStore::new()), fast_config());

    let id = runner
        .submit(JobRequest::new(clip.path(), 70, "p-4"))
        .unwrap();
    let status = finish(&runner, id).await;

    assert_eq!(status.state, JobState::Failure);
    assert_eq!(status.retry_count, 0);
    assert_eq!(analyzer.calls(), 1);
    assert!(status.error().unwrap().contains("soft limit"));

    runner.shutdown().await;
}

#[tokio::test]
async fn hard_limit_abandons_the_attempt() {
    let clip = clip();
    let mut analyzer = ScriptedAnalyzer::succeeding();
    analyzer.delay = Duration::from_millis(300);
    let analyzer = Arc::new(analyzer);
    let config = RunnerConfig {
        limits: TimeLimits::new(Duration::from_millis(20), Duration::from_millis(50)),
        ..fast_config()
    };
    let store = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(analyzer.clone(), store.clone(), config);

    let id = runner
        .submit(JobRequest::new(clip.path(), 70, "p-5"))
        .unwrap();
    let status = finish(&runner, id).await;

    assert_eq!(status.state, JobState::Failure);
    assert_eq!(analyzer.calls(), 1);
    assert!(status.error().unwrap().contains("hard time limit"));
    assert!(store.results_for_patient("p-5").unwrap().is_empty());

    runner.shutdown().await;
}

#[tokio::test]
async fn save_outliving_the_hard_limit_is_not_linked() {
    let clip = clip();
    let store = Arc::new(FlakyStore {
        save_delay: Duration::from_millis(200),
        ..FlakyStore::default()
    });
    let config = RunnerConfig {
        limits: TimeLimits::new(Duration::from_millis(50), Duration::from_millis(80)),
        ..fast_config()
    };
    let runner = JobRunner::start(Arc::new(ScriptedAnalyzer::succeeding()), store.clone(), config);

    let id = runner
        .submit(JobRequest::new(clip.path(), 50, "p-8"))
        .unwrap();
    let status = finish(&runner, id).await;
    assert_eq!(status.state, JobState::Failure);
    assert!(status.error().unwrap().contains("hard time limit reached during persistence"));

    // Let the abandoned save finish on its blocking thread.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.results_for_patient("p-8").unwrap().is_empty());
    assert_eq!(store.inner.result_count(), 0);

    runner.shutdown().await;
}

#[tokio::test]
async fn finished_jobs_expire_while_running_jobs_stay() {
    let first = clip();
    let second = clip();
    let mut analyzer = ScriptedAnalyzer::succeeding();
    analyzer.delay = Duration::from_millis(300);
    let config = RunnerConfig {
        concurrency: 1,
        result_expiry: Duration::from_millis(20),
        ..fast_config()
    };
    let runner = JobRunner::start(Arc::new(analyzer), Arc::new(MemoryStore::new()), config);

    let done = runner
        .submit(JobRequest::new(first.path(), 50, "p-9"))
        .unwrap();
    let running = runner
        .submit(JobRequest::new(second.path(), 50, "p-9"))
        .unwrap();

    assert_eq!(finish(&runner, done).await.state, JobState::Success);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(runner.status(done).is_none());
    assert!(runner.transitions(done).is_empty());
    let in_flight = runner.status(running).expect("running job kept");
    assert!(!in_flight.is_terminal());

    assert_eq!(finish(&runner, running).await.state, JobState::Success);
    runner.shutdown().await;
}

#[tokio::test]
async fn failed_link_leaves_no_orphaned_result() {
    let clip = clip();
    let store = Arc::new(FlakyStore::failing_links(1));
    let runner = JobRunner::start(
        Arc::new(ScriptedAnalyzer::succeeding()),
        store.clone(),
        fast_config(),
    );

    let id = runner
        .submit(JobRequest::new(clip.path(), 50, "p-6"))
        .unwrap();
    let status = finish(&runner, id).await;

    assert_eq!(status.state, JobState::Success);
    assert_eq!(status.retry_count, 1);
    assert_eq!(store.inner.result_count(), 1);
    assert_eq!(store.results_for_patient("p-6").unwrap().len(), 1);

    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_jobs_all_complete() {
    let clips: Vec<NamedTempFile> = (0..4).map(|_| clip()).collect();
    let store = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(
        Arc::new(ScriptedAnalyzer::succeeding()),
        store.clone(),
        fast_config(),
    );

    let ids: Vec<JobId> = clips
        .iter()
        .enumerate()
        .map(|(i, clip)| {
            runner
                .submit(JobRequest::new(clip.path(), 40, format!("p-{i}")))
                .unwrap()
        })
        .collect();

    for id in ids {
        assert_eq!(finish(&runner, id).await.state, JobState::Success);
    }
    assert_eq!(store.result_count(), 4);

    runner.shutdown().await;
}

#[tokio::test]
async fn submission_is_validated_synchronously() {
    let clip = clip();
    let runner = JobRunner::start(
        Arc::new(ScriptedAnalyzer::succeeding()),
        Arc::new(MemoryStore::new()),
        fast_config(),
    );

    let missing = runner.submit(JobRequest::new("/nonexistent/clip.mp4", 40, "p-7"));
    assert!(matches!(missing, Err(TremorError::FileNotFound { .. })));

    let bad_patient = runner.submit(JobRequest::new(clip.path(), 40, "../p-7"));
    assert!(matches!(bad_patient, Err(TremorError::InvalidInput { .. })));

    let id = runner
        .submit(JobRequest::new(clip.path(), 40, "p-7"))
        .unwrap();
    let status = runner.status(id).expect("registered");
    assert!(!status.is_terminal());

    finish(&runner, id).await;
    runner.shutdown().await;

    assert!(runner
        .submit(JobRequest::new(clip.path(), 40, "p-7"))
        .is_err());
    assert!(runner.status(JobId::new()).is_none());
}
