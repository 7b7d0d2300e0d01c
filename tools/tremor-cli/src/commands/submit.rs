//! Run a clip through the job runner and follow its status.

use std::path::PathBuf;
use std::sync::Arc;

use tremor_common::AppConfig;
use tremor_jobs::{AnalysisPipeline, JobRunner, RunnerConfig};
use tremor_model::{JobRequest, JobStatus};
use tremor_store::FileStore;

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    age: u32,
    patient: String,
) -> anyhow::Result<()> {
    let pipeline = AnalysisPipeline::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to load models: {e}"))?;
    let store = FileStore::open(config.store_dir())?;
    let runner = JobRunner::start(
        Arc::new(pipeline),
        Arc::new(store),
        RunnerConfig::from(&config.worker),
    );

    let id = runner.submit(JobRequest::new(&video, age, patient))?;
    println!("Submitted job {id}");

    let mut updates = runner
        .subscribe(id)
        .ok_or_else(|| anyhow::anyhow!("Job {id} is not registered"))?;
    let status = loop {
        let status = updates.borrow_and_update().clone();
        print_status(&status);
        if status.is_terminal() {
            break status;
        }
        updates.changed().await?;
    };
    runner.shutdown().await;

    match (status.result_id(), status.error()) {
        (Some(result_id), _) => {
            println!("Job {id} succeeded, result {result_id}");
            Ok(())
        }
        (None, Some(error)) => Err(anyhow::anyhow!(
            "Job {id} failed after {} attempt(s): {error}",
            status.attempt
        )),
        (None, None) => Err(anyhow::anyhow!("Job {id} ended without an outcome")),
    }
}

fn print_status(status: &JobStatus) {
    let retry = status
        .next_retry_at
        .map(|at| format!(" (next attempt at {})", at.format("%H:%M:%S")))
        .unwrap_or_default();
    println!(
        "  [attempt {}] {:<8} {:>3}%  {}{}",
        status.attempt, status.state, status.progress_percent, status.status_message, retry
    );
}
