//! Analyze a clip in the foreground.

use std::path::PathBuf;

use tremor_common::{AppConfig, TimeLimits};
use tremor_jobs::{persist, AnalysisPipeline, Analyzer};
use tremor_model::JobRequest;
use tremor_store::FileStore;

use super::print_result;

pub fn run(
    config: &AppConfig,
    video: PathBuf,
    age: u32,
    patient: String,
    save: bool,
    render_graph: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = config.clone();
    config.analysis.render_graphs &= render_graph;

    let pipeline = AnalysisPipeline::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to load models: {e}"))?;
    let request = JobRequest::new(&video, age, patient);
    let limits = TimeLimits::new(
        config.worker.soft_time_limit(),
        config.worker.hard_time_limit(),
    );

    tracing::info!(video = %video.display(), age, "Analyzing clip");
    let result = pipeline.analyze(&request, &limits.start())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if save {
        let store = FileStore::open(config.store_dir())?;
        let result_id = persist(&store, &request.patient_id, &result)?;
        println!("Saved result {result_id} for patient {}", request.patient_id);
    }

    Ok(())
}
