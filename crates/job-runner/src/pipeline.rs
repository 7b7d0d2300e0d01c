//! One-clip analysis pipeline.
//!
//! Stages run strictly in order: wrist tracking, signal conditioning,
//! spectral summary, feature extraction, classification, interpretation.
//! When fewer than [`MIN_TRACKED_SAMPLES`] frames contain a hand, the
//! pipeline stops after tracking and returns a "hand not detected" result.
//!
//! Both models are injected. They are loaded once and shared read-only by
//! every job; only the landmark session is per clip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tremor_capture::{
    track_wrist, FfmpegOpener, LandmarkModel, SidecarLandmarkModel, VideoOpener,
};
use tremor_common::{AppConfig, Deadline, TremorError, TremorResult};
use tremor_model::{
    AnalysisResult, DetectedFindings, JobRequest, Measurement, ResultId, MIN_TRACKED_SAMPLES,
};
use tremor_processing::classifier::classify;
use tremor_processing::features::FEATURE_SET;
use tremor_processing::{
    condition, extract_features, interpret, ForestClassifier, SpectralSummary, SpectrumConfig,
    TremorClassifier,
};
use tremor_render::GraphWriter;
use tremor_store::ResultStore;

/// Produces an analysis result for one request.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, request: &JobRequest, deadline: &Deadline) -> TremorResult<AnalysisResult>;
}

/// The production analyzer.
pub struct AnalysisPipeline {
    opener: Arc<dyn VideoOpener>,
    landmarks: Arc<dyn LandmarkModel>,
    classifier: Arc<dyn TremorClassifier>,
    spectrum: SpectrumConfig,
    graphs: Option<GraphWriter>,
}

impl AnalysisPipeline {
    pub fn new(
        opener: Arc<dyn VideoOpener>,
        landmarks: Arc<dyn LandmarkModel>,
        classifier: Arc<dyn TremorClassifier>,
    ) -> Self {
        Self {
            opener,
            landmarks,
            classifier,
            spectrum: SpectrumConfig::default(),
            graphs: None,
        }
    }

    pub fn with_spectrum(mut self, spectrum: SpectrumConfig) -> Self {
        self.spectrum = spectrum;
        self
    }

    /// Render a signal graph for every detected result.
    pub fn with_graphs(mut self, writer: GraphWriter) -> Self {
        self.graphs = Some(writer);
        self
    }

    /// Load both models and build the pipeline from configuration.
    pub fn from_config(config: &AppConfig) -> TremorResult<Self> {
        let classifier = ForestClassifier::load(&config.models.classifier_path)?;
        if classifier.feature_set() != FEATURE_SET {
            return Err(TremorError::config(format!(
                "classifier {} was trained on feature set '{}', this build extracts '{}'",
                config.models.classifier_path.display(),
                classifier.feature_set(),
                FEATURE_SET
            )));
        }
        let landmarks = SidecarLandmarkModel::new(config.models.landmarker.clone())?;

        let mut pipeline = Self::new(
            Arc::new(FfmpegOpener),
            Arc::new(landmarks),
            Arc::new(classifier),
        )
        .with_spectrum(SpectrumConfig {
            exclude_dc: config.analysis.exclude_dc,
        });
        if config.analysis.render_graphs {
            pipeline = pipeline.with_graphs(GraphWriter::new(config.graphs_dir()));
        }
        Ok(pipeline)
    }
}

impl Analyzer for AnalysisPipeline {
    fn analyze(&self, request: &JobRequest, deadline: &Deadline) -> TremorResult<AnalysisResult> {
        if !request.video_path.exists() {
            return Err(TremorError::FileNotFound {
                path: request.video_path.clone(),
            });
        }
        let recorded_at = Local::now().naive_local();
        let file = request.file_name();

        let mut video = self.opener.open(&request.video_path)?;
        let mut session = match self.landmarks.open_session() {
            Ok(session) => session,
            Err(e) => {
                video.release();
                return Err(e);
            }
        };
        let trajectory = track_wrist(video.as_mut(), session.as_mut(), deadline)?;

        if !trajectory.is_trackable() {
            tracing::info!(
                file = %file,
                samples = trajectory.len(),
                required = MIN_TRACKED_SAMPLES,
                "Hand not detected in enough frames"
            );
            return Ok(AnalysisResult::undetected(
                file,
                &request.patient_id,
                recorded_at,
                interpret(&Measurement::Undetected),
            ));
        }

        deadline.check("signal analysis")?;
        let signal = condition(&trajectory, request.patient_age)?;
        let summary = SpectralSummary::analyze(&signal, &self.spectrum)?;
        let features = extract_features(&signal)?;
        let classification = classify(self.classifier.as_ref(), &features)?;
        let interpretation = interpret(&summary.into_measurement());

        let graph = self.graphs.as_ref().and_then(|writer| {
            match writer.write(&signal, recorded_at) {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "Signal graph not rendered");
                    None
                }
            }
        });

        tracing::info!(
            file = %file,
            amplitude = summary.amplitude,
            dominant_frequency_hz = summary.dominant_frequency_hz,
            tremor_type = %classification.tremor_type,
            severity = %classification.severity,
            alert = interpretation.alert.is_some(),
            "Analysis complete"
        );

        Ok(AnalysisResult::detected(
            file,
            &request.patient_id,
            recorded_at,
            DetectedFindings {
                amplitude: summary.amplitude,
                dominant_frequency_hz: summary.dominant_frequency_hz,
                classification,
                graph,
                interpretation,
            },
        ))
    }
}

/// Store a result and link it to the patient's history.
///
/// A failed link discards the stored result so no orphan is left behind.
pub fn persist(
    store: &dyn ResultStore,
    patient_id: &str,
    result: &AnalysisResult,
) -> TremorResult<ResultId> {
    persist_unless_abandoned(store, patient_id, result, &AtomicBool::new(false))
}

/// [`persist`] for an attempt that may be abandoned mid-write.
///
/// Once `abandoned` is set the result is not linked: a save that finishes
/// after the job was given up on is discarded instead.
pub fn persist_unless_abandoned(
    store: &dyn ResultStore,
    patient_id: &str,
    result: &AnalysisResult,
    abandoned: &AtomicBool,
) -> TremorResult<ResultId> {
    let result_id = store.save_result(patient_id, result)?;

    if abandoned.load(Ordering::SeqCst) {
        let err = TremorError::time_limit("attempt abandoned before linking its result");
        discard_orphan(store, patient_id, result_id, &err);
        return Err(err);
    }

    if let Err(link_err) = store.link(patient_id, result_id) {
        discard_orphan(store, patient_id, result_id, &link_err);
        return Err(link_err);
    }

    Ok(result_id)
}

fn discard_orphan(store: &dyn ResultStore, patient_id: &str, result_id: ResultId, cause: &TremorError) {
    match store.discard(result_id) {
        Ok(()) => tracing::warn!(
            result_id = %result_id,
            patient_id,
            error = %cause,
            "Result left unlinked, discarded it"
        ),
        Err(discard_err) => tracing::warn!(
            result_id = %result_id,
            patient_id,
            error = %cause,
            discard_error = %discard_err,
            "Result left unlinked and could not be discarded"
        ),
    }
}
