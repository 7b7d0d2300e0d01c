//! Subcommand implementations.

pub mod analyze;
pub mod check;
pub mod config;
pub mod history;
pub mod submit;

use tremor_model::{AnalysisResult, RESULT_DATE_FORMAT};

/// Print a result the way a clinician reads it.
pub(crate) fn print_result(result: &AnalysisResult) {
    println!("Assessment: {}", result.file());
    println!("  Patient: {}", result.patient_id());
    println!("  Date: {}", result.date().format(RESULT_DATE_FORMAT));

    match (result.amplitude(), result.dominant_frequency_hz()) {
        (Some(amplitude), Some(frequency)) => {
            println!("  Amplitude: {amplitude:.4}");
            println!("  Dominant frequency: {frequency:.2} Hz");
        }
        _ => println!("  Measurement: hand not detected"),
    }
    if let Some(classification) = result.classification() {
        println!("  Tremor type: {}", classification.tremor_type);
        println!("  Severity: {}", classification.severity);
    }
    if let Some(graph) = result.graph() {
        println!("  Graph: {graph}");
    }
    println!("  Interpretation: {}", result.interpretation());
    if let Some(alert) = result.alert() {
        println!("  [ALERT] {alert}");
    }
}
