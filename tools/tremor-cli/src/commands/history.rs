//! List a patient's stored results.

use tremor_common::AppConfig;
use tremor_model::RESULT_DATE_FORMAT;
use tremor_store::{FileStore, ResultStore};

pub fn run(config: &AppConfig, patient: String, json: bool) -> anyhow::Result<()> {
    let store = FileStore::open(config.store_dir())?;
    let history = store.results_for_patient(&patient)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        println!("No results for patient {patient}");
        return Ok(());
    }

    println!("Results for patient {patient} (newest first):");
    for stored in &history {
        let result = &stored.result;
        let measurement = match (result.amplitude(), result.dominant_frequency_hz()) {
            (Some(amplitude), Some(frequency)) => {
                format!("amp {amplitude:.4}, {frequency:.2} Hz")
            }
            _ => "hand not detected".to_string(),
        };
        let classification = result
            .classification()
            .map(|c| format!(", {} / {}", c.tremor_type, c.severity))
            .unwrap_or_default();
        let alert = if result.alert().is_some() { "  [ALERT]" } else { "" };

        println!(
            "  {}  {}  {}{}{}",
            result.date().format(RESULT_DATE_FORMAT),
            result.file(),
            measurement,
            classification,
            alert
        );
        println!("      id: {}", stored.id);
    }

    Ok(())
}
