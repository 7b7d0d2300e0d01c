use chrono::{NaiveDate, NaiveDateTime};
use tremor_model::{
    AnalysisResult, ClassificationResult, DetectedFindings, Interpretation, Severity, TremorType,
};
use tremor_store::{FileStore, MemoryStore, ResultStore};

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 14)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid test date")
}

fn result(patient: &str, recorded_at: NaiveDateTime, amplitude: f64) -> AnalysisResult {
    AnalysisResult::detected(
        "clip.mp4",
        patient,
        recorded_at,
        DetectedFindings {
            amplitude,
            dominant_frequency_hz: 5.0,
            classification: ClassificationResult {
                tremor_type: TremorType::Essential,
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

fn history_is_newest_first(store: &dyn ResultStore) {
    let early = store.save_result("p-1", &result("p-1", at(9, 0), 0.001)).unwrap();
    let late = store.save_result("p-1", &result("p-1", at(11, 30), 0.002)).unwrap();
    let middle = store.save_result("p-1", &result("p-1", at(10, 15), 0.003)).unwrap();
    for id in [early, late, middle] {
        store.link("p-1", id).unwrap();
    }

    let history = store.results_for_patient("p-1").unwrap();
    let ids: Vec<_> = history.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![late, middle, early]);

    let latest = store.latest_for_patient("p-1").unwrap().unwrap();
    assert_eq!(latest.id, late);
    assert!(store.results_for_patient("p-2").unwrap().is_empty());
}

fn link_is_idempotent(store: &dyn ResultStore) {
    let id = store.save_result("p-3", &result("p-3", at(9, 0), 0.001)).unwrap();
    store.link("p-3", id).unwrap();
    store.link("p-3", id).unwrap();
    assert_eq!(store.results_for_patient("p-3").unwrap().len(), 1);
}

fn discarded_result_is_gone(store: &dyn ResultStore) {
    let id = store.save_result("p-4", &result("p-4", at(9, 0), 0.001)).unwrap();
    assert!(store.get(id).unwrap().is_some());
    store.discard(id).unwrap();
    assert!(store.get(id).unwrap().is_none());
    assert!(store.link("p-4", id).is_err());
    assert!(store.results_for_patient("p-4").unwrap().is_empty());
}

fn rejects_path_like_patient_ids(store: &dyn ResultStore) {
    assert!(store
        .save_result("../escape", &result("x", at(9, 0), 0.001))
        .is_err());
}

#[test]
fn memory_store_contract() {
    let store = MemoryStore::new();
    history_is_newest_first(&store);
    link_is_idempotent(&store);
    discarded_result_is_gone(&store);
    rejects_path_like_patient_ids(&store);
}

#[test]
fn file_store_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::open(dir.path()).expect("open store");
    history_is_newest_first(&store);
    link_is_idempotent(&store);
    discarded_result_is_gone(&store);
    rejects_path_like_patient_ids(&store);
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id = {
        let store = FileStore::open(dir.path()).expect("open store");
        let id = store
            .save_result("p-9", &result("p-9", at(14, 5), 0.004_217))
            .unwrap();
        store.link("p-9", id).unwrap();
        id
    };

    let reopened = FileStore::open(dir.path()).expect("reopen store");
    let history = reopened.results_for_patient("p-9").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].result.amplitude(), Some(0.0042));
    assert_eq!(history[0].result.tremor_type(), Some(TremorType::Essential));
}
