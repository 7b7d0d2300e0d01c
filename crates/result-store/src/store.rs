//! Storage trait and shared helpers.

use serde::{Deserialize, Serialize};
use tremor_common::{TremorError, TremorResult};
use tremor_model::{AnalysisResult, ResultId};

/// A result together with the id it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: ResultId,
    pub result: AnalysisResult,
}

/// Persistence of analysis results and patient histories.
///
/// Each method is atomic on its own. Nothing makes `save_result` and
/// `link` atomic together.
pub trait ResultStore: Send + Sync {
    /// Store a result document and return its new id.
    fn save_result(&self, patient_id: &str, result: &AnalysisResult) -> TremorResult<ResultId>;

    /// Append a stored result to the patient's history. Linking the same
    /// id twice is a no-op.
    fn link(&self, patient_id: &str, result_id: ResultId) -> TremorResult<()>;

    /// Remove a result document that was never linked.
    fn discard(&self, result_id: ResultId) -> TremorResult<()>;

    fn get(&self, result_id: ResultId) -> TremorResult<Option<AnalysisResult>>;

    /// The patient's linked results, newest first.
    fn results_for_patient(&self, patient_id: &str) -> TremorResult<Vec<StoredResult>>;

    /// The patient's most recent result.
    fn latest_for_patient(&self, patient_id: &str) -> TremorResult<Option<StoredResult>> {
        Ok(self.results_for_patient(patient_id)?.into_iter().next())
    }
}

/// Reject ids that are empty or could escape the store directory.
pub fn validate_patient_id(patient_id: &str) -> TremorResult<()> {
    let trimmed = patient_id.trim();
    if trimmed.is_empty() {
        return Err(TremorError::invalid_input("patient id is empty"));
    }
    if trimmed != patient_id
        || patient_id.starts_with('.')
        || patient_id.contains(['/', '\\', '\0'])
    {
        return Err(TremorError::invalid_input(format!(
            "patient id '{patient_id}' contains forbidden characters"
        )));
    }
    Ok(())
}

/// Order a history (oldest link first) newest first.
///
/// Dates have minute precision, so results from the same minute keep
/// reverse link order.
pub(crate) fn newest_first(mut history: Vec<StoredResult>) -> Vec<StoredResult> {
    history.reverse();
    history.sort_by(|a, b| b.result.date().cmp(&a.result.date()));
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id_validation() {
        assert!(validate_patient_id("p-0042").is_ok());
        assert!(validate_patient_id("65f1c2a9e4b0").is_ok());
        assert!(validate_patient_id("").is_err());
        assert!(validate_patient_id("  ").is_err());
        assert!(validate_patient_id("../etc").is_err());
        assert!(validate_patient_id("a/b").is_err());
        assert!(validate_patient_id(".hidden").is_err());
    }
}
