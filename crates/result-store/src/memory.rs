//! In-memory store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tremor_common::{TremorError, TremorResult};
use tremor_model::{AnalysisResult, ResultId};

use crate::store::{newest_first, validate_patient_id, ResultStore, StoredResult};

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<ResultId, AnalysisResult>,
    histories: HashMap<String, Vec<ResultId>>,
}

/// Store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored result documents, linked or not.
    pub fn result_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .len()
    }
}

impl ResultStore for MemoryStore {
    fn save_result(&self, patient_id: &str, result: &AnalysisResult) -> TremorResult<ResultId> {
        validate_patient_id(patient_id)?;
        let id = ResultId::new();
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .insert(id, result.clone());
        Ok(id)
    }

    fn link(&self, patient_id: &str, result_id: ResultId) -> TremorResult<()> {
        validate_patient_id(patient_id)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.results.contains_key(&result_id) {
            return Err(TremorError::storage(format!(
                "cannot link unknown result {result_id}"
            )));
        }
        let history = inner.histories.entry(patient_id.to_string()).or_default();
        if !history.contains(&result_id) {
            history.push(result_id);
        }
        Ok(())
    }

    fn discard(&self, result_id: ResultId) -> TremorResult<()> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .remove(&result_id);
        Ok(())
    }

    fn get(&self, result_id: ResultId) -> TremorResult<Option<AnalysisResult>> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .get(&result_id)
            .cloned())
    }

    fn results_for_patient(&self, patient_id: &str) -> TremorResult<Vec<StoredResult>> {
        validate_patient_id(patient_id)?;
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let history = inner
            .histories
            .get(patient_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        inner.results.get(id).map(|result| StoredResult {
                            id: *id,
                            result: result.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(newest_first(history))
    }
}
