//! JSON file store.
//!
//! Layout under the store root:
//!
//! ```text
//! results/<result-id>.json     one AnalysisResult record each
//! patients/<patient-id>.json   {"patient_id": ..., "history": [<result-id>, ...]}
//! ```
//!
//! Every document is written to a temporary file and renamed into place,
//! so readers never observe a partial write.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tremor_common::{TremorError, TremorResult};
use tremor_model::{AnalysisResult, ResultId};

use crate::store::{newest_first, validate_patient_id, ResultStore, StoredResult};

/// Errors from reading or writing store documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid document at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<StoreError> for TremorError {
    fn from(err: StoreError) -> Self {
        TremorError::storage(err.to_string())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PatientRecord {
    patient_id: String,
    #[serde(default)]
    history: Vec<ResultId>,
}

/// Store backed by JSON documents on disk.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write of patient records.
    history_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> TremorResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join("results"), root.join("patients")] {
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        tracing::debug!(root = %root.display(), "Opened result store");
        Ok(Self {
            root,
            history_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn result_path(&self, id: ResultId) -> PathBuf {
        self.root.join("results").join(format!("{id}.json"))
    }

    fn patient_path(&self, patient_id: &str) -> PathBuf {
        self.root.join("patients").join(format!("{patient_id}.json"))
    }

    fn read_patient(&self, patient_id: &str) -> Result<PatientRecord, StoreError> {
        let path = self.patient_path(patient_id);
        match read_json::<PatientRecord>(&path)? {
            Some(record) => Ok(record),
            None => Ok(PatientRecord {
                patient_id: patient_id.to_string(),
                history: Vec::new(),
            }),
        }
    }
}

impl ResultStore for FileStore {
    fn save_result(&self, patient_id: &str, result: &AnalysisResult) -> TremorResult<ResultId> {
        validate_patient_id(patient_id)?;
        let id = ResultId::new();
        write_json_atomic(&self.result_path(id), result)?;
        tracing::debug!(result_id = %id, patient_id, "Saved analysis result");
        Ok(id)
    }

    fn link(&self, patient_id: &str, result_id: ResultId) -> TremorResult<()> {
        validate_patient_id(patient_id)?;
        if !self.result_path(result_id).exists() {
            return Err(TremorError::storage(format!(
                "cannot link unknown result {result_id}"
            )));
        }

        let _guard = self
            .history_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut record = self.read_patient(patient_id)?;
        if record.history.contains(&result_id) {
            return Ok(());
        }
        record.history.push(result_id);
        write_json_atomic(&self.patient_path(patient_id), &record)?;

        tracing::debug!(
            result_id = %result_id,
            patient_id,
            history_len = record.history.len(),
            "Linked result to patient"
        );
        Ok(())
    }

    fn discard(&self, result_id: ResultId) -> TremorResult<()> {
        let path = self.result_path(result_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { path, source: e }.into()),
        }
    }

    fn get(&self, result_id: ResultId) -> TremorResult<Option<AnalysisResult>> {
        Ok(read_json(&self.result_path(result_id))?)
    }

    fn results_for_patient(&self, patient_id: &str) -> TremorResult<Vec<StoredResult>> {
        validate_patient_id(patient_id)?;
        let record = self.read_patient(patient_id)?;

        let mut history = Vec::with_capacity(record.history.len());
        for id in record.history {
            match self.get(id)? {
                Some(result) => history.push(StoredResult { id, result }),
                None => tracing::warn!(
                    result_id = %id,
                    patient_id,
                    "Patient history links a missing result"
                ),
            }
        }
        Ok(newest_first(history))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tmp = path.with_extension(format!("json.tmp-{}", ResultId::new()));
    std::fs::write(&tmp, json).map_err(|e| StoreError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        std::fs::remove_file(&tmp).ok();
        StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store")).unwrap();
        assert!(store.root().join("results").is_dir());
        assert!(store.root().join("patients").is_dir());
    }

    #[test]
    fn test_corrupt_patient_record_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        std::fs::write(store.patient_path("p-1"), "{not json").unwrap();

        let err = store.results_for_patient("p-1").unwrap_err();
        assert!(matches!(err, TremorError::Storage { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_link_unknown_result_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.link("p-1", ResultId::new()).is_err());
    }

    #[test]
    fn test_discard_missing_result_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.discard(ResultId::new()).is_ok());
    }
}
