//! Application configuration.

use crate::error::{TremorError, TremorResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where results, patient histories, and graphs are stored.
    pub data_dir: PathBuf,

    /// Pre-trained model locations.
    pub models: ModelConfig,

    /// Worker pool and retry policy.
    pub worker: WorkerConfig,

    /// Analysis options.
    pub analysis: AnalysisConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Locations of the two opaque models the pipeline consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Exported tremor classifier (JSON forest).
    pub classifier_path: PathBuf,

    /// Hand landmark helper process.
    pub landmarker: LandmarkerConfig,
}

/// External hand-landmark helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkerConfig {
    /// Executable speaking the frame/landmark line protocol.
    pub command: String,

    /// Extra arguments (typically the landmark model file).
    pub args: Vec<String>,

    /// Maximum number of hands the helper should report per frame.
    pub num_hands: u32,
}

/// Worker pool and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of jobs processed concurrently.
    pub concurrency: usize,

    /// Total attempts per job, including the first.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    pub retry_delay_secs: u64,

    /// Point after which an attempt aborts between frames.
    pub soft_time_limit_secs: u64,

    /// Point after which an attempt is abandoned outright.
    pub hard_time_limit_secs: u64,

    /// How long a finished job's status stays queryable.
    pub result_expires_secs: u64,
}

/// Analysis options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Skip the zero-frequency bin when picking the dominant frequency.
    pub exclude_dc: bool,

    /// Render a signal graph PNG for each detected result.
    pub render_graphs: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "tremor_jobs=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models: ModelConfig::default(),
            worker: WorkerConfig::default(),
            analysis: AnalysisConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: default_data_dir().join("models").join("tremor_forest.json"),
            landmarker: LandmarkerConfig::default(),
        }
    }
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self {
            command: "tremor-landmarker".to_string(),
            args: vec![default_data_dir()
                .join("models")
                .join("hand_landmarker.task")
                .to_string_lossy()
                .into_owned()],
            num_hands: 2,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 3,
            retry_delay_secs: 60,
            soft_time_limit_secs: 240,
            hard_time_limit_secs: 300,
            result_expires_secs: 24 * 60 * 60,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            exclude_dc: true,
            render_graphs: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl WorkerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn soft_time_limit(&self) -> Duration {
        Duration::from_secs(self.soft_time_limit_secs)
    }

    pub fn hard_time_limit(&self) -> Duration {
        Duration::from_secs(self.hard_time_limit_secs)
    }

    pub fn result_expiry(&self) -> Duration {
        Duration::from_secs(self.result_expires_secs)
    }

    /// Reject settings the job runner cannot honor.
    pub fn validate(&self) -> TremorResult<()> {
        if self.concurrency == 0 {
            return Err(TremorError::config("worker.concurrency must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(TremorError::config("worker.max_attempts must be at least 1"));
        }
        if self.soft_time_limit_secs > self.hard_time_limit_secs {
            return Err(TremorError::config(format!(
                "soft time limit ({}s) exceeds hard time limit ({}s)",
                self.soft_time_limit_secs, self.hard_time_limit_secs
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Missing sections take defaults.
    pub fn load_from(path: &Path) -> TremorResult<Self> {
        if !path.exists() {
            return Err(TremorError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.worker.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Directory holding rendered signal graphs.
    pub fn graphs_dir(&self) -> PathBuf {
        self.data_dir.join("graphs")
    }

    /// Directory holding stored results and patient histories.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("tremor").join("config.json")
}

/// Default data directory.
fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("tremor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults_match_retry_policy() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.max_attempts, 3);
        assert_eq!(worker.retry_delay(), Duration::from_secs(60));
        assert_eq!(worker.soft_time_limit(), Duration::from_secs(240));
        assert_eq!(worker.hard_time_limit(), Duration::from_secs(300));
        assert_eq!(worker.result_expiry(), Duration::from_secs(86_400));
        assert!(worker.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"worker": {"concurrency": 4}}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.max_attempts, 3);
        assert!(config.analysis.exclude_dc);
        assert_eq!(config.models.landmarker.num_hands, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_soft_limit_above_hard_limit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"worker": {"soft_time_limit_secs": 400, "hard_time_limit_secs": 300}}"#,
        )
        .unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, TremorError::Config { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.data_dir = dir.path().join("data");
        config.worker.retry_delay_secs = 5;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.data_dir, dir.path().join("data"));
        assert_eq!(loaded.worker.retry_delay_secs, 5);
        assert_eq!(loaded.store_dir(), dir.path().join("data").join("store"));
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let err = AppConfig::load_from(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, TremorError::FileNotFound { .. }));
    }
}
