//! Analysis results and their persisted form.
//!
//! An [`AnalysisResult`] is built once, either from a full analysis or
//! from the degenerate "hand not detected" path, and is read-only after
//! that. Its JSON form is the record handed to storage and shown to
//! clinicians:
//!
//! ```json
//! {
//!   "date": "2025-03-14 09:26",
//!   "file": "patient_clip.mp4",
//!   "amplitude": 0.0031,
//!   "frequency": 5.2,
//!   "tremor_type": "Parkinsonien",
//!   "severity": "Moyen",
//!   "graph": "graphs/signal_20250314_092653_1a2b3c4d.png",
//!   "interpretation": "4–6 Hz oscillation: possible pathological tremor; elevated amplitude observed",
//!   "alert": "suspected tremor detected",
//!   "patient_id": "p-0042"
//! }
//! ```
//!
//! Amplitude and frequency are rounded to 4 and 2 decimals respectively
//! when the record is serialized. Values held in memory are never rounded.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Sentinel written in place of a numeric reading when no hand was tracked.
pub const NOT_DETECTED: &str = "Non détectée";

/// Date format of the persisted record (minute precision).
pub const RESULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Decimal places kept for amplitude in the persisted record.
pub const AMPLITUDE_DECIMALS: i32 = 4;

/// Decimal places kept for dominant frequency in the persisted record.
pub const FREQUENCY_DECIMALS: i32 = 2;

/// Errors raised when a persisted record does not describe a valid result.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid date '{value}': {source}")]
    Date {
        value: String,
        source: chrono::ParseError,
    },

    #[error("Amplitude and frequency must both be detected or both be missing")]
    MixedMeasurement,

    #[error("Tremor type and severity must be present together")]
    PartialClassification,

    #[error("Classification present on a result without a measurement")]
    ClassificationWithoutMeasurement,
}

/// Tremor categories known to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TremorType {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Parkinsonien")]
    Parkinsonian,
    #[serde(rename = "Tremor_Essentiel")]
    Essential,
    #[serde(rename = "Hyperkinetique")]
    Hyperkinetic,
    #[serde(rename = "Hypokinetique")]
    Hypokinetic,
    #[serde(rename = "Ataxie")]
    Ataxic,
    #[serde(rename = "Physiologique")]
    Physiological,
}

impl TremorType {
    pub const ALL: [TremorType; 7] = [
        TremorType::Normal,
        TremorType::Parkinsonian,
        TremorType::Essential,
        TremorType::Hyperkinetic,
        TremorType::Hypokinetic,
        TremorType::Ataxic,
        TremorType::Physiological,
    ];

    /// Label used in persisted records and classifier manifests.
    pub fn label(&self) -> &'static str {
        match self {
            TremorType::Normal => "Normal",
            TremorType::Parkinsonian => "Parkinsonien",
            TremorType::Essential => "Tremor_Essentiel",
            TremorType::Hyperkinetic => "Hyperkinetique",
            TremorType::Hypokinetic => "Hypokinetique",
            TremorType::Ataxic => "Ataxie",
            TremorType::Physiological => "Physiologique",
        }
    }
}

impl fmt::Display for TremorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TremorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TremorType::ALL
            .into_iter()
            .find(|t| t.label() == s)
            .ok_or_else(|| format!("unknown tremor type '{s}'"))
    }
}

/// Heuristic severity grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "Faible")]
    Low,
    #[serde(rename = "Moyen")]
    Moderate,
    #[serde(rename = "Élevé")]
    High,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Faible",
            Severity::Moderate => "Moyen",
            Severity::High => "Élevé",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier label plus severity grade for one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tremor_type: TremorType,
    pub severity: Severity,
}

/// Spectral measurement of the conditioned wrist signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Detected {
        /// Population standard deviation of the conditioned signal.
        amplitude: f64,
        /// Frequency of the strongest spectral component, in Hz.
        dominant_frequency_hz: f64,
    },
    Undetected,
}

impl Measurement {
    pub fn is_detected(&self) -> bool {
        matches!(self, Measurement::Detected { .. })
    }

    pub fn amplitude(&self) -> Option<f64> {
        match self {
            Measurement::Detected { amplitude, .. } => Some(*amplitude),
            Measurement::Undetected => None,
        }
    }

    pub fn dominant_frequency_hz(&self) -> Option<f64> {
        match self {
            Measurement::Detected {
                dominant_frequency_hz,
                ..
            } => Some(*dominant_frequency_hz),
            Measurement::Undetected => None,
        }
    }
}

/// Human-readable reading of a measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub text: String,
    pub alert: Option<String>,
}

/// Identifier assigned to a stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(Uuid);

impl ResultId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ResultId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Everything a full analysis contributes to a result.
#[derive(Debug, Clone)]
pub struct DetectedFindings {
    pub amplitude: f64,
    pub dominant_frequency_hz: f64,
    pub classification: ClassificationResult,
    pub graph: Option<String>,
    pub interpretation: Interpretation,
}

/// One completed assessment of one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct AnalysisResult {
    date: NaiveDateTime,
    file: String,
    measurement: Measurement,
    classification: Option<ClassificationResult>,
    graph: Option<String>,
    interpretation: String,
    alert: Option<String>,
    patient_id: String,
}

impl AnalysisResult {
    /// Result of a clip whose signal was analyzed and classified.
    pub fn detected(
        file: impl Into<String>,
        patient_id: impl Into<String>,
        recorded_at: NaiveDateTime,
        findings: DetectedFindings,
    ) -> Self {
        Self {
            date: truncate_to_minute(recorded_at),
            file: file.into(),
            measurement: Measurement::Detected {
                amplitude: findings.amplitude,
                dominant_frequency_hz: findings.dominant_frequency_hz,
            },
            classification: Some(findings.classification),
            graph: findings.graph,
            interpretation: findings.interpretation.text,
            alert: findings.interpretation.alert,
            patient_id: patient_id.into(),
        }
    }

    /// Result of a clip in which too few frames contained a hand.
    pub fn undetected(
        file: impl Into<String>,
        patient_id: impl Into<String>,
        recorded_at: NaiveDateTime,
        interpretation: Interpretation,
    ) -> Self {
        Self {
            date: truncate_to_minute(recorded_at),
            file: file.into(),
            measurement: Measurement::Undetected,
            classification: None,
            graph: None,
            interpretation: interpretation.text,
            alert: interpretation.alert,
            patient_id: patient_id.into(),
        }
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    pub fn amplitude(&self) -> Option<f64> {
        self.measurement.amplitude()
    }

    pub fn dominant_frequency_hz(&self) -> Option<f64> {
        self.measurement.dominant_frequency_hz()
    }

    pub fn classification(&self) -> Option<ClassificationResult> {
        self.classification
    }

    pub fn tremor_type(&self) -> Option<TremorType> {
        self.classification.map(|c| c.tremor_type)
    }

    pub fn severity(&self) -> Option<Severity> {
        self.classification.map(|c| c.severity)
    }

    pub fn graph(&self) -> Option<&str> {
        self.graph.as_deref()
    }

    pub fn interpretation(&self) -> &str {
        &self.interpretation
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Round half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// A numeric reading or the not-detected sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading(Option<f64>);

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(value) => serializer.serialize_f64(value),
            None => serializer.serialize_str(NOT_DETECTED),
        }
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Number(value)) => Ok(Reading(Some(value))),
            Some(Raw::Text(text)) if text == NOT_DETECTED => Ok(Reading(None)),
            Some(Raw::Text(text)) => Err(serde::de::Error::custom(format!(
                "expected a number or \"{NOT_DETECTED}\", got \"{text}\""
            ))),
            None => Ok(Reading(None)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireRecord {
    date: String,
    file: String,
    amplitude: Reading,
    frequency: Reading,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tremor_type: Option<TremorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    #[serde(default)]
    graph: Option<String>,
    interpretation: String,
    #[serde(default)]
    alert: Option<String>,
    #[serde(default)]
    patient_id: String,
}

impl From<AnalysisResult> for WireRecord {
    fn from(result: AnalysisResult) -> Self {
        let (amplitude, frequency) = match result.measurement {
            Measurement::Detected {
                amplitude,
                dominant_frequency_hz,
            } => (
                Reading(Some(round_to(amplitude, AMPLITUDE_DECIMALS))),
                Reading(Some(round_to(dominant_frequency_hz, FREQUENCY_DECIMALS))),
            ),
            Measurement::Undetected => (Reading(None), Reading(None)),
        };
        Self {
            date: result.date.format(RESULT_DATE_FORMAT).to_string(),
            file: result.file,
            amplitude,
            frequency,
            tremor_type: result.classification.map(|c| c.tremor_type),
            severity: result.classification.map(|c| c.severity),
            graph: result.graph,
            interpretation: result.interpretation,
            alert: result.alert,
            patient_id: result.patient_id,
        }
    }
}

impl TryFrom<WireRecord> for AnalysisResult {
    type Error = RecordError;

    fn try_from(record: WireRecord) -> Result<Self, Self::Error> {
        let date =
            NaiveDateTime::parse_from_str(&record.date, RESULT_DATE_FORMAT).map_err(|e| {
                RecordError::Date {
                    value: record.date.clone(),
                    source: e,
                }
            })?;

        let measurement = match (record.amplitude.0, record.frequency.0) {
            (Some(amplitude), Some(dominant_frequency_hz)) => Measurement::Detected {
                amplitude,
                dominant_frequency_hz,
            },
            (None, None) => Measurement::Undetected,
            _ => return Err(RecordError::MixedMeasurement),
        };

        let classification = match (record.tremor_type, record.severity) {
            (Some(tremor_type), Some(severity)) => Some(ClassificationResult {
                tremor_type,
                severity,
            }),
            (None, None) => None,
            _ => return Err(RecordError::PartialClassification),
        };

        if classification.is_some() && !measurement.is_detected() {
            return Err(RecordError::ClassificationWithoutMeasurement);
        }

        Ok(Self {
            date,
            file: record.file,
            measurement,
            classification,
            graph: record.graph,
            interpretation: record.interpretation,
            alert: record.alert,
            patient_id: record.patient_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(9, 26, 53))
            .unwrap()
    }

    fn detected_result() -> AnalysisResult {
        AnalysisResult::detected(
            "clip.mp4",
            "p-0042",
            at(),
            DetectedFindings {
                amplitude: 0.003_141_59,
                dominant_frequency_hz: 5.166_666,
                classification: ClassificationResult {
                    tremor_type: TremorType::Parkinsonian,
                    severity: Severity::Moderate,
                },
                graph: Some("graphs/signal.png".to_string()),
                interpretation: Interpretation {
                    text: "4–6 Hz oscillation: possible pathological tremor".to_string(),
                    alert: Some("suspected tremor detected".to_string()),
                },
            },
        )
    }

    #[test]
    fn test_detected_record_shape() {
        let json = serde_json::to_value(detected_result()).unwrap();
        assert_eq!(json["date"], "2025-03-14 09:26");
        assert_eq!(json["amplitude"], 0.0031);
        assert_eq!(json["frequency"], 5.17);
        assert_eq!(json["tremor_type"], "Parkinsonien");
        assert_eq!(json["severity"], "Moyen");
        assert_eq!(json["alert"], "suspected tremor detected");
        assert_eq!(json["patient_id"], "p-0042");
    }

    #[test]
    fn test_undetected_record_shape() {
        let result = AnalysisResult::undetected(
            "clip.mp4",
            "p-0042",
            at(),
            Interpretation {
                text: "hand not detected".to_string(),
                alert: None,
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["amplitude"], NOT_DETECTED);
        assert_eq!(json["frequency"], NOT_DETECTED);
        assert!(json["graph"].is_null());
        assert!(json["alert"].is_null());
        assert!(json.get("tremor_type").is_none());
        assert!(json.get("severity").is_none());
    }

    #[test]
    fn test_roundtrip_rounds_exactly_once() {
        let first = serde_json::to_string(&detected_result()).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed.amplitude(), Some(0.0031));
        assert_eq!(parsed.dominant_frequency_hz(), Some(5.17));
        assert_eq!(parsed.tremor_type(), Some(TremorType::Parkinsonian));
        assert_eq!(parsed.date(), at().with_second(0).unwrap());

        let second = serde_json::to_string(&parsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_null_reading_reads_as_undetected() {
        let json = r#"{
            "date": "2025-03-14 09:26",
            "file": "clip.mp4",
            "amplitude": null,
            "frequency": null,
            "graph": null,
            "interpretation": "hand not detected",
            "alert": null
        }"#;
        let parsed: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.measurement(), Measurement::Undetected);
        assert_eq!(parsed.patient_id(), "");
    }

    #[test]
    fn test_mixed_measurement_rejected() {
        let json = r#"{
            "date": "2025-03-14 09:26",
            "file": "clip.mp4",
            "amplitude": 0.002,
            "frequency": "Non détectée",
            "interpretation": "x"
        }"#;
        assert!(serde_json::from_str::<AnalysisResult>(json).is_err());
    }

    #[test]
    fn test_unknown_sentinel_rejected() {
        let json = r#"{
            "date": "2025-03-14 09:26",
            "file": "clip.mp4",
            "amplitude": "n/a",
            "frequency": "n/a",
            "interpretation": "x"
        }"#;
        assert!(serde_json::from_str::<AnalysisResult>(json).is_err());
    }

    #[test]
    fn test_tremor_type_labels_parse() {
        for tremor_type in TremorType::ALL {
            assert_eq!(tremor_type.label().parse::<TremorType>(), Ok(tremor_type));
        }
        assert!("Essential".parse::<TremorType>().is_err());
    }

    proptest! {
        #[test]
        fn rounding_is_idempotent(value in -10.0f64..10.0, decimals in 0i32..6) {
            let once = round_to(value, decimals);
            prop_assert_eq!(round_to(once, decimals), once);
        }
    }
}
