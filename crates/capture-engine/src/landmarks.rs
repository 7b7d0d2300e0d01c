//! Hand landmark detection.
//!
//! The landmark model is opaque to the pipeline. A [`LandmarkModel`] is
//! loaded once and shared; each clip gets its own [`LandmarkSession`] since
//! video-mode detectors keep per-stream tracking state and require strictly
//! increasing timestamps.
//!
//! The production model runs an external helper speaking a line protocol on
//! stdin/stdout. For every frame the pipeline writes one JSON header line
//! followed by the raw pixels:
//!
//! ```text
//! {"width":640,"height":480,"format":"rgb24","timestamp_ms":33,"num_hands":2}
//! <width * height * 3 bytes>
//! ```
//!
//! and the helper answers with one line, `{"hands": [[[x, y, z], ...], ...]}`
//! (21 normalized points per hand, wrist first), `{"hands": null}` when no
//! hand is visible, or `{"error": "..."}`.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use tremor_common::{LandmarkerConfig, TremorError, TremorResult};

use crate::video::{command_exists, Frame, PixelFormat};

/// Index of the wrist among a hand's landmarks.
pub const WRIST: usize = 0;

/// A normalized landmark position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Landmarks of one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    points: Vec<Landmark>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn wrist(&self) -> Option<&Landmark> {
        self.points.get(WRIST)
    }
}

/// A loaded landmark model, shared read-only between jobs.
pub trait LandmarkModel: Send + Sync {
    fn name(&self) -> &str;

    /// Start detection on a new clip.
    fn open_session(&self) -> TremorResult<Box<dyn LandmarkSession>>;
}

/// Detection state for one clip.
pub trait LandmarkSession: Send {
    /// Pixel layout the detector expects.
    fn input_format(&self) -> PixelFormat;

    /// Detect hands in a frame. `Ok(None)` means no hand was found.
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> TremorResult<Option<Vec<HandLandmarks>>>;
}

#[derive(Debug, Serialize)]
struct FrameHeader<'a> {
    width: u32,
    height: u32,
    format: &'a str,
    timestamp_ms: u64,
    num_hands: u32,
}

#[derive(Debug, Deserialize)]
struct HelperReply {
    #[serde(default)]
    hands: Option<Vec<Vec<[f64; 3]>>>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one reply line from the landmark helper.
pub fn parse_reply(line: &str) -> TremorResult<Option<Vec<HandLandmarks>>> {
    let reply: HelperReply = serde_json::from_str(line.trim()).map_err(|e| {
        TremorError::tracking(format!("malformed landmark reply '{}': {e}", line.trim()))
    })?;
    if let Some(error) = reply.error {
        return Err(TremorError::tracking(format!("landmark helper: {error}")));
    }

    let hands: Vec<HandLandmarks> = reply
        .hands
        .unwrap_or_default()
        .into_iter()
        .filter(|points| !points.is_empty())
        .map(|points| {
            HandLandmarks::new(
                points
                    .into_iter()
                    .map(|[x, y, z]| Landmark { x, y, z })
                    .collect(),
            )
        })
        .collect();

    Ok((!hands.is_empty()).then_some(hands))
}

/// Landmark model backed by an external helper process.
#[derive(Debug, Clone)]
pub struct SidecarLandmarkModel {
    config: LandmarkerConfig,
}

impl SidecarLandmarkModel {
    pub fn new(config: LandmarkerConfig) -> TremorResult<Self> {
        if config.command.trim().is_empty() {
            return Err(TremorError::config("landmarker command is empty"));
        }
        if config.num_hands == 0 {
            return Err(TremorError::config("landmarker num_hands must be at least 1"));
        }
        Ok(Self { config })
    }

    /// Whether the helper executable can be found.
    pub fn is_available(&self) -> bool {
        let command = &self.config.command;
        if command.contains('/') {
            std::path::Path::new(command).exists()
        } else {
            command_exists(command)
        }
    }

    pub fn config(&self) -> &LandmarkerConfig {
        &self.config
    }
}

impl LandmarkModel for SidecarLandmarkModel {
    fn name(&self) -> &str {
        &self.config.command
    }

    fn open_session(&self) -> TremorResult<Box<dyn LandmarkSession>> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                TremorError::tracking(format!(
                    "Failed to start landmark helper '{}': {e}",
                    self.config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TremorError::tracking("Failed to open landmark helper stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TremorError::tracking("Failed to open landmark helper stdout"))?;

        tracing::debug!(
            command = %self.config.command,
            pid = child.id(),
            "Started landmark session"
        );

        Ok(Box::new(SidecarSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            num_hands: self.config.num_hands,
            line: String::new(),
        }))
    }
}

struct SidecarSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    num_hands: u32,
    line: String,
}

impl LandmarkSession for SidecarSession {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> TremorResult<Option<Vec<HandLandmarks>>> {
        let header = FrameHeader {
            width: frame.width,
            height: frame.height,
            format: frame.format.ffmpeg_name(),
            timestamp_ms,
            num_hands: self.num_hands,
        };
        let mut header_line = serde_json::to_string(&header)?;
        header_line.push('\n');

        let send = |stdin: &mut ChildStdin| -> std::io::Result<()> {
            stdin.write_all(header_line.as_bytes())?;
            stdin.write_all(&frame.data)?;
            stdin.flush()
        };
        send(&mut self.stdin)
            .map_err(|e| TremorError::tracking(format!("Failed to send frame: {e}")))?;

        self.line.clear();
        let bytes = self
            .stdout
            .read_line(&mut self.line)
            .map_err(|e| TremorError::tracking(format!("Failed to read landmarks: {e}")))?;
        if bytes == 0 {
            return Err(TremorError::tracking("landmark helper exited unexpectedly"));
        }

        parse_reply(&self.line)
    }
}

impl Drop for SidecarSession {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_with_two_hands() {
        let hands = parse_reply(r#"{"hands": [[[0.4, 0.61, 0.0], [0.42, 0.55, -0.01]], [[0.7, 0.3, 0.0]]]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].wrist().map(|p| p.y), Some(0.61));
        assert_eq!(hands[1].points().len(), 1);
    }

    #[test]
    fn test_reply_without_hands() {
        assert!(parse_reply(r#"{"hands": null}"#).unwrap().is_none());
        assert!(parse_reply(r#"{"hands": []}"#).unwrap().is_none());
        assert!(parse_reply("{}").unwrap().is_none());
    }

    #[test]
    fn test_reply_error_is_tracking_error() {
        let err = parse_reply(r#"{"error": "model not loaded"}"#).unwrap_err();
        assert!(matches!(err, TremorError::Tracking { .. }));
        assert!(err.is_retryable());
        assert!(parse_reply("not json").is_err());
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = LandmarkerConfig::default();
        config.command = " ".to_string();
        assert!(SidecarLandmarkModel::new(config).is_err());

        let mut config = LandmarkerConfig::default();
        config.num_hands = 0;
        assert!(SidecarLandmarkModel::new(config).is_err());
    }

    #[test]
    fn test_missing_helper_fails_to_open() {
        let config = LandmarkerConfig {
            command: "/nonexistent/tremor-landmarker".to_string(),
            args: Vec::new(),
            num_hands: 2,
        };
        let model = SidecarLandmarkModel::new(config).unwrap();
        assert!(!model.is_available());
        assert!(model.open_session().is_err());
    }
}
