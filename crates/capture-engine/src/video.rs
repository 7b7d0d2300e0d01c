//! Video decoding through an `ffmpeg` child process.
//!
//! Frames are decoded to packed 24-bit pixels on ffmpeg's stdout, one frame
//! after another with no framing, so each read is exactly
//! `width * height * 3` bytes.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;
use tremor_common::{TremorError, TremorResult};

/// Packed 24-bit pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgr24,
    Rgb24,
}

impl PixelFormat {
    /// Name understood by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgb24 => "rgb24",
        }
    }
}

/// One decoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> TremorResult<Self> {
        let expected = frame_len(width, height);
        if data.len() != expected {
            return Err(TremorError::video(format!(
                "frame of {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Convert in place to `format` (swaps the red and blue channels).
    pub fn convert_to(&mut self, format: PixelFormat) {
        if self.format == format {
            return;
        }
        for pixel in self.data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        self.format = format;
    }
}

/// Bytes in a packed 24-bit frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// A sequence of frames read in order.
pub trait VideoSource: Send {
    /// Nominal frame rate in frames per second.
    fn fps(&self) -> f64;

    /// Frame size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` at the end of the clip.
    fn next_frame(&mut self) -> TremorResult<Option<Frame>>;

    /// Release the underlying decoder. Safe to call more than once.
    fn release(&mut self);
}

/// Opens clips for analysis.
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> TremorResult<Box<dyn VideoSource>>;
}

/// Stream metadata reported by `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Coded frame size, before any display rotation.
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
    /// Display rotation in degrees, normalized to `0..360`.
    pub rotation: u32,
}

impl VideoInfo {
    /// Size of the frames ffmpeg emits. ffmpeg applies the display
    /// rotation while decoding, so quarter turns swap width and height.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

/// Older muxers store rotation as a `rotate` tag.
#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

/// Newer ffprobe reports the display matrix as side data.
#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0);
        normalize_rotation(degrees)
    }
}

/// Fold an angle into `0..360`. ffmpeg only auto-rotates quarter turns,
/// so anything else counts as upright.
pub fn normalize_rotation(degrees: f64) -> u32 {
    if !degrees.is_finite() {
        return 0;
    }
    let whole = (degrees.round() as i64).rem_euclid(360);
    if whole % 90 == 0 {
        whole as u32
    } else {
        0
    }
}

/// Parse an ffprobe rational such as `30000/1001` or `25`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.trim().split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Extract stream metadata from ffprobe's JSON output.
pub fn parse_probe_output(json: &str) -> TremorResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| TremorError::unsupported("file has no video stream"))?;

    let width = stream.width.filter(|w| *w > 0);
    let height = stream.height.filter(|h| *h > 0);
    let (width, height) = width
        .zip(height)
        .ok_or_else(|| TremorError::video("video stream has no frame size"))?;

    let rotation = stream.rotation();
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| TremorError::video("video stream has no usable frame rate"))?;

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        rotation,
    })
}

/// Probe a clip with `ffprobe`.
pub fn probe_video(path: &Path) -> TremorResult<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_streams",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| TremorError::video(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(TremorError::video(format!(
            "ffprobe failed on {} (status {}): {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Whether a binary is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A clip decoded by an `ffmpeg` child process.
pub struct FfmpegVideo {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    frames_read: u64,
}

impl FfmpegVideo {
    /// Probe the clip and start decoding it.
    pub fn open(path: &Path) -> TremorResult<Self> {
        if !path.exists() {
            return Err(TremorError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = probe_video(path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", PixelFormat::Bgr24.ffmpeg_name(), "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TremorError::video(format!("Failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TremorError::video("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TremorError::video("Failed to capture ffmpeg stderr"))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let (width, height) = info.display_size();
        tracing::debug!(
            path = %path.display(),
            pid = child.id(),
            width,
            height,
            rotation = info.rotation,
            fps = info.fps,
            "Opened video"
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
            stderr_task: Some(stderr_task),
            frames_read: 0,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Wait for ffmpeg after end of stream and surface decode failures.
    fn finish(&mut self) -> TremorResult<()> {
        self.stdout = None;
        let status = match self.child.take() {
            Some(mut child) => Some(
                child
                    .wait()
                    .map_err(|e| TremorError::video(format!("Failed to wait on ffmpeg: {e}")))?,
            ),
            None => None,
        };
        let stderr_output = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();

        tracing::debug!(
            path = %self.path.display(),
            frames = self.frames_read,
            "Decoder reached end of stream"
        );
        match status {
            Some(status) if !status.success() => Err(TremorError::video(format!(
                "ffmpeg failed decoding {} (status {}): {}",
                self.path.display(),
                status,
                stderr_output.trim()
            ))),
            _ => Ok(()),
        }
    }
}

impl VideoSource for FfmpegVideo {
    fn fps(&self) -> f64 {
        self.info.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.info.display_size()
    }

    fn next_frame(&mut self) -> TremorResult<Option<Frame>> {
        let Some(reader) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let (width, height) = self.info.display_size();
        let mut data = vec![0u8; frame_len(width, height)];
        let mut filled = 0;
        while filled < data.len() {
            let n = reader
                .read(&mut data[filled..])
                .map_err(|e| TremorError::video(format!("Failed reading frame: {e}")))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < data.len() {
            if filled > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    bytes = filled,
                    "Discarding truncated final frame"
                );
            }
            self.finish()?;
            return Ok(None);
        }

        self.frames_read += 1;
        Frame::new(width, height, PixelFormat::Bgr24, data).map(Some)
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            child.kill().ok();
            child.wait().ok();
        }
        if let Some(task) = self.stderr_task.take() {
            task.join().ok();
        }
    }
}

impl Drop for FfmpegVideo {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens clips with [`FfmpegVideo`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegOpener;

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> TremorResult<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegVideo::open(path)?))
    }
}
