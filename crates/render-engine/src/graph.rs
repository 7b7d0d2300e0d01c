//! Signal plot rendering.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tremor_common::{TremorError, TremorResult};
use tremor_model::ConditionedSignal;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 70]);
const GRID: Rgb<u8> = Rgb([220, 220, 228]);
const TRACE: Rgb<u8> = Rgb([31, 119, 180]);

/// Writes signal plots into a directory.
#[derive(Debug, Clone)]
pub struct GraphWriter {
    output_dir: PathBuf,
    width: u32,
    height: u32,
    margin: u32,
}

impl GraphWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            width: 800,
            height: 400,
            margin: 32,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(2 * self.margin + 2);
        self.height = height.max(2 * self.margin + 2);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Plot the signal against time, one vertical grid line per second.
    pub fn render(&self, signal: &ConditionedSignal) -> TremorResult<RgbImage> {
        let samples = signal.samples();
        if samples.len() < 2 {
            return Err(TremorError::render("need at least two samples to plot"));
        }

        let mut img = ImageBuffer::from_pixel(self.width, self.height, BACKGROUND);
        let left = self.margin as f32;
        let top = self.margin as f32;
        let plot_w = (self.width - 2 * self.margin) as f32;
        let plot_h = (self.height - 2 * self.margin) as f32;

        let peak = samples
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()))
            .max(f64::EPSILON);
        let x_at = |i: usize| left + plot_w * i as f32 / (samples.len() - 1) as f32;
        let y_at = |v: f64| top + plot_h / 2.0 - (v / peak) as f32 * (plot_h / 2.0);

        let fps = signal.fps();
        if fps > 0.0 {
            let duration = (samples.len() - 1) as f64 / fps;
            let mut second = 1.0;
            while second < duration {
                let x = left + plot_w * (second / duration) as f32;
                draw_line_segment_mut(&mut img, (x, top), (x, top + plot_h), GRID);
                second += 1.0;
            }
        }
        let zero_y = y_at(0.0);
        draw_line_segment_mut(&mut img, (left, zero_y), (left + plot_w, zero_y), GRID);

        for (i, pair) in samples.windows(2).enumerate() {
            draw_line_segment_mut(
                &mut img,
                (x_at(i), y_at(pair[0])),
                (x_at(i + 1), y_at(pair[1])),
                TRACE,
            );
        }

        draw_hollow_rect_mut(
            &mut img,
            Rect::at(self.margin as i32, self.margin as i32)
                .of_size(self.width - 2 * self.margin, self.height - 2 * self.margin),
            AXIS,
        );

        Ok(img)
    }

    /// Render and save `signal_<YYYYmmdd_HHMMSS>_<id>.png`, returning its path.
    pub fn write(&self, signal: &ConditionedSignal, at: NaiveDateTime) -> TremorResult<PathBuf> {
        let img = self.render(signal)?;
        std::fs::create_dir_all(&self.output_dir)?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("signal_{}_{}.png", at.format("%Y%m%d_%H%M%S"), &suffix[..8]);
        let path = self.output_dir.join(file_name);

        img.save(&path)
            .map_err(|e| TremorError::render(format!("Failed to write {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), samples = signal.len(), "Wrote signal graph");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn signal() -> ConditionedSignal {
        let samples = (0..90)
            .map(|i| 0.01 * (2.0 * std::f64::consts::PI * 5.0 * i as f64 / 30.0).sin())
            .collect();
        ConditionedSignal::new(30.0, samples, 4.0, 6.0)
    }

    #[test]
    fn test_render_draws_trace_inside_frame() {
        let writer = GraphWriter::new("/unused").with_size(320, 160);
        let img = writer.render(&signal()).unwrap();
        assert_eq!(img.dimensions(), (320, 160));

        let trace_pixels = img.pixels().filter(|p| **p == TRACE).count();
        assert!(trace_pixels > 100);
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*img.get_pixel(32, 32), AXIS);
    }

    #[test]
    fn test_render_rejects_single_sample() {
        let writer = GraphWriter::new("/unused");
        let one = ConditionedSignal::new(30.0, vec![0.1], 4.0, 6.0);
        assert!(writer.render(&one).is_err());
    }

    #[test]
    fn test_write_names_file_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let writer = GraphWriter::new(dir.path().join("graphs"));
        let at = NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(9, 26, 53))
            .unwrap();

        let path = writer.write(&signal(), at).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("signal_20250314_092653_"));
        assert!(name.ends_with(".png"));

        let second = writer.write(&signal(), at).unwrap();
        assert_ne!(path, second);
    }
}
