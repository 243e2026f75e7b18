//! Operator feedback: overlays for current-frame detections and display sinks.
//!
//! Nothing here feeds back into the debounced state.

#[cfg(feature = "gui")]
pub mod window;

use crate::models::Detection;
use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

#[cfg(feature = "gui")]
pub use window::WindowDisplay;

const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Text drawn next to a detection
pub fn label(detection: &Detection) -> String {
    format!("{} @ {}", detection.vehicle_id, detection.spot_id)
}

/// Draws detection polygons and labels onto live frames
pub struct Renderer {
    font: Option<FontVec>,
    scale: PxScale,
    color: Rgb<u8>,
}

impl Renderer {
    /// Renderer without a font; only polygons are drawn
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(16.0),
            color: OVERLAY_COLOR,
        }
    }

    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            let points: Vec<(f32, f32)> = detection.geometry.iter().map(|p| (p.x, p.y)).collect();
            if points.is_empty() {
                continue;
            }
            draw_closed_polyline(image, &points, self.color);

            if let Some(font) = &self.font {
                let (x, y) = points[0];
                draw_text_mut(
                    image,
                    self.color,
                    x as i32,
                    (y as i32 - 20).max(0),
                    self.scale,
                    font,
                    &label(detection),
                );
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Two pixel wide closed outline
fn draw_closed_polyline(image: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>) {
    let n = points.len();
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        draw_line_segment_mut(image, (x0, y0), (x1, y1), color);
        draw_line_segment_mut(image, (x0 + 1.0, y0), (x1 + 1.0, y1), color);
        draw_line_segment_mut(image, (x0, y0 + 1.0), (x1, y1 + 1.0), color);
    }
}

/// Where rendered frames go
pub trait Display {
    fn show(&mut self, live: &RgbImage, debug: Option<&GrayImage>) -> Result<()>;

    /// Operator asked to quit
    fn quit_requested(&self) -> bool {
        false
    }
}

/// Headless sink: overwrites `live.png` and `debug.png` in a directory,
/// at most once per interval
pub struct DirectoryDisplay {
    dir: PathBuf,
    interval: Duration,
    last: Option<Instant>,
}

impl DirectoryDisplay {
    pub fn new(dir: PathBuf, interval: Duration) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create debug directory {}", dir.display()))?;
        Ok(Self {
            dir,
            interval,
            last: None,
        })
    }

    pub fn live_path(&self) -> PathBuf {
        self.dir.join("live.png")
    }

    pub fn debug_path(&self) -> PathBuf {
        self.dir.join("debug.png")
    }
}

impl Display for DirectoryDisplay {
    fn show(&mut self, live: &RgbImage, debug: Option<&GrayImage>) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.last {
            if now.duration_since(last) < self.interval {
                return Ok(());
            }
        }
        self.last = Some(now);

        live.save(self.live_path())
            .map_err(|e| anyhow::anyhow!("Failed to save live frame: {}", e))?;
        if let Some(debug) = debug {
            DynamicImage::ImageLuma8(debug.clone())
                .save(self.debug_path())
                .map_err(|e| anyhow::anyhow!("Failed to save debug frame: {}", e))?;
        }
        debug!("Saved overlay frames to {}", self.dir.display());
        Ok(())
    }
}
