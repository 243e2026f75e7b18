//! Frame acquisition.
//!
//! A [`FrameGrabber`] yields frames at the device's native rate; the
//! [`Throttle`] limits how often one of them is offered to the worker.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {index}: {reason}")]
    Open { index: u32, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("no frames available in {0:?}")]
    Empty(PathBuf),
}

/// Source of raw frames
pub trait FrameGrabber {
    /// Block until the next frame is available
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;

    /// Actual frame size delivered by the source
    fn resolution(&self) -> (u32, u32);

    fn name(&self) -> String;
}

/// Limits submissions to at most one per interval
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Record a submission
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Replays a directory of still images in name order, looping forever
pub struct StillImages {
    frames: Vec<RgbImage>,
    position: usize,
    pace: Duration,
    last: Option<Instant>,
}

impl StillImages {
    pub fn open(dir: &Path, pace: Duration) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| {
                        matches!(
                            e.to_ascii_lowercase().as_str(),
                            "png" | "jpg" | "jpeg" | "bmp"
                        )
                    })
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let img = image::open(path)
                .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", path.display(), e))?;
            frames.push(img.to_rgb8());
        }
        if frames.is_empty() {
            return Err(CaptureError::Empty(dir.to_path_buf()).into());
        }

        info!("Replaying {} images from {}", frames.len(), dir.display());
        Ok(Self::from_frames(frames, pace))
    }

    pub fn from_frames(frames: Vec<RgbImage>, pace: Duration) -> Self {
        Self {
            frames,
            position: 0,
            pace,
            last: None,
        }
    }
}

impl FrameGrabber for StillImages {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::Read("replay source is empty".into()));
        }
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.pace {
                thread::sleep(self.pace - elapsed);
            }
        }
        self.last = Some(Instant::now());

        let frame = self.frames[self.position].clone();
        self.position = (self.position + 1) % self.frames.len();
        Ok(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn name(&self) -> String {
        format!("replay ({} images)", self.frames.len())
    }
}

#[cfg(feature = "camera")]
pub use camera::Camera;

#[cfg(feature = "camera")]
mod camera {
    use super::{CaptureError, FrameGrabber};
    use image::RgbImage;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use tracing::{info, warn};

    /// Local camera opened by device index
    pub struct Camera {
        index: u32,
        inner: nokhwa::Camera,
    }

    impl Camera {
        /// Open the device and start streaming. The requested resolution is
        /// a hint; the device may choose another one.
        pub fn open(index: u32, width: u32, height: u32) -> Result<Self, CaptureError> {
            let open_err = |e: nokhwa::NokhwaError| CaptureError::Open {
                index,
                reason: e.to_string(),
            };
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30),
            ));
            let mut inner =
                nokhwa::Camera::new(CameraIndex::Index(index), requested).map_err(open_err)?;
            inner.open_stream().map_err(open_err)?;

            let actual = inner.resolution();
            if actual.width() != width || actual.height() != height {
                warn!(
                    "Camera delivers {}x{} instead of requested {}x{}",
                    actual.width(),
                    actual.height(),
                    width,
                    height
                );
            }
            info!("Opened camera {} ({})", index, inner.info().human_name());
            Ok(Self { index, inner })
        }
    }

    impl FrameGrabber for Camera {
        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            let buffer = self
                .inner
                .frame()
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            let (w, h) = (decoded.width(), decoded.height());
            RgbImage::from_raw(w, h, decoded.into_raw())
                .ok_or_else(|| CaptureError::Read("frame buffer size mismatch".into()))
        }

        fn resolution(&self) -> (u32, u32) {
            let r = self.inner.resolution();
            (r.width(), r.height())
        }

        fn name(&self) -> String {
            format!("camera {}", self.index)
        }
    }

    impl Drop for Camera {
        fn drop(&mut self) {
            if let Err(e) = self.inner.stop_stream() {
                warn!("Failed to stop camera stream: {}", e);
            }
        }
    }
}
