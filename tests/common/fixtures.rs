use image::{GrayImage, Luma, RgbImage};
use qrcode::{Color, QrCode};
use qrpark::models::{DecodedCode, Detection, Point};
use qrpark::reporter::{Publisher, Report, ReportError};
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Canvas size used by the reference camera
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;

/// Renders `payload` as a QR code centered at `(cx, cy)` on a white
/// 640x480 frame, `module_px` pixels per module.
pub fn qr_frame(payload: &str, cx: u32, cy: u32, module_px: u32) -> RgbImage {
    let gray = qr_gray(payload, cx, cy, module_px);
    RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        image::Rgb([v, v, v])
    })
}

/// Grayscale variant of [`qr_frame`]
pub fn qr_gray(payload: &str, cx: u32, cy: u32, module_px: u32) -> GrayImage {
    let code = QrCode::new(payload.as_bytes()).expect("Failed to encode test QR code");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = modules * module_px;
    let left = cx - side / 2;
    let top = cy - side / 2;

    let mut img = GrayImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Luma([255u8]));
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules;
        let my = i as u32 / modules;
        for dy in 0..module_px {
            for dx in 0..module_px {
                img.put_pixel(left + mx * module_px + dx, top + my * module_px + dy, Luma([0u8]));
            }
        }
    }
    img
}

/// A blank white frame
pub fn blank_frame() -> RgbImage {
    RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, image::Rgb([255u8, 255, 255]))
}

/// Axis-aligned square polygon of half-size `half` around `(cx, cy)`
pub fn square(cx: f32, cy: f32, half: f32) -> Vec<Point> {
    vec![
        Point::new(cx - half, cy - half),
        Point::new(cx + half, cy - half),
        Point::new(cx + half, cy + half),
        Point::new(cx - half, cy + half),
    ]
}

/// A decoded code with a square polygon centered at `(cx, cy)`
pub fn code_at(payload: &str, cx: f32, cy: f32) -> DecodedCode {
    DecodedCode::new(payload, square(cx, cy, 20.0))
}

pub fn detection(spot_id: &str, vehicle_id: &str) -> Detection {
    Detection {
        spot_id: spot_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        geometry: Vec::new(),
    }
}

/// Writes a zone file and returns the temp file (keep alive while in use)
pub fn write_zone_file(json: &str) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("Failed to create temp zone file");
    std::fs::write(file.path(), json).expect("Failed to write zone file");
    file
}

/// Publisher that keeps every report it is given
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingPublisher {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, report: &Report) -> Result<(), ReportError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Publisher that always fails like an unreachable backend answering 503
#[derive(Clone, Default)]
pub struct FailingPublisher {
    attempts: Arc<Mutex<usize>>,
}

impl FailingPublisher {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl Publisher for FailingPublisher {
    fn publish(&mut self, _report: &Report) -> Result<(), ReportError> {
        *self.attempts.lock().unwrap() += 1;
        Err(ReportError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
        })
    }
}
