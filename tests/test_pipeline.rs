//! End-to-end tests for the detection worker and the frame pipeline.
//!
//! Tests cover:
//! - A rendered QR code flowing through preprocessing, detection, zone
//!   mapping, debouncing, and publishing
//! - Debounce expiry with simulated time
//! - Publisher failures leaving the state untouched
//! - The single-slot queue dropping frames while the worker is busy
//! - The capture loop shutting the worker down when the source fails
//! - The capture loop failing when the worker thread dies

mod common;

use common::*;
use image::RgbImage;
use qrpark::capture::{CaptureError, FrameGrabber};
use qrpark::pipeline::{Pipeline, Phase, Worker, run_capture_loop};
use qrpark::queue::Offer;
use qrpark::render::{DirectoryDisplay, Renderer};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(35);

fn recording_worker() -> (Worker, RecordingPublisher) {
    let publisher = RecordingPublisher::default();
    let worker = Worker::new(
        "cam_main_01",
        ZoneTable::default_layout(),
        TTL,
        Box::new(publisher.clone()),
    );
    (worker, publisher)
}

#[test]
fn test_code_in_spot_is_reported_then_expires() {
    let (mut worker, publisher) = recording_worker();
    let t0 = Instant::now();

    // 1. A code centered inside A1
    let snapshot = worker.process(Frame::new(qr_frame("BUS123", 150, 350, 6)), t0);
    assert_eq!(snapshot.pairs(), vec![("A1", "BUS123")]);

    let current = worker.reader().current_detections();
    assert_eq!(current.len(), 1);
    let centroid = DecodedCode::new("BUS123", current[0].geometry.clone())
        .centroid()
        .unwrap();
    assert!((centroid.x - 150.0).abs() < 5.0, "centroid {:?}", centroid);
    assert!((centroid.y - 350.0).abs() < 5.0, "centroid {:?}", centroid);

    // 2. Vehicle hidden, still inside the debounce window
    let snapshot = worker.process(Frame::new(blank_frame()), t0 + Duration::from_secs(20));
    assert_eq!(snapshot.pairs(), vec![("A1", "BUS123")]);
    assert!(worker.reader().current_detections().is_empty());

    // 3. Past the TTL it is gone
    let snapshot = worker.process(Frame::new(blank_frame()), t0 + Duration::from_secs(36));
    assert!(snapshot.is_empty());

    // Every cycle publishes the full state, including the empty one
    let reports = publisher.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.camera_id == "cam_main_01"));
    assert_eq!(reports[0].detections, vec![SnapshotEntry::new("A1", "BUS123")]);
    assert_eq!(reports[1].detections, reports[0].detections);
    assert!(reports[2].detections.is_empty());
}

#[test]
fn test_url_payload_reports_last_path_segment() {
    let (mut worker, publisher) = recording_worker();

    let frame = qr_frame("https://fleet.example.com/buses/BUS42", 463, 378, 4);
    let snapshot = worker.process(Frame::new(frame), Instant::now());

    assert_eq!(snapshot.pairs(), vec![("B1", "BUS42")]);
    assert_eq!(publisher.reports()[0].detections[0].vehicle_id, "BUS42");
}

#[test]
fn test_code_outside_zones_is_ignored() {
    let (mut worker, _publisher) = recording_worker();

    // Between the two columns of spots
    let snapshot = worker.process(Frame::new(qr_frame("BUS9", 312, 240, 4)), Instant::now());
    assert!(snapshot.is_empty());
    assert!(worker.reader().current_detections().is_empty());
}

#[test]
fn test_publish_failure_keeps_state() {
    let publisher = FailingPublisher::default();
    let mut worker = Worker::new(
        "cam_main_01",
        ZoneTable::default_layout(),
        TTL,
        Box::new(publisher.clone()),
    );
    let reader = worker.reader();
    let t0 = Instant::now();

    let first = worker.process(Frame::new(qr_frame("BUS123", 150, 350, 6)), t0);
    let second = worker.process(Frame::new(blank_frame()), t0 + Duration::from_secs(1));

    assert_eq!(first.pairs(), vec![("A1", "BUS123")]);
    assert_eq!(second, first);
    assert_eq!(reader.stable_snapshot(), second);
    assert_eq!(publisher.attempts(), 2);
}

/// Holds the worker inside `publish` until the test lets it go
struct GatedPublisher {
    entered: mpsc::Sender<()>,
    gate: mpsc::Receiver<()>,
}

impl Publisher for GatedPublisher {
    fn publish(&mut self, _report: &Report) -> Result<(), ReportError> {
        let _ = self.entered.send(());
        let _ = self.gate.recv_timeout(Duration::from_secs(10));
        Ok(())
    }
}

#[test]
fn test_busy_worker_drops_newest_frame_without_blocking() -> anyhow::Result<()> {
    let (entered_tx, entered) = mpsc::channel();
    let (release, gate) = mpsc::channel();
    let worker = Worker::new(
        "cam_main_01",
        ZoneTable::default_layout(),
        TTL,
        Box::new(GatedPublisher {
            entered: entered_tx,
            gate,
        }),
    );
    let mut pipeline = Pipeline::start(worker, Duration::ZERO)?;
    let image = RgbImage::new(32, 32);
    let t0 = Instant::now();

    // 1. First frame is taken by the worker, which then blocks
    assert_eq!(pipeline.submit(&image, t0), Some(Offer::Queued));
    entered.recv_timeout(Duration::from_secs(10))?;

    // 2. Second frame waits in the slot
    assert_eq!(
        pipeline.submit(&image, t0 + Duration::from_millis(1)),
        Some(Offer::Queued)
    );

    // 3. Third frame finds the slot full and is discarded immediately
    let before = Instant::now();
    assert_eq!(
        pipeline.submit(&image, t0 + Duration::from_millis(2)),
        Some(Offer::DroppedNewest)
    );
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(pipeline.dropped_frames(), 1);

    // 4. Let both queued frames through and stop
    release.send(())?;
    release.send(())?;
    pipeline.shutdown()?;
    assert_eq!(pipeline.phase(), Phase::ShuttingDown);

    entered.recv_timeout(Duration::from_secs(10))?;
    assert!(entered.try_recv().is_err(), "dropped frame must not be processed");
    Ok(())
}

#[test]
fn test_throttle_skips_early_frames() -> anyhow::Result<()> {
    let (worker, _publisher) = recording_worker();
    let mut pipeline = Pipeline::start(worker, Duration::from_millis(100))?;
    let image = RgbImage::new(32, 32);
    let t0 = Instant::now();

    assert_eq!(pipeline.submit(&image, t0), Some(Offer::Queued));
    assert_eq!(pipeline.submit(&image, t0 + Duration::from_millis(50)), None);
    assert_eq!(pipeline.submit(&image, t0 + Duration::from_millis(100)), None);
    assert!(pipeline.submit(&image, t0 + Duration::from_millis(101)).is_some());

    pipeline.shutdown()?;
    Ok(())
}

/// Yields a fixed list of frames, then fails like a disconnected camera
struct FiniteSource {
    frames: Vec<RgbImage>,
}

impl FrameGrabber for FiniteSource {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::Read("device disconnected".into()));
        }
        // Pace like a camera so the throttle lets frames through
        std::thread::sleep(Duration::from_millis(20));
        Ok(self.frames.remove(0))
    }

    fn resolution(&self) -> (u32, u32) {
        (FRAME_WIDTH, FRAME_HEIGHT)
    }

    fn name(&self) -> String {
        "finite".into()
    }
}

#[test]
fn test_capture_loop_stops_worker_when_source_fails() -> anyhow::Result<()> {
    let (worker, publisher) = recording_worker();
    let mut pipeline = Pipeline::start(worker, Duration::ZERO)?;
    let mut source = FiniteSource {
        frames: vec![qr_frame("BUS123", 150, 350, 6)],
    };
    let out = tempfile::TempDir::new()?;
    let display = DirectoryDisplay::new(out.path().to_path_buf(), Duration::ZERO)?;
    let stop = AtomicBool::new(false);

    run_capture_loop(
        &mut source,
        &mut pipeline,
        &Renderer::new(),
        Some(Box::new(display)),
        &stop,
    )?;

    assert_eq!(pipeline.phase(), Phase::ShuttingDown);
    // The worker drained the queued frame before the sentinel
    let reports = publisher.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].detections, vec![SnapshotEntry::new("A1", "BUS123")]);
    assert!(out.path().join("live.png").exists());
    Ok(())
}

#[test]
fn test_capture_loop_honors_stop_flag() -> anyhow::Result<()> {
    let (worker, publisher) = recording_worker();
    let mut pipeline = Pipeline::start(worker, Duration::ZERO)?;
    let mut source = FiniteSource {
        frames: vec![blank_frame(); 3],
    };
    let stop = AtomicBool::new(true);

    run_capture_loop(&mut source, &mut pipeline, &Renderer::new(), None, &stop)?;

    assert_eq!(pipeline.phase(), Phase::ShuttingDown);
    assert_eq!(source.frames.len(), 3);
    assert!(publisher.reports().is_empty());
    Ok(())
}

/// Brings the worker thread down on its first report
struct PanickingPublisher;

impl Publisher for PanickingPublisher {
    fn publish(&mut self, _report: &Report) -> Result<(), ReportError> {
        panic!("publisher crashed");
    }
}

#[test]
fn test_capture_loop_stops_when_worker_dies() -> anyhow::Result<()> {
    let worker = Worker::new(
        "cam_main_01",
        ZoneTable::default_layout(),
        TTL,
        Box::new(PanickingPublisher),
    );
    let mut pipeline = Pipeline::start(worker, Duration::ZERO)?;
    let mut source = FiniteSource {
        frames: vec![RgbImage::new(32, 32); 100],
    };
    let stop = AtomicBool::new(false);

    let result = run_capture_loop(&mut source, &mut pipeline, &Renderer::new(), None, &stop);

    assert!(result.is_err(), "a dead worker must fail the capture loop");
    assert_eq!(pipeline.phase(), Phase::ShuttingDown);
    // Capture stopped long before the source ran dry
    assert!(source.frames.len() > 50, "{} frames left", source.frames.len());
    Ok(())
}
