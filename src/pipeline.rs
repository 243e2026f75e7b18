//! Worker pipeline tying together capture, detection, debouncing, and
//! publishing.
//!
//! The capture/render thread offers frames into a single-slot queue. One
//! worker thread drains it and runs, per frame and strictly in order:
//! preprocessing, code detection, zone mapping, the persistence cycle, and the
//! report. Shutdown is a sentinel sent through the same queue.

use crate::capture::{FrameGrabber, Throttle};
use crate::detection::{CodeDetector, Preprocessor};
use crate::models::{Detection, Frame, StableSnapshot};
use crate::queue::{Offer, SlotReceiver, SlotSender, slot};
use crate::render::{Display, Renderer};
use crate::reporter::{Publisher, Report};
use crate::tracker::PersistenceTracker;
use crate::zones::ZoneTable;
use anyhow::{Context, Result, anyhow, bail};
use image::{GrayImage, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Message on the frame queue
pub enum WorkerMessage {
    Frame(Frame),
    /// Stop after this message
    Shutdown,
}

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Terminal
    ShuttingDown,
}

#[derive(Debug, Default)]
struct SharedView {
    detections: Vec<Detection>,
    snapshot: StableSnapshot,
}

/// Worker-owned pipeline state.
///
/// The tracker is only touched by the worker; the latest per-frame
/// detections and snapshot are published into a shared view that the render
/// thread reads through a [`StateReader`].
pub struct PipelineState {
    tracker: PersistenceTracker,
    view: Arc<Mutex<SharedView>>,
}

impl PipelineState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tracker: PersistenceTracker::new(ttl),
            view: Arc::new(Mutex::new(SharedView::default())),
        }
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            view: self.view.clone(),
        }
    }

    /// Run the tracker cycle and replace the shared view
    pub fn commit(&mut self, detections: Vec<Detection>, now: Instant) -> StableSnapshot {
        let snapshot = self.tracker.cycle(&detections, now);
        let mut view = lock(&self.view);
        view.detections = detections;
        view.snapshot = snapshot.clone();
        snapshot
    }

    pub fn tracked(&self) -> usize {
        self.tracker.len()
    }

    pub fn ttl(&self) -> Duration {
        self.tracker.ttl()
    }
}

/// Read-only access for the render thread; every call copies out under a
/// short lock
#[derive(Clone)]
pub struct StateReader {
    view: Arc<Mutex<SharedView>>,
}

impl StateReader {
    /// Detections from the most recently processed frame only
    pub fn current_detections(&self) -> Vec<Detection> {
        lock(&self.view).detections.clone()
    }

    pub fn stable_snapshot(&self) -> StableSnapshot {
        lock(&self.view).snapshot.clone()
    }
}

fn lock(view: &Mutex<SharedView>) -> MutexGuard<'_, SharedView> {
    // The view is replaced wholesale, so a poisoned guard still holds a
    // consistent value.
    view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the worker thread owns
pub struct Worker {
    camera_id: String,
    preprocessor: Preprocessor,
    detector: CodeDetector,
    zones: ZoneTable,
    state: PipelineState,
    publisher: Box<dyn Publisher>,
    debug: Option<SlotSender<GrayImage>>,
}

impl Worker {
    pub fn new(
        camera_id: impl Into<String>,
        zones: ZoneTable,
        ttl: Duration,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            preprocessor: Preprocessor::default(),
            detector: CodeDetector::default(),
            zones,
            state: PipelineState::new(ttl),
            publisher,
            debug: None,
        }
    }

    /// Offer every thresholded image on `tx` (drop-if-full)
    pub fn with_debug_channel(mut self, tx: SlotSender<GrayImage>) -> Self {
        self.debug = Some(tx);
        self
    }

    pub fn reader(&self) -> StateReader {
        self.state.reader()
    }

    /// One processing cycle for one frame
    pub fn process(&mut self, frame: Frame, now: Instant) -> StableSnapshot {
        let prepared = self.preprocessor.prepare(&frame.image);
        if let Some(tx) = &self.debug {
            // Skip the copy while the previous image is still unread
            if tx.is_full() || tx.offer(prepared.binary.clone()) == Offer::DroppedNewest {
                trace!("Debug view busy, dropped thresholded image");
            }
        }

        let codes = self.detector.detect(&prepared);
        let detections = self.zones.map_codes(&codes);
        if !detections.is_empty() {
            debug!(
                "Frame from {:?} ago: {} code(s), {} in a zone",
                now.saturating_duration_since(frame.captured_at),
                codes.len(),
                detections.len()
            );
        }

        let snapshot = self.state.commit(detections, now);

        let report = Report::new(&self.camera_id, &snapshot);
        if let Err(e) = self.publisher.publish(&report) {
            warn!("Failed to publish {} detections: {:#}", report.detections.len(), anyhow!(e));
        }
        snapshot
    }

    /// Drain the frame queue until the sentinel arrives or every sender is gone
    pub fn run(mut self, frames: SlotReceiver<WorkerMessage>) {
        let span = tracing::info_span!("worker", camera = %self.camera_id);
        let _guard = span.enter();
        info!(
            "Worker started ({} zones, ttl {}s)",
            self.zones.len(),
            self.state.ttl().as_secs()
        );

        let mut processed: u64 = 0;
        while let Some(message) = frames.recv() {
            match message {
                WorkerMessage::Frame(frame) => {
                    self.process(frame, Instant::now());
                    processed += 1;
                }
                WorkerMessage::Shutdown => break,
            }
        }
        info!(
            "Worker stopped after {} frames ({} vehicles tracked)",
            processed,
            self.state.tracked()
        );
    }
}

/// Handle held by the capture/render thread
pub struct Pipeline {
    frames: SlotSender<WorkerMessage>,
    debug: SlotReceiver<GrayImage>,
    reader: StateReader,
    worker: Option<JoinHandle<()>>,
    phase: Phase,
    throttle: Throttle,
    dropped: u64,
}

impl Pipeline {
    /// Spawn the worker thread and enter [`Phase::Running`]
    pub fn start(worker: Worker, submit_interval: Duration) -> Result<Self> {
        let (frames, frames_rx) = slot();
        let (debug_tx, debug) = slot();
        let worker = worker.with_debug_channel(debug_tx);
        let reader = worker.reader();

        let handle = thread::Builder::new()
            .name("detection-worker".into())
            .spawn(move || worker.run(frames_rx))
            .context("Failed to spawn detection worker")?;

        Ok(Self {
            frames,
            debug,
            reader,
            worker: Some(handle),
            phase: Phase::Running,
            throttle: Throttle::new(submit_interval),
            dropped: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reader(&self) -> &StateReader {
        &self.reader
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Offer a copy of `image` to the worker if the throttle allows it.
    /// Never blocks; returns `None` when throttled or shutting down.
    pub fn submit(&mut self, image: &RgbImage, now: Instant) -> Option<Offer> {
        if self.phase != Phase::Running || !self.throttle.ready(now) {
            return None;
        }
        let outcome = self
            .frames
            .offer(WorkerMessage::Frame(Frame::new(image.clone())));
        match outcome {
            Offer::Queued => self.throttle.mark(now),
            Offer::DroppedNewest => {
                self.dropped += 1;
                trace!("Worker busy, dropped frame ({} total)", self.dropped);
            }
            Offer::Disconnected => warn!("Worker is gone, frame discarded"),
        }
        Some(outcome)
    }

    /// Latest thresholded image, if a new one is waiting
    pub fn take_debug_image(&self) -> Option<GrayImage> {
        self.debug.take()
    }

    /// Enter [`Phase::ShuttingDown`]: send the sentinel and wait for the
    /// worker to exit. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        self.phase = Phase::ShuttingDown;
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };

        info!("Stopping worker...");
        let delivered = self.frames.send_blocking(WorkerMessage::Shutdown);
        handle
            .join()
            .map_err(|_| anyhow!("Detection worker panicked"))?;
        if !delivered {
            bail!("Detection worker exited before shutdown");
        }
        info!("Worker stopped");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("{:#}", e);
        }
    }
}

/// Capture/render loop. Runs until the operator quits, `stop` is raised, or
/// the source fails, then shuts the pipeline down.
pub fn run_capture_loop(
    grabber: &mut dyn FrameGrabber,
    pipeline: &mut Pipeline,
    renderer: &Renderer,
    mut display: Option<Box<dyn Display>>,
    stop: &AtomicBool,
) -> Result<()> {
    let mut last_debug: Option<GrayImage> = None;

    while pipeline.phase() == Phase::Running {
        if stop.load(Ordering::SeqCst) {
            info!("Quit requested");
            break;
        }
        if display.as_ref().map(|d| d.quit_requested()).unwrap_or(false) {
            info!("Quit requested from display");
            break;
        }

        let mut image = match grabber.grab() {
            Ok(image) => image,
            Err(e) => {
                error!("Could not read frame from {}: {}", grabber.name(), e);
                break;
            }
        };
        if pipeline.submit(&image, Instant::now()) == Some(Offer::Disconnected) {
            error!("Detection worker is gone, stopping capture");
            break;
        }

        if let Some(display) = display.as_mut() {
            if let Some(debug) = pipeline.take_debug_image() {
                last_debug = Some(debug);
            }
            let detections = pipeline.reader().current_detections();
            renderer.annotate(&mut image, &detections);
            if let Err(e) = display.show(&image, last_debug.as_ref()) {
                warn!("Display failed: {:#}", e);
            }
        }
    }

    pipeline.shutdown()
}
