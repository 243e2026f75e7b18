use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use qrpark::capture::{FrameGrabber, StillImages};
use qrpark::config::{AppConfig, Cli, DisplayConfig, SourceConfig};
use qrpark::pipeline::{Pipeline, Worker, run_capture_loop};
use qrpark::render::{DirectoryDisplay, Display, Renderer};
use qrpark::reporter::{HttpReporter, LogPublisher, Publisher};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    qrpark::telemetry::init(cli.verbose);

    let config = AppConfig::from_cli(cli)?;
    info!(
        "Starting qrpark for {} ({} zones, ttl {}s)",
        config.camera_id,
        config.zones.len(),
        config.ttl.as_secs()
    );

    // Camera open failure is fatal, before anything else starts
    let mut grabber = open_source(&config.source)?;
    let (w, h) = grabber.resolution();
    info!("Frame source: {} ({}x{})", grabber.name(), w, h);

    let publisher: Box<dyn Publisher> = match &config.endpoint {
        Some(url) => Box::new(HttpReporter::new(url.clone(), config.request_timeout)?),
        None => {
            warn!("Dry run: reports are logged, not sent");
            Box::new(LogPublisher)
        }
    };

    let mut renderer = Renderer::new();
    if let Some(font) = &config.font {
        renderer = renderer.with_font_file(font)?;
    }
    if !renderer.has_font() {
        debug!("No overlay font configured, labels are skipped");
    }
    let display = open_display(&config.display)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    }

    let worker = Worker::new(
        config.camera_id.clone(),
        config.zones.clone(),
        config.ttl,
        publisher,
    );
    let mut pipeline = Pipeline::start(worker, config.submit_interval)?;
    info!("Pipeline running");

    run_capture_loop(
        grabber.as_mut(),
        &mut pipeline,
        &renderer,
        display,
        &stop,
    )?;

    // The worker has exited; only now release the camera
    drop(grabber);
    info!("Exiting");
    Ok(())
}

fn open_source(source: &SourceConfig) -> Result<Box<dyn FrameGrabber>> {
    match source {
        SourceConfig::Replay(dir) => Ok(Box::new(StillImages::open(
            dir,
            Duration::from_millis(33),
        )?)),
        #[cfg(feature = "camera")]
        SourceConfig::Camera {
            index,
            width,
            height,
        } => {
            let camera = qrpark::capture::Camera::open(*index, *width, *height)
                .with_context(|| format!("Could not open camera at index {}", index))?;
            Ok(Box::new(camera))
        }
        #[cfg(not(feature = "camera"))]
        SourceConfig::Camera { index, .. } => Err(anyhow::anyhow!(
            "Could not open camera at index {}: built without the `camera` feature (use --replay)",
            index
        )),
    }
}

fn open_display(display: &DisplayConfig) -> Result<Option<Box<dyn Display>>> {
    Ok(match display {
        DisplayConfig::Headless => None,
        DisplayConfig::Directory(dir) => Some(Box::new(
            DirectoryDisplay::new(dir.clone(), Duration::from_secs(1))
                .context("Failed to set up debug output")?,
        )),
        #[cfg(feature = "gui")]
        DisplayConfig::Window => Some(Box::new(qrpark::render::WindowDisplay::new())),
    })
}
