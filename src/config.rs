//! Command line and environment configuration.
//!
//! `Cli` is what clap parses; `AppConfig` is the validated form the rest of
//! the program consumes.

use crate::zones::ZoneTable;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "qrpark")]
#[command(about = "Track which vehicle occupies which parking spot from a live camera feed")]
pub struct Cli {
    /// Camera device index
    #[arg(long, env = "QRPARK_CAMERA_INDEX", default_value_t = 0)]
    pub camera_index: u32,

    /// Requested capture width
    #[arg(long, env = "QRPARK_WIDTH", default_value_t = 640)]
    pub width: u32,

    /// Requested capture height
    #[arg(long, env = "QRPARK_HEIGHT", default_value_t = 480)]
    pub height: u32,

    /// Identifier sent with every report
    #[arg(long, env = "QRPARK_CAMERA_ID", default_value = "cam_main_01")]
    pub camera_id: String,

    /// Backend detections endpoint
    #[arg(
        long,
        env = "QRPARK_ENDPOINT",
        default_value = "http://localhost:8000/api/detections"
    )]
    pub endpoint: String,

    /// Zone file produced by the calibration tool (built-in layout if omitted)
    #[arg(long, env = "QRPARK_ZONES", value_name = "FILE")]
    pub zones: Option<PathBuf>,

    /// Minimum interval between frames handed to the worker
    #[arg(long, env = "QRPARK_SUBMIT_INTERVAL_MS", default_value_t = 100)]
    pub submit_interval_ms: u64,

    /// Seconds a vehicle stays reported after its last sighting
    #[arg(long, env = "QRPARK_TTL_SECS", default_value_t = 35)]
    pub ttl_secs: u64,

    /// Timeout for one report request
    #[arg(long, env = "QRPARK_REQUEST_TIMEOUT_MS", default_value_t = 2000)]
    pub request_timeout_ms: u64,

    /// Replay still images from a directory instead of opening a camera
    #[arg(long, value_name = "DIR")]
    pub replay: Option<PathBuf>,

    /// Write annotated live and debug frames to a directory
    #[arg(long, value_name = "DIR")]
    pub debug_out: Option<PathBuf>,

    /// Show live and debug windows
    #[cfg(feature = "gui")]
    #[arg(long)]
    pub window: bool,

    /// Font used for overlay labels
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Log reports instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Camera { index: u32, width: u32, height: u32 },
    Replay(PathBuf),
}

/// Where rendered frames go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayConfig {
    Headless,
    Directory(PathBuf),
    #[cfg(feature = "gui")]
    Window,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub camera_id: String,
    /// `None` in dry-run mode
    pub endpoint: Option<Url>,
    pub zones: ZoneTable,
    pub submit_interval: Duration,
    pub ttl: Duration,
    pub request_timeout: Duration,
    pub display: DisplayConfig,
    pub font: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.camera_id.trim().is_empty() {
            bail!("camera id must not be empty");
        }
        if cli.ttl_secs == 0 {
            bail!("ttl must be at least one second");
        }
        if cli.request_timeout_ms == 0 {
            bail!("request timeout must be positive");
        }

        let endpoint = if cli.dry_run {
            None
        } else {
            Some(parse_endpoint(&cli.endpoint)?)
        };

        let zones = match &cli.zones {
            Some(path) => ZoneTable::load(path)
                .with_context(|| format!("Failed to load zones from {}", path.display()))?,
            None => ZoneTable::default_layout(),
        };
        if zones.is_empty() {
            bail!("no zones configured");
        }

        let source = match cli.replay {
            Some(dir) => SourceConfig::Replay(dir),
            None => SourceConfig::Camera {
                index: cli.camera_index,
                width: cli.width,
                height: cli.height,
            },
        };

        #[cfg(feature = "gui")]
        let window = cli.window;
        #[cfg(not(feature = "gui"))]
        let window = false;

        let display = match (window, cli.debug_out) {
            #[cfg(feature = "gui")]
            (true, _) => DisplayConfig::Window,
            (_, Some(dir)) => DisplayConfig::Directory(dir),
            _ => DisplayConfig::Headless,
        };

        Ok(Self {
            source,
            camera_id: cli.camera_id,
            endpoint,
            zones,
            submit_interval: Duration::from_millis(cli.submit_interval_ms),
            ttl: Duration::from_secs(cli.ttl_secs),
            request_timeout: Duration::from_millis(cli.request_timeout_ms),
            display,
            font: cli.font,
        })
    }
}

/// Accept only absolute http(s) URLs
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid endpoint {:?}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported endpoint scheme {:?}", other),
    }
}
