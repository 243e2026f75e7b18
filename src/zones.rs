use crate::models::{DecodedCode, Detection, Point};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Layout of the reference five-spot garage at 640x480
pub const DEFAULT_ZONES: [(&str, [f32; 4]); 5] = [
    ("A1", [63.0, 291.0, 243.0, 454.0]),
    ("A2", [60.0, 11.0, 227.0, 189.0]),
    ("B1", [382.0, 304.0, 544.0, 452.0]),
    ("B2", [380.0, 160.0, 541.0, 300.0]),
    ("B3", [381.0, 9.0, 542.0, 156.0]),
];

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("failed to read zone file {path:?}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid zone file {path:?}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("zones {first} and {second} overlap")]
    Overlap { first: String, second: String },
    #[error("spot {0} is defined more than once")]
    Duplicate(String),
}

/// Pixel-space rectangle for one parking spot
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub spot_id: String,
    pub x_start: f32,
    pub y_start: f32,
    pub x_end: f32,
    pub y_end: f32,
}

impl Zone {
    pub fn new(spot_id: impl Into<String>, rect: [f32; 4]) -> Self {
        let [x_start, y_start, x_end, y_end] = rect;
        Self {
            spot_id: spot_id.into(),
            x_start,
            y_start,
            x_end,
            y_end,
        }
    }

    /// Strict containment on both axes; degenerate rectangles contain nothing.
    pub fn contains(&self, p: Point) -> bool {
        self.x_start < p.x && p.x < self.x_end && self.y_start < p.y && p.y < self.y_end
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.x_start < self.x_end && self.y_start < self.y_end)
    }

    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.x_start + self.x_end) / 2.0,
            (self.y_start + self.y_end) / 2.0,
        )
    }

    /// True when the interiors of both rectangles intersect
    pub fn overlaps(&self, other: &Zone) -> bool {
        if self.is_degenerate() || other.is_degenerate() {
            return false;
        }
        self.x_start < other.x_end
            && other.x_start < self.x_end
            && self.y_start < other.y_end
            && other.y_start < self.y_end
    }
}

/// Immutable spot table, iterated in a fixed order (sorted by spot id).
#[derive(Debug, Clone)]
pub struct ZoneTable {
    zones: Vec<Zone>,
}

impl ZoneTable {
    /// Validate and build a table. Overlapping or duplicated spots are rejected.
    pub fn new(mut zones: Vec<Zone>) -> Result<Self, ZoneError> {
        zones.sort_by(|a, b| a.spot_id.cmp(&b.spot_id));

        let mut seen = HashSet::new();
        for zone in &zones {
            if !seen.insert(zone.spot_id.as_str()) {
                return Err(ZoneError::Duplicate(zone.spot_id.clone()));
            }
            if zone.is_degenerate() {
                warn!("Zone {} has zero area and will never match", zone.spot_id);
            }
        }

        for (i, a) in zones.iter().enumerate() {
            for b in &zones[i + 1..] {
                if a.overlaps(b) {
                    return Err(ZoneError::Overlap {
                        first: a.spot_id.clone(),
                        second: b.spot_id.clone(),
                    });
                }
            }
        }

        Ok(Self { zones })
    }

    /// Built-in garage layout
    pub fn default_layout() -> Self {
        Self {
            zones: DEFAULT_ZONES
                .iter()
                .map(|(id, rect)| Zone::new(*id, *rect))
                .collect(),
        }
    }

    /// Parse the calibration output: `{"A1": [x_start, y_start, x_end, y_end], ...}`
    pub fn from_json_str(json: &str) -> Result<Self, ZoneError> {
        let raw: BTreeMap<String, [f32; 4]> =
            serde_json::from_str(json).map_err(|source| ZoneError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        Self::from_map(raw)
    }

    /// Load the calibration output from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZoneError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let file = File::open(path).map_err(|source| ZoneError::Io {
            path: shown.clone(),
            source,
        })?;
        let raw: BTreeMap<String, [f32; 4]> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ZoneError::Parse {
                path: shown.clone(),
                source,
            })?;

        let table = Self::from_map(raw)?;
        info!("Loaded {} zones from {}", table.len(), shown);
        Ok(table)
    }

    fn from_map(raw: BTreeMap<String, [f32; 4]>) -> Result<Self, ZoneError> {
        Self::new(
            raw.into_iter()
                .map(|(spot_id, rect)| Zone::new(spot_id, rect))
                .collect(),
        )
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// First zone strictly containing `p`
    pub fn locate(&self, p: Point) -> Option<&Zone> {
        self.zones.iter().find(|z| z.contains(p))
    }

    /// Zone enclosing the centroid of a decoded code
    pub fn resolve(&self, code: &DecodedCode) -> Option<&Zone> {
        self.locate(code.centroid()?)
    }

    /// Map decoded codes to current-frame detections.
    ///
    /// Codes without geometry, without a readable payload, or outside every
    /// zone are skipped.
    pub fn map_codes(&self, codes: &[DecodedCode]) -> Vec<Detection> {
        let mut detections = Vec::new();
        for code in codes {
            let Some(vehicle_id) = code.vehicle_id() else {
                debug!("Ignoring code with unreadable payload");
                continue;
            };
            let Some(zone) = self.resolve(code) else {
                debug!("Code {} is outside every zone", vehicle_id);
                continue;
            };
            detections.push(Detection {
                spot_id: zone.spot_id.clone(),
                vehicle_id,
                geometry: code.geometry.clone(),
            });
        }
        detections
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::default_layout()
    }
}
