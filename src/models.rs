use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use url::Url;

/// A raw camera frame. Owned by exactly one pipeline stage at a time.
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }
}

/// Pixel-space point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A single optical code decoded from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCode {
    pub payload: String,
    /// Polygon corners in decode order
    pub geometry: Vec<Point>,
}

impl DecodedCode {
    pub fn new(payload: impl Into<String>, geometry: Vec<Point>) -> Self {
        Self {
            payload: payload.into(),
            geometry,
        }
    }

    /// Vehicle identifier carried by the payload.
    ///
    /// URL payloads resolve to their last path segment, anything else is used
    /// verbatim. Empty payloads yield `None`.
    pub fn vehicle_id(&self) -> Option<String> {
        vehicle_id_from_payload(&self.payload)
    }

    /// Mean of all polygon points, `None` for a code without geometry.
    pub fn centroid(&self) -> Option<Point> {
        if self.geometry.is_empty() {
            return None;
        }
        let n = self.geometry.len() as f32;
        let (sx, sy) = self
            .geometry
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

/// Derive the vehicle identifier from a raw code payload
pub fn vehicle_id_from_payload(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    match Url::parse(payload) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
        _ => Some(payload.to_string()),
    }
}

/// A code from the current frame that resolved to a parking spot
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub spot_id: String,
    pub vehicle_id: String,
    pub geometry: Vec<Point>,
}

/// One `(spot, vehicle)` pair of the debounced state.
///
/// Serialized with the field names the backend expects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub spot_id: String,
    #[serde(rename = "bus_number")]
    pub vehicle_id: String,
}

impl SnapshotEntry {
    pub fn new(spot_id: impl Into<String>, vehicle_id: impl Into<String>) -> Self {
        Self {
            spot_id: spot_id.into(),
            vehicle_id: vehicle_id.into(),
        }
    }
}

/// Publish-ready occupancy state, sorted by spot then vehicle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StableSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl StableSnapshot {
    pub fn new(mut entries: Vec<SnapshotEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as `(spot_id, vehicle_id)` tuples
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.spot_id.as_str(), e.vehicle_id.as_str()))
            .collect()
    }
}
