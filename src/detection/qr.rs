use crate::models::{DecodedCode, Point};
use image::GrayImage;
use rqrr::PreparedImage;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decoder panicked: {0}")]
    Panicked(String),
    #[error("decoder failed: {0}")]
    Failed(String),
}

/// Low-level code decoding primitive
pub trait CodeDecoder: Send {
    /// Decode every code visible in `image`
    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedCode>, DecodeError>;

    fn name(&self) -> &str;
}

/// QR decoding backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl CodeDecoder for QrDecoder {
    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedCode>, DecodeError> {
        // rqrr can panic on pathological grids; contain it to this attempt
        panic::catch_unwind(AssertUnwindSafe(|| decode_grids(image)))
            .map_err(|payload| DecodeError::Panicked(panic_message(payload.as_ref())))
    }

    fn name(&self) -> &str {
        "rqrr"
    }
}

fn decode_grids(image: &GrayImage) -> Vec<DecodedCode> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut prepared = PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        image.get_pixel(x as u32, y as u32)[0]
    });
    let grids = prepared.detect_grids();
    trace!("Found {} candidate grids", grids.len());

    let mut codes = Vec::new();
    for grid in grids {
        let geometry = grid
            .bounds
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        match grid.decode() {
            Ok((_meta, content)) => codes.push(DecodedCode::new(content, geometry)),
            Err(e) => debug!("Grid failed to decode: {:?}", e),
        }
    }
    codes
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
