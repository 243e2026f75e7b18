pub mod preprocessing;
pub mod qr;

use crate::models::DecodedCode;
use image::GrayImage;
use tracing::{debug, warn};

pub use preprocessing::{Prepared, Preprocessor};
pub use qr::{CodeDecoder, DecodeError, QrDecoder};

/// One decode attempt: picks which prepared image variant to decode
pub trait DetectionStrategy: Send {
    fn select<'a>(&self, prepared: &'a Prepared) -> &'a GrayImage;

    /// Human-readable name for this strategy (used in log output)
    fn name(&self) -> &str;
}

/// Decode the high-contrast thresholded image
pub struct ThresholdedStrategy;

impl DetectionStrategy for ThresholdedStrategy {
    fn select<'a>(&self, prepared: &'a Prepared) -> &'a GrayImage {
        &prepared.binary
    }

    fn name(&self) -> &str {
        "thresholded"
    }
}

/// Decode the plain grayscale image
pub struct GrayscaleStrategy;

impl DetectionStrategy for GrayscaleStrategy {
    fn select<'a>(&self, prepared: &'a Prepared) -> &'a GrayImage {
        &prepared.gray
    }

    fn name(&self) -> &str {
        "grayscale"
    }
}

/// Runs strategies in order and stops at the first one that decodes anything.
///
/// A failing attempt is logged and treated as "no result" so the next
/// strategy still runs.
pub struct CodeDetector {
    decoder: Box<dyn CodeDecoder>,
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl CodeDetector {
    /// Detector with no strategies
    pub fn new(decoder: Box<dyn CodeDecoder>) -> Self {
        Self {
            decoder,
            strategies: Vec::new(),
        }
    }

    /// Thresholded image first, grayscale as fallback
    pub fn standard(decoder: Box<dyn CodeDecoder>) -> Self {
        Self::new(decoder)
            .add_strategy(Box::new(ThresholdedStrategy))
            .add_strategy(Box::new(GrayscaleStrategy))
    }

    pub fn add_strategy(mut self, strategy: Box<dyn DetectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn detect(&self, prepared: &Prepared) -> Vec<DecodedCode> {
        for strategy in &self.strategies {
            match self.decoder.decode(strategy.select(prepared)) {
                Ok(codes) if !codes.is_empty() => {
                    debug!(
                        "{} decoded {} code(s) on {} image",
                        self.decoder.name(),
                        codes.len(),
                        strategy.name()
                    );
                    return codes;
                }
                Ok(_) => {}
                Err(e) => warn!("Decode attempt on {} image failed: {}", strategy.name(), e),
            }
        }
        Vec::new()
    }
}

impl Default for CodeDetector {
    fn default() -> Self {
        Self::standard(Box::new(QrDecoder::new()))
    }
}
