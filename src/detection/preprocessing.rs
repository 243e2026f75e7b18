use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};

/// Convert image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Edge-preserving smoothing. Flattens sensor noise inside uniform regions
/// while keeping the sharp dark/light transitions of code modules.
pub fn smooth(
    img: &GrayImage,
    window_size: u32,
    sigma_color: f32,
    sigma_spatial: f32,
) -> GrayImage {
    if window_size < 3 {
        return img.clone();
    }
    bilateral_filter(img, window_size, sigma_color, sigma_spatial)
}

/// Gaussian-weighted adaptive threshold.
///
/// A pixel becomes white when it is brighter than its Gaussian-weighted
/// neighbourhood mean minus `offset`, black otherwise. `block_size` is the odd
/// neighbourhood width; the Gaussian sigma is derived from it the same way
/// common vision libraries do.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let block_size = block_size.max(3) | 1;
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(img, sigma);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y)[0] as i16;
        let mean = local_mean.get_pixel(x, y)[0] as i16;
        if value > mean - offset {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Both image variants handed to the detector
#[derive(Clone)]
pub struct Prepared {
    pub gray: GrayImage,
    pub binary: GrayImage,
}

/// Grayscale -> smoothing -> adaptive threshold
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Bilateral window width in pixels
    pub smooth_window: u32,
    pub sigma_color: f32,
    pub sigma_spatial: f32,
    pub block_size: u32,
    pub offset: i16,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            smooth_window: 9,
            sigma_color: 75.0,
            sigma_spatial: 75.0,
            block_size: 11,
            offset: 2,
        }
    }

    pub fn prepare(&self, frame: &RgbImage) -> Prepared {
        let gray = to_grayscale(frame);
        let smoothed = smooth(&gray, self.smooth_window, self.sigma_color, self.sigma_spatial);
        let binary = adaptive_threshold(&smoothed, self.block_size, self.offset);
        Prepared { gray, binary }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
