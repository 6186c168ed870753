//! Color segmentation: RGB frame to binary mask plus grayscale.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;

use crate::params::{Hsv, HsvFilterParams};

/// Output of [`segment`].
#[derive(Clone, Debug)]
pub struct Segmentation {
    /// `255` where the pixel passed the color gate, `0` elsewhere.
    pub mask: GrayImage,
    pub gray: GrayImage,
}

/// Convert one RGB pixel to 8-bit HSV (hue halved into `[0, 180)`).
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let [r, g, b] = rgb.map(f64::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    // 360 deg rounds to hue 180, which wraps to 0
    let h = ((h / 2.0).round() as u32 % 180) as u8;
    Hsv::new(h, s.round() as u8, v as u8)
}

/// Binary mask of pixels whose HSV value lies inside `[low, high]`.
pub fn hsv_in_range(frame: &RgbImage, low: &Hsv, high: &Hsv) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let hsv = rgb_to_hsv(frame.get_pixel(x, y).0);
        Luma([if hsv.within(low, high) { 255 } else { 0 }])
    })
}

/// Gate the frame on color and close small gaps in the mask.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(w = frame.width(), h = frame.height()))
)]
pub fn segment(frame: &RgbImage, params: &HsvFilterParams) -> Segmentation {
    let ranged = hsv_in_range(frame, &params.low, &params.high);
    // k passes of a 3x3 closing equal one closing with a (2k+1) square
    let mask = match params.morphology_iterations {
        0 => ranged,
        k => close(&ranged, Norm::LInf, k),
    };
    let gray = luma_bt601(frame);
    Segmentation { mask, gray }
}

/// Grayscale with BT.601 weights, `0.299 R + 0.587 G + 0.114 B`.
pub fn luma_bt601(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0.map(f64::from);
        Luma([(0.299 * r + 0.587 * g + 0.114 * b).round() as u8])
    })
}
