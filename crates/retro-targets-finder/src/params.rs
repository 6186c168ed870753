//! Tunable detector parameters.

use nalgebra::Vector3;
use retro_targets_core::SubpixParams;
use serde::{Deserialize, Serialize};

/// One HSV triple in the 8-bit convention: hue in `[0, 180)`, saturation and
/// value in `[0, 255]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Inclusive per-channel containment in `[low, high]`.
    #[inline]
    pub fn within(&self, low: &Hsv, high: &Hsv) -> bool {
        (low.h..=high.h).contains(&self.h)
            && (low.s..=high.s).contains(&self.s)
            && (low.v..=high.v).contains(&self.v)
    }
}

/// Color gate applied before contour extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsvFilterParams {
    pub low: Hsv,
    pub high: Hsv,
    /// Number of 3x3 dilate/erode passes in the closing; `0` disables it.
    pub morphology_iterations: u8,
}

impl Default for HsvFilterParams {
    fn default() -> Self {
        Self {
            low: Hsv::new(40, 50, 30),
            high: Hsv::new(150, 255, 200),
            morphology_iterations: 1,
        }
    }
}

/// Geometric filters, corner refinement and pose post-processing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParams {
    /// Minimum number of boundary pixels for a contour to be considered.
    pub contour_size_threshold: usize,
    /// Douglas-Peucker tolerance in pixels.
    pub contour_approximation_accuracy: f64,
    /// Exclusive lower bound on `4*pi*area / perimeter^2`.
    pub shape_factor_min: f64,
    /// Exclusive upper bound on `4*pi*area / perimeter^2`.
    pub shape_factor_max: f64,
    /// Number of standard deviations a section's rectangle area may differ
    /// from the frame mean.
    pub area_stddev_band: f64,
    /// Minimum distance of a section's rectangle center from any image edge.
    pub image_edge_threshold: f64,
    /// Corner refinement window and stopping criteria.
    pub corner_refinement: SubpixParams,
    /// Report the camera pose in the target frame instead of the target
    /// pose in the camera frame.
    pub use_world_coordinates: bool,
    /// Robot-to-camera mechanical offset subtracted from the translation.
    pub robot_offset: Vector3<f64>,
    /// Camera-to-shooter correction added to `x`.
    pub shooter_offset: f64,
    /// Solutions closer than this are reported as `NoTargetFound`.
    pub min_depth: f64,
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            contour_size_threshold: 80,
            contour_approximation_accuracy: 7.0,
            shape_factor_min: 0.4,
            shape_factor_max: 0.8,
            area_stddev_band: 1.25,
            image_edge_threshold: 10.0,
            corner_refinement: SubpixParams::default(),
            use_world_coordinates: false,
            robot_offset: Vector3::zeros(),
            shooter_offset: 215.0,
            min_depth: 500.0,
        }
    }
}

/// Everything the finder can be tuned with.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderParams {
    pub hsv: HsvFilterParams,
    pub processing: ProcessingParams,
    /// Keep annotated canvases and labels for each processed frame.
    pub debug_images: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_bounds_are_inclusive() {
        let low = Hsv::new(40, 50, 30);
        let high = Hsv::new(150, 255, 200);
        assert!(Hsv::new(40, 50, 30).within(&low, &high));
        assert!(Hsv::new(150, 255, 200).within(&low, &high));
        assert!(!Hsv::new(39, 100, 100).within(&low, &high));
        assert!(!Hsv::new(60, 100, 201).within(&low, &high));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let params: FinderParams = serde_json::from_str(
            r#"{"processing": {"min_depth": 750.0, "robot_offset": [10.0, 0.0, -5.0]}}"#,
        )
        .unwrap();
        assert_eq!(params.processing.min_depth, 750.0);
        assert_eq!(params.processing.robot_offset, Vector3::new(10.0, 0.0, -5.0));
        assert_eq!(params.processing.contour_size_threshold, 80);
        assert_eq!(params.hsv, HsvFilterParams::default());
        assert_eq!(params.processing.corner_refinement.max_iterations, 100);
    }
}
