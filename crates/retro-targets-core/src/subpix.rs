//! Iterative subpixel corner refinement.
//!
//! Each iteration solves for the point `q` that is orthogonal to the image
//! gradient at every pixel `p` of a Gaussian-weighted window:
//! `sum(g g^T) q = sum(g g^T p)`.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::image::{sample_bilinear, GrayImageView};

/// Search window and stopping criteria for [`refine_corner`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubpixParams {
    /// Half size of the search window; the window spans `2 * half_window + 1` pixels.
    pub half_window: usize,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop once a step moves the estimate by less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iterations: 100,
            epsilon: 0.1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum RefineError {
    #[error("search window must be at least one pixel")]
    InvalidWindow,
    #[error("corner ({x:.2}, {y:.2}) lies outside the image")]
    OutsideImage { x: f64, y: f64 },
    #[error("gradient system is singular near ({x:.2}, {y:.2})")]
    Singular { x: f64, y: f64 },
    #[error("refined corner drifted out of the search window")]
    Drifted,
    #[error("refinement produced a non-finite estimate")]
    NonFinite,
}

fn gaussian_weights(half: usize) -> Vec<f64> {
    let coeff = 1.0 / (half * half) as f64;
    (0..=2 * half)
        .map(|i| {
            let d = i as f64 - half as f64;
            (-d * d * coeff).exp()
        })
        .collect()
}

/// Refine one corner estimate on a grayscale image.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &SubpixParams,
) -> Result<Point2<f64>, RefineError> {
    let half = params.half_window;
    if half == 0 {
        return Err(RefineError::InvalidWindow);
    }
    let weights = gaussian_weights(half);
    let eps2 = params.epsilon * params.epsilon;
    let h = half as i64;

    let mut c = start;
    for _ in 0..params.max_iterations.max(1) {
        if !img.contains(c.x, c.y) {
            return Err(RefineError::OutsideImage { x: c.x, y: c.y });
        }

        let (mut gxx_s, mut gxy_s, mut gyy_s, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for dy in -h..=h {
            let wy = weights[(dy + h) as usize];
            let y = c.y + dy as f64;
            for dx in -h..=h {
                let m = wy * weights[(dx + h) as usize];
                let x = c.x + dx as f64;
                let gx = 0.5 * (sample_bilinear(img, x + 1.0, y) - sample_bilinear(img, x - 1.0, y));
                let gy = 0.5 * (sample_bilinear(img, x, y + 1.0) - sample_bilinear(img, x, y - 1.0));

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                let (px, py) = (dx as f64, dy as f64);

                gxx_s += gxx;
                gxy_s += gxy;
                gyy_s += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = gxx_s * gyy_s - gxy_s * gxy_s;
        if det.abs() <= f64::EPSILON * (gxx_s * gyy_s).abs() {
            return Err(RefineError::Singular { x: c.x, y: c.y });
        }
        let sx = (gyy_s * bb1 - gxy_s * bb2) / det;
        let sy = (gxx_s * bb2 - gxy_s * bb1) / det;
        if !sx.is_finite() || !sy.is_finite() {
            return Err(RefineError::NonFinite);
        }

        c = Point2::new(c.x + sx, c.y + sy);
        if sx * sx + sy * sy <= eps2 {
            break;
        }
    }

    if (c.x - start.x).abs() > half as f64 || (c.y - start.y).abs() > half as f64 {
        return Err(RefineError::Drifted);
    }
    Ok(c)
}

/// Refine every corner; any failure leaves the whole set to the caller unchanged.
pub fn refine_corners<const N: usize>(
    img: &GrayImageView<'_>,
    corners: &[Point2<f64>; N],
    params: &SubpixParams,
) -> Result<[Point2<f64>; N], RefineError> {
    let mut out = *corners;
    for (dst, src) in out.iter_mut().zip(corners) {
        *dst = refine_corner(img, *src, params)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40x40 image, bright quadrant for x >= 20 and y >= 20.
    fn quadrant_image() -> Vec<u8> {
        let mut data = vec![0u8; 40 * 40];
        for y in 20..40 {
            for x in 20..40 {
                data[y * 40 + x] = 200;
            }
        }
        data
    }

    #[test]
    fn converges_onto_step_corner() {
        let data = quadrant_image();
        let img = GrayImageView::new(40, 40, &data).unwrap();
        let refined =
            refine_corner(&img, Point2::new(17.0, 18.0), &SubpixParams::default()).unwrap();
        assert!((refined.x - 19.5).abs() < 0.35, "x = {}", refined.x);
        assert!((refined.y - 19.5).abs() < 0.35, "y = {}", refined.y);
    }

    #[test]
    fn flat_patch_is_singular() {
        let data = vec![90u8; 30 * 30];
        let img = GrayImageView::new(30, 30, &data).unwrap();
        let err = refine_corner(&img, Point2::new(15.0, 15.0), &SubpixParams::default());
        assert!(matches!(err, Err(RefineError::Singular { .. })));
    }

    #[test]
    fn straight_edge_is_singular() {
        let mut data = vec![0u8; 30 * 30];
        for y in 0..30 {
            for x in 15..30 {
                data[y * 30 + x] = 255;
            }
        }
        let img = GrayImageView::new(30, 30, &data).unwrap();
        let err = refine_corner(&img, Point2::new(14.0, 15.0), &SubpixParams::default());
        assert!(matches!(err, Err(RefineError::Singular { .. })));
    }

    #[test]
    fn outside_start_is_rejected() {
        let data = quadrant_image();
        let img = GrayImageView::new(40, 40, &data).unwrap();
        let err = refine_corner(&img, Point2::new(-3.0, 5.0), &SubpixParams::default());
        assert!(matches!(err, Err(RefineError::OutsideImage { .. })));
    }

    #[test]
    fn batch_refinement_is_all_or_nothing() {
        let data = quadrant_image();
        let img = GrayImageView::new(40, 40, &data).unwrap();
        let corners = [Point2::new(19.0, 19.0), Point2::new(5.0, 5.0)];
        assert!(refine_corners(&img, &corners, &SubpixParams::default()).is_err());
    }
}
