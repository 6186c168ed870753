//! Target-section candidates: geometric scoring and corner ordering.

use std::f64::consts::PI;

use imageproc::geometry::{arc_length, contour_area};
use log::trace;
use nalgebra::Point2;
use retro_targets_core::RefineError;

use crate::contour::{min_area_rect, to_point2, MinAreaRect, Polygon};
use crate::params::ProcessingParams;

/// What happened to a section's corners during subpixel refinement.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum CornerRefinement {
    /// Not attempted yet.
    #[default]
    Raw,
    Refined,
    /// Refinement failed; the corners are the polygon vertices.
    Failed(RefineError),
}

/// One quadrilateral that passed every geometric filter.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetSection {
    /// Corners, in canonical order once `ordered` is set.
    pub corners: [Point2<f64>; 4],
    pub rect: MinAreaRect,
    /// Rectangle angle rotated onto the long axis, for overlays.
    pub display_angle: f64,
    pub shape_factor: f64,
    /// Mean of the polygon vertices.
    pub center: Point2<f64>,
    /// Polygon area in square pixels.
    pub area: f64,
    pub refinement: CornerRefinement,
    /// False until the corners have been placed in canonical order. A
    /// section that never gets ordered cannot be handed to the pose solver.
    pub ordered: bool,
}

/// `4*pi*area / perimeter^2`: 1 for a circle, `pi/4` for a square.
pub fn shape_factor(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * PI * area / (perimeter * perimeter)
}

/// Population mean and standard deviation of the candidate rectangle areas
/// of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaBand {
    pub mean: f64,
    pub stddev: f64,
}

impl AreaBand {
    pub fn from_areas(areas: &[f64]) -> Option<Self> {
        if areas.is_empty() {
            return None;
        }
        let n = areas.len() as f64;
        let mean = areas.iter().sum::<f64>() / n;
        let mean_sq = areas.iter().map(|a| a * a).sum::<f64>() / n;
        let stddev = (mean_sq - mean * mean).max(0.0).sqrt();
        Some(Self { mean, stddev })
    }

    /// Whether `area` lies within `mean +/- k * stddev`.
    pub fn contains(&self, area: f64, k: f64) -> bool {
        // absorbs rounding when every area is identical
        let slack = 1e-9 * self.mean.abs().max(1.0);
        let half = k * self.stddev + slack;
        area >= self.mean - half && area <= self.mean + half
    }
}

/// Long-axis convention for overlays: `+180` when the rectangle is taller
/// than wide, `+90` otherwise.
pub fn normalize_rect_angle(rect: &MinAreaRect) -> f64 {
    if rect.width < rect.height {
        rect.angle + 180.0
    } else {
        rect.angle + 90.0
    }
}

fn centroid(points: &[Point2<f64>]) -> Point2<f64> {
    let n = points.len().max(1) as f64;
    Point2::from(points.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords) / n)
}

fn away_from_edges(center: &Point2<f64>, margin: f64, width: f64, height: f64) -> bool {
    center.x >= margin
        && center.x <= width - margin
        && center.y >= margin
        && center.y <= height - margin
}

/// Turn approximated polygons into target sections.
///
/// The area band is computed over every polygon of the frame, including the
/// ones rejected for their vertex count.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(polygons = polygons.len()))
)]
pub fn score_polygons(
    polygons: &[Polygon],
    params: &ProcessingParams,
    frame_width: u32,
    frame_height: u32,
) -> Vec<TargetSection> {
    let rects: Vec<Option<MinAreaRect>> = polygons.iter().map(|p| min_area_rect(p)).collect();
    let areas: Vec<f64> = rects
        .iter()
        .map(|r| r.as_ref().map_or(0.0, MinAreaRect::area))
        .collect();
    let Some(band) = AreaBand::from_areas(&areas) else {
        return Vec::new();
    };
    trace!("rect area mean {:.1} stddev {:.1}", band.mean, band.stddev);

    let (w, h) = (f64::from(frame_width), f64::from(frame_height));
    let mut sections = Vec::new();

    for (i, (poly, rect)) in polygons.iter().zip(&rects).enumerate() {
        let Ok(vertices) = <[_; 4]>::try_from(poly.as_slice()) else {
            trace!("polygon {i}: {} vertices", poly.len());
            continue;
        };
        let corners = vertices.map(|p| to_point2(&p));
        let Some(rect) = rect else {
            continue;
        };

        let area = contour_area(poly);
        let sf = shape_factor(area, arc_length(poly, true));
        if !(sf > params.shape_factor_min && sf < params.shape_factor_max) {
            trace!("polygon {i}: shape factor {sf:.3} out of band");
            continue;
        }
        if !band.contains(rect.area(), params.area_stddev_band) {
            trace!("polygon {i}: area outlier {:.1} (mean {:.1})", rect.area(), band.mean);
            continue;
        }
        if !away_from_edges(&rect.center, params.image_edge_threshold, w, h) {
            trace!("polygon {i}: too close to the image edge");
            continue;
        }

        sections.push(TargetSection {
            corners,
            rect: *rect,
            display_angle: normalize_rect_angle(rect),
            shape_factor: sf,
            center: centroid(&corners),
            area,
            refinement: CornerRefinement::Raw,
            ordered: false,
        });
    }
    sections
}

/// Slot of a corner relative to `center` (image coordinates, y down).
#[inline]
fn quadrant(p: &Point2<f64>, center: &Point2<f64>) -> usize {
    match (p.x >= center.x, p.y >= center.y) {
        (true, true) => 0,
        (false, false) => 1,
        (true, false) => 2,
        (false, true) => 3,
    }
}

/// Re-order corners into the fixed quadrant layout around `center`:
/// 0 right-below, 1 left-above, 2 right-above, 3 left-below. Returns `None`
/// unless the four corners land in four different quadrants.
pub fn canonical_order(
    corners: &[Point2<f64>; 4],
    center: &Point2<f64>,
) -> Option<[Point2<f64>; 4]> {
    let mut slots: [Option<Point2<f64>>; 4] = [None; 4];
    for p in corners {
        let slot = &mut slots[quadrant(p, center)];
        if slot.is_some() {
            return None;
        }
        *slot = Some(*p);
    }
    let [a, b, c, d] = slots;
    Some([a?, b?, c?, d?])
}
