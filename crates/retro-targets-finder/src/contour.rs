//! Contour extraction and polygon geometry on binary masks.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, convex_hull};
use imageproc::point::Point;
use log::trace;
use nalgebra::{Point2, Vector2};

/// Closed polygon in pixel coordinates, first vertex not repeated at the end.
pub type Polygon = Vec<Point<i32>>;

/// Outer boundaries of the foreground regions of `mask`, each with every
/// boundary pixel kept. Boundaries with fewer than `min_points` pixels are
/// dropped, as are regions nested inside holes of other regions.
pub fn outer_contours(mask: &GrayImage, min_points: usize) -> Vec<Polygon> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| {
            let keep = c.points.len() >= min_points;
            if !keep {
                trace!("contour with {} points below size threshold", c.points.len());
            }
            keep
        })
        .map(|c| c.points)
        .collect()
}

/// Convex hull of the points, duplicates removed first.
pub fn integer_hull(points: &[Point<i32>]) -> Polygon {
    let mut pts = points.to_vec();
    pts.sort_by_key(|p| (p.y, p.x));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    convex_hull(pts)
}

/// Convex hull of a contour, simplified with Douglas-Peucker.
///
/// The closed hull is cut at its first vertex and at the vertex farthest
/// from it; both are corners of the hull and survive, and each half is
/// simplified as an open chain. A non-positive `epsilon` returns the hull
/// unchanged.
pub fn approximate_outline(contour: &[Point<i32>], epsilon: f64) -> Polygon {
    let outline = integer_hull(contour);
    if outline.len() < 3 || epsilon <= 0.0 {
        return outline;
    }
    let start = to_point2(&outline[0]);
    let split = (1..outline.len())
        .max_by(|&i, &j| {
            let di = (to_point2(&outline[i]) - start).norm_squared();
            let dj = (to_point2(&outline[j]) - start).norm_squared();
            di.total_cmp(&dj)
        })
        .unwrap_or(1);

    let mut out = approximate_polygon_dp(&outline[..=split], epsilon, false);
    let back: Vec<Point<i32>> = outline[split..].iter().chain(&outline[..1]).copied().collect();
    let back = approximate_polygon_dp(&back, epsilon, false);
    out.pop();
    out.extend_from_slice(&back[..back.len() - 1]);
    out
}

#[inline]
pub fn to_point2(p: &Point<i32>) -> Point2<f64> {
    Point2::new(f64::from(p.x), f64::from(p.y))
}

/// Rotated bounding rectangle. `width` runs along the direction given by
/// `angle` (degrees, in `[0, 90)`), `height` perpendicular to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinAreaRect {
    pub center: Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl MinAreaRect {
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Corners, walking around the rectangle.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        let (s, c) = self.angle.to_radians().sin_cos();
        let u = Vector2::new(c, s) * (0.5 * self.width);
        let v = Vector2::new(-s, c) * (0.5 * self.height);
        [
            self.center - u - v,
            self.center + u - v,
            self.center + u + v,
            self.center - u + v,
        ]
    }
}

/// Smallest-area enclosing rectangle by rotating calipers over the hull.
///
/// Unlike `imageproc::geometry::min_area_rect`, the center, side lengths and
/// angle are kept unrounded; the shape and area filters need them.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<MinAreaRect> {
    let hull: Vec<Point2<f64>> = integer_hull(points).iter().map(to_point2).collect();
    match hull.len() {
        0 => None,
        1 => Some(MinAreaRect {
            center: hull[0],
            width: 0.0,
            height: 0.0,
            angle: 0.0,
        }),
        n => {
            let mut best: Option<(f64, MinAreaRect)> = None;
            for i in 0..n {
                let edge = hull[(i + 1) % n] - hull[i];
                let len = edge.norm();
                if len < f64::EPSILON {
                    continue;
                }
                let u = edge / len;
                let v = Vector2::new(-u.y, u.x);

                let (mut u_min, mut u_max) = (f64::INFINITY, f64::NEG_INFINITY);
                let (mut v_min, mut v_max) = (f64::INFINITY, f64::NEG_INFINITY);
                for p in &hull {
                    let (pu, pv) = (p.coords.dot(&u), p.coords.dot(&v));
                    u_min = u_min.min(pu);
                    u_max = u_max.max(pu);
                    v_min = v_min.min(pv);
                    v_max = v_max.max(pv);
                }

                let (width, height) = (u_max - u_min, v_max - v_min);
                let area = width * height;
                if best.as_ref().is_some_and(|(a, _)| *a <= area) {
                    continue;
                }
                let center = Point2::from(
                    u * (0.5 * (u_min + u_max)) + v * (0.5 * (v_min + v_max)),
                );
                best = Some((
                    area,
                    normalize_rect(center, width, height, u.y.atan2(u.x).to_degrees()),
                ));
            }
            best.map(|(_, rect)| rect)
        }
    }
}

fn normalize_rect(center: Point2<f64>, width: f64, height: f64, angle: f64) -> MinAreaRect {
    let (mut w, mut h, mut a) = (width, height, angle);
    while a < 0.0 {
        a += 90.0;
        std::mem::swap(&mut w, &mut h);
    }
    while a >= 90.0 {
        a -= 90.0;
        std::mem::swap(&mut w, &mut h);
    }
    MinAreaRect {
        center,
        width: w,
        height: h,
        angle: a,
    }
}
