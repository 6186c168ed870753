//! Plane-to-image homographies, used to initialise the planar pose solver.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};

/// Smallest accepted eigenvalue ratio of the normal matrix.
const MIN_CONDITION: f64 = 1e-12;

/// Planar projective transform `p_dst ~ H * p_src`, scaled so `h[(2, 2)] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Map a point; `None` when it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        (v.z.abs() > f64::EPSILON).then(|| Point2::new(v.x / v.z, v.y / v.z))
    }

    #[inline]
    pub fn column(&self, i: usize) -> Vector3<f64> {
        self.h.column(i).into_owned()
    }

    /// RMS transfer error of `src -> dst`; infinite if any point maps to infinity.
    pub fn rms_error(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
        if src.is_empty() || src.len() != dst.len() {
            return f64::INFINITY;
        }
        let mut sum = 0.0;
        for (s, d) in src.iter().zip(dst) {
            match self.apply(*s) {
                Some(p) => sum += (p - d).norm_squared(),
                None => return f64::INFINITY,
            }
        }
        (sum / src.len() as f64).sqrt()
    }
}

/// Isotropic conditioning: centroid to the origin, mean distance `sqrt(2)`.
#[derive(Clone, Copy, Debug)]
struct Conditioner {
    scale: f64,
    cx: f64,
    cy: f64,
}

impl Conditioner {
    /// `None` when every point coincides.
    fn fit(points: &[Point2<f64>]) -> Option<Self> {
        let n = points.len() as f64;
        let centroid = points.iter().map(|p| p.coords).sum::<Vector2<f64>>() / n;
        let (cx, cy) = (centroid.x, centroid.y);
        let spread = points
            .iter()
            .map(|p| (p.x - cx).hypot(p.y - cy))
            .sum::<f64>()
            / n;
        (spread > 1e-12).then(|| Self {
            scale: std::f64::consts::SQRT_2 / spread,
            cx,
            cy,
        })
    }

    #[inline]
    fn map(&self, p: &Point2<f64>) -> (f64, f64) {
        (self.scale * (p.x - self.cx), self.scale * (p.y - self.cy))
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(
            s, 0.0, -s * self.cx, //
            0.0, s, -s * self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let inv = 1.0 / self.scale;
        Matrix3::new(
            inv, 0.0, self.cx, //
            0.0, inv, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Estimate `H` with `dst ~ H * src` from at least four correspondences.
///
/// Both point sets are conditioned, then the eight unknowns (with
/// `h33 = 1`) are found by linear least squares over the normal equations.
/// Exactly four points in general position give the exact solution.
/// Returns `None` for mismatched inputs or a degenerate configuration.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    let cs = Conditioner::fit(src)?;
    let cd = Conditioner::fit(dst)?;

    let mut ata = SMatrix::<f64, 8, 8>::zeros();
    let mut atb = SVector::<f64, 8>::zeros();
    for (s, d) in src.iter().zip(dst) {
        let (x, y) = cs.map(s);
        let (u, v) = cd.map(d);
        let rows = [
            (SVector::<f64, 8>::from([x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]), u),
            (SVector::<f64, 8>::from([0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]), v),
        ];
        for (a, b) in rows {
            ata += a * a.transpose();
            atb += a * b;
        }
    }

    let eig = ata.symmetric_eigenvalues();
    if eig.min() <= MIN_CONDITION * eig.max() {
        return None;
    }
    let x = ata.cholesky()?.solve(&atb);
    if x.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let conditioned = Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );
    let h = cd.inverse_matrix() * conditioned * cs.matrix();
    let h33 = h[(2, 2)];
    (h33.abs() > 1e-12).then(|| Homography::new(h / h33))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ))
    }

    fn strip() -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 50.8),
            Point2::new(127.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(127.0, 50.8),
        ]
    }

    #[test]
    fn four_corners_give_the_exact_transform() {
        let gt = ground_truth();
        let src = strip();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| gt.apply(p).unwrap()).collect();

        let h = estimate_homography(&src, &dst).expect("estimate");
        assert!(h.rms_error(&src, &dst) < 1e-8);
        let probe = Point2::new(60.0, 25.0);
        let (a, b) = (h.apply(probe).unwrap(), gt.apply(probe).unwrap());
        assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
    }

    #[test]
    fn overdetermined_grid_is_recovered() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..3)
            .flat_map(|y| (0..4).map(move |x| Point2::new(x as f64 * 40.0, y as f64 * 25.0)))
            .collect();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| gt.apply(p).unwrap()).collect();

        let h = estimate_homography(&src, &dst).expect("estimate");
        assert_relative_eq!(h.h, gt.h, epsilon = 1e-8);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let src: Vec<Point2<f64>> = (0..5).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        let dst = src.clone();
        assert!(estimate_homography(&src, &dst).is_none());
    }

    #[test]
    fn mismatched_or_short_input_fails() {
        let four = strip();
        assert!(estimate_homography(&four, &four[..3]).is_none());
        assert!(estimate_homography(&four[..3], &four[..3]).is_none());
        assert_eq!(ground_truth().rms_error(&four, &four[..2]), f64::INFINITY);
    }
}
