//! Rigid poses, rotation helpers and the planar perspective pose solver.
//!
//! A [`CameraPose`] maps points from a target (model) frame into the camera
//! frame: `p_cam = R * p_model + t`. The solver is non-iterative: it fits the
//! plane of the model points, estimates the plane-to-image homography on
//! undistorted normalized coordinates and decomposes it into `[r1 r2 t]`.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::homography::estimate_homography;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Below this value of `sqrt(R00^2 + R10^2)` the Euler decomposition is
/// treated as gimbal-locked.
pub const EULER_SINGULARITY_EPS: f64 = 1e-6;

/// Relative out-of-plane tolerance for the model points.
const COPLANARITY_TOLERANCE: f64 = 1e-6;

/// Largest accepted RMS homography transfer error, in normalized image
/// units (about 14 px at a 700 px focal length).
const MAX_TRANSFER_RMS: f64 = 0.02;

/// Errors produced by the pose solver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("model has {model} points but {image} image points were given")]
    CountMismatch { model: usize, image: usize },
    #[error("at least 4 correspondences are required (got {0})")]
    TooFewPoints(usize),
    #[error("model points are not coplanar (max offset {offset:.3})")]
    NonCoplanar { offset: f64 },
    #[error("model points are degenerate (collinear or coincident)")]
    DegenerateModel,
    #[error("plane-to-image homography is degenerate")]
    DegenerateHomography,
    #[error("observations do not fit a plane (rms transfer error {rms:.4})")]
    Inconsistent { rms: f64 },
    #[error("pose solution is not finite")]
    NonFinite,
}

/// Rigid transform from a model frame into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl CameraPose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build a pose from a Rodrigues rotation vector and a translation.
    pub fn from_rvec_tvec(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(rvec), tvec)
    }

    /// Rodrigues rotation vector (axis scaled by angle).
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation.matrix()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// Inverse rigid transform: `R' = R^T`, `t' = -R^T t`.
    pub fn inverse(&self) -> Self {
        let rt = self.rotation.inverse();
        Self::new(rt, -(rt * self.translation))
    }
}

/// Three-axis Euler decomposition `(x, y, z)` in radians.
///
/// Falls back to the gimbal-lock formula (z fixed at 0) when
/// `sqrt(R00^2 + R10^2)` is not above [`EULER_SINGULARITY_EPS`].
pub fn euler_angles(r: &Matrix3<f64>) -> Vector3<f64> {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();
    if sy > EULER_SINGULARITY_EPS {
        Vector3::new(
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        Vector3::new((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy), 0.0)
    }
}

/// [`euler_angles`] converted to degrees.
pub fn euler_angles_deg(r: &Matrix3<f64>) -> Vector3<f64> {
    euler_angles(r).map(f64::to_degrees)
}

/// Orthonormal frame of a planar point set.
struct PlaneFrame {
    origin: Vector3<f64>,
    /// Columns: in-plane axis u, in-plane axis v, normal.
    basis: Matrix3<f64>,
}

impl PlaneFrame {
    fn fit(points: &[Point3<f64>]) -> Result<Self, PoseError> {
        let n = points.len() as f64;
        let origin = points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n;

        let mut cov = Matrix3::<f64>::zeros();
        for p in points {
            let d = p.coords - origin;
            cov += d * d.transpose();
        }
        let eig = SymmetricEigen::new(cov);
        let (min_idx, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, &v)| {
                if v < best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        let normal = eig.eigenvectors.column(min_idx).normalize();

        let extent = points
            .iter()
            .map(|p| (p.coords - origin).norm())
            .fold(0.0_f64, f64::max);
        if extent <= f64::EPSILON {
            return Err(PoseError::DegenerateModel);
        }
        let offset = points
            .iter()
            .map(|p| normal.dot(&(p.coords - origin)).abs())
            .fold(0.0_f64, f64::max);
        if offset > COPLANARITY_TOLERANCE * extent.max(1.0) {
            return Err(PoseError::NonCoplanar { offset });
        }

        // First in-plane axis along the first usable model edge keeps the
        // frame stable for axis-aligned targets.
        let first = points[0].coords;
        let u = points
            .iter()
            .skip(1)
            .map(|p| {
                let d = p.coords - first;
                d - normal * normal.dot(&d)
            })
            .find(|d| d.norm() > extent * 1e-6)
            .ok_or(PoseError::DegenerateModel)?
            .normalize();
        let v = normal.cross(&u);

        Ok(Self {
            origin,
            basis: Matrix3::from_columns(&[u, v, normal]),
        })
    }

    fn to_plane(&self, p: &Point3<f64>) -> Point2<f64> {
        let q = self.basis.transpose() * (p.coords - self.origin);
        Point2::new(q.x, q.y)
    }
}

/// Solve the pose of a planar model from 2D observations.
///
/// `guess` only disambiguates the sign of the homography decomposition: the
/// solution whose translation points the same way as the guess is kept.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(model, image, camera, guess), fields(n = model.len()))
)]
pub fn solve_planar_pose(
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    guess: &CameraPose,
) -> Result<CameraPose, PoseError> {
    if model.len() != image.len() {
        return Err(PoseError::CountMismatch {
            model: model.len(),
            image: image.len(),
        });
    }
    if model.len() < 4 {
        return Err(PoseError::TooFewPoints(model.len()));
    }

    let frame = PlaneFrame::fit(model)?;
    let plane_pts: Vec<Point2<f64>> = model.iter().map(|p| frame.to_plane(p)).collect();
    let norm_pts: Vec<Point2<f64>> = image.iter().map(|&p| camera.undistort_point(p)).collect();

    let h = estimate_homography(&plane_pts, &norm_pts).ok_or(PoseError::DegenerateHomography)?;
    let rms = h.rms_error(&plane_pts, &norm_pts);
    if !rms.is_finite() {
        return Err(PoseError::DegenerateHomography);
    }
    if rms > MAX_TRANSFER_RMS {
        return Err(PoseError::Inconsistent { rms });
    }
    let (h1, h2, h3) = (h.column(0), h.column(1), h.column(2));

    let lambda = 0.5 * (h1.norm() + h2.norm());
    if !lambda.is_finite() || lambda < f64::EPSILON {
        return Err(PoseError::DegenerateHomography);
    }
    // Translation of the plane origin in the camera frame, up to sign.
    let plane_origin_cam = guess.transform_point(&Point3::from(frame.origin));
    let sign = if h3.dot(&plane_origin_cam.coords) >= 0.0 {
        1.0
    } else {
        -1.0
    };
    let scale = sign / lambda;

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let approx_r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx_r.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(PoseError::DegenerateHomography),
    };
    let mut r_plane = u * v_t;
    if r_plane.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r_plane = u_fixed * v_t;
    }
    let t_plane = h3 * scale;

    // p_cam = R_plane * B^T * (p - origin) + t_plane
    let r = r_plane * frame.basis.transpose();
    let t = t_plane - r * frame.origin;

    if !r.iter().all(|v| v.is_finite()) || !t.iter().all(|v| v.is_finite()) {
        return Err(PoseError::NonFinite);
    }

    Ok(CameraPose::new(Rotation3::from_matrix_unchecked(r), t))
}
