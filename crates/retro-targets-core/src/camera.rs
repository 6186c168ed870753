//! Calibrated pinhole camera with Brown-Conrady distortion.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::pose::CameraPose;

const UNDISTORT_ITERATIONS: usize = 20;

/// Pinhole intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Distortion coefficients in the `(k1, k2, p1, p2, k3)` order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub const NONE: Distortion = Distortion {
        k1: 0.0,
        k2: 0.0,
        p1: 0.0,
        p2: 0.0,
        k3: 0.0,
    };

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Distort a normalized image point.
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Distortion::apply`].
    pub fn remove(&self, distorted: Point2<f64>) -> Point2<f64> {
        let (x0, y0) = (distorted.x, distorted.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let icdist = 1.0 / radial;
            if !icdist.is_finite() || icdist < 0.0 {
                return Point2::new(x0, y0);
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (x0 - dx) * icdist;
            y = (y0 - dy) * icdist;
        }
        Point2::new(x, y)
    }
}

/// The cameras the pipeline knows how to model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraModel {
    /// PS3 Eye with the zoom lens.
    #[default]
    Ps3EyeZoom,
    /// PS3 Eye with the stock wide-angle lens.
    Ps3EyeWide,
    /// Any other camera with a stored calibration.
    Calibrated {
        intrinsics: CameraIntrinsics,
        #[serde(default)]
        distortion: Distortion,
    },
}

impl CameraModel {
    pub fn camera_intrinsics(&self) -> CameraIntrinsics {
        match self {
            CameraModel::Ps3EyeZoom => CameraIntrinsics {
                fx: 7.826_081_783_547_931_5e2,
                fy: 7.826_081_783_547_931_5e2,
                cx: 3.142_673_866_501_270_4e2,
                cy: 2.224_243_340_469_554_7e2,
            },
            CameraModel::Ps3EyeWide => CameraIntrinsics {
                fx: 5.397_899_847_717_777_7e2,
                fy: 5.395_973_604_974_796e2,
                cx: 3.138_738_451_585_725_8e2,
                cy: 2.318_641_403_162_675_4e2,
            },
            CameraModel::Calibrated { intrinsics, .. } => *intrinsics,
        }
    }

    /// 3x3 intrinsic matrix `K`.
    pub fn intrinsics(&self) -> Matrix3<f64> {
        self.camera_intrinsics().matrix()
    }

    pub fn distortion(&self) -> Distortion {
        match self {
            CameraModel::Ps3EyeZoom => Distortion {
                k1: -3.532_621_011_798_972_6e-2,
                k2: -1.175_064_965_959_941_7,
                p1: 0.0,
                p2: 0.0,
                k3: 1.338_080_638_035_902_5,
            },
            CameraModel::Ps3EyeWide => Distortion {
                k1: -1.217_704_451_404_443_4e-1,
                k2: 1.610_732_033_068_860_7e-1,
                p1: -1.052_322_935_343_724e-3,
                p2: -3.260_488_942_678_847_1e-3,
                k3: 0.0,
            },
            CameraModel::Calibrated { distortion, .. } => *distortion,
        }
    }

    /// Distortion coefficients `(k1, k2, p1, p2, k3)`.
    pub fn distortion_coefficients(&self) -> [f64; 5] {
        self.distortion().to_array()
    }

    /// Project a point expressed in the model frame through `pose`.
    pub fn project_point(&self, pose: &CameraPose, p: &Point3<f64>) -> Option<Point2<f64>> {
        let pc = pose.transform_point(p);
        if pc.z.abs() < f64::EPSILON {
            return None;
        }
        let d = self.distortion().apply(Point2::new(pc.x / pc.z, pc.y / pc.z));
        let k = self.camera_intrinsics();
        Some(Point2::new(k.fx * d.x + k.cx, k.fy * d.y + k.cy))
    }

    /// Project model-frame points; points on the camera plane are skipped.
    pub fn project_points(&self, pose: &CameraPose, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
        points
            .iter()
            .filter_map(|p| self.project_point(pose, p))
            .collect()
    }

    /// Map a distorted pixel to undistorted normalized image coordinates.
    pub fn undistort_point(&self, pixel: Point2<f64>) -> Point2<f64> {
        let k = self.camera_intrinsics();
        let distorted = Point2::new((pixel.x - k.cx) / k.fx, (pixel.y - k.cy) / k.fy);
        self.distortion().remove(distorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn builtin_matrices_match_calibration() {
        let k = CameraModel::Ps3EyeZoom.intrinsics();
        assert_relative_eq!(k[(0, 0)], 782.608_178_354_793_1, epsilon = 1e-9);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(k[(0, 1)], 0.0);
        let d = CameraModel::Ps3EyeWide.distortion_coefficients();
        assert_relative_eq!(d[0], -0.121_770_445_140_444_34, epsilon = 1e-12);
        assert_eq!(d[4], 0.0);
    }

    #[test]
    fn undistort_inverts_projection() {
        for camera in [CameraModel::Ps3EyeWide, CameraModel::Ps3EyeZoom] {
            let pose = CameraPose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 1000.0));
            for p in [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(120.0, -80.0, 0.0),
                Point3::new(-150.0, 60.0, 0.0),
            ] {
                let px = camera.project_point(&pose, &p).expect("in front");
                let n = camera.undistort_point(px);
                assert_relative_eq!(n.x, p.x / 1000.0, epsilon = 1e-7);
                assert_relative_eq!(n.y, p.y / 1000.0, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn calibrated_variant_round_trips_through_json() {
        let cam = CameraModel::Calibrated {
            intrinsics: CameraIntrinsics {
                fx: 600.0,
                fy: 601.0,
                cx: 320.0,
                cy: 240.0,
            },
            distortion: Distortion::NONE,
        };
        let json = serde_json::to_string(&cam).unwrap();
        assert!(json.contains("\"kind\":\"calibrated\""));
        let back: CameraModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cam);
    }
}
