//! Geometry, camera and pose primitives for retroreflective target tracking.
//!
//! Nothing in this crate knows about targets or color segmentation; it
//! provides the camera models, a planar pose solver, homographies and
//! subpixel corner refinement that the finder crate builds on.

mod camera;
mod homography;
mod image;
mod logger;
mod pose;
mod subpix;

pub use camera::{CameraIntrinsics, CameraModel, Distortion};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImageView};
pub use pose::{
    euler_angles, euler_angles_deg, solve_planar_pose, CameraPose, PoseError,
    EULER_SINGULARITY_EPS,
};
pub use subpix::{refine_corner, refine_corners, RefineError, SubpixParams};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
