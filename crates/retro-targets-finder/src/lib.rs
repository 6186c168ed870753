//! Retroreflective field-target detection and pose estimation.
//!
//! [`TargetFinder`] turns one RGB frame into a list of [`VisionData`]
//! records, one per target, sorted left to right. Geometry, camera models
//! and the pose solver come from `retro-targets-core`.

pub mod contour;
mod data;
mod finder;
mod model;
mod params;
pub mod section;
pub mod segment;

pub use data::{UnknownStatus, VisionData, VisionMessage, VisionStatus};
pub use finder::{
    group_sections, normalized_image_position, package_pose, DebugImages, DebugLabel,
    FinderOutput, PackagedPose, Target, TargetFinder,
};
pub use model::TargetModel;
pub use params::{FinderParams, Hsv, HsvFilterParams, ProcessingParams};
pub use section::{CornerRefinement, TargetSection};

pub use retro_targets_core::{CameraIntrinsics, CameraModel, CameraPose, Distortion, RefineError};
