//! Per-frame detection pipeline.
//!
//! Stages run strictly in sequence: color segmentation, contour extraction
//! and approximation, section scoring, grouping into targets, corner
//! refinement, pose solve, left-to-right ordering.

mod debug;
mod pipeline;
mod target;

pub use debug::{DebugImages, DebugLabel};
pub use pipeline::{FinderOutput, TargetFinder};
pub use target::{
    group_sections, normalized_image_position, package_pose, PackagedPose, Target,
};
