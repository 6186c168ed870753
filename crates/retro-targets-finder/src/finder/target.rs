use log::trace;
use nalgebra::{Point2, Vector3};
use retro_targets_core::{euler_angles_deg, CameraPose};

use crate::data::{VisionData, VisionStatus};
use crate::params::ProcessingParams;
use crate::section::TargetSection;

/// One physical target in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    /// Sections making up the target; always exactly one today.
    pub sections: Vec<TargetSection>,
    /// Midpoint of canonical corners 0 and 1, in pixels. Unordered sections
    /// leave it at the section centroid.
    pub center: Point2<f64>,
    /// Rotation vector after offset and frame conversion.
    pub rvec: Vector3<f64>,
    /// Translation after offset and frame conversion.
    pub tvec: Vector3<f64>,
    /// Raw solver output (model frame to camera frame), kept for overlays.
    pub camera_pose: Option<CameraPose>,
    /// Planar distance from the shooter.
    pub robot_distance: f64,
    pub data: VisionData,
}

impl Target {
    fn from_section(section: TargetSection) -> Self {
        Self {
            center: section.center,
            sections: vec![section],
            rvec: Vector3::zeros(),
            tvec: Vector3::zeros(),
            camera_pose: None,
            robot_distance: 0.0,
            data: VisionData::default(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.data.status == VisionStatus::TargetFound
    }
}

/// Assemble sections into targets: one section per target.
///
/// Stitching several sections into one physical target would be done here.
pub fn group_sections(sections: Vec<TargetSection>) -> Vec<Target> {
    sections.into_iter().map(Target::from_section).collect()
}

/// Pixel position mapped to `[-1, 1]` on both axes, y pointing up.
pub fn normalized_image_position(center: &Point2<f64>, width: u32, height: u32) -> (f64, f64) {
    let (hw, hh) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    ((center.x - hw) / hw, (hh - center.y) / hh)
}

/// Pose fields derived from one converged solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackagedPose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
    pub status: VisionStatus,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub theta: f64,
    pub distance: f64,
}

impl PackagedPose {
    /// Copy the pose fields into a record, keeping its id and image position.
    pub fn write_into(&self, data: &mut VisionData) {
        data.status = self.status;
        data.x = self.x;
        data.y = self.y;
        data.z = self.z;
        data.roll = self.roll;
        data.pitch = self.pitch;
        data.yaw = self.yaw;
        data.theta = self.theta;
        data.distance = self.distance;
    }
}

/// Turn a solved target pose into the reported quantities: robot offset,
/// optional frame inversion, Euler angles, shooter offset, bearing, distance
/// and the depth plausibility check.
pub fn package_pose(solved: &CameraPose, params: &ProcessingParams) -> PackagedPose {
    let shifted = CameraPose::new(solved.rotation, solved.translation - params.robot_offset);
    let pose = if params.use_world_coordinates {
        shifted.inverse()
    } else {
        shifted
    };

    let euler = euler_angles_deg(&pose.rotation_matrix());
    let t = pose.translation;
    let x = t.x + params.shooter_offset;
    let z = t.z;

    let status = if z < params.min_depth {
        trace!("implausible depth {z:.1}");
        VisionStatus::NoTargetFound
    } else {
        VisionStatus::TargetFound
    };

    PackagedPose {
        rvec: pose.rvec(),
        tvec: t,
        status,
        x,
        y: t.y,
        z,
        pitch: euler.x,
        yaw: euler.y,
        roll: euler.z,
        theta: -x.atan2(z).to_degrees(),
        distance: x.hypot(z),
    }
}
