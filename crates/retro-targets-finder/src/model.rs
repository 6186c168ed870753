//! Physical target geometry.
//!
//! Key points are in millimetres, expressed in the target's own frame with
//! the plane of the tape at `z = 0`.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Field target variants the finder can track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetModel {
    /// 2022 upper hub: a ring of 5 in x 2 in tape strips, each tracked on its own.
    #[default]
    RapidReact,
    /// 2020 power port: a single hexagonal outline.
    InfiniteRecharge,
}

const RAPID_REACT_KEY_POINTS: [[f64; 3]; 5] = [
    [0.0, 0.0, -500.0],
    [0.0, 0.0, 0.0],
    [127.0, 0.0, 0.0],
    [0.0, 50.8, 0.0],
    [127.0, 50.8, 0.0],
];

/// One tape strip, in section-corner order: the corner pairs `(0, 1)` and
/// `(2, 3)` are opposite each other.
const RAPID_REACT_STRIP: [[f64; 3]; 4] = [
    [0.0, 50.8, 0.0],
    [127.0, 0.0, 0.0],
    [0.0, 0.0, 0.0],
    [127.0, 50.8, 0.0],
];

const INFINITE_RECHARGE_KEY_POINTS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [58.6486, 0.0, 0.0],
    [938.3014, 0.0, 0.0],
    [996.95, 0.0, 0.0],
    [278.384, 381.0, 0.0],
    [718.566, 381.0, 0.0],
    [249.047, 431.8, 0.0],
    [747.903, 431.8, 0.0],
];

/// Outer top corners and outer bottom corners of the hexagon, in
/// section-corner order.
const INFINITE_RECHARGE_OUTLINE: [[f64; 3]; 4] = [
    [249.047, 431.8, 0.0],
    [996.95, 0.0, 0.0],
    [0.0, 0.0, 0.0],
    [747.903, 431.8, 0.0],
];

const AXES: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [100.0, 0.0, 0.0],
    [0.0, 100.0, 0.0],
    [0.0, 0.0, 100.0],
];

fn to_points(raw: &[[f64; 3]]) -> Vec<Point3<f64>> {
    raw.iter().map(|&[x, y, z]| Point3::new(x, y, z)).collect()
}

impl TargetModel {
    /// Every 3D key point of the full target.
    pub fn key_points(&self) -> Vec<Point3<f64>> {
        match self {
            TargetModel::RapidReact => to_points(&RAPID_REACT_KEY_POINTS),
            TargetModel::InfiniteRecharge => to_points(&INFINITE_RECHARGE_KEY_POINTS),
        }
    }

    /// Key points matched against one target section, in the section's
    /// canonical corner order. Unknown sub-targets yield an empty list.
    pub fn sub_target_key_points(&self, index: usize) -> Vec<Point3<f64>> {
        match (self, index) {
            // every hub strip has the same shape
            (TargetModel::RapidReact, _) => to_points(&RAPID_REACT_STRIP),
            (TargetModel::InfiniteRecharge, 0) => to_points(&INFINITE_RECHARGE_OUTLINE),
            (TargetModel::InfiniteRecharge, _) => Vec::new(),
        }
    }

    /// Origin followed by the x, y and z axis tips, for debug overlays.
    pub fn axes(&self) -> Vec<Point3<f64>> {
        to_points(&AXES)
    }
}
