use std::f64::consts::PI;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::{Rotation3, Vector3};
use retro_targets_finder::{
    CameraIntrinsics, CameraModel, CameraPose, CornerRefinement, Distortion, FinderParams,
    RefineError, TargetFinder, TargetModel, VisionMessage, VisionStatus,
};

const TAPE: Rgb<u8> = Rgb([20, 180, 40]);

fn pinhole() -> CameraModel {
    CameraModel::Calibrated {
        intrinsics: CameraIntrinsics {
            fx: 700.0,
            fy: 700.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: Distortion::NONE,
    }
}

/// Pose of a hub strip facing the camera, its origin at `(x, y, z)`.
fn facing(x: f64, y: f64, z: f64) -> CameraPose {
    CameraPose::new(
        Rotation3::from_axis_angle(&Vector3::y_axis(), PI),
        Vector3::new(x, y, z),
    )
}

/// Hub strip facing the camera, rolled about the optical axis by `roll_deg`,
/// its center at `(x, y, z)`.
fn rolled(roll_deg: f64, x: f64, y: f64, z: f64) -> CameraPose {
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), roll_deg.to_radians())
        * Rotation3::from_axis_angle(&Vector3::y_axis(), PI);
    let center = rotation * Vector3::new(63.5, 25.4, 0.0);
    CameraPose::new(rotation, Vector3::new(x, y, z) - center)
}

fn draw_strip(frame: &mut RgbImage, camera: &CameraModel, pose: &CameraPose) {
    let corners = TargetModel::RapidReact.sub_target_key_points(0);
    let projected = camera.project_points(pose, &corners);
    assert_eq!(projected.len(), 4);
    // corner order 0, 2, 1, 3 walks around the strip
    let outline: Vec<Point<i32>> = [0, 2, 1, 3]
        .iter()
        .map(|&i| Point::new(projected[i].x.round() as i32, projected[i].y.round() as i32))
        .collect();
    draw_polygon_mut(frame, &outline, TAPE);
}

fn finder(params: FinderParams) -> TargetFinder {
    TargetFinder::new(TargetModel::RapidReact, pinhole(), params)
}

#[test]
fn two_strips_are_found_and_ordered_left_to_right() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    let right = facing(263.5, -25.4, 1500.0);
    let left = facing(-136.5, -25.4, 1500.0);
    draw_strip(&mut frame, &camera, &right);
    draw_strip(&mut frame, &camera, &left);

    let out = finder(FinderParams::default()).process(&frame);
    assert_eq!(out.targets.len(), 2);

    let packets = out.packets();
    assert!(packets[0].image_x < packets[1].image_x);
    for (id, packet) in packets.iter().enumerate() {
        assert_eq!(packet.target_id, id as i32);
        assert_eq!(packet.status, VisionStatus::TargetFound);
        assert!((packet.z - 1500.0).abs() < 150.0, "z = {}", packet.z);
    }
    // x carries the 215 mm shooter correction
    assert!((packets[0].x - (-136.5 + 215.0)).abs() < 30.0, "x = {}", packets[0].x);
    assert!((packets[1].x - (263.5 + 215.0)).abs() < 30.0, "x = {}", packets[1].x);
    assert!(packets[0].theta > packets[1].theta);

    for target in &out.targets {
        assert_eq!(target.sections.len(), 1);
        assert_eq!(target.sections[0].refinement, CornerRefinement::Refined);
    }
}

#[test]
fn strip_too_close_to_the_camera_is_not_a_target() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &facing(63.5, -25.4, 450.0));

    let packets = finder(FinderParams::default()).process(&frame).packets();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].status, VisionStatus::NoTargetFound);
    assert!(packets[0].z > 300.0 && packets[0].z < 600.0);
}

#[test]
fn clipped_strip_is_rejected() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    // only a 14 px wide piece stays in view, centered 7 px from the edge
    draw_strip(&mut frame, &camera, &facing(-655.6, -25.4, 1500.0));

    let mut params = FinderParams::default();
    params.processing.contour_size_threshold = 20;
    let out = finder(params).process(&frame);
    assert!(out.targets.is_empty());
}

#[test]
fn world_coordinates_report_the_camera_in_the_target_frame() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &facing(63.5, -25.4, 1500.0));

    let mut params = FinderParams::default();
    params.processing.use_world_coordinates = true;
    params.processing.shooter_offset = 0.0;
    params.processing.min_depth = f64::NEG_INFINITY;

    let out = finder(params).process(&frame);
    assert_eq!(out.targets.len(), 1);
    let target = &out.targets[0];
    // a half turn about y is its own inverse: -R^T t = (63.5, 25.4, 1500)
    assert!((target.tvec.z - 1500.0).abs() < 150.0, "tvec = {:?}", target.tvec);
    assert!((target.tvec.x - 63.5).abs() < 30.0, "tvec = {:?}", target.tvec);
}

#[test]
fn debug_output_carries_readouts() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &facing(63.5, -25.4, 1500.0));

    let params = FinderParams {
        debug_images: true,
        ..FinderParams::default()
    };
    let out = finder(params).process(&frame);
    let debug = out.debug.expect("debug images");
    assert!(debug.labels.iter().any(|l| l.text.starts_with("Z: ")));
    assert!(debug.labels.iter().any(|l| l.text.starts_with("Average Theta")));
    assert!(debug.contours.pixels().any(|p| p[0] == 255));
}

#[test]
fn packets_round_trip_through_a_message() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &facing(63.5, -25.4, 1500.0));
    draw_strip(&mut frame, &camera, &facing(-236.5, -25.4, 1800.0));

    let msg = VisionMessage::new(0, finder(FinderParams::default()).process(&frame).packets());
    let text = serde_json::to_string(&msg).unwrap();
    let back: VisionMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn rolled_strip_is_reported_as_processing_error() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    // at 40 degrees two corners share a quadrant around the centroid
    draw_strip(&mut frame, &camera, &rolled(40.0, 0.0, 0.0, 1500.0));

    let out = finder(FinderParams::default()).process(&frame);
    assert_eq!(out.targets.len(), 1);
    let target = &out.targets[0];
    assert!(!target.sections[0].ordered);
    assert!(target.camera_pose.is_none());
    assert_eq!(target.data.status, VisionStatus::ProcessingError);
    assert_eq!(target.data.target_id, 0);
    assert!(target.data.image_x.abs() < 0.05, "image_x = {}", target.data.image_x);
    assert!(target.data.image_y.abs() < 0.05, "image_y = {}", target.data.image_y);
}

#[test]
fn one_unsolvable_strip_leaves_its_neighbour_alone() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &rolled(40.0, -200.0, 0.0, 1500.0));
    draw_strip(&mut frame, &camera, &facing(263.5, -25.4, 1500.0));

    let packets = finder(FinderParams::default()).process(&frame).packets();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].status, VisionStatus::ProcessingError);
    assert!(packets[0].image_x < 0.0);
    assert_eq!(packets[1].status, VisionStatus::TargetFound);
    assert!((packets[1].z - 1500.0).abs() < 150.0, "z = {}", packets[1].z);
    assert!((packets[1].x - (263.5 + 215.0)).abs() < 30.0, "x = {}", packets[1].x);
}

#[test]
fn failed_refinement_keeps_raw_corners_and_still_solves() {
    let camera = pinhole();
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &camera, &facing(63.5, -25.4, 1500.0));

    let mut params = FinderParams::default();
    params.processing.corner_refinement.half_window = 0;
    let out = finder(params).process(&frame);
    assert_eq!(out.targets.len(), 1);

    let section = &out.targets[0].sections[0];
    assert_eq!(section.refinement, CornerRefinement::Failed(RefineError::InvalidWindow));
    assert!(section.ordered);
    // polygon vertices sit on whole pixels
    assert!(section.corners.iter().all(|c| c.x.fract() == 0.0 && c.y.fract() == 0.0));

    let packet = out.targets[0].data;
    assert_eq!(packet.status, VisionStatus::TargetFound);
    assert!((packet.z - 1500.0).abs() < 150.0, "z = {}", packet.z);
}

#[test]
fn failed_pose_solve_still_publishes_every_target() {
    let mut frame = RgbImage::new(640, 480);
    draw_strip(&mut frame, &pinhole(), &facing(263.5, -25.4, 1500.0));
    draw_strip(&mut frame, &pinhole(), &facing(-136.5, -25.4, 1500.0));

    // zero focal lengths leave nothing for the homography to work with
    let broken = CameraModel::Calibrated {
        intrinsics: CameraIntrinsics {
            fx: 0.0,
            fy: 0.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: Distortion::NONE,
    };
    let out = TargetFinder::new(TargetModel::RapidReact, broken, FinderParams::default())
        .process(&frame);

    let packets = out.packets();
    assert_eq!(packets.len(), 2);
    for (id, packet) in packets.iter().enumerate() {
        assert_eq!(packet.target_id, id as i32);
        assert_eq!(packet.status, VisionStatus::ProcessingError);
    }
    assert!(packets[0].image_x < 0.0 && packets[1].image_x > 0.0);
    for target in &out.targets {
        assert!(target.camera_pose.is_none());
        assert_eq!(target.sections[0].refinement, CornerRefinement::Refined);
    }
}
