//! Diagnostic canvases. Nothing here feeds back into the published results.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_polygon_mut,
};
use nalgebra::Point2;
use retro_targets_core::CameraModel;

use super::target::Target;
use crate::contour::Polygon;
use crate::model::TargetModel;

const MM_PER_INCH: f64 = 25.4;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 64, 64]),
    Rgb([64, 160, 255]),
    Rgb([255, 200, 0]),
    Rgb([200, 64, 255]),
    Rgb([0, 230, 200]),
    Rgb([255, 128, 0]),
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS_COLORS: [Rgb<u8>; 3] = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];

/// Text to overlay at a pixel position; rendering is left to the display.
#[derive(Clone, Debug, PartialEq)]
pub struct DebugLabel {
    pub text: String,
    pub position: (i32, i32),
    pub color: Rgb<u8>,
}

/// Canvases kept for one frame when debug images are enabled.
#[derive(Clone, Debug)]
pub struct DebugImages {
    /// Input frame with corner markers, re-projected key points and axes.
    pub raw: RgbImage,
    /// Approximated contours, filled.
    pub contours: GrayImage,
    /// Color-gated mask after closing.
    pub ranged: GrayImage,
    pub labels: Vec<DebugLabel>,
}

impl DebugImages {
    /// Canvases paired with their display names.
    pub fn named(&self) -> [(&'static str, image::DynamicImage); 3] {
        [
            ("Raw", image::DynamicImage::ImageRgb8(self.raw.clone())),
            ("Contours", image::DynamicImage::ImageLuma8(self.contours.clone())),
            ("Ranged", image::DynamicImage::ImageLuma8(self.ranged.clone())),
        ]
    }
}

#[inline]
fn px(p: &Point2<f64>) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

/// Fill every approximated polygon into a blank mask-sized canvas.
pub(crate) fn render_contours(width: u32, height: u32, polygons: &[Polygon]) -> GrayImage {
    let mut canvas = GrayImage::new(width, height);
    for poly in polygons {
        let mut pts = poly.clone();
        pts.dedup();
        while pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        if pts.len() >= 3 {
            draw_polygon_mut(&mut canvas, &pts, Luma([255]));
        }
    }
    canvas
}

/// Annotate the raw frame and build the readout labels.
pub(crate) fn render_targets(
    frame: &RgbImage,
    targets: &[Target],
    model: &TargetModel,
    camera: &CameraModel,
) -> (RgbImage, Vec<DebugLabel>) {
    let mut raw = frame.clone();
    let mut labels = Vec::new();
    let mut theta_sum = 0.0;
    let mut found = 0usize;

    for (i, target) in targets.iter().enumerate() {
        if !target.is_found() {
            continue;
        }
        theta_sum += target.data.theta;
        found += 1;
        let color = PALETTE[i % PALETTE.len()];

        for section in &target.sections {
            for c in &section.corners {
                draw_hollow_circle_mut(&mut raw, px(c), 5, color);
            }
            let rect = section.rect.corners();
            for k in 0..4 {
                let (a, b) = (rect[k], rect[(k + 1) % 4]);
                draw_line_segment_mut(
                    &mut raw,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    color,
                );
            }
        }

        if let Some(pose) = &target.camera_pose {
            for p in camera.project_points(pose, &model.key_points()) {
                draw_filled_circle_mut(&mut raw, px(&p), 1, color);
            }
            let axes = camera.project_points(pose, &model.axes());
            if let Some((origin, tips)) = axes.split_first() {
                for (tip, axis_color) in tips.iter().zip(AXIS_COLORS) {
                    draw_line_segment_mut(
                        &mut raw,
                        (origin.x as f32, origin.y as f32),
                        (tip.x as f32, tip.y as f32),
                        axis_color,
                    );
                }
            }
        }

        let lines = [
            format!("X: {:.1}", target.data.x / MM_PER_INCH),
            format!("Y: {:.1}", target.data.y / MM_PER_INCH),
            format!("Z: {:.1}", target.data.z / MM_PER_INCH),
            format!("Theta: {:.1}", target.data.theta),
            format!("rDist: {:.1}", target.robot_distance / MM_PER_INCH),
        ];
        for (j, text) in lines.into_iter().enumerate() {
            labels.push(DebugLabel {
                text,
                position: (10, 30 + i as i32 * 60 + j as i32 * 20),
                color,
            });
        }
    }

    if found > 0 {
        labels.push(DebugLabel {
            text: format!("Average Theta: {:.1}", theta_sum / found as f64),
            position: (10, 430),
            color: WHITE,
        });
    }
    (raw, labels)
}
