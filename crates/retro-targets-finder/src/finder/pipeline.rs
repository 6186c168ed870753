use image::RgbImage;
use log::{debug, trace, warn};
use nalgebra::{Point2, Vector3};
use retro_targets_core::{
    refine_corners, solve_planar_pose, CameraModel, CameraPose, GrayImageView, SubpixParams,
};

use super::debug::{render_contours, render_targets, DebugImages};
use super::target::{group_sections, normalized_image_position, package_pose, Target};
use crate::contour::{approximate_outline, outer_contours, Polygon};
use crate::data::{VisionData, VisionStatus};
use crate::model::TargetModel;
use crate::params::FinderParams;
use crate::section::{canonical_order, score_polygons, CornerRefinement};
use crate::segment::segment;

/// Starting point handed to the pose solver: slightly tilted, 2.5 m out.
fn initial_pose_guess() -> CameraPose {
    CameraPose::from_rvec_tvec(Vector3::new(-0.3, 0.0, 0.0), Vector3::new(0.0, 0.0, 2500.0))
}

/// Result of processing one frame.
#[derive(Clone, Debug, Default)]
pub struct FinderOutput {
    /// Targets sorted left to right; `data.target_id` matches the index.
    pub targets: Vec<Target>,
    /// Present only when debug images are enabled.
    pub debug: Option<DebugImages>,
}

impl FinderOutput {
    /// Per-target records in publication order.
    pub fn packets(&self) -> Vec<VisionData> {
        self.targets.iter().map(|t| t.data).collect()
    }
}

/// Detection and pose pipeline for one camera and one target type.
#[derive(Clone, Debug)]
pub struct TargetFinder {
    target_model: TargetModel,
    camera: CameraModel,
    params: FinderParams,
}

impl TargetFinder {
    pub fn new(target_model: TargetModel, camera: CameraModel, params: FinderParams) -> Self {
        Self {
            target_model,
            camera,
            params,
        }
    }

    #[inline]
    pub fn target_model(&self) -> &TargetModel {
        &self.target_model
    }

    #[inline]
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    #[inline]
    pub fn params(&self) -> &FinderParams {
        &self.params
    }

    /// Replace the tunable parameters between frames.
    pub fn set_params(&mut self, params: FinderParams) {
        self.params = params;
    }

    /// Run the full pipeline on one RGB frame.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(w = frame.width(), h = frame.height()))
    )]
    pub fn process(&self, frame: &RgbImage) -> FinderOutput {
        let (width, height) = frame.dimensions();
        let processing = &self.params.processing;

        let seg = segment(frame, &self.params.hsv);
        let contours = outer_contours(&seg.mask, processing.contour_size_threshold);
        if contours.is_empty() {
            debug!("no contours above the size threshold");
        }

        let polygons: Vec<Polygon> = contours
            .iter()
            .map(|c| approximate_outline(c, processing.contour_approximation_accuracy))
            .collect();
        for (i, poly) in polygons.iter().enumerate() {
            trace!("contour {i}: {} polygon vertices", poly.len());
        }

        let sections = score_polygons(&polygons, processing, width, height);
        let mut targets = group_sections(sections);

        let gray = GrayImageView::new(width as usize, height as usize, seg.gray.as_raw());
        if gray.is_none() {
            warn!("grayscale buffer does not match a {width}x{height} frame");
        }
        self.refine_targets(&mut targets, gray.as_ref(), &processing.corner_refinement);
        self.solve_targets(&mut targets, width, height);

        targets.sort_by(|a, b| a.data.image_x.total_cmp(&b.data.image_x));
        for (id, target) in targets.iter_mut().enumerate() {
            target.data.target_id = id as i32;
        }
        debug!(
            "{} targets, {} found",
            targets.len(),
            targets.iter().filter(|t| t.is_found()).count()
        );

        let debug = self.params.debug_images.then(|| {
            let (raw, labels) = render_targets(frame, &targets, &self.target_model, &self.camera);
            DebugImages {
                raw,
                contours: render_contours(width, height, &polygons),
                ranged: seg.mask.clone(),
                labels,
            }
        });

        FinderOutput { targets, debug }
    }

    /// Subpixel corners (skipped without a grayscale view), then canonical
    /// order. A section whose corners do not span four quadrants keeps its
    /// corners as found and stays unordered.
    fn refine_targets(
        &self,
        targets: &mut [Target],
        gray: Option<&GrayImageView<'_>>,
        subpix: &SubpixParams,
    ) {
        for target in targets.iter_mut() {
            for section in &mut target.sections {
                match gray.map(|g| refine_corners(g, &section.corners, subpix)) {
                    Some(Ok(refined)) => {
                        section.corners = refined;
                        section.refinement = CornerRefinement::Refined;
                    }
                    Some(Err(err)) => {
                        warn!("corner refinement failed, keeping raw corners: {err}");
                        section.refinement = CornerRefinement::Failed(err);
                    }
                    None => {}
                }
                match canonical_order(&section.corners, &section.center) {
                    Some(ordered) => {
                        section.corners = ordered;
                        section.ordered = true;
                    }
                    None => debug!("section corners do not span four quadrants"),
                }
            }
            if let Some(section) = target.sections.first().filter(|s| s.ordered) {
                let [c0, c1, ..] = section.corners;
                target.center = Point2::from((c0.coords + c1.coords) / 2.0);
            }
        }
    }

    fn solve_targets(&self, targets: &mut [Target], width: u32, height: u32) {
        let guess = initial_pose_guess();
        for target in targets.iter_mut() {
            let (image_x, image_y) = normalized_image_position(&target.center, width, height);
            target.data.image_x = image_x;
            target.data.image_y = image_y;

            let [section] = target.sections.as_slice() else {
                warn!("unsupported section count {}", target.sections.len());
                target.data.status = VisionStatus::ProcessingError;
                continue;
            };
            if !section.ordered {
                target.data.status = VisionStatus::ProcessingError;
                continue;
            }

            let key_points = self.target_model.sub_target_key_points(0);
            let solved =
                match solve_planar_pose(&key_points, &section.corners, &self.camera, &guess) {
                    Ok(pose) => pose,
                    Err(err) => {
                        debug!("pose solve failed: {err}");
                        target.data.status = VisionStatus::ProcessingError;
                        continue;
                    }
                };

            let packaged = package_pose(&solved, &self.params.processing);
            packaged.write_into(&mut target.data);
            target.rvec = packaged.rvec;
            target.tvec = packaged.tvec;
            target.robot_distance = packaged.distance;
            target.camera_pose = Some(solved);
        }
    }
}
