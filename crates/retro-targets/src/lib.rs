//! High-level facade for the `retro-targets-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry core and the target finder
//! - a background [`VisionLoop`] that pulls frames from a [`FrameSource`],
//!   runs the finder and hands [`VisionMessage`]s to a [`Publisher`]
//! - JSON configuration with optional hot reload
//! - the `retro-targets` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use retro_targets::{ImageSequenceSource, JsonLinesPublisher, VisionConfig, VisionLoop};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VisionConfig::load_json("vision.json")?;
//! let frames = ImageSequenceSource::from_dir("frames", true)?;
//! let mut vision = VisionLoop::new("front", &config, frames, JsonLinesPublisher::new(std::io::stdout()));
//! vision.start();
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! vision.stop();
//! vision.wait()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `retro_targets::core`: camera models, homographies, planar pose, subpixel refinement.
//! - `retro_targets::finder`: segmentation, contour scoring, grouping and pose packaging.
//! - [`config`], [`source`], [`publish`], [`display`]: the loop's collaborators.

pub use retro_targets_core as core;
pub use retro_targets_finder as finder;

pub mod config;
pub mod display;
pub mod publish;
pub mod source;
mod vision_loop;

pub use config::{
    CameraConfig, ConfigError, ConfigSource, DiagnosticsConfig, JsonConfigFile, VisionConfig,
};
pub use display::{DebugDisplay, NoDisplay, PngDumpDisplay, ESC_KEY};
pub use publish::{ChannelPublisher, JsonLinesPublisher, Publisher};
pub use source::{ChannelFrameSource, FrameSource, ImageSequenceSource, SourceError};
pub use vision_loop::{LoopError, LoopWorker, VisionLoop};

pub use retro_targets_finder::{
    FinderParams, TargetFinder, TargetModel, VisionData, VisionMessage, VisionStatus,
};
