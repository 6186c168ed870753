//! Debug-image sinks.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::warn;
use retro_targets_finder::DebugImages;

/// Key code that stops the loop when debug display is on.
pub const ESC_KEY: i32 = 27;

/// Shows diagnostic canvases and reports key presses.
pub trait DebugDisplay: Send {
    fn show(&mut self, name: &str, images: &DebugImages);
    /// Wait up to `delay` for a key press.
    fn poll_key(&mut self, delay: Duration) -> Option<i32>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDisplay;

impl DebugDisplay for NoDisplay {
    fn show(&mut self, _name: &str, _images: &DebugImages) {}

    fn poll_key(&mut self, _delay: Duration) -> Option<i32> {
        None
    }
}

/// Writes every canvas of every frame as a PNG, plus the overlay labels as
/// text, into a directory.
#[derive(Debug)]
pub struct PngDumpDisplay {
    dir: PathBuf,
    frame: u64,
}

impl PngDumpDisplay {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, frame: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn dump(&self, name: &str, images: &DebugImages) -> Result<(), Box<dyn std::error::Error>> {
        let stem = format!("{}_{:06}", name.replace(char::is_whitespace, "_"), self.frame);
        for (kind, img) in images.named() {
            img.save(self.dir.join(format!("{stem}_{}.png", kind.to_lowercase())))?;
        }
        let labels: String = images
            .labels
            .iter()
            .map(|l| format!("{} {} {}\n", l.position.0, l.position.1, l.text))
            .collect();
        fs::write(self.dir.join(format!("{stem}_labels.txt")), labels)?;
        Ok(())
    }
}

impl DebugDisplay for PngDumpDisplay {
    fn show(&mut self, name: &str, images: &DebugImages) {
        if let Err(err) = self.dump(name, images) {
            warn!("failed to dump debug images: {err}");
        }
        self.frame += 1;
    }

    fn poll_key(&mut self, _delay: Duration) -> Option<i32> {
        None
    }
}
