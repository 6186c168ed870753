//! Frame sources feeding the vision loop.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::Receiver;
use image::RgbImage;
use log::{debug, warn};

/// Supplies frames to the loop. `None` means no frame this iteration.
pub trait FrameSource: Send {
    fn try_acquire_frame(&mut self) -> Option<RgbImage>;
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no images found in {0}")]
    Empty(PathBuf),
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Image files replayed in name order, once or in a loop.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
    finished: Arc<AtomicBool>,
}

impl ImageSequenceSource {
    pub fn from_paths(paths: Vec<PathBuf>, looping: bool) -> Self {
        Self {
            paths,
            next: 0,
            looping,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every image file directly inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>, looping: bool) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        paths.sort();
        debug!("{} frames in {}", paths.len(), dir.display());
        Ok(Self::from_paths(paths, looping))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Set once a non-looping sequence has handed out its last frame and
    /// been asked for another.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }
}

impl FrameSource for ImageSequenceSource {
    fn try_acquire_frame(&mut self) -> Option<RgbImage> {
        if self.next >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                self.finished.store(true, Ordering::SeqCst);
                return None;
            }
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                None
            }
        }
    }
}

/// Frames pushed from another thread, e.g. a capture driver.
#[derive(Debug)]
pub struct ChannelFrameSource {
    rx: Receiver<RgbImage>,
    timeout: Duration,
}

impl ChannelFrameSource {
    pub fn new(rx: Receiver<RgbImage>) -> Self {
        Self {
            rx,
            timeout: Duration::from_millis(100),
        }
    }

    /// How long one acquisition waits before reporting no frame.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl FrameSource for ChannelFrameSource {
    fn try_acquire_frame(&mut self) -> Option<RgbImage> {
        self.rx.recv_timeout(self.timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, n: u8) {
        for i in 0..n {
            let img = RgbImage::from_pixel(4, 3, Rgb([i, 0, 0]));
            img.save(dir.join(format!("frame_{i:02}.png"))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    #[test]
    fn plays_directory_in_name_order_once() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);

        let mut src = ImageSequenceSource::from_dir(dir.path(), false).unwrap();
        assert_eq!(src.len(), 3);
        let finished = src.finished_flag();
        for i in 0..3 {
            let frame = src.try_acquire_frame().expect("frame");
            assert_eq!(frame.get_pixel(0, 0)[0], i);
        }
        assert!(!finished.load(Ordering::SeqCst));
        assert!(src.try_acquire_frame().is_none());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn looping_sequence_wraps() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);

        let mut src = ImageSequenceSource::from_dir(dir.path(), true).unwrap();
        let seen: Vec<u8> = (0..5)
            .map(|_| src.try_acquire_frame().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(seen, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::from_dir(dir.path(), false),
            Err(SourceError::Empty(_))
        ));
    }

    #[test]
    fn channel_source_times_out_without_frames() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut src = ChannelFrameSource::new(rx).with_timeout(Duration::from_millis(5));
        assert!(src.try_acquire_frame().is_none());
        tx.send(RgbImage::new(2, 2)).unwrap();
        assert_eq!(src.try_acquire_frame().unwrap().dimensions(), (2, 2));
    }
}
