//! Background acquisition/detection/publish loop.
//!
//! A [`VisionLoop`] runs its [`LoopWorker`] on one named thread. The only
//! state shared with the controller is the pair of `should_run` /
//! `is_running` flags; cancellation is cooperative and polled once per
//! frame. The thread hands the worker back when it exits, so a stopped
//! loop can be started again.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};
use retro_targets_finder::{FinderOutput, TargetFinder, VisionMessage};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    config::{ConfigSource, DiagnosticsConfig, VisionConfig},
    display::{DebugDisplay, NoDisplay, ESC_KEY},
    publish::Publisher,
    source::FrameSource,
};

#[derive(thiserror::Error, Debug)]
pub enum LoopError {
    #[error("loop is already running")]
    AlreadyRunning,
    #[error("failed to spawn loop thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("loop thread panicked")]
    WorkerPanicked,
    #[error("loop state was lost by an earlier failure")]
    WorkerLost,
}

/// Everything the loop thread owns.
pub struct LoopWorker {
    name: String,
    camera_id: i32,
    diagnostics: DiagnosticsConfig,
    finder: Option<TargetFinder>,
    source: Box<dyn FrameSource>,
    publisher: Box<dyn Publisher>,
    config_source: Option<Box<dyn ConfigSource>>,
    display: Box<dyn DebugDisplay>,
    frames: u64,
}

impl LoopWorker {
    /// Frames acquired so far, across restarts.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finder(&self) -> Option<&TargetFinder> {
        self.finder.as_ref()
    }

    pub fn diagnostics(&self) -> &DiagnosticsConfig {
        &self.diagnostics
    }

    fn run(mut self, should_run: &AtomicBool) -> Self {
        info!("{}: loop started", self.name);
        while should_run.load(Ordering::SeqCst) {
            self.step(should_run);
        }
        info!("{}: loop stopped after {} frames", self.name, self.frames);
        self
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(frame = self.frames)))]
    fn step(&mut self, should_run: &AtomicBool) {
        if self.diagnostics.hot_reload {
            self.reload();
        }

        let Some(frame) = self.source.try_acquire_frame() else {
            return;
        };
        self.frames += 1;

        let output = self.finder.as_ref().map(|finder| finder.process(&frame));
        let packets = output
            .as_ref()
            .map(FinderOutput::packets)
            .unwrap_or_default();
        let message = VisionMessage::new(self.camera_id, packets);
        debug!(
            "{}: frame {} -> {} targets ({} found)",
            self.name,
            self.frames,
            message.packets.len(),
            message.found().count()
        );
        self.publisher.send(std::slice::from_ref(&message));

        if self.diagnostics.display_debug_images {
            if let Some(images) = output.as_ref().and_then(|o| o.debug.as_ref()) {
                self.display.show(&self.name, images);
            }
            let delay = Duration::from_millis(self.diagnostics.wait_key_delay_ms);
            if self.display.poll_key(delay) == Some(ESC_KEY) {
                info!("{}: cancel key pressed", self.name);
                should_run.store(false, Ordering::SeqCst);
            }
        }
    }

    fn reload(&mut self) {
        let Some(source) = self.config_source.as_mut() else {
            return;
        };
        match source.load() {
            Ok(cfg) => self.apply(&cfg),
            Err(err) => warn!("{}: config reload failed: {err}", self.name),
        }
    }

    /// Camera and target model are fixed at construction; only tunables change.
    fn apply(&mut self, cfg: &VisionConfig) {
        match cfg.diagnostics.level_filter() {
            Ok(level) => log::set_max_level(level),
            Err(err) => warn!("{}: {err}", self.name),
        }
        self.diagnostics = cfg.diagnostics.clone();
        if let Some(finder) = self.finder.as_mut() {
            finder.set_params(cfg.finder_params());
        }
    }
}

/// Clears `is_running` when the loop thread exits, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Start/stop controller for one camera's processing loop.
pub struct VisionLoop {
    name: String,
    should_run: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    worker: Option<LoopWorker>,
    handle: Option<JoinHandle<LoopWorker>>,
}

impl VisionLoop {
    /// Build a loop from a configuration snapshot. A negative camera id
    /// publishes empty messages without running a finder.
    pub fn new(
        name: impl Into<String>,
        config: &VisionConfig,
        source: impl FrameSource + 'static,
        publisher: impl Publisher + 'static,
    ) -> Self {
        let name = name.into();
        let worker = LoopWorker {
            name: name.clone(),
            camera_id: config.camera.camera_id,
            diagnostics: config.diagnostics.clone(),
            finder: config.build_finder(),
            source: Box::new(source),
            publisher: Box::new(publisher),
            config_source: None,
            display: Box::new(NoDisplay),
            frames: 0,
        };
        Self {
            name,
            should_run: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            worker: Some(worker),
            handle: None,
        }
    }

    /// Source polled before every frame when hot reload is enabled.
    pub fn with_config_source(mut self, source: impl ConfigSource + 'static) -> Self {
        match self.worker.as_mut() {
            Some(worker) => worker.config_source = Some(Box::new(source)),
            None => warn!("{}: config source ignored while running", self.name),
        }
        self
    }

    pub fn with_display(mut self, display: impl DebugDisplay + 'static) -> Self {
        match self.worker.as_mut() {
            Some(worker) => worker.display = Box::new(display),
            None => warn!("{}: display ignored while running", self.name),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Worker state, available while the loop is not running.
    pub fn worker(&self) -> Option<&LoopWorker> {
        self.worker.as_ref()
    }

    /// Launch the loop thread. Returns `false` if it is already running or
    /// could not be launched.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(LoopError::AlreadyRunning) => false,
            Err(err) => {
                warn!("{}: {err}", self.name);
                false
            }
        }
    }

    pub fn try_start(&mut self) -> Result<(), LoopError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }
        self.reclaim()?;
        let worker = self.worker.take().ok_or(LoopError::WorkerLost)?;

        self.should_run.store(true, Ordering::SeqCst);
        self.is_running.store(true, Ordering::SeqCst);

        let should_run = Arc::clone(&self.should_run);
        let guard = RunningGuard(Arc::clone(&self.is_running));
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _guard = guard;
                worker.run(&should_run)
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.should_run.store(false, Ordering::SeqCst);
                self.is_running.store(false, Ordering::SeqCst);
                Err(LoopError::Spawn(err))
            }
        }
    }

    /// Ask the loop to exit after the current frame. Does not wait.
    pub fn stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Block until the loop thread has exited. Only returns once the loop
    /// has been stopped, by [`VisionLoop::stop`] or by the cancel key.
    pub fn wait(&mut self) -> Result<(), LoopError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let worker = handle.join().map_err(|_| LoopError::WorkerPanicked)?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Collect the worker from a thread that has already exited.
    fn reclaim(&mut self) -> Result<(), LoopError> {
        if self.handle.is_some() {
            self.wait()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for VisionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionLoop")
            .field("name", &self.name)
            .field("should_run", &self.should_run.load(Ordering::SeqCst))
            .field("is_running", &self.is_running())
            .field("has_worker", &self.worker.is_some())
            .finish()
    }
}
