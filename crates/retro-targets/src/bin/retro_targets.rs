//! retro-targets CLI: replay image frames through the vision loop.

use std::{
    path::PathBuf,
    sync::atomic::Ordering,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use log::info;
use retro_targets::{
    ChannelPublisher, ConfigError, ConfigSource, ImageSequenceSource, JsonConfigFile,
    JsonLinesPublisher, LoopError, PngDumpDisplay, Publisher, SourceError, VisionConfig,
    VisionLoop,
};

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("frames: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Logger(#[from] log::SetLoggerError),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "retro-targets")]
#[command(about = "Find retroreflective field targets and publish their poses as JSON lines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the vision loop over a directory of frames.
    Run(RunArgs),

    /// Print or write the default configuration.
    DefaultConfig {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// JSON configuration; created with defaults when missing.
    #[arg(long)]
    config: PathBuf,

    /// Directory of frames, replayed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Play the frames once instead of looping.
    #[arg(long)]
    once: bool,

    /// Dump debug canvases into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Stop after publishing this many messages.
    #[arg(long)]
    max_frames: Option<usize>,
}

/// How long the CLI waits for a message before checking whether the loop is done.
const IDLE_POLL: Duration = Duration::from_millis(200);

fn init_logging(config: &VisionConfig) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let _ = config;
        retro_targets::core::init_tracing(false);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        retro_targets::core::init_with_level(config.diagnostics.level_filter()?)?;
        Ok(())
    }
}

fn run(args: RunArgs) -> CliResult<()> {
    let mut config_file = JsonConfigFile::new(&args.config);
    let mut config = config_file.load()?;
    init_logging(&config)?;

    if args.debug_dir.is_some() {
        config.diagnostics.display_debug_images = true;
    }

    let frames = ImageSequenceSource::from_dir(&args.frames, !args.once)?;
    let finished = frames.finished_flag();
    let (tx, rx) = crossbeam_channel::unbounded();

    let name = format!("camera-{}", config.camera.camera_id);
    let mut vision = VisionLoop::new(name, &config, frames, ChannelPublisher::new(tx));
    if config.diagnostics.hot_reload {
        vision = vision.with_config_source(config_file);
    }
    if let Some(dir) = &args.debug_dir {
        vision = vision.with_display(PngDumpDisplay::new(dir)?);
    }

    vision.try_start()?;

    let mut out = JsonLinesPublisher::new(std::io::stdout());
    let mut published = 0usize;
    loop {
        if args.max_frames.is_some_and(|max| published >= max) {
            break;
        }
        match rx.recv_timeout(IDLE_POLL) {
            Ok(message) => {
                out.send(std::slice::from_ref(&message));
                published += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                if finished.load(Ordering::SeqCst) || !vision.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    vision.stop();
    vision.wait()?;
    info!("published {published} messages");
    Ok(())
}

fn default_config(output: Option<PathBuf>) -> CliResult<()> {
    let config = VisionConfig::default();
    match output {
        Some(path) => config.write_json(path)?,
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args)?,
        Commands::DefaultConfig { output } => default_config(output)?,
    }
    Ok(())
}
