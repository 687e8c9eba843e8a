use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use video_generator::{
    config::Config,
    encoder::Codec,
    video::{ImageLoader, MediaTime},
    WriterSession,
};

#[derive(Parser)]
#[command(
    name = "video-generator",
    version,
    about = "Turn a directory of still images into a video",
    long_about = "Video-Generator shows every image in a directory, in file-name order, for an equal share of the requested duration and writes the result as H.264/MP4 (through ffmpeg) or as an animated GIF."
)]
struct Cli {
    /// Directory containing numbered stills (PNG, JPEG, GIF)
    #[arg(short, long)]
    images: PathBuf,

    /// Total video duration in seconds
    #[arg(short, long)]
    duration: f64,

    /// Directory the video is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output codec (h264, gif)
    #[arg(long)]
    codec: Option<Codec>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    info!("Starting Video-Generator v{}", env!("CARGO_PKG_VERSION"));
    info!("Images: {:?}", cli.images);
    info!("Duration: {}s", cli.duration);

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(dir) = cli.output_dir {
        config.output.directory = Some(dir);
    }
    if config.output.directory.is_none() {
        config.output.directory = Some(std::env::current_dir().context("no current directory")?);
    }
    if let Some(codec) = cli.codec {
        config.video.codec = codec;
    }
    if let Some(width) = cli.width {
        config.video.width = width;
    }
    if let Some(height) = cli.height {
        config.video.height = height;
    }

    let duration = MediaTime::from_secs_f64(cli.duration)
        .ok_or_else(|| anyhow::anyhow!("Invalid duration: {}", cli.duration))?;

    let loader = ImageLoader::new(config.run.decode_threads)?;
    let images = loader.load_directory(&cli.images)?;

    let session = WriterSession::new(config)?;

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current frame");
            cancel.cancel();
        }
    });

    info!("Starting generation...");
    let result = session
        .generate(images, duration, |progress| {
            info!(
                "Frame {}/{} ({:.0}%)",
                progress.completed,
                progress.total,
                progress.fraction() * 100.0
            );
        })
        .await;

    match result {
        Ok(video) => {
            if !video.skipped.is_empty() {
                warn!("{} frames were written blank: {:?}", video.skipped.len(), video.skipped);
            }
            info!(
                "Generation complete! {} frames, {} bytes, saved to: {:?}",
                video.frame_count, video.file_size, video.path
            );
            Ok(())
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}
