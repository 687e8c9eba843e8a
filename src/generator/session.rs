use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::encoder::{open_writer, Codec, FrameSink, WriterConfig, WriterFactory};
use crate::error::{EncoderError, GeneratorError, Result};
use crate::generator::feeder::{CancelToken, FrameFeeder};
use crate::video::{ImageSequence, MediaTime, PixelBufferFiller, Progress, Timeline};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A finished video on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub path: PathBuf,
    pub frame_count: usize,
    pub duration: MediaTime,
    pub file_size: u64,
    pub codec: Codec,
    /// Frames written blank because their still could not be drawn
    pub skipped: Vec<usize>,
}

/// Turns one image sequence into one video file.
///
/// A session is consumed by its run; the encoder it opens is finalized
/// before the run reports back.
pub struct WriterSession {
    config: Config,
    factory: WriterFactory,
    cancel: CancelToken,
}

impl WriterSession {
    /// Validate `config` and prepare a session using the built-in encoders
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory: Box::new(open_writer),
            cancel: CancelToken::new(),
        })
    }

    /// Replace the encoder back-end
    pub fn with_writer_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&WriterConfig) -> std::result::Result<Box<dyn FrameSink>, EncoderError>
            + Send
            + Sync
            + 'static,
    {
        self.factory = Box::new(factory);
        self
    }

    /// Token that stops this session's run at the next frame
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Encode `images` spread evenly over `duration`.
    ///
    /// `on_progress` runs on the frame worker after each accepted frame.
    pub async fn generate<P>(
        self,
        images: ImageSequence,
        duration: MediaTime,
        on_progress: P,
    ) -> Result<GeneratedVideo>
    where
        P: FnMut(Progress) + Send + 'static,
    {
        if images.is_empty() {
            return Err(GeneratorError::invalid_input("image sequence is empty"));
        }
        let timeline = Timeline::new(images.len(), duration)?;

        let directory = resolve_output_dir(self.config.output.directory.as_deref()).await?;
        let output_path = directory.join(self.output_file_name());
        remove_stale_output(&output_path).await;

        info!(
            "Encoding {} images over {} into {:?}",
            images.len(),
            timeline.total_duration(),
            output_path
        );

        let keep_partial = self.config.run.keep_partial_output;
        let result = self.encode(images, timeline, &output_path, on_progress).await;

        match result {
            Ok(video) => {
                info!("Video written to {:?} ({} bytes)", video.path, video.file_size);
                Ok(video)
            }
            Err(e) => {
                warn!("Video generation failed ({:?}): {}", e.kind(), e);
                if !keep_partial {
                    discard_partial_output(&output_path).await;
                }
                Err(e)
            }
        }
    }

    /// Callback flavour of [`generate`](Self::generate). Exactly one of
    /// `on_success` or `on_failure` is called, once.
    pub async fn run<P, S, F>(
        self,
        images: ImageSequence,
        duration: MediaTime,
        on_progress: P,
        on_success: S,
        on_failure: F,
    ) where
        P: FnMut(Progress) + Send + 'static,
        S: FnOnce(GeneratedVideo),
        F: FnOnce(GeneratorError),
    {
        match self.generate(images, duration, on_progress).await {
            Ok(video) => on_success(video),
            Err(e) => on_failure(e),
        }
    }

    async fn encode<P>(
        self,
        images: ImageSequence,
        timeline: Timeline,
        output_path: &Path,
        mut on_progress: P,
    ) -> Result<GeneratedVideo>
    where
        P: FnMut(Progress) + Send + 'static,
    {
        let writer_config = WriterConfig {
            output_path: output_path.to_path_buf(),
            frame_size: self.config.frame_size(),
            codec: self.config.codec_settings(),
            frame_duration: timeline.frame_duration(),
            pool_capacity: self.config.video.pool_capacity,
        };

        let mut sink = (self.factory)(&writer_config).map_err(|cause| GeneratorError::WriterStartFailed {
            reason: cause.to_string(),
            cause: Some(cause),
        })?;
        if let Err(cause) = sink.start_session(MediaTime::ZERO) {
            sink.cancel_writing();
            return Err(GeneratorError::WriterStartFailed {
                reason: cause.to_string(),
                cause: Some(cause),
            });
        }

        let frame_count = timeline.frame_count();
        let duration = timeline.total_duration();
        let feeder = FrameFeeder::new(sink, images, timeline)?
            .with_filler(PixelBufferFiller::new(self.config.video.resize_filter))
            .with_policy(self.config.run.frame_error_policy)
            .with_cancel_token(self.cancel.clone())
            .with_stall_timeout(self.config.stall_timeout());

        let summary = tokio::task::spawn_blocking(move || feeder.run(&mut on_progress))
            .await
            .map_err(|e| GeneratorError::Worker {
                reason: e.to_string(),
            })??;

        let file_size = tokio::fs::metadata(output_path)
            .await
            .map_err(|e| GeneratorError::FinalizeFailed {
                cause: EncoderError::WriteFailed {
                    reason: format!("output missing after finalize: {}", e),
                },
            })?
            .len();

        Ok(GeneratedVideo {
            path: output_path.to_path_buf(),
            frame_count,
            duration,
            file_size,
            codec: self.config.video.codec,
            skipped: summary.skipped,
        })
    }

    fn output_file_name(&self) -> String {
        let output = &self.config.output;
        let extension = self.config.video.codec.extension();
        if output.unique_per_run {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            let run = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}-{}.{}", output.file_stem, stamp, run, extension)
        } else {
            format!("{}.{}", output.file_stem, extension)
        }
    }
}

/// Create the output directory if needed and make sure it can be written
async fn resolve_output_dir(directory: Option<&Path>) -> Result<PathBuf> {
    let directory = directory.ok_or_else(|| GeneratorError::DirectoryUnavailable {
        reason: "no output directory configured".to_string(),
    })?;

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| GeneratorError::DirectoryUnavailable {
            reason: format!("cannot create {}: {}", directory.display(), e),
        })?;

    let metadata = tokio::fs::metadata(directory)
        .await
        .map_err(|e| GeneratorError::DirectoryUnavailable {
            reason: format!("cannot inspect {}: {}", directory.display(), e),
        })?;
    if !metadata.is_dir() {
        return Err(GeneratorError::DirectoryUnavailable {
            reason: format!("{} is not a directory", directory.display()),
        });
    }

    // Permission bits miss ACLs, read-only mounts and pseudo filesystems, so
    // write a scratch file instead.
    tempfile::NamedTempFile::new_in(directory).map_err(|e| GeneratorError::DirectoryUnavailable {
        reason: format!("{} is not writable: {}", directory.display(), e),
    })?;

    Ok(directory.to_path_buf())
}

/// Best-effort delete of a previous run's file at `path`
async fn remove_stale_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed previous output {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove previous output {:?}: {}", path, e),
    }
}

async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {:?}: {}", path, e),
    }
}
