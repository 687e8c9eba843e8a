use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::encoder::{open_writable, AppendGuard, FrameSink, ReadySignal, WriterConfig};
use crate::error::EncoderError;
use crate::video::{MediaTime, PixelBuffer, PixelBufferPool, PixelFormat};

const FFMPEG: &str = "ffmpeg";

/// H.264/MP4 writer backed by the system `ffmpeg` binary.
///
/// Frames travel as raw ARGB over ffmpeg's stdin. A dedicated pipe thread
/// writes them out and hands each buffer back to the pool; the pool's free
/// capacity is the sink's readiness, so a slow encoder pushes back on the
/// feeder instead of piling frames up in memory.
pub struct FfmpegSink {
    config: WriterConfig,
    pool: PixelBufferPool,
    child: Option<Child>,
    frames: Option<Sender<PixelBuffer>>,
    pipe_thread: Option<JoinHandle<Result<(), EncoderError>>>,
    shared: Arc<PipeShared>,
    guard: AppendGuard,
    session_started: bool,
    finished: bool,
}

/// State the pipe thread shares with the sink
#[derive(Default)]
struct PipeShared {
    signal: Mutex<Option<ReadySignal>>,
    last_error: Mutex<Option<EncoderError>>,
    failed: AtomicBool,
}

impl PipeShared {
    fn notify_ready(&self) {
        if let Some(signal) = self.signal.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            signal.notify_ready();
        }
    }

    fn fail(&self, error: EncoderError) {
        self.failed.store(true, Ordering::SeqCst);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        if let Some(signal) = self.signal.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            signal.notify_failed(error);
        }
    }

    fn record(&self, error: &EncoderError) {
        self.failed.store(true, Ordering::SeqCst);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
    }

    fn last_error(&self) -> Option<EncoderError> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear_signal(&self) {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub fn is_ffmpeg_available() -> bool {
    Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

impl FfmpegSink {
    /// Validate settings, spawn ffmpeg and the pipe thread
    pub fn start(config: WriterConfig) -> Result<Self, EncoderError> {
        let size = config.frame_size;
        if size.is_empty() || !size.is_even() {
            return Err(EncoderError::UnsupportedSettings {
                details: format!(
                    "H.264 output needs non-zero even dimensions, got {}x{}",
                    size.width, size.height
                ),
            });
        }
        if !config.frame_duration.is_positive() {
            return Err(EncoderError::UnsupportedSettings {
                details: format!("frame duration must be positive, got {}", config.frame_duration),
            });
        }
        if config.pool_capacity == 0 {
            return Err(EncoderError::UnsupportedSettings {
                details: "pixel buffer pool needs at least one buffer".to_string(),
            });
        }

        if !is_ffmpeg_available() {
            return Err(EncoderError::BinaryMissing {
                program: FFMPEG.to_string(),
            });
        }

        drop(open_writable(&config.output_path)?);

        let format = PixelFormat::Argb32;
        let frame_duration = config.frame_duration.reduced();
        let frame_rate = format!("{}/{}", frame_duration.timescale(), frame_duration.value());

        let mut cmd = Command::new(FFMPEG);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args([
                "-y",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                format.ffmpeg_name(),
                "-s",
                &format!("{}x{}", size.width, size.height),
                "-r",
                &frame_rate,
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                "libx264",
                "-crf",
                &config.codec.crf().to_string(),
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ])
            .arg(&config.output_path);

        debug!("Spawning ffmpeg: {:?}", cmd);

        let child = cmd.spawn().map_err(|e| EncoderError::SpawnFailed {
            reason: e.to_string(),
        })?;
        info!(
            "ffmpeg writer started: {}x{} at {} fps -> {:?}",
            size.width, size.height, frame_rate, config.output_path
        );

        Self::from_child(config, child)
    }

    /// Wire a running encoder process to a new sink. The child's stdin must
    /// be piped; it receives every appended frame as raw ARGB.
    fn from_child(config: WriterConfig, mut child: Child) -> Result<Self, EncoderError> {
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            return Err(EncoderError::SpawnFailed {
                reason: "ffmpeg stdin was not captured".to_string(),
            });
        };

        let size = config.frame_size;
        let pool = PixelBufferPool::new(size, PixelFormat::Argb32, config.pool_capacity);
        let shared = Arc::new(PipeShared::default());
        let (frames_tx, frames_rx) = bounded(config.pool_capacity);

        let pipe_thread = {
            let pool = pool.clone();
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("ffmpeg-pipe".to_string())
                .spawn(move || pipe_frames(stdin, frames_rx, pool, shared))
        };
        let pipe_thread = match pipe_thread {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                return Err(EncoderError::SpawnFailed {
                    reason: format!("failed to start pipe thread: {}", e),
                });
            }
        };

        Ok(Self {
            guard: AppendGuard::new(size, config.frame_duration),
            config,
            pool,
            child: Some(child),
            frames: Some(frames_tx),
            pipe_thread: Some(pipe_thread),
            shared,
            session_started: false,
            finished: false,
        })
    }

    fn reject(&self, buffer: PixelBuffer, error: EncoderError) -> Result<(), EncoderError> {
        self.pool.release(buffer);
        self.shared.record(&error);
        Err(error)
    }

    fn close_input(&mut self) {
        self.finished = true;
        self.shared.clear_signal();
        // Dropping the sender lets the pipe thread drain and close stdin.
        self.frames.take();
    }
}

impl FrameSink for FfmpegSink {
    fn pixel_buffer_pool(&self) -> &PixelBufferPool {
        &self.pool
    }

    fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    fn start_session(&mut self, at: MediaTime) -> Result<(), EncoderError> {
        if at != MediaTime::ZERO {
            return Err(EncoderError::UnsupportedSettings {
                details: format!("raw pipe sessions start at zero, not {}", at),
            });
        }
        self.session_started = true;
        Ok(())
    }

    fn request_media_data_when_ready(&mut self, signal: ReadySignal) {
        if self.finished {
            return;
        }
        let ready = self.is_ready_for_more_media_data();
        *self.shared.signal.lock().unwrap_or_else(PoisonError::into_inner) = Some(signal.clone());
        if ready {
            signal.notify_ready();
        }
    }

    fn is_ready_for_more_media_data(&self) -> bool {
        !self.finished && !self.shared.failed.load(Ordering::SeqCst) && self.pool.available() > 0
    }

    fn append(&mut self, buffer: PixelBuffer, presentation_time: MediaTime) -> Result<(), EncoderError> {
        if self.finished {
            return self.reject(buffer, EncoderError::AlreadyFinished);
        }
        if !self.session_started {
            return self.reject(buffer, EncoderError::SessionNotStarted);
        }
        if let Some(error) = self.shared.last_error() {
            self.pool.release(buffer);
            return Err(error);
        }
        if let Err(error) = self.guard.check(&buffer, presentation_time) {
            return self.reject(buffer, error);
        }

        let Some(frames) = self.frames.as_ref() else {
            return self.reject(buffer, EncoderError::AlreadyFinished);
        };
        match frames.try_send(buffer) {
            Ok(()) => {
                self.guard.record(presentation_time);
                Ok(())
            }
            Err(TrySendError::Full(buffer)) => {
                self.pool.release(buffer);
                Err(EncoderError::NotReady)
            }
            Err(TrySendError::Disconnected(buffer)) => {
                let error = self.shared.last_error().unwrap_or(EncoderError::PipeBroken {
                    reason: "pipe thread exited".to_string(),
                });
                self.reject(buffer, error)
            }
        }
    }

    fn last_error(&self) -> Option<EncoderError> {
        self.shared.last_error()
    }

    fn mark_as_finished(&mut self) {
        if !self.finished {
            debug!("ffmpeg input finished after {} frames", self.guard.appended());
            self.close_input();
        }
    }

    fn finish_writing(mut self: Box<Self>) -> Result<(), EncoderError> {
        self.close_input();

        let piped = match self.pipe_thread.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(EncoderError::PipeBroken {
                reason: "pipe thread panicked".to_string(),
            }),
            None => Ok(()),
        };

        let Some(child) = self.child.take() else {
            return piped;
        };
        let output = child.wait_with_output().map_err(|e| EncoderError::ExitFailure {
            status: "unknown".to_string(),
            stderr: format!("failed to wait for ffmpeg: {}", e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncoderError::ExitFailure {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        piped?;

        info!(
            "ffmpeg finished {:?} ({} frames)",
            self.config.output_path,
            self.guard.appended()
        );
        Ok(())
    }

    fn cancel_writing(mut self: Box<Self>) {
        self.close_input();
        if let Some(mut child) = self.child.take() {
            debug!("Cancelling ffmpeg writer for {:?}", self.config.output_path);
            let _ = child.kill();
            let _ = child.wait();
        }
        // With ffmpeg gone the pipe thread fails its next write and exits.
        if let Some(handle) = self.pipe_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("ffmpeg writer dropped before finishing; killing encoder");
            self.frames.take();
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Body of the pipe thread: write frames in order until the sender closes
fn pipe_frames(
    mut stdin: ChildStdin,
    frames: Receiver<PixelBuffer>,
    pool: PixelBufferPool,
    shared: Arc<PipeShared>,
) -> Result<(), EncoderError> {
    for buffer in frames.iter() {
        let written = write_frame(&mut stdin, &buffer);
        pool.release(buffer);

        if let Err(e) = written {
            let error = EncoderError::PipeBroken {
                reason: e.to_string(),
            };
            shared.fail(error.clone());
            return Err(error);
        }
        shared.notify_ready();
    }

    stdin.flush().map_err(|e| EncoderError::PipeBroken {
        reason: e.to_string(),
    })
}

fn write_frame<W: Write>(out: &mut W, buffer: &PixelBuffer) -> std::io::Result<()> {
    let visible = buffer.width() as usize * buffer.format().bytes_per_pixel();
    if buffer.bytes_per_row() == visible {
        return out.write_all(&buffer.data()[..visible * buffer.height() as usize]);
    }
    for y in 0..buffer.height() {
        out.write_all(buffer.row(y))?;
    }
    Ok(())
}
