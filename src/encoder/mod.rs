//! # Encoder Module
//!
//! The [`FrameSink`] trait is the pull-based writing protocol the frame
//! feeder drives: the sink announces readiness through a [`ReadySignal`],
//! accepts one pixel buffer per append and finalizes the container at the
//! end. Two back-ends ship with the crate:
//!
//! - [`FfmpegSink`] - H.264 in MP4 through the system `ffmpeg` binary
//! - [`GifSink`] - animated GIF written in pure Rust

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::EncoderError;
use crate::video::{FrameSize, MediaTime, PixelBuffer, PixelBufferPool};

pub mod ffmpeg;
pub mod gif;

pub use ffmpeg::FfmpegSink;
pub use gif::GifSink;

/// Output codec and container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 video in an MP4 container
    H264,
    /// Animated GIF
    Gif,
}

impl Codec {
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::H264 => "mp4",
            Codec::Gif => "gif",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Gif => "gif",
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "mp4" => Ok(Codec::H264),
            "gif" => Ok(Codec::Gif),
            other => Err(format!("unknown codec '{}' (expected h264 or gif)", other)),
        }
    }
}

/// Codec choice plus its tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSettings {
    pub codec: Codec,
    /// 0-100, higher is better
    pub quality: u8,
}

impl CodecSettings {
    /// x264 constant rate factor for the quality setting
    pub fn crf(&self) -> u8 {
        (51 - ((self.quality.min(100) as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }
}

/// Everything a back-end needs to open an output file
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub output_path: PathBuf,
    pub frame_size: FrameSize,
    pub codec: CodecSettings,
    /// Spacing between consecutive presentation timestamps
    pub frame_duration: MediaTime,
    pub pool_capacity: usize,
}

/// Messages a sink sends to whoever is feeding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    ReadyForMoreMediaData,
    /// The sink failed outside of an `append` call
    Failed(EncoderError),
}

/// Sending half of the readiness channel, handed to a sink once
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Sender<EncoderEvent>,
}

impl ReadySignal {
    /// Returns false once the feeder has gone away
    pub fn notify_ready(&self) -> bool {
        self.tx.send(EncoderEvent::ReadyForMoreMediaData).is_ok()
    }

    pub fn notify_failed(&self, error: EncoderError) -> bool {
        self.tx.send(EncoderEvent::Failed(error)).is_ok()
    }
}

pub fn readiness_channel() -> (ReadySignal, Receiver<EncoderEvent>) {
    let (tx, rx) = unbounded();
    (ReadySignal { tx }, rx)
}

/// Pull-based frame writer.
///
/// A sink must never signal readiness after `mark_as_finished`, and it
/// returns every appended buffer to its pool once the buffer is consumed,
/// whether or not the append succeeded.
pub trait FrameSink: Send {
    /// Pool of buffers matching this sink's input format
    fn pixel_buffer_pool(&self) -> &PixelBufferPool;

    fn output_path(&self) -> &Path;

    /// Start the session clock; the first frame must be stamped `at`
    fn start_session(&mut self, at: MediaTime) -> Result<(), EncoderError>;

    /// Register the readiness signal. Signals immediately if already ready.
    fn request_media_data_when_ready(&mut self, signal: ReadySignal);

    fn is_ready_for_more_media_data(&self) -> bool;

    fn append(&mut self, buffer: PixelBuffer, presentation_time: MediaTime) -> Result<(), EncoderError>;

    /// Most recent error the sink hit, if any
    fn last_error(&self) -> Option<EncoderError>;

    /// No more frames will be appended
    fn mark_as_finished(&mut self);

    /// Flush and close the container. Blocks until the file is complete.
    fn finish_writing(self: Box<Self>) -> Result<(), EncoderError>;

    /// Abandon the output without completing the container
    fn cancel_writing(self: Box<Self>);
}

/// Builds a sink for a writer configuration
pub type WriterFactory =
    Box<dyn Fn(&WriterConfig) -> Result<Box<dyn FrameSink>, EncoderError> + Send + Sync>;

/// Open the built-in back-end for `config.codec`
pub fn open_writer(config: &WriterConfig) -> Result<Box<dyn FrameSink>, EncoderError> {
    match config.codec.codec {
        Codec::H264 => Ok(Box::new(FfmpegSink::start(config.clone())?)),
        Codec::Gif => Ok(Box::new(GifSink::start(config.clone())?)),
    }
}

/// Checks shared by the built-in sinks before a frame is accepted
pub(crate) struct AppendGuard {
    frame_size: FrameSize,
    frame_duration: MediaTime,
    previous: Option<MediaTime>,
    appended: u64,
}

impl AppendGuard {
    pub(crate) fn new(frame_size: FrameSize, frame_duration: MediaTime) -> Self {
        Self {
            frame_size,
            frame_duration,
            previous: None,
            appended: 0,
        }
    }

    pub(crate) fn appended(&self) -> u64 {
        self.appended
    }

    /// Validate geometry and timing of the next frame without recording it
    pub(crate) fn check(&self, buffer: &PixelBuffer, pts: MediaTime) -> Result<(), EncoderError> {
        if buffer.size() != self.frame_size {
            return Err(EncoderError::GeometryMismatch {
                width: self.frame_size.width,
                height: self.frame_size.height,
                got_width: buffer.width(),
                got_height: buffer.height(),
            });
        }

        if let Some(previous) = self.previous {
            if pts <= previous {
                return Err(EncoderError::NonMonotonicTimestamp { previous, got: pts });
            }
        }

        // Both sinks write constant-rate streams.
        let expected = self
            .frame_duration
            .checked_mul(self.appended)
            .unwrap_or(MediaTime::ZERO);
        if pts != expected {
            return Err(EncoderError::OffGrid { expected, got: pts });
        }

        Ok(())
    }

    pub(crate) fn record(&mut self, pts: MediaTime) {
        self.previous = Some(pts);
        self.appended += 1;
    }
}

/// Create or truncate the output file to prove it is writable
pub(crate) fn open_writable(path: &Path) -> Result<std::fs::File, EncoderError> {
    std::fs::File::create(path).map_err(|e| EncoderError::OutputUnwritable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
