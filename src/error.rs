use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::video::MediaTime;

/// Stable classification of a failed run.
///
/// Callers match on this instead of on message text; every
/// [`GeneratorError`] maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DirectoryUnavailable,
    WriterStartFailed,
    Rasterization,
    AppendFailed,
    Cancelled,
    InvalidInput,
    Stalled,
    FinalizeFailed,
    Config,
    Internal,
}

/// Main error type for the video generator
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Output directory unavailable: {reason}")]
    DirectoryUnavailable { reason: String },

    #[error("Video writer failed to start: {reason}")]
    WriterStartFailed {
        reason: String,
        #[source]
        cause: Option<EncoderError>,
    },

    #[error("Failed to rasterize frame {frame}: {reason}")]
    Rasterization {
        frame: usize,
        reason: String,
        #[source]
        cause: Option<EncoderError>,
    },

    #[error("Encoder rejected frame {frame}: {cause}")]
    AppendFailed {
        frame: usize,
        #[source]
        cause: EncoderError,
    },

    #[error("Run cancelled after {completed} of {total} frames")]
    Cancelled { completed: usize, total: usize },

    #[error("Invalid input: {details}")]
    InvalidInput { details: String },

    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    #[error("Encoder signalled no readiness for {waited:?} ({completed} of {total} frames written)")]
    Stalled {
        waited: Duration,
        completed: usize,
        total: usize,
    },

    #[error("Failed to finalize output container: {cause}")]
    FinalizeFailed {
        #[source]
        cause: EncoderError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frame worker failed: {reason}")]
    Worker { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by an encoder back-end.
///
/// Kept `Clone` so a back-end can both return an error and remember it as
/// its last error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("encoder program '{program}' was not found on PATH")]
    BinaryMissing { program: String },

    #[error("failed to spawn encoder: {reason}")]
    SpawnFailed { reason: String },

    #[error("unsupported writer settings: {details}")]
    UnsupportedSettings { details: String },

    #[error("cannot write output '{path}': {reason}")]
    OutputUnwritable { path: PathBuf, reason: String },

    #[error("writing session has not been started")]
    SessionNotStarted,

    #[error("input has already been marked as finished")]
    AlreadyFinished,

    #[error("encoder is not ready for more media data")]
    NotReady,

    #[error("presentation time {got} does not follow {previous}")]
    NonMonotonicTimestamp { previous: MediaTime, got: MediaTime },

    #[error("presentation time {got} is off the frame grid (expected {expected})")]
    OffGrid { expected: MediaTime, got: MediaTime },

    #[error("frame is {got_width}x{got_height}, writer expects {width}x{height}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("pipe to encoder broke: {reason}")]
    PipeBroken { reason: String },

    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("encoder exited with {status}: {stderr}")]
    ExitFailure { status: String, stderr: String },

    #[error("encoder stopped signalling readiness")]
    SignalLost,
}

/// Pixel buffer pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pixel buffer pool exhausted ({capacity} buffers in use)")]
    Exhausted { capacity: usize },
}

/// Rasterization errors for a single image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    #[error("source image has no pixels ({width}x{height})")]
    EmptySource { width: u32, height: u32 },

    #[error("buffer of {len} bytes with {bytes_per_row} bytes per row cannot hold {width}x{height} ARGB")]
    BufferGeometry {
        width: u32,
        height: u32,
        bytes_per_row: usize,
        len: usize,
    },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using GeneratorError
pub type Result<T> = std::result::Result<T, GeneratorError>;

impl GeneratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DirectoryUnavailable { .. } => ErrorKind::DirectoryUnavailable,
            Self::WriterStartFailed { .. } => ErrorKind::WriterStartFailed,
            Self::Rasterization { .. } => ErrorKind::Rasterization,
            Self::AppendFailed { .. } => ErrorKind::AppendFailed,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidInput { .. } | Self::ImageLoad { .. } => ErrorKind::InvalidInput,
            Self::Stalled { .. } => ErrorKind::Stalled,
            Self::FinalizeFailed { .. } => ErrorKind::FinalizeFailed,
            Self::Config(_) => ErrorKind::Config,
            Self::Worker { .. } | Self::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_input<S: Into<String>>(details: S) -> Self {
        Self::InvalidInput {
            details: details.into(),
        }
    }

    /// Encoder error underlying this failure, if the encoder reported one
    pub fn encoder_cause(&self) -> Option<&EncoderError> {
        match self {
            Self::WriterStartFailed { cause, .. } | Self::Rasterization { cause, .. } => {
                cause.as_ref()
            }
            Self::AppendFailed { cause, .. } | Self::FinalizeFailed { cause } => Some(cause),
            _ => None,
        }
    }

    /// True for caller-requested stops, which are not defects
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::DirectoryUnavailable { reason } => {
                format!("No writable output directory: {}. Pass --output-dir or set output.directory.", reason)
            }
            Self::WriterStartFailed {
                cause: Some(EncoderError::BinaryMissing { program }),
                ..
            } => {
                format!("'{}' is required for H.264 output. Install it or use the gif codec.", program)
            }
            Self::ImageLoad { path, .. } => {
                format!("Could not load image '{}'. Please check the file exists and is a PNG, JPEG or GIF.", path.display())
            }
            Self::Cancelled { completed, total } => {
                format!("Stopped on request after {} of {} frames.", completed, total)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kinds_are_stable() {
        let err = GeneratorError::invalid_input("no images");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = GeneratorError::Cancelled { completed: 1, total: 3 };
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.is_cancellation());

        let err = GeneratorError::ImageLoad {
            path: PathBuf::from("01.png"),
            reason: "truncated".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_append_failure_exposes_encoder_cause() {
        let err = GeneratorError::AppendFailed {
            frame: 2,
            cause: EncoderError::PipeBroken {
                reason: "broken pipe".to_string(),
            },
        };

        assert_eq!(err.kind(), ErrorKind::AppendFailed);
        assert!(matches!(err.encoder_cause(), Some(EncoderError::PipeBroken { .. })));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("frame 2"));
    }

    #[test]
    fn test_rasterization_without_encoder_context() {
        let err = GeneratorError::Rasterization {
            frame: 1,
            reason: PoolError::Exhausted { capacity: 1 }.to_string(),
            cause: None,
        };

        assert!(err.encoder_cause().is_none());
        assert!(err.source().is_none());
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_missing_ffmpeg_message() {
        let err = GeneratorError::WriterStartFailed {
            reason: "ffmpeg unavailable".to_string(),
            cause: Some(EncoderError::BinaryMissing {
                program: "ffmpeg".to_string(),
            }),
        };

        assert!(err.user_message().contains("gif codec"));
    }
}
