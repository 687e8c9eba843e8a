//! # Video Generator
//!
//! Turn an ordered set of still images into a video file, with each image
//! shown for an equal share of a requested total duration.
//!
//! Frames are produced on demand: the encoder announces when it can take
//! more data, and a dedicated worker rasterizes the next still into a pooled
//! pixel buffer and appends it at its exact presentation time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use video_generator::{
//!     config::Config,
//!     video::{ImageLoader, MediaTime},
//!     WriterSession,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.output.directory = Some("out".into());
//!
//! let images = ImageLoader::new(4)?.load_directory("stills/")?;
//! let video = WriterSession::new(config)?
//!     .generate(images, MediaTime::from_secs(20), |p| {
//!         println!("{}/{}", p.completed, p.total);
//!     })
//!     .await?;
//!
//! println!("wrote {:?}", video.path);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - media time, timeline, pixel buffers and their pool, image loading
//! - [`encoder`] - the [`FrameSink`](encoder::FrameSink) protocol and its back-ends
//! - [`generator`] - the frame feeder and the writer session
//! - [`config`] - configuration management
//!
//! ## Custom encoders
//!
//! Any type implementing [`FrameSink`](encoder::FrameSink) can be plugged in
//! through [`WriterSession::with_writer_factory`].

pub mod config;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{ErrorKind, GeneratorError, Result},
    generator::{CancelToken, GeneratedVideo, WriterSession},
    video::{ImageSequence, MediaTime, Progress},
};
