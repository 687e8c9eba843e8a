//! # Frame Module
//!
//! Pixel buffers and the pool they are leased from, the still-to-buffer
//! filler, exact media time and the per-frame timeline.

pub mod loader;
pub mod pool;
pub mod raster;
pub mod time;
pub mod timeline;
pub mod types;

pub use loader::ImageLoader;
pub use pool::PixelBufferPool;
pub use raster::{PixelBufferFiller, ResizeFilter};
pub use time::MediaTime;
pub use timeline::Timeline;
pub use types::{FrameSize, ImageSequence, PixelBuffer, PixelFormat, Progress};
