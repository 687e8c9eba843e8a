//! # Generator Module
//!
//! Drives one run from an ordered image sequence to a finished file:
//!
//! - [`WriterSession`] - validates input, resolves the output location,
//!   opens the encoder and reports the run's single outcome
//! - [`FrameFeeder`] - the blocking worker that pushes frames into the
//!   encoder whenever it asks for more

pub mod feeder;
pub mod session;

pub use feeder::{CancelToken, FeedSummary, FeederState, FrameErrorPolicy, FrameFeeder};
pub use session::{GeneratedVideo, WriterSession};
