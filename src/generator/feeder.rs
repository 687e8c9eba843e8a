use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::encoder::{readiness_channel, EncoderEvent, FrameSink};
use crate::error::{EncoderError, GeneratorError, Result};
use crate::video::{ImageSequence, PixelBufferFiller, Progress, Timeline};

/// Default wait for the encoder to ask for more data
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the feeder is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    /// Waiting for the first readiness event
    Idle,
    Feeding,
    /// Every frame accepted; input is closed and the container is finalizing
    Draining,
    Failed,
    Finished,
}

/// Shared flag that stops a run at the next frame boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to do when a still cannot be drawn into its buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameErrorPolicy {
    /// Fail the run
    #[default]
    Abort,
    /// Write a blank frame in its slot and carry on
    Skip,
}

/// Outcome of a completed feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub frames_written: usize,
    /// Indexes of frames written blank under [`FrameErrorPolicy::Skip`]
    pub skipped: Vec<usize>,
}

/// Pushes one run's frames into a [`FrameSink`] as fast as the sink asks
/// for them.
///
/// The feeder owns the sink for the whole run and consumes it on
/// [`finish`](Self::finish), so a sink is finalized exactly once.
pub struct FrameFeeder {
    sink: Box<dyn FrameSink>,
    images: ImageSequence,
    timeline: Timeline,
    queue: VecDeque<usize>,
    filler: PixelBufferFiller,
    policy: FrameErrorPolicy,
    cancel: CancelToken,
    stall_timeout: Duration,
    state: FeederState,
    completed: usize,
    skipped: Vec<usize>,
    error: Option<GeneratorError>,
}

impl FrameFeeder {
    pub fn new(sink: Box<dyn FrameSink>, images: ImageSequence, timeline: Timeline) -> Result<Self> {
        if images.len() != timeline.frame_count() {
            return Err(GeneratorError::invalid_input(format!(
                "{} images for a timeline of {} frames",
                images.len(),
                timeline.frame_count()
            )));
        }

        Ok(Self {
            queue: (0..images.len()).collect(),
            sink,
            images,
            timeline,
            filler: PixelBufferFiller::default(),
            policy: FrameErrorPolicy::default(),
            cancel: CancelToken::new(),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            state: FeederState::Idle,
            completed: 0,
            skipped: Vec::new(),
            error: None,
        })
    }

    pub fn with_filler(mut self, filler: PixelBufferFiller) -> Self {
        self.filler = filler;
        self
    }

    pub fn with_policy(mut self, policy: FrameErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn state(&self) -> FeederState {
        self.state
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.completed, self.timeline.frame_count())
    }

    /// Feed every frame, then finalize the sink. Blocks the calling thread.
    pub fn run(mut self, on_progress: &mut dyn FnMut(Progress)) -> Result<FeedSummary> {
        let (signal, events) = readiness_channel();
        self.sink.request_media_data_when_ready(signal);
        self.drive(&events, on_progress);
        self.finish()
    }

    /// Handle readiness events until every frame is in or the run failed
    pub fn drive(&mut self, events: &Receiver<EncoderEvent>, on_progress: &mut dyn FnMut(Progress)) {
        while matches!(self.state, FeederState::Idle | FeederState::Feeding) {
            if self.cancel.is_cancelled() {
                let cancelled = self.cancelled();
                self.fail(cancelled);
                return;
            }

            match events.recv_timeout(self.stall_timeout) {
                Ok(EncoderEvent::ReadyForMoreMediaData) => {
                    if self.state == FeederState::Idle {
                        debug!("Encoder ready, feeding {} frames", self.queue.len());
                        self.state = FeederState::Feeding;
                    }
                    self.on_ready(on_progress);
                }
                Ok(EncoderEvent::Failed(cause)) => {
                    let frame = self.completed;
                    self.fail(GeneratorError::AppendFailed { frame, cause });
                }
                Err(RecvTimeoutError::Timeout) => {
                    let progress = self.progress();
                    self.fail(GeneratorError::Stalled {
                        waited: self.stall_timeout,
                        completed: progress.completed,
                        total: progress.total,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let frame = self.completed;
                    let cause = self.sink.last_error().unwrap_or(EncoderError::SignalLost);
                    self.fail(GeneratorError::AppendFailed { frame, cause });
                }
            }
        }
    }

    fn on_ready(&mut self, on_progress: &mut dyn FnMut(Progress)) {
        while self.state == FeederState::Feeding && self.sink.is_ready_for_more_media_data() {
            if self.cancel.is_cancelled() {
                let cancelled = self.cancelled();
                self.fail(cancelled);
                return;
            }
            let Some(index) = self.queue.pop_front() else {
                break;
            };

            if let Err(error) = self.feed_frame(index) {
                self.fail(error);
                return;
            }

            self.completed += 1;
            on_progress(self.progress());
        }

        if self.state == FeederState::Feeding && self.queue.is_empty() {
            debug!("All {} frames appended, closing input", self.completed);
            self.state = FeederState::Draining;
            self.sink.mark_as_finished();
        }
    }

    fn feed_frame(&mut self, index: usize) -> Result<()> {
        let pts = self.timeline.timestamp(index).ok_or_else(|| GeneratorError::Worker {
            reason: format!("frame {} is outside the timeline", index),
        })?;

        let pool = self.sink.pixel_buffer_pool().clone();
        let mut buffer = pool.acquire().map_err(|e| GeneratorError::Rasterization {
            frame: index,
            reason: e.to_string(),
            cause: self.sink.last_error(),
        })?;

        if let Err(e) = self.filler.fill(&self.images[index], &mut buffer) {
            match self.policy {
                FrameErrorPolicy::Abort => {
                    pool.release(buffer);
                    return Err(GeneratorError::Rasterization {
                        frame: index,
                        reason: e.to_string(),
                        cause: self.sink.last_error(),
                    });
                }
                FrameErrorPolicy::Skip => {
                    warn!("Frame {} written blank: {}", index, e);
                    buffer.clear();
                    self.skipped.push(index);
                }
            }
        }

        self.sink
            .append(buffer, pts)
            .map_err(|cause| GeneratorError::AppendFailed { frame: index, cause })?;

        debug!("Appended frame {} at {}", index, pts);
        Ok(())
    }

    fn cancelled(&self) -> GeneratorError {
        let progress = self.progress();
        GeneratorError::Cancelled {
            completed: progress.completed,
            total: progress.total,
        }
    }

    fn fail(&mut self, error: GeneratorError) {
        warn!("Frame feed failed: {}", error);
        self.state = FeederState::Failed;
        self.sink.mark_as_finished();
        self.error = Some(error);
    }

    /// Finalize the sink and report the run's single outcome
    pub fn finish(self) -> Result<FeedSummary> {
        let FrameFeeder {
            sink,
            state,
            completed,
            skipped,
            error,
            ..
        } = self;

        let outcome = match (state, error) {
            (FeederState::Draining, None) => match sink.finish_writing() {
                Ok(()) => Ok(FeedSummary {
                    frames_written: completed,
                    skipped,
                }),
                Err(cause) => Err(GeneratorError::FinalizeFailed { cause }),
            },
            (_, Some(error)) => {
                sink.cancel_writing();
                Err(error)
            }
            (state, None) => {
                sink.cancel_writing();
                Err(GeneratorError::Worker {
                    reason: format!("feed stopped in state {:?}", state),
                })
            }
        };

        match &outcome {
            Ok(summary) => info!("Feed finished: {} frames", summary.frames_written),
            Err(e) => debug!("Feed finished with {:?}: {}", e.kind(), e),
        }
        debug!("Feeder state {:?} -> {:?}", state, FeederState::Finished);
        outcome
    }
}
