use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use tracing::{debug, info};

use crate::encoder::{open_writable, AppendGuard, FrameSink, ReadySignal, WriterConfig};
use crate::error::EncoderError;
use crate::video::{MediaTime, PixelBuffer, PixelBufferPool, PixelFormat};

/// NeuQuant sampling factor: 1 is best quality, 30 fastest.
const QUANTIZER_SPEED: i32 = 10;

/// GIF frame delays are stored in hundredths of a second.
const CENTIS_PER_SEC: u64 = 100;

/// Animated GIF writer.
///
/// Appends are encoded synchronously, so the sink is ready whenever it has
/// not failed or finished. Each buffer goes back to the pool before
/// `append` returns, and every accepted frame re-signals readiness.
pub struct GifSink {
    config: WriterConfig,
    pool: PixelBufferPool,
    encoder: Option<GifEncoder<BufWriter<File>>>,
    guard: AppendGuard,
    signal: Option<ReadySignal>,
    last_error: Option<EncoderError>,
    session_started: bool,
    finished: bool,
}

impl GifSink {
    pub fn start(config: WriterConfig) -> Result<Self, EncoderError> {
        let size = config.frame_size;
        if size.is_empty() || size.width > u16::MAX as u32 || size.height > u16::MAX as u32 {
            return Err(EncoderError::UnsupportedSettings {
                details: format!("GIF frames must be 1..=65535 pixels per side, got {}x{}", size.width, size.height),
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

        frame_delay(config.frame_duration, 0)?;
        let file = open_writable(&config.output_path)?;

        let quality = config.codec.quality.min(100) as i32;
        let speed = (QUANTIZER_SPEED * (101 - quality) / 50).clamp(1, 30);
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), speed);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| EncoderError::WriteFailed {
                reason: e.to_string(),
            })?;

        info!(
            "GIF writer started: {}x{}, {} per frame -> {:?}",
            size.width, size.height, config.frame_duration, config.output_path
        );

        Ok(Self {
            pool: PixelBufferPool::new(size, PixelFormat::Argb32, config.pool_capacity),
            guard: AppendGuard::new(size, config.frame_duration),
            config,
            encoder: Some(encoder),
            signal: None,
            last_error: None,
            session_started: false,
            finished: false,
        })
    }

    fn reject(&mut self, buffer: PixelBuffer, error: EncoderError) -> Result<(), EncoderError> {
        self.pool.release(buffer);
        self.last_error = Some(error.clone());
        Err(error)
    }
}

/// Delay of frame `index` in whole centiseconds.
///
/// Both ends of the frame are rounded on the exact grid, so rounding never
/// accumulates and the delays sum to the rounded total duration.
fn frame_delay(frame_duration: MediaTime, index: u64) -> Result<Delay, EncoderError> {
    let too_long = || EncoderError::UnsupportedSettings {
        details: format!("frame duration {} is too long for GIF", frame_duration),
    };
    let start = frame_duration.checked_mul(index).ok_or_else(too_long)?;
    let end = frame_duration
        .checked_mul(index + 1)
        .ok_or_else(too_long)?;

    let centis = end.round_to_units(CENTIS_PER_SEC) - start.round_to_units(CENTIS_PER_SEC);
    let centis = u16::try_from(centis).map_err(|_| too_long())?;
    Ok(Delay::from_numer_denom_ms(u32::from(centis) * 10, 1))
}

impl FrameSink for GifSink {
    fn pixel_buffer_pool(&self) -> &PixelBufferPool {
        &self.pool
    }

    fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    fn start_session(&mut self, at: MediaTime) -> Result<(), EncoderError> {
        if at != MediaTime::ZERO {
            return Err(EncoderError::UnsupportedSettings {
                details: format!("GIF sessions start at zero, not {}", at),
            });
        }
        self.session_started = true;
        Ok(())
    }

    fn request_media_data_when_ready(&mut self, signal: ReadySignal) {
        if self.finished {
            return;
        }
        if self.is_ready_for_more_media_data() {
            signal.notify_ready();
        }
        self.signal = Some(signal);
    }

    fn is_ready_for_more_media_data(&self) -> bool {
        !self.finished && self.last_error.is_none() && self.pool.available() > 0
    }

    fn append(&mut self, buffer: PixelBuffer, presentation_time: MediaTime) -> Result<(), EncoderError> {
        if self.finished {
            return self.reject(buffer, EncoderError::AlreadyFinished);
        }
        if !self.session_started {
            return self.reject(buffer, EncoderError::SessionNotStarted);
        }
        if let Some(error) = self.last_error.clone() {
            self.pool.release(buffer);
            return Err(error);
        }
        if let Err(error) = self.guard.check(&buffer, presentation_time) {
            return self.reject(buffer, error);
        }

        let delay = match frame_delay(self.config.frame_duration, self.guard.appended()) {
            Ok(delay) => delay,
            Err(error) => return self.reject(buffer, error),
        };
        let rgba = buffer.to_rgba_image();
        self.pool.release(buffer);

        let Some(encoder) = self.encoder.as_mut() else {
            let error = EncoderError::AlreadyFinished;
            self.last_error = Some(error.clone());
            return Err(error);
        };
        if let Err(e) = encoder.encode_frame(Frame::from_parts(rgba, 0, 0, delay)) {
            let error = EncoderError::WriteFailed {
                reason: e.to_string(),
            };
            self.last_error = Some(error.clone());
            return Err(error);
        }

        self.guard.record(presentation_time);
        if let Some(signal) = self.signal.as_ref() {
            signal.notify_ready();
        }
        Ok(())
    }

    fn last_error(&self) -> Option<EncoderError> {
        self.last_error.clone()
    }

    fn mark_as_finished(&mut self) {
        if !self.finished {
            debug!("GIF input finished after {} frames", self.guard.appended());
        }
        self.finished = true;
        self.signal = None;
    }

    fn finish_writing(mut self: Box<Self>) -> Result<(), EncoderError> {
        self.mark_as_finished();

        // The trailer is written when the encoder is dropped.
        drop(self.encoder.take());

        let len = std::fs::metadata(&self.config.output_path)
            .map(|m| m.len())
            .map_err(|e| EncoderError::WriteFailed {
                reason: e.to_string(),
            })?;
        if len == 0 {
            return Err(EncoderError::WriteFailed {
                reason: "GIF output is empty".to_string(),
            });
        }

        info!(
            "GIF finished {:?} ({} frames, {} bytes)",
            self.config.output_path,
            self.guard.appended(),
            len
        );
        Ok(())
    }

    fn cancel_writing(mut self: Box<Self>) {
        self.mark_as_finished();
        drop(self.encoder.take());
        debug!("GIF writer for {:?} cancelled", self.config.output_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{readiness_channel, Codec, CodecSettings, EncoderEvent};
    use crate::video::FrameSize;
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;
    use tempfile::tempdir;

    fn config(path: &Path) -> WriterConfig {
        WriterConfig {
            output_path: path.to_path_buf(),
            frame_size: FrameSize::new(8, 6),
            codec: CodecSettings {
                codec: Codec::Gif,
                quality: 80,
            },
            frame_duration: MediaTime::new(1, 2),
            pool_capacity: 2,
        }
    }

    #[test]
    fn test_writes_every_frame_with_its_delay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.gif");
        let mut sink = GifSink::start(config(&path)).unwrap();
        sink.start_session(MediaTime::ZERO).unwrap();

        for i in 0..3 {
            let mut buffer = sink.pixel_buffer_pool().acquire().unwrap();
            buffer.data_mut().fill(255);
            sink.append(buffer, MediaTime::new(i, 2)).unwrap();
        }
        assert_eq!(sink.pixel_buffer_pool().outstanding(), 0);

        sink.mark_as_finished();
        Box::new(sink).finish_writing().unwrap();

        let frames = GifDecoder::new(File::open(&path).unwrap())
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].delay().numer_denom_ms(), (500, 1));
    }

    #[test]
    fn test_delays_add_up_to_the_full_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thirds.gif");
        let mut config = config(&path);
        config.frame_duration = MediaTime::new(1, 3);
        let mut sink = GifSink::start(config).unwrap();
        sink.start_session(MediaTime::ZERO).unwrap();

        for i in 0..30 {
            let buffer = sink.pixel_buffer_pool().acquire().unwrap();
            sink.append(buffer, MediaTime::new(i, 3)).unwrap();
        }
        Box::new(sink).finish_writing().unwrap();

        let frames = GifDecoder::new(File::open(&path).unwrap())
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        let total_ms: u32 = frames
            .iter()
            .map(|f| {
                let (numer, denom) = f.delay().numer_denom_ms();
                numer / denom
            })
            .sum();
        assert_eq!(frames.len(), 30);
        assert_eq!(total_ms, 10_000);
    }

    #[test]
    fn test_delay_rounds_each_frame_boundary() {
        let third = MediaTime::new(1, 3);
        let delays: Vec<_> = (0..3)
            .map(|i| frame_delay(third, i).unwrap().numer_denom_ms())
            .collect();
        assert_eq!(delays, vec![(330, 1), (340, 1), (330, 1)]);

        assert!(frame_delay(MediaTime::from_secs(1000), 0).is_err());
    }

    #[test]
    fn test_signals_readiness_once_registered() {
        let dir = tempdir().unwrap();
        let mut sink = GifSink::start(config(&dir.path().join("a.gif"))).unwrap();
        let (signal, events) = readiness_channel();

        sink.request_media_data_when_ready(signal);
        assert_eq!(events.try_recv().unwrap(), EncoderEvent::ReadyForMoreMediaData);

        sink.mark_as_finished();
        assert!(!sink.is_ready_for_more_media_data());
    }

    #[test]
    fn test_append_before_session_fails() {
        let dir = tempdir().unwrap();
        let mut sink = GifSink::start(config(&dir.path().join("b.gif"))).unwrap();
        let buffer = sink.pixel_buffer_pool().acquire().unwrap();

        assert_eq!(
            sink.append(buffer, MediaTime::ZERO).unwrap_err(),
            EncoderError::SessionNotStarted
        );
        assert_eq!(sink.pixel_buffer_pool().outstanding(), 0);
        assert_eq!(sink.last_error(), Some(EncoderError::SessionNotStarted));
    }

    #[test]
    fn test_unwritable_path_fails_to_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("c.gif");

        assert!(matches!(
            GifSink::start(config(&path)).err().unwrap(),
            EncoderError::OutputUnwritable { .. }
        ));
    }
}
