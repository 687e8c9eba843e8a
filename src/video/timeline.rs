use tracing::debug;

use crate::error::{GeneratorError, Result};
use crate::video::MediaTime;

/// Presentation timestamps for a run of equal-duration frames.
///
/// Frame `i` starts at `i * total / frame_count`, computed exactly on a
/// rational timescale so the sequence never drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    frame_count: usize,
    total: MediaTime,
    frame_duration: MediaTime,
}

impl Timeline {
    pub fn new(frame_count: usize, total: MediaTime) -> Result<Self> {
        if frame_count == 0 {
            return Err(GeneratorError::invalid_input(
                "a timeline needs at least one frame",
            ));
        }
        if !total.is_positive() {
            return Err(GeneratorError::invalid_input(format!(
                "total duration must be positive, got {}",
                total
            )));
        }

        let frame_duration = total.reduced().checked_div(frame_count as u64).ok_or_else(|| {
            GeneratorError::invalid_input(format!(
                "{} frames over {} cannot be timed exactly",
                frame_count, total
            ))
        })?;

        // The last timestamp must be representable too.
        frame_duration
            .checked_mul(frame_count as u64)
            .ok_or_else(|| GeneratorError::invalid_input("timeline overflows media time"))?;

        debug!(
            "Timeline: {} frames over {} ({} per frame)",
            frame_count, total, frame_duration
        );

        Ok(Self {
            frame_count,
            total,
            frame_duration,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn total_duration(&self) -> MediaTime {
        self.total
    }

    pub fn frame_duration(&self) -> MediaTime {
        self.frame_duration
    }

    /// Presentation timestamp of frame `index`, `None` past the end
    pub fn timestamp(&self, index: usize) -> Option<MediaTime> {
        if index >= self.frame_count {
            return None;
        }
        self.frame_duration.checked_mul(index as u64)
    }

    /// How long frame `index` stays on screen
    pub fn display_duration(&self, index: usize) -> Option<MediaTime> {
        let start = self.timestamp(index)?;
        let end = self.timestamp(index + 1).unwrap_or(self.total);
        end.checked_sub(start)
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaTime> + '_ {
        (0..self.frame_count).filter_map(move |i| self.timestamp(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn secs(values: &[i64]) -> Vec<MediaTime> {
        values.iter().map(|&v| MediaTime::new(v, 1)).collect()
    }

    #[test]
    fn test_four_frames_over_twenty_seconds() {
        let timeline = Timeline::new(4, MediaTime::from_secs(20)).unwrap();
        let stamps: Vec<_> = timeline.iter().collect();
        assert_eq!(stamps, secs(&[0, 5, 10, 15]));
    }

    #[test]
    fn test_two_frames_over_twenty_seconds() {
        let timeline = Timeline::new(2, MediaTime::from_secs(20)).unwrap();
        let stamps: Vec<_> = timeline.iter().collect();
        assert_eq!(stamps, secs(&[0, 10]));
        assert_eq!(timeline.display_duration(1), Some(MediaTime::from_secs(10)));
    }

    #[test]
    fn test_single_frame_spans_everything() {
        let timeline = Timeline::new(1, MediaTime::from_secs(7)).unwrap();
        assert_eq!(timeline.timestamp(0), Some(MediaTime::ZERO));
        assert_eq!(timeline.timestamp(1), None);
        assert_eq!(timeline.display_duration(0), Some(MediaTime::from_secs(7)));
    }

    #[test]
    fn test_thirds_are_exact() {
        let timeline = Timeline::new(3, MediaTime::from_secs(10)).unwrap();
        assert_eq!(timeline.timestamp(1), Some(MediaTime::new(10, 3)));
        assert_eq!(timeline.timestamp(2), Some(MediaTime::new(20, 3)));

        let last = timeline.timestamp(2).unwrap();
        let tail = MediaTime::from_secs(10).checked_sub(last).unwrap();
        assert_eq!(tail, timeline.frame_duration());
    }

    #[test]
    fn test_thousands_of_frames_over_fractional_duration() {
        let total = MediaTime::from_secs_f64(1.234567).unwrap();
        let timeline = Timeline::new(5000, total).unwrap();

        let stamps: Vec<_> = timeline.iter().collect();
        assert_eq!(stamps.len(), 5000);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(timeline.display_duration(4999), Some(timeline.frame_duration()));
        assert_eq!(timeline.frame_duration().checked_mul(5000), Some(total));
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(Timeline::new(0, MediaTime::from_secs(5)).is_err());
        assert!(Timeline::new(3, MediaTime::ZERO).is_err());
        assert!(Timeline::new(3, MediaTime::new(-1, 1)).is_err());
    }

    #[test]
    fn test_random_timelines_are_monotonic() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let frames = rng.gen_range(1..10_000usize);
            let total = MediaTime::from_secs_f64(rng.gen_range(0.001..600.0)).unwrap();
            let timeline = Timeline::new(frames, total).unwrap();

            let stamps: Vec<_> = timeline.iter().collect();
            assert_eq!(stamps.len(), frames);
            assert_eq!(stamps[0], MediaTime::ZERO);
            assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            assert!(*stamps.last().unwrap() < total);
        }
    }
}
