use std::ops::Index;
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Output frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_even(&self) -> bool {
        self.width % 2 == 0 && self.height % 2 == 0
    }
}

/// Raw pixel layouts a buffer can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit A, R, G, B with premultiplied alpha
    Argb32,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Argb32 => 4,
        }
    }

    /// Name of the matching `-pix_fmt` in ffmpeg
    pub const fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Argb32 => "argb",
        }
    }
}

/// A fixed-size block of raw pixels leased from a
/// [`PixelBufferPool`](crate::video::PixelBufferPool).
#[derive(Debug)]
pub struct PixelBuffer {
    size: FrameSize,
    format: PixelFormat,
    bytes_per_row: usize,
    data: Vec<u8>,
    pool_id: u64,
}

impl PixelBuffer {
    pub(crate) fn from_parts(
        size: FrameSize,
        format: PixelFormat,
        bytes_per_row: usize,
        data: Vec<u8>,
        pool_id: u64,
    ) -> Self {
        Self {
            size,
            format,
            bytes_per_row,
            data,
            pool_id,
        }
    }

    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Visible bytes of row `y`, without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.bytes_per_row;
        let visible = self.size.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + visible]
    }

    /// Get the ARGB pixel at the given coordinates
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = x as usize * self.format.bytes_per_pixel();
        let row = self.row(y);
        [row[offset], row[offset + 1], row[offset + 2], row[offset + 3]]
    }

    /// Reset every byte to zero (transparent black)
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Copy out as straight-alpha RGBA
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.size.width, self.size.height, |x, y| {
            let [a, r, g, b] = self.pixel(x, y);
            image::Rgba([unpremultiply(r, a), unpremultiply(g, a), unpremultiply(b, a), a])
        })
    }
}

fn unpremultiply(channel: u8, alpha: u8) -> u8 {
    match alpha {
        0 => 0,
        255 => channel,
        a => ((channel as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8,
    }
}

/// Ordered, read-only stills shared between the caller and a run
#[derive(Debug, Clone)]
pub struct ImageSequence {
    images: Arc<[DynamicImage]>,
}

impl ImageSequence {
    pub fn new(images: Vec<DynamicImage>) -> Self {
        Self {
            images: images.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DynamicImage> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicImage> {
        self.images.iter()
    }
}

impl From<Vec<DynamicImage>> for ImageSequence {
    fn from(images: Vec<DynamicImage>) -> Self {
        Self::new(images)
    }
}

impl FromIterator<DynamicImage> for ImageSequence {
    fn from_iter<I: IntoIterator<Item = DynamicImage>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Index<usize> for ImageSequence {
    type Output = DynamicImage;

    fn index(&self, index: usize) -> &Self::Output {
        &self.images[index]
    }
}

/// Frames appended so far out of the run's fixed total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_skips_stride_padding() {
        let size = FrameSize::new(2, 2);
        let mut data = vec![0u8; 2 * 12];
        data[12..16].copy_from_slice(&[255, 1, 2, 3]);
        let buffer = PixelBuffer::from_parts(size, PixelFormat::Argb32, 12, data, 0);

        assert_eq!(buffer.row(1).len(), 8);
        assert_eq!(buffer.pixel(0, 1), [255, 1, 2, 3]);
    }

    #[test]
    fn test_rgba_conversion_unpremultiplies() {
        let size = FrameSize::new(1, 1);
        let buffer = PixelBuffer::from_parts(size, PixelFormat::Argb32, 4, vec![128, 64, 0, 128], 0);

        let rgba = buffer.to_rgba_image();
        assert_eq!(rgba.get_pixel(0, 0).0, [128, 0, 255, 128]);
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(Progress::new(1, 4).fraction(), 0.25);
        assert_eq!(Progress::new(0, 0).fraction(), 0.0);
    }

    #[test]
    fn test_frame_size_parity() {
        assert!(FrameSize::new(1280, 720).is_even());
        assert!(!FrameSize::new(1279, 720).is_even());
        assert!(FrameSize::new(0, 720).is_empty());
    }
}
