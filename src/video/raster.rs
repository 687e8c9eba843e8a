use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use crate::error::RasterError;
use crate::video::types::PixelBuffer;

/// Resampling filter used when stretching a still to the output size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Draws a still into a pixel buffer, stretched to fill the whole frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelBufferFiller {
    filter: ResizeFilter,
}

impl PixelBufferFiller {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    /// Overwrite every visible pixel of `buffer` with `image`.
    ///
    /// The aspect ratio is not preserved. Output is premultiplied ARGB.
    pub fn fill(&self, image: &DynamicImage, buffer: &mut PixelBuffer) -> Result<(), RasterError> {
        let (src_width, src_height) = image.dimensions();
        if src_width == 0 || src_height == 0 {
            return Err(RasterError::EmptySource {
                width: src_width,
                height: src_height,
            });
        }

        let (width, height) = (buffer.width(), buffer.height());
        let bytes_per_pixel = buffer.format().bytes_per_pixel();
        let bytes_per_row = buffer.bytes_per_row();
        let visible_row = width as usize * bytes_per_pixel;
        let needed = bytes_per_row * height.saturating_sub(1) as usize + visible_row;
        if bytes_per_row < visible_row || buffer.data().len() < needed {
            return Err(RasterError::BufferGeometry {
                width,
                height,
                bytes_per_row,
                len: buffer.data().len(),
            });
        }

        let scaled = if (src_width, src_height) == (width, height) {
            image.to_rgba8()
        } else {
            imageops::resize(image, width, height, self.filter.into())
        };

        let data = buffer.data_mut();
        for (y, src_row) in scaled.rows().enumerate() {
            let start = y * bytes_per_row;
            let dst_row = &mut data[start..start + visible_row];
            for (dst, px) in dst_row.chunks_exact_mut(bytes_per_pixel).zip(src_row) {
                let [r, g, b, a] = px.0;
                dst[0] = a;
                dst[1] = premultiply(r, a);
                dst[2] = premultiply(g, a);
                dst[3] = premultiply(b, a);
            }
        }

        Ok(())
    }
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((channel as u32 * alpha as u32 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{FrameSize, PixelBufferPool, PixelFormat};
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    fn buffer(width: u32, height: u32) -> PixelBuffer {
        PixelBufferPool::new(FrameSize::new(width, height), PixelFormat::Argb32, 1)
            .acquire()
            .unwrap()
    }

    #[test]
    fn test_small_image_is_stretched_over_whole_frame() {
        let filler = PixelBufferFiller::new(ResizeFilter::Nearest);
        let image = solid(3, 1, [10, 20, 30, 255]);
        let mut target = buffer(8, 6);

        filler.fill(&image, &mut target).unwrap();

        for y in 0..6 {
            for x in 0..8 {
                assert_eq!(target.pixel(x, y), [255, 10, 20, 30]);
            }
        }
    }

    #[test]
    fn test_channel_order_is_argb_premultiplied() {
        let filler = PixelBufferFiller::default();
        let image = solid(2, 2, [255, 0, 100, 128]);
        let mut target = buffer(2, 2);

        filler.fill(&image, &mut target).unwrap();

        assert_eq!(target.pixel(1, 1), [128, 128, 0, 50]);
    }

    #[test]
    fn test_source_is_left_untouched() {
        let filler = PixelBufferFiller::new(ResizeFilter::Triangle);
        let image = solid(5, 5, [1, 2, 3, 255]);
        let before = image.to_rgba8().into_raw();
        let mut target = buffer(2, 2);

        filler.fill(&image, &mut target).unwrap();

        assert_eq!(image.to_rgba8().into_raw(), before);
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let filler = PixelBufferFiller::default();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(0, 4));
        let mut target = buffer(2, 2);

        let err = filler.fill(&image, &mut target).unwrap_err();
        assert_eq!(err, RasterError::EmptySource { width: 0, height: 4 });
    }

    #[test]
    fn test_split_horizontal_halves_keep_their_side() {
        let filler = PixelBufferFiller::new(ResizeFilter::Nearest);
        let mut source = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255]));
        source.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let mut target = buffer(4, 2);

        filler.fill(&DynamicImage::ImageRgba8(source), &mut target).unwrap();

        assert_eq!(target.pixel(0, 1), [255, 255, 0, 0]);
        assert_eq!(target.pixel(3, 0), [255, 0, 0, 255]);
    }
}
