use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use video_generator::video::{FrameSize, PixelBufferFiller, PixelBufferPool, PixelFormat, ResizeFilter};

fn still(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
    }))
}

fn bench_fill_same_size(c: &mut Criterion) {
    let pool = PixelBufferPool::new(FrameSize::new(1280, 720), PixelFormat::Argb32, 1);
    let filler = PixelBufferFiller::new(ResizeFilter::CatmullRom);
    let image = still(1280, 720);

    c.bench_function("fill_720p_no_resize", |b| {
        b.iter(|| {
            let mut buffer = pool.acquire().expect("acquire buffer");
            filler.fill(black_box(&image), &mut buffer).expect("fill");
            pool.release(buffer);
        });
    });
}

fn bench_fill_downscale(c: &mut Criterion) {
    let pool = PixelBufferPool::new(FrameSize::new(1280, 720), PixelFormat::Argb32, 1);
    let image = still(1920, 1080);

    for filter in [ResizeFilter::Nearest, ResizeFilter::Triangle, ResizeFilter::Lanczos3] {
        let filler = PixelBufferFiller::new(filter);
        c.bench_function(&format!("fill_1080p_to_720p_{:?}", filter), |b| {
            b.iter(|| {
                let mut buffer = pool.acquire().expect("acquire buffer");
                filler.fill(black_box(&image), &mut buffer).expect("fill");
                pool.release(buffer);
            });
        });
    }
}

criterion_group!(benches, bench_fill_same_size, bench_fill_downscale);
criterion_main!(benches);
