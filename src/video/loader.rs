use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{GeneratorError, Result};
use crate::video::types::ImageSequence;

/// Loads a directory of stills in file-name order
pub struct ImageLoader {
    pool: rayon::ThreadPool,
}

impl ImageLoader {
    pub fn new(decode_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(decode_threads.max(1))
            .thread_name(|i| format!("image-decode-{}", i))
            .build()
            .map_err(|e| GeneratorError::Worker {
                reason: format!("failed to start decode threads: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Find every supported image directly inside `dir`, sorted by file name
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(GeneratorError::invalid_input(format!(
                "image directory not found: {}",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && Self::is_supported(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        debug!("Found {} images in {:?}", paths.len(), dir);
        Ok(paths)
    }

    /// Decode every image in `dir`; decoding runs in parallel, order is kept
    pub fn load_directory<P: AsRef<Path>>(&self, dir: P) -> Result<ImageSequence> {
        let paths = Self::discover(&dir)?;
        if paths.is_empty() {
            return Err(GeneratorError::invalid_input(format!(
                "no PNG, JPEG or GIF images in {}",
                dir.as_ref().display()
            )));
        }
        self.load_paths(&paths)
    }

    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<ImageSequence> {
        let images: Vec<DynamicImage> = self
            .pool
            .install(|| paths.par_iter().map(|p| Self::load_image(p)).collect::<Result<_>>())?;

        info!("Loaded {} images", images.len());
        Ok(ImageSequence::new(images))
    }

    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| GeneratorError::ImageLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        debug!("Decoded {:?}: {}x{}", path, width, height);
        Ok(image)
    }

    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "png" | "jpg" | "jpeg" | "gif"))
            .unwrap_or(false)
    }
}
