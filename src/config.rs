use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    encoder::{Codec, CodecSettings},
    error::{ConfigError, Result},
    generator::FrameErrorPolicy,
    video::{FrameSize, ResizeFilter},
};

/// Main configuration for the video generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output frame and encoder settings
    pub video: VideoConfig,

    /// Where finished videos go
    pub output: OutputConfig,

    /// Run-time behaviour of the frame feeder
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.output.validate()?;
        self.run.validate()?;
        Ok(())
    }

    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.video.width, self.video.height)
    }

    pub fn codec_settings(&self) -> CodecSettings {
        CodecSettings {
            codec: self.video.codec,
            quality: self.video.quality,
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.run.stall_timeout_secs)
    }
}

/// Output frame and encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    pub codec: Codec,

    /// Encoding quality (0-100)
    pub quality: u8,

    /// Pixel buffers in flight between the feeder and the encoder
    pub pool_capacity: usize,

    /// Filter used when stretching stills to the output size
    pub resize_filter: ResizeFilter,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            codec: Codec::H264,
            quality: 85,
            pool_capacity: 4,
            resize_filter: ResizeFilter::default(),
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.size".to_string(),
                value: format!("{}x{}", self.width, self.height),
            }
            .into());
        }

        if self.codec == Codec::H264 && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(ConfigError::InvalidValue {
                key: "video.size".to_string(),
                value: format!("{}x{} (h264 needs even dimensions)", self.width, self.height),
            }
            .into());
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "video.quality".to_string(),
                value: self.quality.to_string(),
            }
            .into());
        }

        if self.pool_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.pool_capacity".to_string(),
                value: self.pool_capacity.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Output location configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated videos; created if missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// File name without extension
    pub file_stem: String,

    /// Append a timestamp so runs never overwrite each other
    pub unique_per_run: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_stem: "slideshow".to_string(),
            unique_per_run: false,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        let stem = self.file_stem.trim();
        if stem.is_empty() || stem.contains(['/', '\\']) || stem == "." || stem == ".." {
            return Err(ConfigError::InvalidValue {
                key: "output.file_stem".to_string(),
                value: self.file_stem.clone(),
            }
            .into());
        }

        Ok(())
    }
}

/// Frame feeder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seconds to wait for the encoder before failing the run
    pub stall_timeout_secs: u64,

    pub frame_error_policy: FrameErrorPolicy,

    /// Leave a partially written file behind when a run fails
    pub keep_partial_output: bool,

    /// Threads used to decode input images
    pub decode_threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 30,
            frame_error_policy: FrameErrorPolicy::default(),
            keep_partial_output: false,
            decode_threads: num_cpus::get(),
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<()> {
        if self.stall_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "run.stall_timeout_secs".to_string(),
                value: self.stall_timeout_secs.to_string(),
            }
            .into());
        }

        if self.decode_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "run.decode_threads".to_string(),
                value: self.decode_threads.to_string(),
            }
            .into());
        }

        Ok(())
    }
}
