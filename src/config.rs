//! Runtime configuration
//!
//! Plain structs with defaults and named presets. The host binary reads a
//! [`MonitorConfig`] from TOML; library users build them in code.

use crate::error::{MicroscopeError, Result};
use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one frame source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Bound on a single-shot GET, and on opening a stream
    pub request_timeout_ms: u64,
    /// Bound on waiting for the next frame of an open stream, per tick
    pub stream_read_timeout_ms: u64,
    /// Events buffered between the acquisition task and the view
    /// (larger = more latency, smaller = more drops)
    pub queue_size: usize,
    /// Size of the synthesized error frame
    pub placeholder_size: Size,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
            stream_read_timeout_ms: 100,
            queue_size: 2,
            placeholder_size: Size::new(640, 480),
        }
    }
}

impl AcquisitionConfig {
    /// Short timeouts for cameras on the local network
    pub fn local_network() -> Self {
        Self {
            request_timeout_ms: 500,
            stream_read_timeout_ms: 50,
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(MicroscopeError::configuration(
                "request_timeout_ms must be positive",
            ));
        }
        if self.queue_size == 0 {
            return Err(MicroscopeError::configuration("queue_size must be positive"));
        }
        if self.placeholder_size.is_empty() {
            return Err(MicroscopeError::configuration(
                "placeholder_size must not be empty",
            ));
        }
        Ok(())
    }
}

/// Settings for the frame-sequence writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Directory recordings are written to
    pub output_dir: PathBuf,
    /// File name stem; a timestamp is appended per recording
    pub file_stem: String,
    /// Nominal playback rate written to the manifest
    pub fps: u32,
    /// Every recorded frame is resized to this width
    pub width: u32,
    /// Every recorded frame is resized to this height
    pub height: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_stem: "output".to_string(),
            fps: 5,
            width: 1280,
            height: 720,
            quality: 85,
        }
    }
}

impl RecordConfig {
    /// Create config for 720p @ 5fps into `dir`
    pub fn hd_720p(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(MicroscopeError::configuration("record fps must be positive"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(MicroscopeError::configuration(
                "record resolution must not be empty",
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(MicroscopeError::configuration(format!(
                "JPEG quality {} out of range 1-100",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Host configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Settings file; the platform config directory is used when unset
    pub settings_path: Option<PathBuf>,
    pub acquisition: AcquisitionConfig,
    pub record: RecordConfig,
}

impl MonitorConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(text)?;
        config.acquisition.validate()?;
        config.record.validate()?;
        Ok(config)
    }

    /// Read from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
