//! Frame-sequence writer
//!
//! Records frames as a plain concatenation of JPEG images (`.mjpg`), every
//! frame resized to one fixed resolution, plus a small JSON manifest next to
//! it describing the recording. Players that understand raw MJPEG can play
//! the file directly.

use crate::config::RecordConfig;
use crate::video::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error types for recording
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error("invalid recording configuration: {0}")]
    Config(String),
}

/// Sidecar description of a finished recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingManifest {
    /// File name of the frame sequence
    pub file: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frames: u64,
    /// Byte offset of every frame in the sequence
    pub offsets: Vec<u64>,
    /// Start of the recording, milliseconds since the Unix epoch
    pub started_ms: u64,
}

/// Open frame-sequence file
///
/// Closed explicitly with [`close`](Self::close), or on drop.
pub struct FrameSequenceWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    config: RecordConfig,
    manifest: RecordingManifest,
    position: u64,
}

impl FrameSequenceWriter {
    /// Create a new timestamped recording in the configured directory
    pub fn create(config: &RecordConfig) -> Result<Self, RecordError> {
        let started_ms = now_ms();
        let path = config
            .output_dir
            .join(format!("{}-{}.mjpg", config.file_stem, started_ms));
        Self::open(path, config)
    }

    /// Create a recording at an explicit path, truncating an existing file
    pub fn open(path: impl Into<PathBuf>, config: &RecordConfig) -> Result<Self, RecordError> {
        let path = path.into();
        config
            .validate()
            .map_err(|e| RecordError::Config(e.to_string()))?;

        let file = File::create(&path).map_err(|source| RecordError::Open {
            path: path.clone(),
            source,
        })?;

        info!(
            "Recording to {} ({}x{} @ {}fps)",
            path.display(),
            config.width,
            config.height,
            config.fps
        );

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            manifest: RecordingManifest {
                file: file_name,
                fps: config.fps,
                width: config.width,
                height: config.height,
                frames: 0,
                offsets: Vec::new(),
                started_ms: now_ms(),
            },
            config: config.clone(),
            path,
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manifest path for a recording path
    pub fn manifest_path(path: &Path) -> PathBuf {
        path.with_extension("json")
    }

    pub fn frames_written(&self) -> u64 {
        self.manifest.frames
    }

    /// Append one frame, resized to the recording resolution
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(RecordError::Write {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "recording already closed"),
            });
        };

        let sized = frame.resize(self.config.width, self.config.height);
        let image = sized
            .to_image()
            .ok_or_else(|| RecordError::Encode("frame buffer does not match its size".into()))?;
        let rgb = DynamicImage::ImageRgba8(image).to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.config.quality)
            .encode_image(&rgb)
            .map_err(|e| RecordError::Encode(e.to_string()))?;

        writer.write_all(&jpeg).map_err(|source| RecordError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.manifest.offsets.push(self.position);
        self.manifest.frames += 1;
        self.position += jpeg.len() as u64;
        Ok(())
    }

    /// Flush the sequence and write the manifest
    pub fn close(mut self) -> Result<RecordingManifest, RecordError> {
        self.finish()?;
        Ok(self.manifest.clone())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer.flush().map_err(|source| RecordError::Write {
            path: self.path.clone(),
            source,
        })?;

        let manifest_path = Self::manifest_path(&self.path);
        let json = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|e| RecordError::Encode(e.to_string()))?;
        std::fs::write(&manifest_path, json).map_err(|source| RecordError::Write {
            path: manifest_path,
            source,
        })?;

        info!(
            "Closed recording {} after {} frames",
            self.path.display(),
            self.manifest.frames
        );
        Ok(())
    }
}

impl Drop for FrameSequenceWriter {
    fn drop(&mut self) {
        if self.writer.is_some() {
            debug!("Closing recording {} on drop", self.path.display());
            if let Err(e) = self.finish() {
                warn!("Failed to close recording: {}", e);
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::decoder::{FrameDecoder, Payload};

    fn small_config(dir: &Path) -> RecordConfig {
        RecordConfig {
            output_dir: dir.to_path_buf(),
            width: 32,
            height: 18,
            ..Default::default()
        }
    }

    #[test]
    fn test_write_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());

        let mut writer = FrameSequenceWriter::create(&config).unwrap();
        let path = writer.path().to_path_buf();
        writer.write_frame(&Frame::filled(64, 64, [255, 0, 0, 255])).unwrap();
        writer.write_frame(&Frame::filled(10, 10, [0, 0, 255, 255])).unwrap();
        assert_eq!(writer.frames_written(), 2);

        let manifest = writer.close().unwrap();
        assert_eq!(manifest.frames, 2);
        assert_eq!(manifest.offsets.len(), 2);
        assert_eq!(manifest.offsets[0], 0);

        // Every frame in the sequence decodes at the recording resolution
        let bytes = std::fs::read(&path).unwrap();
        let second = bytes[manifest.offsets[1] as usize..].to_vec();
        let frame = FrameDecoder::new().decode(Payload::Encoded(second)).unwrap();
        assert_eq!((frame.width, frame.height), (32, 18));

        let stored: RecordingManifest = serde_json::from_slice(
            &std::fs::read(FrameSequenceWriter::manifest_path(&path)).unwrap(),
        )
        .unwrap();
        assert_eq!(stored, manifest);
    }

    #[test]
    fn test_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(&dir.path().join("missing"));
        let result = FrameSequenceWriter::create(&config);
        assert!(matches!(result, Err(RecordError::Open { .. })));
    }

    #[test]
    fn test_drop_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let path = dir.path().join("dropped.mjpg");

        {
            let mut writer = FrameSequenceWriter::open(&path, &config).unwrap();
            writer.write_frame(&Frame::filled(8, 8, [0, 255, 0, 255])).unwrap();
        }

        assert!(FrameSequenceWriter::manifest_path(&path).exists());
    }
}
