//! Testing Utilities
//!
//! Scripted camera transports that count what the acquisition loop asks of
//! them, and helpers for producing encoded test images.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use microscope_core::config::AcquisitionConfig;
use microscope_core::plugins::PluginSet;
use microscope_core::video::{Frame, FrameStream, Payload, Transport, TransportError};
use microscope_core::view::{CameraView, ViewFactory};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport answering GETs from a script and streams from a frame list
///
/// Records the number of GETs, stream opens, and the highest number of
/// GETs outstanding at once.
pub struct MockTransport {
    body: Mutex<Result<Vec<u8>, String>>,
    delay: Duration,
    stream_frames: Vec<Vec<u8>>,
    /// Streams fail instead of going quiet once their frames run out
    stream_fails: bool,
    gets: AtomicU64,
    stream_opens: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl MockTransport {
    /// Answer every GET with `bytes`
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self {
            body: Mutex::new(Ok(bytes)),
            delay: Duration::ZERO,
            stream_frames: Vec::new(),
            stream_fails: false,
            gets: AtomicU64::new(0),
            stream_opens: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        }
    }

    /// Refuse every GET
    pub fn refusing() -> Self {
        let transport = Self::serving(Vec::new());
        *transport.body.lock().unwrap() = Err("connection refused".to_string());
        transport
    }

    /// Hold every GET for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Frames handed out, in order, by every opened stream
    pub fn with_stream_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.stream_frames = frames;
        self
    }

    /// Opened streams report a closed connection after their last frame
    pub fn with_failing_stream(mut self) -> Self {
        self.stream_fails = true;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Change what later GETs return
    pub fn set_body(&self, bytes: Vec<u8>) {
        *self.body.lock().unwrap() = Ok(bytes);
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn stream_opens(&self) -> u64 {
        self.stream_opens.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone();
        body.map_err(|reason| TransportError::Connect {
            url: url.to_string(),
            reason,
        })
    }

    async fn open_stream(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            url: url.to_string(),
            frames: self.stream_frames.iter().cloned().collect(),
            fails: self.stream_fails,
        }))
    }
}

/// Stream handing out a fixed list of frames, then nothing or a failure
pub struct ScriptedStream {
    url: String,
    frames: VecDeque<Vec<u8>>,
    fails: bool,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Payload>, TransportError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(Payload::Encoded(frame))),
            None if self.fails => Err(TransportError::StreamClosed {
                url: self.url.clone(),
            }),
            None => Ok(None),
        }
    }
}

/// Lossless PNG of a single color
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(rgba));
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// JPEG of a horizontal gradient
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        let level = (x * 255 / width.max(1)) as u8;
        Rgb([level, level, level])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

/// Frame whose pixels encode their coordinates
pub fn coordinate_frame(width: u32, height: u32) -> Frame {
    let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]));
    Frame::from_image(image)
}

/// Views sharing `transport`, with the given plugins
pub fn factory(transport: Arc<dyn Transport>, plugins: PluginSet) -> ViewFactory {
    ViewFactory::new(transport, plugins, AcquisitionConfig::default())
}

/// Idle thumbnail view over `transport`
pub fn view(transport: Arc<dyn Transport>, plugins: PluginSet) -> CameraView {
    factory(transport, plugins)
        .build()
        .expect("Failed to build camera view")
}
