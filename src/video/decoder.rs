//! Frame Decoder
//!
//! Normalizes transport payloads into the canonical RGBA [`Frame`].

use crate::video::frame::{Frame, PixelFormat};
use thiserror::Error;
use tracing::trace;

/// Error types for payload decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was empty
    #[error("empty payload")]
    Empty,

    /// Encoded image could not be decoded
    #[error("unsupported or corrupt image data: {0}")]
    Malformed(String),

    /// Raw buffer length does not match its declared dimensions
    #[error("raw {format} buffer of {actual} bytes does not match {width}x{height} (expected {expected})")]
    SizeMismatch {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A frame as it comes off the wire, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Encoded still image (JPEG from a snapshot URL or an MJPEG part)
    Encoded(Vec<u8>),
    /// Already decoded pixels from a stream decoder
    Raw {
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    },
    /// Already a canonical frame
    Decoded(Frame),
}

impl Payload {
    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Encoded(bytes) => bytes.len(),
            Payload::Raw { data, .. } => data.len(),
            Payload::Decoded(frame) => frame.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateless payload decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a payload into a frame
    ///
    /// Pure: the same payload always yields the same frame or the same error.
    pub fn decode(&self, payload: Payload) -> Result<Frame, DecodeError> {
        match payload {
            Payload::Encoded(bytes) => Self::decode_encoded(&bytes),
            Payload::Raw {
                width,
                height,
                format,
                data,
            } => Self::decode_raw(width, height, format, data),
            Payload::Decoded(frame) => Ok(frame),
        }
    }

    fn decode_encoded(bytes: &[u8]) -> Result<Frame, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        trace!("Decoding encoded payload: {} bytes", bytes.len());

        let image = image::load_from_memory(bytes)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        Ok(Frame::from_image(image.to_rgba8()))
    }

    fn decode_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Frame, DecodeError> {
        let expected = format.buffer_size(width, height);
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        if data.len() != expected {
            return Err(DecodeError::SizeMismatch {
                format,
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        let rgba = match format {
            PixelFormat::Rgba8 => data,
            PixelFormat::Rgb8 => data
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
            // Stream decoders hand out BGR; swap to RGB order
            PixelFormat::Bgr8 => data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0], 255])
                .collect(),
        };

        Frame::from_rgba(width, height, rgba).ok_or(DecodeError::SizeMismatch {
            format,
            width,
            height,
            expected,
            actual: 0,
        })
    }
}
