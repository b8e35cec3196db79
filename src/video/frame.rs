//! Video Frame Types
//!
//! Defines the canonical decoded frame and the pixel formats raw payloads
//! may arrive in.

use crate::geometry::{Rect, Size};
use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use std::fmt;

/// Pixel layout of a raw (already decoded) buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// BGR, 8 bits per channel, packed (stream decoder output)
    Bgr8,
    /// RGB, 8 bits per channel, packed
    Rgb8,
    /// RGBA, 8 bits per channel, packed (canonical frame layout)
    Rgba8,
}

impl PixelFormat {
    /// Calculate the buffer size needed for a frame
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Bgr8 => write!(f, "BGR8"),
            PixelFormat::Rgb8 => write!(f, "RGB8"),
            PixelFormat::Rgba8 => write!(f, "RGBA8"),
        }
    }
}

/// Placeholder background (mid grey)
const PLACEHOLDER_FILL: [u8; 4] = [64, 64, 64, 255];

/// A decoded frame, always RGBA8, row-major, no padding
///
/// Frames carry no transport metadata. `caption` is only set on synthesized
/// placeholder frames and is rendered by the display alongside the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// RGBA pixel data (width * height * 4 bytes)
    pub data: Vec<u8>,
    /// Human-readable message for placeholder frames
    pub caption: Option<String>,
}

impl Frame {
    /// Create a frame filled with a single color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(PixelFormat::Rgba8.buffer_size(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            caption: None,
        }
    }

    /// Create a frame from RGBA data, `None` if the length does not match
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != PixelFormat::Rgba8.buffer_size(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            caption: None,
        })
    }

    /// Synthesized frame shown in place of a failed fetch
    pub fn placeholder(size: Size, message: impl Into<String>) -> Self {
        let mut frame = Self::filled(size.width, size.height, PLACEHOLDER_FILL);
        frame.caption = Some(message.into());
        frame
    }

    pub fn is_placeholder(&self) -> bool {
        self.caption.is_some()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Full-frame rectangle
    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + 4]);
        Some(px)
    }

    /// Copy out a sub-rectangle
    ///
    /// The rectangle is clipped to the frame. A rectangle that does not
    /// overlap the frame yields an unchanged copy.
    pub fn crop(&self, rect: Rect) -> Frame {
        let Some(clip) = rect.intersect(&self.rect()) else {
            return self.clone();
        };
        let (cx, cy) = (clip.x as usize, clip.y as usize);
        let (cw, ch) = (clip.width as usize, clip.height as usize);
        let stride = self.width as usize * 4;

        let mut data = Vec::with_capacity(cw * ch * 4);
        for row in cy..cy + ch {
            let start = row * stride + cx * 4;
            data.extend_from_slice(&self.data[start..start + cw * 4]);
        }

        Frame {
            width: cw as u32,
            height: ch as u32,
            data,
            caption: self.caption.clone(),
        }
    }

    /// Resize to exact dimensions
    pub fn resize(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let Some(image) = self.to_image() else {
            return self.clone();
        };
        let scaled = imageops::resize(
            &image,
            width.max(1),
            height.max(1),
            imageops::FilterType::Triangle,
        );
        let mut frame = Frame::from_image(scaled);
        frame.caption = self.caption.clone();
        frame
    }

    /// Resize to `width`, preserving aspect ratio
    pub fn scale_to_width(&self, width: u32) -> Frame {
        if self.width == 0 {
            return self.clone();
        }
        let height = (self.height as u64 * width as u64 / self.width as u64) as u32;
        self.resize(width, height.max(1))
    }

    /// Resize to `height`, preserving aspect ratio
    pub fn scale_to_height(&self, height: u32) -> Frame {
        if self.height == 0 {
            return self.clone();
        }
        let width = (self.width as u64 * height as u64 / self.height as u64) as u32;
        self.resize(width.max(1), height)
    }

    /// Borrow-free conversion to an `image` buffer
    pub fn to_image(&self) -> Option<RgbaImage> {
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn from_image(image: RgbaImage) -> Frame {
        let (width, height) = image.dimensions();
        Frame {
            width,
            height,
            data: image.into_raw(),
            caption: None,
        }
    }

    /// Packed RGB bytes (alpha dropped), for encoders
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        Frame::from_rgba(width, height, data).unwrap()
    }

    #[test]
    fn test_pixel_format_buffer_size() {
        assert_eq!(PixelFormat::Bgr8.buffer_size(1280, 720), 1280 * 720 * 3);
        assert_eq!(PixelFormat::Rgba8.buffer_size(1280, 720), 1280 * 720 * 4);
    }

    #[test]
    fn test_from_rgba_rejects_bad_length() {
        assert!(Frame::from_rgba(10, 10, vec![0; 399]).is_none());
        assert!(Frame::from_rgba(10, 10, vec![0; 400]).is_some());
    }

    #[test]
    fn test_crop() {
        let frame = gradient(8, 6);
        let cropped = frame.crop(Rect::new(2, 1, 3, 2));
        assert_eq!(cropped.size(), Size::new(3, 2));
        assert_eq!(cropped.pixel(0, 0), Some([2, 1, 0, 255]));
        assert_eq!(cropped.pixel(2, 1), Some([4, 2, 0, 255]));
    }

    #[test]
    fn test_crop_is_clipped() {
        let frame = gradient(8, 6);
        let cropped = frame.crop(Rect::new(6, 4, 10, 10));
        assert_eq!(cropped.size(), Size::new(2, 2));

        let outside = frame.crop(Rect::new(100, 100, 5, 5));
        assert_eq!(outside, frame);
    }

    #[test]
    fn test_scale_preserves_aspect() {
        let frame = Frame::filled(200, 100, [255, 0, 0, 255]);
        assert_eq!(frame.scale_to_width(100).size(), Size::new(100, 50));
        assert_eq!(frame.scale_to_height(25).size(), Size::new(50, 25));
    }

    #[test]
    fn test_placeholder() {
        let frame = Frame::placeholder(Size::new(4, 4), "Error loading http://cam/");
        assert!(frame.is_placeholder());
        assert_eq!(frame.pixel(3, 3), Some(PLACEHOLDER_FILL));
    }
}
