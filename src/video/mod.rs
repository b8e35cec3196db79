//! Video Acquisition Module
//!
//! Pulls frames from network cameras and normalizes them for display.
//!
//! ## Architecture
//!
//! ```text
//! Camera (JPEG / MJPEG) → Transport → FrameSource → FrameDecoder → Frame
//!                                        (task)         (view)       ↓
//!                                                              PluginPipeline
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use microscope_core::config::AcquisitionConfig;
//! use microscope_core::video::{Endpoint, FrameDecoder, FrameSource, SourceEvent};
//!
//! # async fn example() -> microscope_core::Result<()> {
//! let endpoint = Endpoint::new("http://localhost:9998/jpg/image.jpg", 5)?;
//! let mut source = FrameSource::http(endpoint, AcquisitionConfig::default())?;
//! source.start()?;
//!
//! while let Some(SourceEvent::Payload(payload)) = source.next_event().await {
//!     let frame = FrameDecoder::new().decode(payload)?;
//!     println!("{}x{}", frame.width, frame.height);
//! }
//!
//! source.stop();
//! # Ok(())
//! # }
//! ```

mod decoder;
mod frame;
mod recorder;
mod source;
mod transport;

pub use decoder::{DecodeError, FrameDecoder, Payload};
pub use frame::{Frame, PixelFormat};
pub use recorder::{FrameSequenceWriter, RecordError, RecordingManifest};
pub use source::{
    AcquisitionState, AcquisitionStats, Endpoint, FrameSource, SourceEvent, DEFAULT_FPS,
    DEFAULT_URL,
};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{FrameStream, MjpegParser, Protocol, Transport, TransportError};
