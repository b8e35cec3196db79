//! Camera Transport
//!
//! Wire access to camera endpoints: single-shot HTTP GETs of a still JPEG,
//! and long-lived multipart MJPEG/CGI streams from which individual JPEG
//! frames are cut out.
//!
//! The [`Transport`] trait is the seam between the acquisition loop and the
//! network, so the loop can be driven by scripted transports in tests.

use crate::video::decoder::Payload;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on buffered stream bytes without a complete frame
const MAX_STREAM_BUFFER: usize = 16 * 1024 * 1024;

/// How frames are pulled from an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One HTTP GET per frame
    SingleShotHttp,
    /// Frames read from an already-open MJPEG stream
    MjpegPoll,
}

impl Protocol {
    /// Classify a URL by suffix: `.mjpg` / `.cgi` (any case) are streams
    pub fn classify(url: &str) -> Self {
        let lower = url.trim().to_ascii_lowercase();
        if lower.ends_with("mjpg") || lower.ends_with("cgi") {
            Protocol::MjpegPoll
        } else {
            Protocol::SingleShotHttp
        }
    }
}

/// Transport failures; all are recoverable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection refused, DNS failure, TLS failure
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed reading from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("stream {url} was closed by the camera")]
    StreamClosed { url: String },
}

impl TransportError {
    /// URL of the failing endpoint
    pub fn url(&self) -> &str {
        match self {
            TransportError::Timeout { url }
            | TransportError::Connect { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::Body { url, .. }
            | TransportError::StreamClosed { url } => url,
        }
    }
}

/// Access to camera endpoints
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one still image, bounded by `timeout`
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Open a continuous MJPEG stream
    async fn open_stream(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn FrameStream>, TransportError>;
}

/// An open stream handle
#[async_trait]
pub trait FrameStream: Send {
    /// Read the most recent complete frame
    ///
    /// `Ok(None)` means the stream is momentarily empty; `Err` means the
    /// handle is dead and should be reopened.
    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<Payload>, TransportError>;
}

/// Cuts JPEG images out of a multipart byte stream by SOI/EOI markers
///
/// Multipart boundaries and part headers are skipped implicitly since only
/// the bytes between a start-of-image and the next end-of-image marker are
/// kept.
#[derive(Debug, Default)]
pub struct MjpegParser {
    buffer: Vec<u8>,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        if self.buffer.len() > MAX_STREAM_BUFFER {
            // Keep only from the last start marker on
            match Self::rfind(&self.buffer, &SOI) {
                Some(pos) if pos > 0 => {
                    self.buffer.drain(..pos);
                }
                _ => self.buffer.clear(),
            }
            debug!("MJPEG buffer overflow, trimmed to {} bytes", self.buffer.len());
        }
    }

    /// Pop the oldest complete JPEG
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = Self::find(&self.buffer, &SOI, 0)?;
        let end = Self::find(&self.buffer, &EOI, start + SOI.len())? + EOI.len();
        let jpeg = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        trace!("Extracted MJPEG frame: {} bytes", jpeg.len());
        Some(jpeg)
    }

    /// Pop every complete JPEG and return only the newest
    pub fn latest_frame(&mut self) -> Option<Vec<u8>> {
        let mut latest = None;
        while let Some(frame) = self.next_frame() {
            latest = Some(frame);
        }
        latest
    }

    /// Bytes buffered but not yet part of a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
        if haystack.len() < 2 || from >= haystack.len() - 1 {
            return None;
        }
        haystack[from..]
            .windows(2)
            .position(|w| w == needle)
            .map(|p| p + from)
    }

    fn rfind(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
        haystack.windows(2).rposition(|w| w == needle)
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use tracing::warn;

    /// reqwest-backed transport
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|e| TransportError::Connect {
                    url: String::new(),
                    reason: format!("failed to build HTTP client: {}", e),
                })?;
            Ok(Self { client })
        }

        fn map_error(url: &str, err: reqwest::Error) -> TransportError {
            if err.is_timeout() {
                TransportError::Timeout { url: url.to_string() }
            } else if err.is_connect() || err.is_request() || err.is_builder() {
                TransportError::Connect {
                    url: url.to_string(),
                    reason: err.to_string(),
                }
            } else if let Some(status) = err.status() {
                TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                }
            } else {
                TransportError::Body {
                    url: url.to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
            trace!("GET {}", url);
            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| Self::map_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| Self::map_error(url, e))?;
            Ok(bytes.to_vec())
        }

        async fn open_stream(
            &self,
            url: &str,
            timeout: Duration,
        ) -> Result<Box<dyn FrameStream>, TransportError> {
            debug!("Opening MJPEG stream {}", url);
            let response = tokio::time::timeout(timeout, self.client.get(url).send())
                .await
                .map_err(|_| TransportError::Timeout { url: url.to_string() })?
                .map_err(|e| Self::map_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                warn!("MJPEG stream {} refused with status {}", url, status);
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            Ok(Box::new(HttpMjpegStream {
                url: url.to_string(),
                response,
                parser: MjpegParser::new(),
            }))
        }
    }

    /// Open multipart response plus the frame cutter
    struct HttpMjpegStream {
        url: String,
        response: reqwest::Response,
        parser: MjpegParser,
    }

    #[async_trait]
    impl FrameStream for HttpMjpegStream {
        async fn read_frame(
            &mut self,
            timeout: Duration,
        ) -> Result<Option<Payload>, TransportError> {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if let Some(jpeg) = self.parser.latest_frame() {
                    return Ok(Some(Payload::Encoded(jpeg)));
                }

                let chunk = match tokio::time::timeout_at(deadline, self.response.chunk()).await {
                    Err(_) => return Ok(None),
                    Ok(chunk) => chunk,
                };

                match chunk {
                    Ok(Some(bytes)) => self.parser.push(&bytes),
                    Ok(None) => {
                        return Err(TransportError::StreamClosed {
                            url: self.url.clone(),
                        })
                    }
                    Err(e) => {
                        return Err(TransportError::Body {
                            url: self.url.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(tag: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, tag, tag, 0xFF, 0xD9]
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Protocol::classify("http://localhost:9998/jpg/image.jpg"),
            Protocol::SingleShotHttp
        );
        assert_eq!(
            Protocol::classify("http://cam1/video.mjpg"),
            Protocol::MjpegPoll
        );
        assert_eq!(
            Protocol::classify("http://cam1/axis-cgi/mjpg/video.CGI"),
            Protocol::MjpegPoll
        );
        assert_eq!(Protocol::classify("http://cam1/STREAM.MJPG"), Protocol::MjpegPoll);
    }

    #[test]
    fn test_parser_skips_multipart_headers() {
        let mut parser = MjpegParser::new();
        parser.push(b"--myboundary\r\nContent-Type: image/jpeg\r\n\r\n");
        parser.push(&fake_jpeg(1));
        parser.push(b"\r\n--myboundary\r\n");

        assert_eq!(parser.next_frame(), Some(fake_jpeg(1)));
        assert_eq!(parser.next_frame(), None);
    }

    #[test]
    fn test_parser_waits_for_complete_frame() {
        let mut parser = MjpegParser::new();
        let jpeg = fake_jpeg(7);
        parser.push(&jpeg[..5]);
        assert_eq!(parser.next_frame(), None);
        parser.push(&jpeg[5..]);
        assert_eq!(parser.next_frame(), Some(jpeg));
    }

    #[test]
    fn test_parser_latest_frame_drops_stale() {
        let mut parser = MjpegParser::new();
        parser.push(&fake_jpeg(1));
        parser.push(&fake_jpeg(2));
        parser.push(&fake_jpeg(3)[..4]);

        assert_eq!(parser.latest_frame(), Some(fake_jpeg(2)));
        assert_eq!(parser.buffered(), 4);
    }

    #[test]
    fn test_transport_error_url() {
        let err = TransportError::Status {
            url: "http://cam/x.jpg".into(),
            status: 404,
        };
        assert_eq!(err.url(), "http://cam/x.jpg");
        assert_eq!(err.to_string(), "http://cam/x.jpg answered with HTTP status 404");
    }
}
