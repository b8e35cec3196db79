//! microscope-core
//!
//! Live camera and microscope feed acquisition with a pluggable overlay
//! pipeline and persisted per-camera settings.
//!
//! ## Architecture
//!
//! Each camera view polls one network camera at a fixed rate, decodes the
//! frames, runs them through an ordered list of plugins, and keeps the
//! result for display. Views sit in a grid container; a click on a
//! thumbnail names the camera so the host can load it into a main view.
//!
//! ### Modules
//!
//! - `video`: Frame acquisition (transports, rate-limited source, decoder, recorder)
//! - `plugins`: Plugin trait, pipeline and built-in overlays/transforms
//! - `settings`: Hierarchical settings store with typed defaults
//! - `view`: Camera views, the grid container, window geometry
//! - `config`: Runtime configuration
//!
//! ## Example
//!
//! ```rust
//! use microscope_core::plugins::{PluginSet, ViewInfo};
//! use microscope_core::video::Frame;
//!
//! let mut pipeline = PluginSet::standard().build().unwrap();
//!
//! // Run a frame through every image-transforming plugin
//! let frame = pipeline.apply_image(Frame::filled(640, 480, [0, 0, 0, 255]), &ViewInfo::default());
//! assert_eq!(frame.width, 640);
//! ```

// Re-export commonly used types
pub use error::{MicroscopeError, Result};
pub use plugins::{Plugin, PluginPipeline, PluginSet};
pub use settings::SettingsStore;
pub use video::{Frame, FrameSource};
pub use view::{CameraView, Container};

// Public modules
pub mod config;
pub mod error;
pub mod geometry;
pub mod plugins;
pub mod settings;
pub mod video;
pub mod view;

use tracing::info;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging for library hosts
///
/// `log_level` is an `EnvFilter` directive such as `info` or
/// `microscope_core=debug`; an invalid directive falls back to `info`.
pub fn init_logging(log_level: &str) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| MicroscopeError::Other(format!("Failed to initialize logging: {}", e)))?;

    info!("microscope-core initialized with log level: {}", log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
