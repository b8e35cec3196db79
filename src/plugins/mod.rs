//! Plugin system module
//!
//! Overlay and image-processing plugins attached to a camera view.
//!
//! ## Architecture
//!
//! Plugins describe what they want, the host draws it:
//! - **Plugin logic** (in Rust core) - Input handling, state, settings
//! - **Rendering** (host) - Frames, overlay shapes, menus and controls
//!
//! ## Components
//!
//! - [`Plugin`](trait@Plugin) - Trait that all plugins must implement
//! - [`ImageTransform`] / [`PluginSettings`] / [`PluginConfig`] - Optional capabilities
//! - [`PluginPipeline`](struct@PluginPipeline) - Ordered plugins of one view
//! - [`PluginSet`] - Recipe for building a fresh pipeline per view
//!
//! ## Built-in Plugins
//!
//! ### Overlays
//! - [`crosshair`] - Centre crosshair
//! - [`grid`] - User-drawn measurement grid
//!
//! ### Image Processing
//! - [`zoom`] - Crop to selection
//! - [`record`] - Frame-sequence recording
//!
//! ### View Control
//! - [`preset`] - Named settings snapshots
//! - [`toggle`] - Acquisition on/off
//!
//! ## Example Usage
//!
//! ```rust
//! use microscope_core::plugins::{ActionInput, PluginSet, ViewInfo};
//!
//! # fn example() -> microscope_core::Result<()> {
//! let mut pipeline = PluginSet::standard().build()?;
//!
//! let view = ViewInfo::default();
//! let effects = pipeline.trigger("Zoom", "crop", ActionInput::None, &view)?;
//! println!("{:?}", effects);
//!
//! pipeline.shutdown_all()?;
//! # Ok(())
//! # }
//! ```

pub mod crosshair;
pub mod grid;
mod pipeline;
mod plugin;
pub mod preset;
pub mod record;
pub mod toggle;
pub mod zoom;

pub use crosshair::{CrosshairPlugin, CROSSHAIR_PLUGIN};
pub use grid::{GridPlugin, GridState, GRID_PLUGIN};
pub use pipeline::PluginPipeline;
pub use plugin::{
    ActionInput, ConfigField, Cursor, Effect, FieldKind, ImageTransform, InputKind, MenuAction,
    MenuItem, MenuSection, OverlayShape, Plugin, PluginConfig, PluginContext, PluginSettings,
    PointerButton, PointerEvent, PointerKind, ViewInfo,
};
pub use preset::{PresetPlugin, PRESET_PLUGIN};
pub use record::{RecordPlugin, RECORD_PLUGIN};
pub use toggle::{TogglePlugin, TOGGLE_PLUGIN};
pub use zoom::{ZoomPlugin, ZOOM_PLUGIN};

use crate::config::RecordConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Built-in plugin variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Crosshair,
    Grid,
    Zoom,
    Record,
    Preset,
    Toggle,
}

impl PluginKind {
    /// Name the variant registers under
    pub fn plugin_name(&self) -> &'static str {
        match self {
            PluginKind::Crosshair => CROSSHAIR_PLUGIN,
            PluginKind::Grid => GRID_PLUGIN,
            PluginKind::Zoom => ZOOM_PLUGIN,
            PluginKind::Record => RECORD_PLUGIN,
            PluginKind::Preset => PRESET_PLUGIN,
            PluginKind::Toggle => TOGGLE_PLUGIN,
        }
    }

    fn instantiate(&self, record: &RecordConfig) -> Box<dyn Plugin> {
        match self {
            PluginKind::Crosshair => Box::new(CrosshairPlugin::new()),
            PluginKind::Grid => Box::new(GridPlugin::new()),
            PluginKind::Zoom => Box::new(ZoomPlugin::new()),
            PluginKind::Record => Box::new(RecordPlugin::new(record.clone())),
            PluginKind::Preset => Box::new(PresetPlugin::new()),
            PluginKind::Toggle => Box::new(TogglePlugin::new()),
        }
    }
}

/// Ordered list of plugin variants, built into a fresh pipeline per view
///
/// Plugin instances are never shared between views; every call to
/// [`build`](Self::build) creates new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSet {
    kinds: Vec<PluginKind>,
    record: RecordConfig,
}

impl PluginSet {
    pub fn new(kinds: Vec<PluginKind>) -> Self {
        Self {
            kinds,
            record: RecordConfig::default(),
        }
    }

    /// No plugins
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Every built-in plugin; zoom runs before record so recordings are cropped
    pub fn standard() -> Self {
        Self::new(vec![
            PluginKind::Crosshair,
            PluginKind::Grid,
            PluginKind::Zoom,
            PluginKind::Record,
            PluginKind::Preset,
            PluginKind::Toggle,
        ])
    }

    /// Builder: recording settings handed to [`RecordPlugin`]
    pub fn with_record_config(mut self, record: RecordConfig) -> Self {
        self.record = record;
        self
    }

    pub fn kinds(&self) -> &[PluginKind] {
        &self.kinds
    }

    /// Instantiate every variant, in order
    ///
    /// # Errors
    ///
    /// - `MicroscopeError::AlreadyExists` - a variant is listed twice
    pub fn build(&self) -> Result<PluginPipeline> {
        let mut pipeline = PluginPipeline::new();
        for kind in &self.kinds {
            pipeline.register(kind.instantiate(&self.record))?;
        }
        Ok(pipeline)
    }
}

impl Default for PluginSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MicroscopeError;

    #[test]
    fn test_standard_set_names() {
        let pipeline = PluginSet::standard().build().unwrap();
        assert_eq!(
            pipeline.plugin_names(),
            vec![
                "Crosshair",
                "Grid",
                "Zoom",
                "Record",
                "Camera Presets",
                "Toggle Plugin"
            ]
        );
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let set = PluginSet::new(vec![PluginKind::Zoom, PluginKind::Zoom]);
        assert!(matches!(set.build(), Err(MicroscopeError::AlreadyExists(_))));
    }

    #[test]
    fn test_builds_independent_instances() {
        let set = PluginSet::new(vec![PluginKind::Zoom]);
        let mut a = set.build().unwrap();
        let b = set.build().unwrap();

        a.trigger(ZOOM_PLUGIN, "crop", ActionInput::None, &ViewInfo::default())
            .unwrap();
        a.get_mut(ZOOM_PLUGIN)
            .and_then(|p| p.settings_mut())
            .unwrap()
            .read_settings(&crate::settings::SettingsMap::from([(
                "crop".to_string(),
                crate::geometry::Rect::new(0, 0, 5, 5).into(),
            )]));

        assert_eq!(a.write_settings()[0].1.len(), 1);
        assert!(b.write_settings()[0].1.is_empty());
    }

    #[test]
    fn test_kind_names_match_plugins() {
        for kind in PluginSet::standard().kinds() {
            let plugin = kind.instantiate(&RecordConfig::default());
            assert_eq!(plugin.name(), kind.plugin_name());
        }
    }
}
