//! Preset Plugin
//!
//! Saves the settings of every other plugin in the view under a name and
//! restores them on request.
//!
//! The plugin's own settings group *is* the preset map:
//!
//! ```text
//! Camera Presets
//!   <preset name>
//!     <plugin name> { ...that plugin's settings... }
//! ```
//!
//! Snapshotting and restoring other plugins happens in the
//! [`PluginPipeline`](crate::plugins::PluginPipeline); this plugin emits
//! [`Effect::SavePreset`] and [`Effect::LoadPreset`].

use crate::error::{MicroscopeError, Result};
use crate::plugins::plugin::{
    ActionInput, Effect, InputKind, MenuAction, MenuItem, Plugin, PluginContext, PluginSettings,
    PointerEvent,
};
use crate::settings::{SettingValue, SettingsMap};
use tracing::{debug, warn};

/// Plugin name and settings group
pub const PRESET_PLUGIN: &str = "Camera Presets";

const ACTION_SAVE: &str = "save_preset";
/// Prefix of the per-preset load actions
const ACTION_LOAD_PREFIX: &str = "preset:";

/// Named snapshots of the other plugins
pub struct PresetPlugin {
    presets: SettingsMap,
    selected: Option<String>,
}

impl PresetPlugin {
    pub fn new() -> Self {
        Self {
            presets: SettingsMap::new(),
            selected: None,
        }
    }

    /// Preset names, sorted
    pub fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    /// Stored snapshot of one preset
    pub fn preset(&self, name: &str) -> Option<&SettingsMap> {
        self.presets.get(name).and_then(SettingValue::as_map)
    }

    /// Last loaded preset
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Menu action id that loads `name`
    pub fn load_action(name: &str) -> String {
        format!("{}{}", ACTION_LOAD_PREFIX, name)
    }
}

impl Default for PresetPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginSettings for PresetPlugin {
    /// Replaces the preset map; non-group entries are ignored
    fn read_settings(&mut self, map: &SettingsMap) {
        self.presets = map
            .iter()
            .filter(|(_, value)| value.as_map().is_some())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if let Some(selected) = &self.selected {
            if !self.presets.contains_key(selected) {
                self.selected = None;
            }
        }
    }

    fn write_settings(&self) -> SettingsMap {
        self.presets.clone()
    }
}

impl Plugin for PresetPlugin {
    fn name(&self) -> &str {
        PRESET_PLUGIN
    }

    fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {}

    fn context_menu(&self) -> Vec<MenuItem> {
        let presets = self
            .presets
            .keys()
            .map(|name| {
                let checked = self.selected.as_deref() == Some(name.as_str());
                MenuAction::new(Self::load_action(name), name.as_str())
                    .checked(checked)
                    .into()
            })
            .collect();

        vec![
            MenuAction::new(ACTION_SAVE, "Save Preset")
                .with_input(InputKind::Text {
                    prompt: "Enter preset name".to_string(),
                })
                .into(),
            MenuItem::Submenu {
                label: "Presets".to_string(),
                items: presets,
            },
        ]
    }

    fn trigger(&mut self, action: &str, input: ActionInput, ctx: &mut PluginContext) -> Result<()> {
        if action == ACTION_SAVE {
            let ActionInput::Text(name) = input else {
                return Err(MicroscopeError::plugin("Saving a preset needs a name"));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(MicroscopeError::plugin("Preset name must not be empty"));
            }
            debug!("Saving preset '{}'", name);
            ctx.emit(Effect::SavePreset(name.to_string()));
            return Ok(());
        }

        let Some(name) = action.strip_prefix(ACTION_LOAD_PREFIX) else {
            return Err(MicroscopeError::plugin(format!(
                "Unknown preset action '{}'",
                action
            )));
        };
        if !self.presets.contains_key(name) {
            warn!("Preset '{}' does not exist", name);
            return Err(MicroscopeError::not_found(format!(
                "Preset '{}' not found",
                name
            )));
        }

        self.selected = Some(name.to_string());
        ctx.emit(Effect::LoadPreset(name.to_string()));
        Ok(())
    }

    fn settings(&self) -> Option<&dyn PluginSettings> {
        Some(self)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn PluginSettings> {
        Some(self)
    }
}
