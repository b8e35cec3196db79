//! Plugin Pipeline
//!
//! Owns the ordered plugin list of one camera view and routes frames, input
//! and menu activations to it.
//!
//! ## Responsibilities
//!
//! - Plugin registration (names are unique within a pipeline)
//! - Image transforms, in registration order, transform-capable plugins only
//! - Pointer fan-out and context-menu aggregation, every plugin, in order
//! - Preset save/load across plugins
//! - Settings round-trip by plugin name
//! - Configuration forms of configurable plugins
//!
//! ## Example
//!
//! ```rust
//! use microscope_core::plugins::{CrosshairPlugin, PluginPipeline, ViewInfo, ZoomPlugin};
//! use microscope_core::video::Frame;
//!
//! # fn example() -> microscope_core::Result<()> {
//! let mut pipeline = PluginPipeline::new();
//! pipeline.register(Box::new(CrosshairPlugin::new()))?;
//! pipeline.register(Box::new(ZoomPlugin::new()))?;
//!
//! let frame = pipeline.apply_image(Frame::filled(64, 48, [0, 0, 0, 255]), &ViewInfo::default());
//! let menu = pipeline.context_menu();
//! assert_eq!(menu[0].title, "Crosshair");
//! # Ok(())
//! # }
//! ```

use crate::error::{MicroscopeError, Result};
use crate::geometry::Point;
use crate::plugins::plugin::{
    ActionInput, ConfigField, Effect, MenuAction, MenuSection, OverlayShape, Plugin,
    PluginContext, PointerEvent, ViewInfo,
};
use crate::settings::{self, SettingsMap};
use crate::video::Frame;
use tracing::{debug, error, info, trace, warn};

/// Ordered plugins of one view
pub struct PluginPipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Append a plugin
    ///
    /// # Errors
    ///
    /// - `MicroscopeError::AlreadyExists` - a plugin with this name is registered
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();

        if self.has_plugin(&name) {
            return Err(MicroscopeError::AlreadyExists(format!(
                "Plugin '{}' is already registered",
                name
            )));
        }

        debug!(
            "Registering plugin '{}' at position {} (settings={})",
            name,
            self.plugins.len(),
            plugin.settings().is_some()
        );
        self.plugins.push(plugin);
        Ok(())
    }

    /// Remove a plugin and shut it down
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| MicroscopeError::not_found(format!("Plugin '{}' not found", name)))?;

        let mut plugin = self.plugins.remove(index);
        plugin
            .shutdown()
            .map_err(|e| MicroscopeError::plugin(format!("Failed to shutdown plugin '{}': {}", name, e)))?;

        debug!("Plugin '{}' unregistered", name);
        Ok(())
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Plugin names in registration order
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Plugin + 'static)> {
        self.plugins
            .iter_mut()
            .find(|p| p.name() == name)
            .map(|p| p.as_mut())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name() == name)
    }

    /// Run every transform-capable plugin over the frame, in order
    ///
    /// Plugins without the transform capability are not invoked.
    pub fn apply_image(&mut self, frame: Frame, view: &ViewInfo) -> Frame {
        let mut frame = frame;
        for plugin in self.plugins.iter_mut() {
            if let Some(transform) = plugin.as_transform() {
                frame = transform.apply_image(frame, view);
            }
        }
        trace!("Pipeline produced {}x{} frame", frame.width, frame.height);
        frame
    }

    pub fn pointer_down(&mut self, position: Point, view: &ViewInfo) -> Vec<Effect> {
        self.dispatch_pointer(PointerEvent::down(position.x, position.y), view)
    }

    pub fn pointer_move(&mut self, position: Point, view: &ViewInfo) -> Vec<Effect> {
        self.dispatch_pointer(PointerEvent::drag(position.x, position.y), view)
    }

    pub fn pointer_up(&mut self, position: Point, view: &ViewInfo) -> Vec<Effect> {
        self.dispatch_pointer(PointerEvent::up(position.x, position.y), view)
    }

    /// Fan a pointer event out to every plugin
    pub fn dispatch_pointer(&mut self, event: PointerEvent, view: &ViewInfo) -> Vec<Effect> {
        let mut ctx = PluginContext::new(*view);
        for plugin in self.plugins.iter_mut() {
            plugin.handle_pointer(&event, &mut ctx);
        }
        self.execute(None, ctx.into_effects())
    }

    /// One labelled section per plugin, in registration order
    pub fn context_menu(&self) -> Vec<MenuSection> {
        self.plugins
            .iter()
            .map(|plugin| MenuSection {
                title: plugin.name().to_string(),
                items: plugin.context_menu(),
            })
            .collect()
    }

    /// Route a menu activation to one plugin
    ///
    /// Returns the effects the view still has to carry out.
    pub fn trigger(
        &mut self,
        plugin: &str,
        action: &str,
        input: ActionInput,
        view: &ViewInfo,
    ) -> Result<Vec<Effect>> {
        let index = self
            .index_of(plugin)
            .ok_or_else(|| MicroscopeError::not_found(format!("Plugin '{}' not found", plugin)))?;

        debug!("Triggering '{}' on plugin '{}'", action, plugin);

        let mut ctx = PluginContext::new(*view);
        self.plugins[index]
            .trigger(action, input, &mut ctx)
            .map_err(|e| {
                warn!("Plugin '{}' failed to run '{}': {}", plugin, action, e);
                e
            })?;

        Ok(self.execute(Some(index), ctx.into_effects()))
    }

    /// Every plugin's overlay, in registration order
    pub fn overlays(&self) -> Vec<OverlayShape> {
        self.plugins.iter().flat_map(|p| p.overlay()).collect()
    }

    /// Embedded controls as (plugin name, control)
    pub fn controls(&self) -> Vec<(String, MenuAction)> {
        self.plugins
            .iter()
            .filter_map(|p| p.control().map(|c| (p.name().to_string(), c)))
            .collect()
    }

    /// Settings of every settings-capable plugin, by name
    pub fn write_settings(&self) -> Vec<(String, SettingsMap)> {
        self.plugins
            .iter()
            .filter_map(|p| {
                p.settings()
                    .map(|s| (p.name().to_string(), s.write_settings()))
            })
            .collect()
    }

    /// Feed one plugin its stored dictionary
    ///
    /// Returns `false` when no settings-capable plugin has that name.
    pub fn read_settings(&mut self, name: &str, map: &SettingsMap) -> bool {
        match self.get_mut(name).and_then(|p| p.settings_mut()) {
            Some(settings) => {
                settings.read_settings(map);
                true
            }
            None => false,
        }
    }

    /// Configuration fields of every configurable plugin, by name
    pub fn config_forms(&self) -> Vec<(String, Vec<ConfigField>)> {
        self.plugins
            .iter()
            .filter_map(|p| p.config().map(|c| (p.name().to_string(), c.config_fields())))
            .collect()
    }

    /// Apply edited configuration values to one plugin
    ///
    /// # Errors
    ///
    /// - `MicroscopeError::NotFound` - no configurable plugin has that name
    /// - `MicroscopeError::Configuration` - a value is out of range; nothing is applied
    pub fn configure(&mut self, name: &str, values: &SettingsMap) -> Result<()> {
        let config = self
            .get_mut(name)
            .and_then(|p| p.config_mut())
            .ok_or_else(|| {
                MicroscopeError::not_found(format!("Plugin '{}' is not configurable", name))
            })?;

        config.apply_config(values).map_err(|e| {
            warn!("Rejected configuration for '{}': {}", name, e);
            e
        })?;
        debug!("Plugin '{}' configured ({} values)", name, values.len());
        Ok(())
    }

    /// Carry out pipeline-level effects, pass the rest through
    fn execute(&mut self, source: Option<usize>, effects: Vec<Effect>) -> Vec<Effect> {
        let mut remaining = Vec::new();
        for effect in effects {
            match (effect, source) {
                (Effect::SavePreset(name), Some(index)) => {
                    self.save_preset(index, &name);
                    remaining.push(Effect::PersistSettings);
                }
                (Effect::LoadPreset(name), Some(index)) => self.load_preset(index, &name),
                (Effect::SavePreset(_) | Effect::LoadPreset(_), None) => {
                    warn!("Preset effect without an owning plugin ignored");
                }
                (other, _) => remaining.push(other),
            }
        }
        remaining
    }

    /// Snapshot every other plugin into the owner's preset map
    fn save_preset(&mut self, owner: usize, name: &str) {
        let snapshot: SettingsMap = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != owner)
            .filter_map(|(_, p)| {
                p.settings()
                    .map(|s| (p.name().to_string(), s.write_settings().into()))
            })
            .collect();

        let owner_name = self.plugins[owner].name().to_string();
        let Some(presets) = self.plugins[owner].settings_mut() else {
            error!("Plugin '{}' saves presets but has no settings", owner_name);
            return;
        };
        let mut stored = presets.write_settings();
        stored.insert(name.to_string(), snapshot.into());
        presets.read_settings(&stored);

        info!("Saved preset '{}'", name);
    }

    /// Apply the owner's preset to every other plugin it names
    fn load_preset(&mut self, owner: usize, name: &str) {
        let Some(preset) = self.plugins[owner]
            .settings()
            .and_then(|s| settings::get::<SettingsMap>(&s.write_settings(), name))
        else {
            warn!("Preset '{}' not found", name);
            return;
        };

        for (i, plugin) in self.plugins.iter_mut().enumerate() {
            if i == owner {
                continue;
            }
            let Some(values) = preset.get(plugin.name()).and_then(|v| v.as_map()) else {
                continue;
            };
            if let Some(settings) = plugin.settings_mut() {
                settings.read_settings(values);
            }
        }

        info!("Loaded preset '{}'", name);
    }

    /// Shut down every plugin, in reverse registration order
    ///
    /// # Errors
    ///
    /// Returns the first error encountered, but continues shutting down remaining plugins.
    pub fn shutdown_all(&mut self) -> Result<()> {
        info!("Shutting down {} plugins", self.plugins.len());

        let mut errors = Vec::new();
        while let Some(mut plugin) = self.plugins.pop() {
            if let Err(e) = plugin.shutdown() {
                error!("Failed to shutdown plugin '{}': {}", plugin.name(), e);
                errors.push(e);
            }
        }

        if let Some(first_error) = errors.into_iter().next() {
            return Err(first_error);
        }
        Ok(())
    }
}

impl Default for PluginPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::plugin::{ImageTransform, MenuAction, MenuItem, PluginSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records how often each capability is invoked
    struct CountingPlugin {
        name: String,
        transforms: bool,
        applied: Arc<AtomicUsize>,
        pointer: Arc<AtomicUsize>,
        value: i64,
    }

    impl CountingPlugin {
        fn new(name: &str, transforms: bool) -> Self {
            Self {
                name: name.to_string(),
                transforms,
                applied: Arc::new(AtomicUsize::new(0)),
                pointer: Arc::new(AtomicUsize::new(0)),
                value: 0,
            }
        }
    }

    impl ImageTransform for CountingPlugin {
        fn apply_image(&mut self, frame: Frame, _view: &ViewInfo) -> Frame {
            self.applied.fetch_add(1, Ordering::SeqCst);
            frame
        }
    }

    impl PluginSettings for CountingPlugin {
        fn read_settings(&mut self, map: &SettingsMap) {
            self.value = settings::get_or(map, "value", self.value);
        }

        fn write_settings(&self) -> SettingsMap {
            SettingsMap::from([("value".to_string(), self.value.into())])
        }
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {
            self.pointer.fetch_add(1, Ordering::SeqCst);
        }

        fn context_menu(&self) -> Vec<MenuItem> {
            vec![MenuAction::new("noop", &self.name).into()]
        }

        fn trigger(&mut self, _action: &str, _input: ActionInput, _ctx: &mut PluginContext) -> Result<()> {
            Ok(())
        }

        fn as_transform(&mut self) -> Option<&mut dyn ImageTransform> {
            if self.transforms {
                Some(self)
            } else {
                None
            }
        }

        fn settings(&self) -> Option<&dyn PluginSettings> {
            Some(self)
        }

        fn settings_mut(&mut self) -> Option<&mut dyn PluginSettings> {
            Some(self)
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut pipeline = PluginPipeline::new();
        pipeline
            .register(Box::new(CountingPlugin::new("a", false)))
            .unwrap();
        let result = pipeline.register(Box::new(CountingPlugin::new("a", true)));
        assert!(matches!(result, Err(MicroscopeError::AlreadyExists(_))));
        assert_eq!(pipeline.plugin_count(), 1);
    }

    #[test]
    fn test_apply_image_skips_non_transforms() {
        let passive = CountingPlugin::new("passive", false);
        let active = CountingPlugin::new("active", true);
        let passive_count = passive.applied.clone();
        let active_count = active.applied.clone();

        let mut pipeline = PluginPipeline::new();
        pipeline.register(Box::new(passive)).unwrap();
        pipeline.register(Box::new(active)).unwrap();

        pipeline.apply_image(Frame::filled(2, 2, [0; 4]), &ViewInfo::default());
        assert_eq!(passive_count.load(Ordering::SeqCst), 0);
        assert_eq!(active_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pointer_reaches_every_plugin() {
        let a = CountingPlugin::new("a", false);
        let b = CountingPlugin::new("b", true);
        let (ca, cb) = (a.pointer.clone(), b.pointer.clone());

        let mut pipeline = PluginPipeline::new();
        pipeline.register(Box::new(a)).unwrap();
        pipeline.register(Box::new(b)).unwrap();

        let effects = pipeline.dispatch_pointer(PointerEvent::down(0, 0), &ViewInfo::default());
        assert!(effects.is_empty());
        assert_eq!(ca.load(Ordering::SeqCst), 1);
        assert_eq!(cb.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_context_menu_order() {
        let mut pipeline = PluginPipeline::new();
        for name in ["z", "a", "m"] {
            pipeline
                .register(Box::new(CountingPlugin::new(name, false)))
                .unwrap();
        }
        let titles: Vec<String> = pipeline.context_menu().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["z", "a", "m"]);
        assert_eq!(pipeline.plugin_names(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_settings_by_name() {
        let mut pipeline = PluginPipeline::new();
        pipeline
            .register(Box::new(CountingPlugin::new("a", false)))
            .unwrap();

        let map = SettingsMap::from([("value".to_string(), 42i64.into())]);
        assert!(pipeline.read_settings("a", &map));
        assert!(!pipeline.read_settings("missing", &map));
        assert_eq!(pipeline.write_settings(), vec![("a".to_string(), map)]);
    }

    #[test]
    fn test_trigger_unknown_plugin() {
        let mut pipeline = PluginPipeline::new();
        let result = pipeline.trigger("nope", "x", ActionInput::None, &ViewInfo::default());
        assert!(matches!(result, Err(MicroscopeError::NotFound(_))));
    }

    #[test]
    fn test_unregister_and_shutdown_all() {
        let mut pipeline = PluginPipeline::new();
        pipeline
            .register(Box::new(CountingPlugin::new("a", false)))
            .unwrap();
        pipeline
            .register(Box::new(CountingPlugin::new("b", false)))
            .unwrap();

        pipeline.unregister("a").unwrap();
        assert!(!pipeline.has_plugin("a"));
        assert!(pipeline.unregister("a").is_err());

        pipeline.shutdown_all().unwrap();
        assert_eq!(pipeline.plugin_count(), 0);
    }

    #[test]
    fn test_configure_routes_by_name() {
        use crate::geometry::Rgb;
        use crate::plugins::{CrosshairPlugin, CROSSHAIR_PLUGIN};

        let mut pipeline = PluginPipeline::new();
        pipeline
            .register(Box::new(CountingPlugin::new("counter", false)))
            .unwrap();
        pipeline.register(Box::new(CrosshairPlugin::new())).unwrap();

        let forms = pipeline.config_forms();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].0, CROSSHAIR_PLUGIN);

        let values = SettingsMap::from([("color".to_string(), Rgb::RED.into())]);
        pipeline.configure(CROSSHAIR_PLUGIN, &values).unwrap();
        let written = pipeline.write_settings();
        let crosshair = &written.iter().find(|(name, _)| name == CROSSHAIR_PLUGIN).unwrap().1;
        assert_eq!(settings::get::<Rgb>(crosshair, "color"), Some(Rgb::RED));

        assert!(matches!(
            pipeline.configure("counter", &values),
            Err(MicroscopeError::NotFound(_))
        ));
        assert!(matches!(
            pipeline.configure("missing", &values),
            Err(MicroscopeError::NotFound(_))
        ));
    }
}
