//! Plugin trait definition
//!
//! Defines the interface that all overlay plugins must implement, plus the
//! optional capability traits a plugin may opt into.
//!
//! ## Plugin Architecture
//!
//! Plugins in `microscope-core` handle:
//! - Input handling (pointer down/move/up in displayed-frame coordinates)
//! - Context-menu contributions, described as data
//! - Overlay shapes, described as data
//!
//! and optionally:
//! - Image transforms ([`ImageTransform`])
//! - Persisted settings ([`PluginSettings`])
//! - User-editable configuration ([`PluginConfig`])
//!
//! The host handles rendering of frames, overlays and menus.
//!
//! ## Example
//!
//! ```rust
//! use microscope_core::error::Result;
//! use microscope_core::plugins::{ActionInput, MenuItem, Plugin, PluginContext, PointerEvent};
//!
//! struct MyPlugin;
//!
//! impl Plugin for MyPlugin {
//!     fn name(&self) -> &str {
//!         "Mine"
//!     }
//!
//!     fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {}
//!
//!     fn context_menu(&self) -> Vec<MenuItem> {
//!         Vec::new()
//!     }
//!
//!     fn trigger(&mut self, _action: &str, _input: ActionInput, _ctx: &mut PluginContext) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::{MicroscopeError, Result};
use crate::geometry::{Point, Rect, Rgb, Size};
use crate::settings::{FromSetting, SettingValue, SettingsMap};
use crate::video::Frame;

/// Phase of a pointer interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// Mouse button pressed during the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    None,
    Left,
    Right,
    Middle,
}

/// A pointer event in displayed-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub position: Point,
    pub button: PointerButton,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, position: Point, button: PointerButton) -> Self {
        Self {
            kind,
            position,
            button,
        }
    }

    pub fn down(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Down, Point::new(x, y), PointerButton::Left)
    }

    pub fn drag(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Move, Point::new(x, y), PointerButton::Left)
    }

    pub fn up(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Up, Point::new(x, y), PointerButton::Left)
    }

    pub fn is_left(&self) -> bool {
        self.button == PointerButton::Left
    }
}

/// Pointer cursor shape requested by a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Crosshair,
}

/// Facts about the owning view a plugin may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewInfo {
    /// Size of the frame currently on screen
    pub display_size: Size,
    /// Camera-level divisions (distinct from the grid plugin's own)
    pub x_divs: u32,
    pub y_divs: u32,
    /// Thumbnail view inside a grid rather than the main view
    pub viewport: bool,
}

impl Default for ViewInfo {
    fn default() -> Self {
        Self {
            display_size: Size::default(),
            x_divs: 5,
            y_divs: 5,
            viewport: true,
        }
    }
}

/// Side effects a plugin asks its view or pipeline to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write the view's settings to the store
    PersistSettings,
    /// Start or stop the view's acquisition
    SetAcquisition(bool),
    SetCursor(Cursor),
    /// Snapshot every other plugin under this name (handled by the pipeline)
    SavePreset(String),
    /// Feed every other plugin its entry of this preset (handled by the pipeline)
    LoadPreset(String),
}

/// Per-call context handed to plugin hooks
#[derive(Debug, Default)]
pub struct PluginContext {
    view: ViewInfo,
    effects: Vec<Effect>,
}

impl PluginContext {
    pub fn new(view: ViewInfo) -> Self {
        Self {
            view,
            effects: Vec::new(),
        }
    }

    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    pub fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

/// What a menu action asks the user for before triggering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputKind {
    #[default]
    None,
    Text { prompt: String },
    Color,
}

/// User input accompanying a triggered action
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionInput {
    #[default]
    None,
    Text(String),
    Color(Rgb),
}

/// One triggerable menu entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuAction {
    /// Identifier passed back to [`Plugin::trigger`]
    pub id: String,
    pub label: String,
    pub checkable: bool,
    pub checked: bool,
    pub input: InputKind,
}

impl MenuAction {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            checkable: false,
            checked: false,
            input: InputKind::None,
        }
    }

    /// Builder: make checkable with the given state
    pub fn checked(mut self, checked: bool) -> Self {
        self.checkable = true;
        self.checked = checked;
        self
    }

    /// Builder: require input before triggering
    pub fn with_input(mut self, input: InputKind) -> Self {
        self.input = input;
        self
    }
}

/// Context-menu entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    Action(MenuAction),
    Submenu { label: String, items: Vec<MenuItem> },
}

impl MenuItem {
    pub fn as_action(&self) -> Option<&MenuAction> {
        match self {
            MenuItem::Action(action) => Some(action),
            MenuItem::Submenu { .. } => None,
        }
    }

    /// Depth-first search for an action by id
    pub fn find(&self, id: &str) -> Option<&MenuAction> {
        match self {
            MenuItem::Action(action) if action.id == id => Some(action),
            MenuItem::Action(_) => None,
            MenuItem::Submenu { items, .. } => items.iter().find_map(|item| item.find(id)),
        }
    }
}

impl From<MenuAction> for MenuItem {
    fn from(action: MenuAction) -> Self {
        MenuItem::Action(action)
    }
}

/// A labelled group of menu entries, one per plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSection {
    pub title: String,
    pub items: Vec<MenuItem>,
}

/// Overlay primitive in displayed-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayShape {
    Line { from: Point, to: Point, color: Rgb },
    Rect { rect: Rect, color: Rgb },
    /// Rubber-band style selection outline
    Selection { rect: Rect },
}

/// Plugin trait for camera-view plugins
///
/// All plugins implement the required input and menu hooks; image
/// transforms and settings are separate capability traits exposed through
/// the accessor methods.
///
/// ## Lifecycle
///
/// 1. **Construction**: one instance per view, never shared
/// 2. **Registration**: added to the view's [`PluginPipeline`](crate::plugins::PluginPipeline)
/// 3. **Operation**: hooks are called on the interactive thread
/// 4. **Shutdown**: `shutdown()` releases resources when the view is torn down
pub trait Plugin: Send {
    /// Stable plugin name, also its settings group
    fn name(&self) -> &str;

    /// Handle a pointer event
    fn handle_pointer(&mut self, event: &PointerEvent, ctx: &mut PluginContext);

    /// Entries for the view's context menu
    fn context_menu(&self) -> Vec<MenuItem>;

    /// Run a menu action by id
    fn trigger(&mut self, action: &str, input: ActionInput, ctx: &mut PluginContext) -> Result<()>;

    /// Shapes to draw over the frame
    fn overlay(&self) -> Vec<OverlayShape> {
        Vec::new()
    }

    /// Control embedded in the view itself
    fn control(&self) -> Option<MenuAction> {
        None
    }

    fn as_transform(&mut self) -> Option<&mut dyn ImageTransform> {
        None
    }

    fn settings(&self) -> Option<&dyn PluginSettings> {
        None
    }

    fn settings_mut(&mut self) -> Option<&mut dyn PluginSettings> {
        None
    }

    fn config(&self) -> Option<&dyn PluginConfig> {
        None
    }

    fn config_mut(&mut self) -> Option<&mut dyn PluginConfig> {
        None
    }

    /// Release resources
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Image-transform capability
pub trait ImageTransform {
    /// Transform a frame; the returned frame is handed to the next plugin
    fn apply_image(&mut self, frame: Frame, view: &ViewInfo) -> Frame;
}

/// Settings capability
pub trait PluginSettings {
    /// Apply a stored dictionary; missing keys keep their current value
    fn read_settings(&mut self, settings: &SettingsMap);

    fn write_settings(&self) -> SettingsMap;
}

/// Kind of an editable configuration field, with its accepted range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Color,
    Bool,
    Integer { min: i64, max: i64 },
    /// Both coordinates share the range
    Point { min: i32, max: i32 },
}

/// One editable field of a plugin's configuration form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    /// Key used in the values passed to [`PluginConfig::apply_config`]
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    /// Current value
    pub value: SettingValue,
}

impl ConfigField {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        kind: FieldKind,
        value: impl Into<SettingValue>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            value: value.into(),
        }
    }

    /// Check that `value` has this field's type and lies in its range
    pub fn check(&self, value: &SettingValue) -> Result<()> {
        let valid = match self.kind {
            FieldKind::Color => Rgb::from_setting(value).is_some(),
            FieldKind::Bool => bool::from_setting(value).is_some(),
            FieldKind::Integer { min, max } => {
                i64::from_setting(value).is_some_and(|v| (min..=max).contains(&v))
            }
            FieldKind::Point { min, max } => Point::from_setting(value)
                .is_some_and(|p| (min..=max).contains(&p.x) && (min..=max).contains(&p.y)),
        };

        if valid {
            Ok(())
        } else {
            Err(MicroscopeError::configuration(format!(
                "Invalid value for '{}': {:?}",
                self.label, value
            )))
        }
    }
}

/// Configuration capability, edited by the host's plugin configuration form
pub trait PluginConfig {
    /// Fields with their current values
    fn config_fields(&self) -> Vec<ConfigField>;

    /// Apply edited values; keys left out keep their current value
    ///
    /// Nothing is applied when any value is out of range or of the wrong type.
    fn apply_config(&mut self, values: &SettingsMap) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPlugin {
        name: String,
        pointer_events: Vec<PointerKind>,
        shutdown: bool,
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle_pointer(&mut self, event: &PointerEvent, _ctx: &mut PluginContext) {
            self.pointer_events.push(event.kind);
        }

        fn context_menu(&self) -> Vec<MenuItem> {
            vec![MenuAction::new("go", "Go").into()]
        }

        fn trigger(&mut self, _action: &str, _input: ActionInput, ctx: &mut PluginContext) -> Result<()> {
            ctx.emit(Effect::PersistSettings);
            Ok(())
        }

        fn shutdown(&mut self) -> Result<()> {
            self.shutdown = true;
            Ok(())
        }
    }

    #[test]
    fn test_plugin_trait_defaults() {
        let mut plugin = TestPlugin {
            name: "test".to_string(),
            pointer_events: Vec::new(),
            shutdown: false,
        };

        assert_eq!(plugin.name(), "test");
        assert!(plugin.as_transform().is_none());
        assert!(plugin.settings().is_none());
        assert!(plugin.config().is_none());
        assert!(plugin.overlay().is_empty());
        assert!(plugin.control().is_none());

        plugin.shutdown().unwrap();
        assert!(plugin.shutdown);
    }

    #[test]
    fn test_context_collects_effects() {
        let mut plugin = TestPlugin {
            name: "test".to_string(),
            pointer_events: Vec::new(),
            shutdown: false,
        };
        let mut ctx = PluginContext::new(ViewInfo::default());

        plugin.handle_pointer(&PointerEvent::down(1, 2), &mut ctx);
        plugin.trigger("go", ActionInput::None, &mut ctx).unwrap();

        assert_eq!(plugin.pointer_events, vec![PointerKind::Down]);
        assert_eq!(ctx.into_effects(), vec![Effect::PersistSettings]);
    }

    #[test]
    fn test_config_field_ranges() {
        let length = ConfigField::new("len", "Length", FieldKind::Integer { min: 1, max: 10 }, 5i64);
        assert!(length.check(&SettingValue::Int(10)).is_ok());
        assert!(length.check(&SettingValue::Str("3".into())).is_ok());
        assert!(length.check(&SettingValue::Int(0)).is_err());
        assert!(length.check(&SettingValue::Bool(true)).is_err());

        let pos = ConfigField::new("pos", "Position", FieldKind::Point { min: -5, max: 5 }, Point::new(0, 0));
        assert!(pos.check(&Point::new(-5, 5).into()).is_ok());
        assert!(matches!(
            pos.check(&Point::new(6, 0).into()),
            Err(MicroscopeError::Configuration(_))
        ));

        let color = ConfigField::new("color", "Color", FieldKind::Color, Rgb::GREEN);
        assert!(color.check(&"#102030".into()).is_ok());
        assert!(color.check(&"green-ish".into()).is_err());
    }

    #[test]
    fn test_menu_find() {
        let menu = MenuItem::Submenu {
            label: "Presets".into(),
            items: vec![
                MenuAction::new("preset:A", "A").checked(true).into(),
                MenuAction::new("preset:B", "B").checked(false).into(),
            ],
        };

        let action = menu.find("preset:A").unwrap();
        assert!(action.checkable && action.checked);
        assert!(menu.find("preset:C").is_none());
        assert!(menu.as_action().is_none());
    }
}
