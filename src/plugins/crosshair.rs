//! Crosshair Plugin
//!
//! Draws a horizontal and a vertical line through a point of the view,
//! by default its centre.
//!
//! ## Settings
//!
//! | Key               | Type    | Default   |
//! |-------------------|---------|-----------|
//! | `color`           | color   | `#00ff00` |
//! | `pos`             | point   | view centre |
//! | `hor_len`         | integer | 100       |
//! | `vert_len`        | integer | 100       |
//! | `visible`         | bool    | true      |
//! | `always_centered` | bool    | true      |
//!
//! The same keys are editable through [`PluginConfig`]; lengths range over
//! 1..=1000 and position coordinates over -10000..=10000.

use crate::error::{MicroscopeError, Result};
use crate::geometry::{Point, Rgb};
use crate::plugins::plugin::{
    ActionInput, ConfigField, FieldKind, ImageTransform, InputKind, MenuAction, MenuItem,
    OverlayShape, Plugin, PluginConfig, PluginContext, PluginSettings, PointerEvent, ViewInfo,
};
use crate::settings::{self, SettingsMap};
use crate::video::Frame;
use tracing::{debug, trace};

/// Plugin name and settings group
pub const CROSSHAIR_PLUGIN: &str = "Crosshair";

const ACTION_VISIBLE: &str = "visible";
const ACTION_COLOR: &str = "crosshair_color";
const DEFAULT_LENGTH: i32 = 100;
const LENGTH_RANGE: (i64, i64) = (1, 1000);
const POSITION_RANGE: (i32, i32) = (-10_000, 10_000);

/// Crosshair overlay
pub struct CrosshairPlugin {
    position: Point,
    horizontal_length: i32,
    vertical_length: i32,
    color: Rgb,
    always_centered: bool,
    visible: bool,
    /// Cached line pair, regenerated by `repaint`
    lines: [OverlayShape; 2],
    redraws: u64,
}

impl CrosshairPlugin {
    pub fn new() -> Self {
        let mut plugin = Self {
            position: Point::default(),
            horizontal_length: DEFAULT_LENGTH,
            vertical_length: DEFAULT_LENGTH,
            color: Rgb::GREEN,
            always_centered: true,
            visible: true,
            lines: [OverlayShape::Selection {
                rect: Default::default(),
            }; 2],
            redraws: 0,
        };
        plugin.repaint();
        plugin
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
        self.repaint();
    }

    /// Horizontal and vertical line lengths
    pub fn lengths(&self) -> (i32, i32) {
        (self.horizontal_length, self.vertical_length)
    }

    pub fn set_lengths(&mut self, horizontal: i32, vertical: i32) {
        self.horizontal_length = horizontal;
        self.vertical_length = vertical;
        self.repaint();
    }

    pub fn is_always_centered(&self) -> bool {
        self.always_centered
    }

    /// When set, the position follows the view centre on every image update
    pub fn set_always_centered(&mut self, always_centered: bool) {
        self.always_centered = always_centered;
    }

    /// Move the crossing point; overridden on the next image update while
    /// always centred
    pub fn set_position(&mut self, position: Point) {
        self.position = position;
        self.repaint();
    }

    /// Number of times the line pair was regenerated
    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    fn repaint(&mut self) {
        let half_h = self.horizontal_length / 2;
        let half_v = self.vertical_length / 2;
        let Point { x, y } = self.position;

        self.lines = [
            OverlayShape::Line {
                from: Point::new(x - half_h, y),
                to: Point::new(x + half_h, y),
                color: self.color,
            },
            OverlayShape::Line {
                from: Point::new(x, y + half_v),
                to: Point::new(x, y - half_v),
                color: self.color,
            },
        ];
        self.redraws += 1;
        trace!("Crosshair redrawn at ({}, {})", x, y);
    }
}

impl Default for CrosshairPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransform for CrosshairPlugin {
    /// Pass-through; follows the view centre when `always_centered`
    fn apply_image(&mut self, frame: Frame, view: &ViewInfo) -> Frame {
        if self.always_centered {
            let center = view.display_size.center();
            if center != self.position {
                self.position = center;
                self.repaint();
            }
        }
        frame
    }
}

impl PluginSettings for CrosshairPlugin {
    fn read_settings(&mut self, map: &SettingsMap) {
        self.color = settings::get_or(map, "color", self.color);
        self.position = settings::get_or(map, "pos", self.position);
        self.horizontal_length = settings::get_or(map, "hor_len", self.horizontal_length);
        self.vertical_length = settings::get_or(map, "vert_len", self.vertical_length);
        self.visible = settings::get_or(map, "visible", self.visible);
        self.always_centered = settings::get_or(map, "always_centered", true);
        self.repaint();
    }

    fn write_settings(&self) -> SettingsMap {
        SettingsMap::from([
            ("color".to_string(), self.color.into()),
            ("pos".to_string(), self.position.into()),
            ("hor_len".to_string(), self.horizontal_length.into()),
            ("vert_len".to_string(), self.vertical_length.into()),
            ("visible".to_string(), self.visible.into()),
            ("always_centered".to_string(), self.always_centered.into()),
        ])
    }
}

impl PluginConfig for CrosshairPlugin {
    fn config_fields(&self) -> Vec<ConfigField> {
        let (min_len, max_len) = LENGTH_RANGE;
        let (min_pos, max_pos) = POSITION_RANGE;
        let length = FieldKind::Integer {
            min: min_len,
            max: max_len,
        };
        vec![
            ConfigField::new("color", "Color", FieldKind::Color, self.color),
            ConfigField::new("hor_len", "Horizontal length", length, self.horizontal_length),
            ConfigField::new("vert_len", "Vertical length", length, self.vertical_length),
            ConfigField::new(
                "always_centered",
                "Always centered",
                FieldKind::Bool,
                self.always_centered,
            ),
            ConfigField::new(
                "pos",
                "Position",
                FieldKind::Point {
                    min: min_pos,
                    max: max_pos,
                },
                self.position,
            ),
        ]
    }

    fn apply_config(&mut self, values: &SettingsMap) -> Result<()> {
        for field in self.config_fields() {
            if let Some(value) = values.get(&field.key) {
                field.check(value)?;
            }
        }

        self.color = settings::get_or(values, "color", self.color);
        self.horizontal_length = settings::get_or(values, "hor_len", self.horizontal_length);
        self.vertical_length = settings::get_or(values, "vert_len", self.vertical_length);
        self.always_centered = settings::get_or(values, "always_centered", self.always_centered);
        self.position = settings::get_or(values, "pos", self.position);
        debug!(
            "Crosshair configured: {}x{} at ({}, {}), centered={}",
            self.horizontal_length,
            self.vertical_length,
            self.position.x,
            self.position.y,
            self.always_centered
        );
        self.repaint();
        Ok(())
    }
}

impl Plugin for CrosshairPlugin {
    fn name(&self) -> &str {
        CROSSHAIR_PLUGIN
    }

    fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {}

    fn context_menu(&self) -> Vec<MenuItem> {
        vec![
            MenuAction::new(ACTION_VISIBLE, "Visible")
                .checked(self.visible)
                .into(),
            MenuAction::new(ACTION_COLOR, "Change Color")
                .with_input(InputKind::Color)
                .into(),
        ]
    }

    fn trigger(&mut self, action: &str, input: ActionInput, _ctx: &mut PluginContext) -> Result<()> {
        match action {
            ACTION_VISIBLE => {
                self.visible = !self.visible;
                debug!("Crosshair visible: {}", self.visible);
                Ok(())
            }
            ACTION_COLOR => match input {
                ActionInput::Color(color) => {
                    self.set_color(color);
                    Ok(())
                }
                _ => Err(MicroscopeError::plugin("Changing the crosshair color needs a color")),
            },
            other => Err(MicroscopeError::plugin(format!(
                "Unknown crosshair action '{}'",
                other
            ))),
        }
    }

    fn overlay(&self) -> Vec<OverlayShape> {
        if self.visible {
            self.lines.to_vec()
        } else {
            Vec::new()
        }
    }

    fn as_transform(&mut self) -> Option<&mut dyn ImageTransform> {
        Some(self)
    }

    fn settings(&self) -> Option<&dyn PluginSettings> {
        Some(self)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn PluginSettings> {
        Some(self)
    }

    fn config(&self) -> Option<&dyn PluginConfig> {
        Some(self)
    }

    fn config_mut(&mut self) -> Option<&mut dyn PluginConfig> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::settings::SettingValue;

    fn view(width: u32, height: u32) -> ViewInfo {
        ViewInfo {
            display_size: Size::new(width, height),
            ..ViewInfo::default()
        }
    }

    #[test]
    fn test_recenters_only_on_change() {
        let mut plugin = CrosshairPlugin::new();
        let before = plugin.redraw_count();
        let frame = Frame::filled(4, 4, [1, 2, 3, 255]);

        let out = plugin.apply_image(frame.clone(), &view(200, 100));
        assert_eq!(out, frame);
        assert_eq!(plugin.position(), Point::new(100, 50));
        assert_eq!(plugin.redraw_count(), before + 1);

        plugin.apply_image(frame.clone(), &view(200, 100));
        assert_eq!(plugin.redraw_count(), before + 1);

        plugin.apply_image(frame, &view(300, 100));
        assert_eq!(plugin.redraw_count(), before + 2);
    }

    #[test]
    fn test_overlay_lines() {
        let mut plugin = CrosshairPlugin::new();
        plugin.apply_image(Frame::filled(1, 1, [0; 4]), &view(200, 200));

        let shapes = plugin.overlay();
        assert_eq!(
            shapes[0],
            OverlayShape::Line {
                from: Point::new(50, 100),
                to: Point::new(150, 100),
                color: Rgb::GREEN,
            }
        );
        assert_eq!(shapes.len(), 2);
    }

    #[test]
    fn test_visible_toggle() {
        let mut plugin = CrosshairPlugin::new();
        let mut ctx = PluginContext::new(ViewInfo::default());

        let menu = plugin.context_menu();
        let action = menu[0].find(ACTION_VISIBLE).unwrap();
        assert!(action.checkable && action.checked);

        plugin.trigger(ACTION_VISIBLE, ActionInput::None, &mut ctx).unwrap();
        assert!(!plugin.is_visible());
        assert!(plugin.overlay().is_empty());
        assert!(plugin.trigger("bogus", ActionInput::None, &mut ctx).is_err());
    }

    #[test]
    fn test_settings_accept_string_booleans() {
        let mut plugin = CrosshairPlugin::new();
        let map = SettingsMap::from([
            ("visible".to_string(), "False".into()),
            ("always_centered".to_string(), "false".into()),
            ("pos".to_string(), Point::new(10, 20).into()),
            ("hor_len".to_string(), 40i64.into()),
        ]);
        plugin.read_settings(&map);

        assert!(!plugin.is_visible());
        plugin.apply_image(Frame::filled(1, 1, [0; 4]), &view(500, 500));
        assert_eq!(plugin.position(), Point::new(10, 20));

        let written = plugin.write_settings();
        assert_eq!(settings::get::<bool>(&written, "always_centered"), Some(false));
        assert_eq!(settings::get::<i32>(&written, "hor_len"), Some(40));
    }

    #[test]
    fn test_color_action() {
        let mut plugin = CrosshairPlugin::new();
        let mut ctx = PluginContext::new(ViewInfo::default());

        let menu = plugin.context_menu();
        assert_eq!(menu[1].find(ACTION_COLOR).unwrap().input, InputKind::Color);

        assert!(plugin.trigger(ACTION_COLOR, ActionInput::None, &mut ctx).is_err());
        assert_eq!(plugin.color(), Rgb::GREEN);

        let before = plugin.redraw_count();
        plugin
            .trigger(ACTION_COLOR, ActionInput::Color(Rgb::RED), &mut ctx)
            .unwrap();
        assert_eq!(plugin.color(), Rgb::RED);
        assert_eq!(plugin.redraw_count(), before + 1);
        assert!(plugin
            .overlay()
            .iter()
            .all(|shape| matches!(shape, OverlayShape::Line { color, .. } if *color == Rgb::RED)));
    }

    #[test]
    fn test_setters_redraw_lines() {
        let mut plugin = CrosshairPlugin::new();
        plugin.set_always_centered(false);
        plugin.set_position(Point::new(30, 40));
        plugin.set_lengths(20, 60);

        // A fixed crosshair ignores the view centre
        plugin.apply_image(Frame::filled(1, 1, [0; 4]), &view(500, 500));
        assert_eq!(plugin.position(), Point::new(30, 40));
        assert_eq!(plugin.lengths(), (20, 60));
        assert_eq!(
            plugin.overlay(),
            vec![
                OverlayShape::Line {
                    from: Point::new(20, 40),
                    to: Point::new(40, 40),
                    color: Rgb::GREEN,
                },
                OverlayShape::Line {
                    from: Point::new(30, 70),
                    to: Point::new(30, 10),
                    color: Rgb::GREEN,
                },
            ]
        );
    }

    #[test]
    fn test_config_form_applies_values() {
        let mut plugin = CrosshairPlugin::new();
        let fields = plugin.config_fields();
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["color", "hor_len", "vert_len", "always_centered", "pos"]);
        assert_eq!(fields[1].value, SettingValue::Int(100));

        let values = SettingsMap::from([
            ("color".to_string(), Rgb::new(0, 0, 255).into()),
            ("hor_len".to_string(), 300i64.into()),
            ("always_centered".to_string(), false.into()),
            ("pos".to_string(), Point::new(-20, 15).into()),
        ]);
        plugin.apply_config(&values).unwrap();

        assert_eq!(plugin.color(), Rgb::new(0, 0, 255));
        assert_eq!(plugin.lengths(), (300, 100));
        assert!(!plugin.is_always_centered());
        assert_eq!(plugin.position(), Point::new(-20, 15));

        // Written settings carry the configured values
        let written = plugin.write_settings();
        assert_eq!(settings::get::<i32>(&written, "hor_len"), Some(300));
        assert_eq!(settings::get::<Point>(&written, "pos"), Some(Point::new(-20, 15)));
    }

    #[test]
    fn test_config_rejects_out_of_range() {
        let mut plugin = CrosshairPlugin::new();
        let values = SettingsMap::from([
            ("color".to_string(), Rgb::RED.into()),
            ("vert_len".to_string(), 0i64.into()),
        ]);

        assert!(matches!(
            plugin.apply_config(&values),
            Err(MicroscopeError::Configuration(_))
        ));
        // Nothing applied, not even the valid color
        assert_eq!(plugin.color(), Rgb::GREEN);
        assert_eq!(plugin.lengths(), (100, 100));

        let far = SettingsMap::from([("pos".to_string(), Point::new(20_000, 0).into())]);
        assert!(plugin.apply_config(&far).is_err());
    }
}
