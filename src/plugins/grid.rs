//! Grid Plugin
//!
//! Lets the user drag out a rectangle and overlays it split into
//! `x_divs x y_divs` equal cells.
//!
//! ## States
//!
//! - **Idle**: no grid, menu offers "Draw grid"
//! - **Drawing**: armed; pointer down records the start corner, moves update
//!   the live selection, pointer up finalizes it
//! - **Defined**: grid drawn; selector, grid and color can be changed
//!
//! The divisions are the plugin's own and independent of the camera's.

use crate::error::{MicroscopeError, Result};
use crate::geometry::{Point, Rect, Rgb};
use crate::plugins::plugin::{
    ActionInput, InputKind, MenuAction, MenuItem, OverlayShape, Plugin, PluginContext,
    PluginSettings, PointerEvent, PointerKind,
};
use crate::settings::{self, SettingsMap};
use tracing::{debug, info};

/// Plugin name and settings group
pub const GRID_PLUGIN: &str = "Grid";

const ACTION_DRAW: &str = "draw_grid";
const ACTION_TOGGLE_SELECTOR: &str = "toggle_selector";
const ACTION_TOGGLE_GRID: &str = "toggle_grid";
const ACTION_COLOR: &str = "grid_color";

const DEFAULT_DIVS: u32 = 5;

/// Interaction state of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Idle,
    Drawing,
    Defined,
}

/// Measurement grid overlay
pub struct GridPlugin {
    state: GridState,
    start: Point,
    end: Point,
    /// Pointer went down while Drawing
    dragging: bool,
    grid_hidden: bool,
    selector_hidden: bool,
    color: Rgb,
    x_divs: u32,
    y_divs: u32,
}

impl GridPlugin {
    pub fn new() -> Self {
        Self {
            state: GridState::Idle,
            start: Point::new(0, 0),
            end: Point::new(1, 1),
            dragging: false,
            grid_hidden: false,
            selector_hidden: false,
            color: Rgb::GREEN,
            x_divs: DEFAULT_DIVS,
            y_divs: DEFAULT_DIVS,
        }
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn is_defined(&self) -> bool {
        self.state == GridState::Defined
    }

    pub fn is_grid_hidden(&self) -> bool {
        self.grid_hidden
    }

    pub fn is_selector_hidden(&self) -> bool {
        self.selector_hidden
    }

    /// Grid rectangle, normalized
    pub fn rect(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }

    pub fn divisions(&self) -> (u32, u32) {
        (self.x_divs, self.y_divs)
    }

    /// Set the grid's own divisions; zero is raised to one
    pub fn set_divisions(&mut self, x_divs: u32, y_divs: u32) {
        self.x_divs = x_divs.max(1);
        self.y_divs = y_divs.max(1);
    }

    /// Cells of the defined grid, row-major; empty unless Defined
    pub fn cells(&self) -> Vec<Rect> {
        if self.is_defined() {
            self.rect().divide(self.x_divs, self.y_divs)
        } else {
            Vec::new()
        }
    }

    /// Outline plus inner division lines of the current rectangle
    fn grid_shapes(&self) -> Vec<OverlayShape> {
        let rect = self.rect();
        let color = self.color;
        let mut shapes = vec![OverlayShape::Rect { rect, color }];

        let inc_x = rect.width as f64 / self.x_divs as f64;
        let inc_y = rect.height as f64 / self.y_divs as f64;
        let (x1, y1) = (rect.x, rect.y);
        let (x2, y2) = (rect.x + rect.width, rect.y + rect.height);

        for i in 1..self.x_divs {
            let x = x1 + (i as f64 * inc_x) as i32;
            shapes.push(OverlayShape::Line {
                from: Point::new(x, y1),
                to: Point::new(x, y2),
                color,
            });
        }
        for j in 1..self.y_divs {
            let y = y1 + (j as f64 * inc_y) as i32;
            shapes.push(OverlayShape::Line {
                from: Point::new(x1, y),
                to: Point::new(x2, y),
                color,
            });
        }
        shapes
    }
}

impl Default for GridPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginSettings for GridPlugin {
    fn read_settings(&mut self, map: &SettingsMap) {
        let defined = settings::get_or(map, "grid_defined", self.is_defined());
        self.start = settings::get_or(map, "start", self.start);
        self.end = settings::get_or(map, "end", self.end);
        self.grid_hidden = settings::get_or(map, "grid_hidden", self.grid_hidden);
        self.selector_hidden = settings::get_or(map, "selector_hidden", self.selector_hidden);
        self.color = settings::get_or(map, "color", self.color);
        self.set_divisions(
            settings::get_or(map, "xDivs", self.x_divs),
            settings::get_or(map, "yDivs", self.y_divs),
        );
        self.state = if defined {
            GridState::Defined
        } else {
            GridState::Idle
        };
        self.dragging = false;
    }

    fn write_settings(&self) -> SettingsMap {
        SettingsMap::from([
            ("grid_defined".to_string(), self.is_defined().into()),
            ("grid_hidden".to_string(), self.grid_hidden.into()),
            ("selector_hidden".to_string(), self.selector_hidden.into()),
            ("start".to_string(), self.start.into()),
            ("end".to_string(), self.end.into()),
            ("color".to_string(), self.color.into()),
            ("xDivs".to_string(), self.x_divs.into()),
            ("yDivs".to_string(), self.y_divs.into()),
        ])
    }
}

impl Plugin for GridPlugin {
    fn name(&self) -> &str {
        GRID_PLUGIN
    }

    fn handle_pointer(&mut self, event: &PointerEvent, _ctx: &mut PluginContext) {
        if self.state != GridState::Drawing {
            return;
        }

        match event.kind {
            PointerKind::Down if event.is_left() => {
                self.start = event.position;
                self.end = event.position;
                self.dragging = true;
            }
            PointerKind::Move if self.dragging && event.is_left() => {
                self.end = event.position;
            }
            PointerKind::Up if self.dragging => {
                self.end = event.position;
                self.dragging = false;
                if self.rect().is_empty() {
                    debug!("Empty grid selection, cancelling");
                    self.state = GridState::Idle;
                } else {
                    let rect = self.rect();
                    info!(
                        "Grid defined at ({}, {}) {}x{}",
                        rect.x, rect.y, rect.width, rect.height
                    );
                    self.state = GridState::Defined;
                }
            }
            _ => {}
        }
    }

    fn context_menu(&self) -> Vec<MenuItem> {
        if self.is_defined() {
            vec![
                MenuAction::new(ACTION_TOGGLE_SELECTOR, "Hide/Show selector").into(),
                MenuAction::new(ACTION_TOGGLE_GRID, "Hide/Show Grid").into(),
                MenuAction::new(ACTION_COLOR, "Change Grid color")
                    .with_input(InputKind::Color)
                    .into(),
            ]
        } else {
            vec![MenuAction::new(ACTION_DRAW, "Draw grid").into()]
        }
    }

    fn trigger(&mut self, action: &str, input: ActionInput, _ctx: &mut PluginContext) -> Result<()> {
        match action {
            ACTION_DRAW => {
                self.state = GridState::Drawing;
                self.dragging = false;
            }
            ACTION_TOGGLE_SELECTOR => self.selector_hidden = !self.selector_hidden,
            ACTION_TOGGLE_GRID => self.grid_hidden = !self.grid_hidden,
            ACTION_COLOR => match input {
                ActionInput::Color(color) => self.color = color,
                _ => {
                    return Err(MicroscopeError::plugin("Grid color change needs a color"));
                }
            },
            other => {
                return Err(MicroscopeError::plugin(format!(
                    "Unknown grid action '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    fn overlay(&self) -> Vec<OverlayShape> {
        match self.state {
            GridState::Idle => Vec::new(),
            GridState::Drawing if self.dragging => {
                let mut shapes = self.grid_shapes();
                shapes.push(OverlayShape::Selection { rect: self.rect() });
                shapes
            }
            GridState::Drawing => Vec::new(),
            GridState::Defined => {
                let mut shapes = if self.grid_hidden {
                    Vec::new()
                } else {
                    self.grid_shapes()
                };
                if !self.selector_hidden {
                    shapes.push(OverlayShape::Selection { rect: self.rect() });
                }
                shapes
            }
        }
    }

    fn settings(&self) -> Option<&dyn PluginSettings> {
        Some(self)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn PluginSettings> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::plugin::ViewInfo;

    fn draw(plugin: &mut GridPlugin, from: (i32, i32), to: (i32, i32)) {
        let mut ctx = PluginContext::new(ViewInfo::default());
        plugin.trigger(ACTION_DRAW, ActionInput::None, &mut ctx).unwrap();
        plugin.handle_pointer(&PointerEvent::down(from.0, from.1), &mut ctx);
        plugin.handle_pointer(&PointerEvent::drag(to.0, to.1), &mut ctx);
        plugin.handle_pointer(&PointerEvent::up(to.0, to.1), &mut ctx);
    }

    #[test]
    fn test_draw_defines_grid() {
        let mut plugin = GridPlugin::new();
        assert_eq!(plugin.context_menu().len(), 1);

        draw(&mut plugin, (10, 10), (110, 60));

        assert_eq!(plugin.state(), GridState::Defined);
        assert_eq!(plugin.rect(), Rect::new(10, 10, 100, 50));
        let cells = plugin.cells();
        assert_eq!(cells.len(), 25);
        assert_eq!(cells[0], Rect::new(10, 10, 20, 10));
        assert_eq!(plugin.context_menu().len(), 3);
    }

    #[test]
    fn test_reverse_drag_is_normalized() {
        let mut plugin = GridPlugin::new();
        draw(&mut plugin, (110, 60), (10, 10));
        assert_eq!(plugin.rect(), Rect::new(10, 10, 100, 50));
    }

    #[test]
    fn test_empty_selection_cancels() {
        let mut plugin = GridPlugin::new();
        draw(&mut plugin, (10, 10), (10, 50));
        assert_eq!(plugin.state(), GridState::Idle);
        assert!(plugin.cells().is_empty());
    }

    #[test]
    fn test_pointer_ignored_when_not_armed() {
        let mut plugin = GridPlugin::new();
        let mut ctx = PluginContext::new(ViewInfo::default());
        plugin.handle_pointer(&PointerEvent::down(0, 0), &mut ctx);
        plugin.handle_pointer(&PointerEvent::up(50, 50), &mut ctx);
        assert_eq!(plugin.state(), GridState::Idle);
    }

    #[test]
    fn test_overlay_line_counts() {
        let mut plugin = GridPlugin::new();
        plugin.set_divisions(3, 2);
        draw(&mut plugin, (0, 0), (90, 40));

        let shapes = plugin.overlay();
        let lines = shapes
            .iter()
            .filter(|s| matches!(s, OverlayShape::Line { .. }))
            .count();
        assert_eq!(lines, 2 + 1);
        assert!(shapes.iter().any(|s| matches!(s, OverlayShape::Selection { .. })));

        let mut ctx = PluginContext::new(ViewInfo::default());
        plugin.trigger(ACTION_TOGGLE_GRID, ActionInput::None, &mut ctx).unwrap();
        plugin.trigger(ACTION_TOGGLE_SELECTOR, ActionInput::None, &mut ctx).unwrap();
        assert!(plugin.overlay().is_empty());
    }

    #[test]
    fn test_color_change_requires_color() {
        let mut plugin = GridPlugin::new();
        draw(&mut plugin, (0, 0), (10, 10));
        let mut ctx = PluginContext::new(ViewInfo::default());

        assert!(plugin.trigger(ACTION_COLOR, ActionInput::None, &mut ctx).is_err());
        plugin
            .trigger(ACTION_COLOR, ActionInput::Color(Rgb::RED), &mut ctx)
            .unwrap();
        assert_eq!(
            settings::get::<Rgb>(&plugin.write_settings(), "color"),
            Some(Rgb::RED)
        );
    }

    #[test]
    fn test_settings_restore_defined_grid() {
        let mut plugin = GridPlugin::new();
        draw(&mut plugin, (5, 5), (55, 30));
        let mut ctx = PluginContext::new(ViewInfo::default());
        plugin.trigger(ACTION_TOGGLE_GRID, ActionInput::None, &mut ctx).unwrap();
        let stored = plugin.write_settings();

        let mut restored = GridPlugin::new();
        restored.read_settings(&stored);
        assert!(restored.is_defined());
        assert!(restored.is_grid_hidden());
        assert_eq!(restored.rect(), plugin.rect());
    }
}
