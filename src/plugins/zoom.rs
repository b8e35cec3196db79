//! Zoom Plugin
//!
//! Crops incoming frames to a rectangle the user selects on the displayed
//! frame.
//!
//! Selections are made in displayed coordinates and mapped back to source
//! coordinates with the source-to-displayed ratio captured at the last image
//! update. The ratio uses the uncropped frame size, and an existing crop's
//! offset is not added.

use crate::error::{MicroscopeError, Result};
use crate::geometry::{Point, Rect, Size};
use crate::plugins::plugin::{
    ActionInput, Cursor, Effect, ImageTransform, MenuAction, MenuItem, OverlayShape, Plugin,
    PluginContext, PluginSettings, PointerEvent, PointerKind, ViewInfo,
};
use crate::settings::{self, SettingsMap};
use crate::video::Frame;
use tracing::{debug, info};

/// Plugin name and settings group
pub const ZOOM_PLUGIN: &str = "Zoom";

const ACTION_CROP: &str = "crop";
const ACTION_RESET: &str = "reset_crop";

/// Crop-to-selection transform
pub struct ZoomPlugin {
    armed: bool,
    /// Anchor and current corner of the live selection
    selection: Option<(Point, Point)>,
    crop: Option<Rect>,
    /// Size of the last frame entering `apply_image`, before cropping
    source_size: Size,
}

impl ZoomPlugin {
    pub fn new() -> Self {
        Self {
            armed: false,
            selection: None,
            crop: None,
            source_size: Size::default(),
        }
    }

    /// Current crop in source coordinates
    pub fn crop(&self) -> Option<Rect> {
        self.crop
    }

    pub fn set_crop(&mut self, crop: Option<Rect>) {
        self.crop = crop.filter(|rect| !rect.is_empty());
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Uncropped size seen at the last image update
    pub fn source_size(&self) -> Size {
        self.source_size
    }

    /// Map a rectangle in displayed coordinates to source coordinates
    pub fn to_source(&self, selection: Rect, displayed: Size) -> Rect {
        if displayed.is_empty() || self.source_size.is_empty() {
            return selection;
        }

        let sx = self.source_size.width as f64 / displayed.width as f64;
        let sy = self.source_size.height as f64 / displayed.height as f64;
        Rect::new(
            (selection.x as f64 * sx) as i32,
            (selection.y as f64 * sy) as i32,
            (selection.width as f64 * sx) as i32,
            (selection.height as f64 * sy) as i32,
        )
    }

    fn finish_selection(&mut self, displayed: Size) {
        let Some((anchor, corner)) = self.selection.take() else {
            return;
        };
        let selection = Rect::from_points(anchor, corner);
        if selection.is_empty() {
            debug!("Empty zoom selection ignored");
            return;
        }

        let crop = self.to_source(selection, displayed);
        info!(
            "Zoom crop set to ({}, {}) {}x{}",
            crop.x, crop.y, crop.width, crop.height
        );
        self.set_crop(Some(crop));
    }
}

impl Default for ZoomPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransform for ZoomPlugin {
    fn apply_image(&mut self, frame: Frame, _view: &ViewInfo) -> Frame {
        self.source_size = frame.size();
        match self.crop {
            Some(rect) => frame.crop(rect),
            None => frame,
        }
    }
}

impl PluginSettings for ZoomPlugin {
    /// A missing `crop` clears the crop
    fn read_settings(&mut self, map: &SettingsMap) {
        self.set_crop(settings::get::<Rect>(map, "crop"));
    }

    fn write_settings(&self) -> SettingsMap {
        let mut map = SettingsMap::new();
        if let Some(crop) = self.crop {
            map.insert("crop".to_string(), crop.into());
        }
        map
    }
}

impl Plugin for ZoomPlugin {
    fn name(&self) -> &str {
        ZOOM_PLUGIN
    }

    fn handle_pointer(&mut self, event: &PointerEvent, ctx: &mut PluginContext) {
        if !self.armed {
            return;
        }

        match event.kind {
            PointerKind::Down if event.is_left() && self.selection.is_none() => {
                self.selection = Some((event.position, event.position));
            }
            PointerKind::Move if event.is_left() => {
                if let Some((_, corner)) = self.selection.as_mut() {
                    *corner = event.position;
                }
            }
            PointerKind::Up => {
                let displayed = ctx.view().display_size;
                self.finish_selection(displayed);
                self.armed = false;
                ctx.emit(Effect::SetCursor(Cursor::Default));
            }
            _ => {}
        }
    }

    fn context_menu(&self) -> Vec<MenuItem> {
        let mut items = vec![MenuAction::new(ACTION_CROP, "Zoom/Crop to selection").into()];
        if self.crop.is_some() {
            items.push(MenuAction::new(ACTION_RESET, "Reset Zoom/Crop").into());
        }
        items
    }

    fn trigger(&mut self, action: &str, _input: ActionInput, ctx: &mut PluginContext) -> Result<()> {
        match action {
            ACTION_CROP => {
                self.armed = true;
                self.selection = None;
                ctx.emit(Effect::SetCursor(Cursor::Crosshair));
                Ok(())
            }
            ACTION_RESET => {
                self.crop = None;
                debug!("Zoom crop reset");
                Ok(())
            }
            other => Err(MicroscopeError::plugin(format!(
                "Unknown zoom action '{}'",
                other
            ))),
        }
    }

    fn overlay(&self) -> Vec<OverlayShape> {
        self.selection
            .map(|(anchor, corner)| OverlayShape::Selection {
                rect: Rect::from_points(anchor, corner),
            })
            .into_iter()
            .collect()
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
}
