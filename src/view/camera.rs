//! Camera View
//!
//! One camera's acquisition, decoding, plugin pipeline and display state.
//!
//! ## Frame path
//!
//! ```text
//! FrameSource ──Payload──▶ FrameDecoder ──▶ PluginPipeline ──▶ scale ──▶ frame()
//!      │                        │ (error: keep last frame)
//!      └──Error──▶ placeholder "Error loading <url>" ──▶ PluginPipeline
//! ```
//!
//! Everything here runs on the interactive thread; only the frame source
//! works in the background.

use crate::config::AcquisitionConfig;
use crate::error::{MicroscopeError, Result};
use crate::geometry::{Point, Size};
use crate::plugins::{
    ActionInput, ConfigField, Cursor, Effect, MenuAction, MenuSection, OverlayShape,
    PluginPipeline, PluginSet, ViewInfo,
};
use crate::settings::{self, Scope, SettingsMap, SettingsPath, SettingsStore};
use crate::video::{
    AcquisitionState, AcquisitionStats, Endpoint, Frame, FrameDecoder, FrameSource, SourceEvent,
    Transport, DEFAULT_FPS, DEFAULT_URL,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Default grid divisions of a camera
pub const DEFAULT_DIVS: u32 = 5;

/// Zoom factor per mouse-wheel notch
pub const WHEEL_ZOOM_FACTOR: f64 = 1.05;

/// Callback for a click on a thumbnail view; receives the camera's key
pub type RegionClickedHandler = Box<dyn FnMut(&str) + Send>;

/// Requested display scaling
///
/// Scales to `width` when it is positive, otherwise to `height` when that is
/// positive, otherwise not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleHint {
    pub width: i32,
    pub height: i32,
}

impl ScaleHint {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn apply(&self, frame: Frame) -> Frame {
        if self.width > 0 {
            frame.scale_to_width(self.width as u32)
        } else if self.height > 0 {
            frame.scale_to_height(self.height as u32)
        } else {
            frame
        }
    }
}

/// The six per-camera fields shared with host forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub url: String,
    pub fps: u32,
    pub x_divs: u32,
    pub y_divs: u32,
    pub color: bool,
    pub scale: Option<ScaleHint>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            fps: DEFAULT_FPS,
            x_divs: DEFAULT_DIVS,
            y_divs: DEFAULT_DIVS,
            color: false,
            scale: None,
        }
    }
}

impl CameraSettings {
    /// Read from a camera group's entries
    ///
    /// Missing keys take their defaults; rate and divisions are at least 1.
    /// A stored scale is honoured only when `scaleW >= 0` and `viewport` is
    /// set.
    pub fn from_map(map: &SettingsMap, viewport: bool) -> Self {
        let defaults = Self::default();
        let scale_w: i32 = settings::get_or(map, "scaleW", -1);
        let scale = (scale_w >= 0 && viewport)
            .then(|| ScaleHint::new(scale_w, settings::get_or(map, "scaleH", 200)));

        Self {
            url: settings::get_or(map, "url", defaults.url),
            fps: settings::get_or(map, "fps", defaults.fps).max(1),
            x_divs: settings::get_or(map, "xDivs", defaults.x_divs).max(1),
            y_divs: settings::get_or(map, "yDivs", defaults.y_divs).max(1),
            color: settings::get_or(map, "color", defaults.color),
            scale,
        }
    }

    pub fn to_map(&self) -> SettingsMap {
        let mut map = SettingsMap::from([
            ("url".to_string(), self.url.clone().into()),
            ("fps".to_string(), self.fps.into()),
            ("xDivs".to_string(), self.x_divs.into()),
            ("yDivs".to_string(), self.y_divs.into()),
            ("color".to_string(), self.color.into()),
        ]);
        if let Some(scale) = self.scale {
            map.insert("scaleW".to_string(), scale.width.into());
            map.insert("scaleH".to_string(), scale.height.into());
        }
        map
    }
}

/// Mouse-wheel zoom and pan of the displayed frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewTransform {
    /// Zoom one notch in (`delta > 0`) or out, keeping the point under the
    /// pointer fixed
    pub fn wheel(&mut self, delta: i32, at: Point) {
        let factor = if delta > 0 {
            WHEEL_ZOOM_FACTOR
        } else {
            1.0 / WHEEL_ZOOM_FACTOR
        };
        let (sx, sy) = self.map_to_scene(at);
        self.scale *= factor;
        self.offset_x = at.x as f64 - sx * self.scale;
        self.offset_y = at.y as f64 - sy * self.scale;
    }

    /// Widget position to frame position
    pub fn map_to_scene(&self, at: Point) -> (f64, f64) {
        (
            (at.x as f64 - self.offset_x) / self.scale,
            (at.y as f64 - self.offset_y) / self.scale,
        )
    }
}

/// A camera view
pub struct CameraView {
    source: FrameSource,
    decoder: FrameDecoder,
    pipeline: PluginPipeline,
    settings: CameraSettings,
    viewport: bool,
    /// Settings group this view was read from
    settings_path: Option<SettingsPath>,
    frame: Option<Frame>,
    display_size: Size,
    cursor: Cursor,
    transform: ViewTransform,
    on_region_clicked: Option<RegionClickedHandler>,
    persist_requested: bool,
}

impl CameraView {
    /// Create an idle thumbnail view with default camera settings
    pub fn new(
        transport: Arc<dyn Transport>,
        plugins: &PluginSet,
        config: AcquisitionConfig,
    ) -> Result<Self> {
        let settings = CameraSettings::default();
        let endpoint = Endpoint::new(&settings.url, settings.fps)?;
        Ok(Self {
            source: FrameSource::new(endpoint, transport, config),
            decoder: FrameDecoder::new(),
            pipeline: plugins.build()?,
            settings,
            viewport: true,
            settings_path: None,
            frame: None,
            display_size: Size::default(),
            cursor: Cursor::Default,
            transform: ViewTransform::default(),
            on_region_clicked: None,
            persist_requested: false,
        })
    }

    /// Create an idle view that talks HTTP
    #[cfg(feature = "http")]
    pub fn http(plugins: &PluginSet, config: AcquisitionConfig) -> Result<Self> {
        let transport = crate::video::HttpTransport::new(config.request_timeout())?;
        Self::new(Arc::new(transport), plugins, config)
    }

    /// Builder: thumbnail (`true`) or main detail view (`false`)
    pub fn with_viewport(mut self, viewport: bool) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn is_viewport(&self) -> bool {
        self.viewport
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn settings_path(&self) -> Option<&SettingsPath> {
        self.settings_path.as_ref()
    }

    /// Key carried by region-clicked notifications
    pub fn key(&self) -> String {
        match &self.settings_path {
            Some(path) => path.to_string(),
            None => self.settings.url.clone(),
        }
    }

    pub fn set_url(&mut self, url: &str) -> Result<()> {
        self.source.set_endpoint(url)?;
        self.settings.url = url.trim().to_string();
        Ok(())
    }

    pub fn set_fps(&mut self, fps: u32) -> Result<()> {
        self.source.set_rate(fps)?;
        self.settings.fps = fps;
        Ok(())
    }

    /// Camera-level divisions; zero is raised to one
    pub fn set_divisions(&mut self, x_divs: u32, y_divs: u32) {
        self.settings.x_divs = x_divs.max(1);
        self.settings.y_divs = y_divs.max(1);
    }

    pub fn set_color(&mut self, color: bool) {
        self.settings.color = color;
    }

    pub fn set_scale(&mut self, scale: Option<ScaleHint>) {
        self.settings.scale = scale;
    }

    /// Register the region-clicked callback
    pub fn on_region_clicked(&mut self, handler: impl FnMut(&str) + Send + 'static) {
        self.on_region_clicked = Some(Box::new(handler));
    }

    pub fn pipeline(&self) -> &PluginPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut PluginPipeline {
        &mut self.pipeline
    }

    /// Facts handed to plugins
    pub fn view_info(&self) -> ViewInfo {
        ViewInfo {
            display_size: self.display_size,
            x_divs: self.settings.x_divs,
            y_divs: self.settings.y_divs,
            viewport: self.viewport,
        }
    }

    /// Start or stop acquisition
    ///
    /// Starting pushes the current URL and rate to the source first.
    pub fn acquire(&mut self, start: bool) -> Result<()> {
        if start {
            self.source.set_endpoint(&self.settings.url)?;
            self.source.set_rate(self.settings.fps)?;
            self.source.start()
        } else {
            self.source.stop();
            Ok(())
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.source.state()
    }

    pub fn is_acquiring(&self) -> bool {
        self.source.is_acquiring()
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.source.stats()
    }

    /// Drain pending source events into the display
    ///
    /// Returns the number of frames displayed.
    pub fn pump(&mut self) -> usize {
        let mut shown = 0;
        while let Some(event) = self.source.try_next_event() {
            if self.handle_event(event) {
                shown += 1;
            }
        }
        shown
    }

    /// Wait for one source event and display it
    ///
    /// Returns `None` once acquisition is stopped.
    pub async fn pump_next(&mut self) -> Option<bool> {
        let event = self.source.next_event().await?;
        Some(self.handle_event(event))
    }

    fn handle_event(&mut self, event: SourceEvent) -> bool {
        match event {
            SourceEvent::Payload(payload) => match self.decoder.decode(payload) {
                Ok(frame) => {
                    self.display(frame);
                    true
                }
                Err(e) => {
                    warn!("Failed to decode frame from {}: {}", self.settings.url, e);
                    false
                }
            },
            SourceEvent::Error(e) => {
                debug!("Fetch failed: {}", e);
                let size = self.source.config().placeholder_size;
                let placeholder = Frame::placeholder(size, format!("Error loading {}", e.url()));
                self.display(placeholder);
                true
            }
        }
    }

    /// Run a frame through the pipeline and scaling and make it current
    pub fn display(&mut self, frame: Frame) {
        let view = self.view_info();
        let mut frame = self.pipeline.apply_image(frame, &view);
        if let Some(scale) = self.settings.scale {
            frame = scale.apply(frame);
        }
        trace!("Displaying {}x{} frame", frame.width, frame.height);
        self.display_size = frame.size();
        self.frame = Some(frame);
    }

    /// Frame currently on screen
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn overlays(&self) -> Vec<OverlayShape> {
        self.pipeline.overlays()
    }

    pub fn context_menu(&self) -> Vec<MenuSection> {
        self.pipeline.context_menu()
    }

    pub fn controls(&self) -> Vec<(String, MenuAction)> {
        self.pipeline.controls()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn transform(&self) -> &ViewTransform {
        &self.transform
    }

    pub fn wheel(&mut self, delta: i32, at: Point) {
        self.transform.wheel(delta, at);
    }

    /// Pointer press; thumbnails also report a region click first
    pub fn pointer_down(&mut self, position: Point) {
        if self.viewport {
            let key = self.key();
            if let Some(handler) = self.on_region_clicked.as_mut() {
                debug!("Region clicked: {}", key);
                handler(&key);
            }
        }
        let view = self.view_info();
        let effects = self.pipeline.pointer_down(position, &view);
        self.apply_effects(effects);
    }

    pub fn pointer_move(&mut self, position: Point) {
        let view = self.view_info();
        let effects = self.pipeline.pointer_move(position, &view);
        self.apply_effects(effects);
    }

    pub fn pointer_up(&mut self, position: Point) {
        let view = self.view_info();
        let effects = self.pipeline.pointer_up(position, &view);
        self.apply_effects(effects);
    }

    /// Run a context-menu action or control of one plugin
    pub fn trigger(&mut self, plugin: &str, action: &str, input: ActionInput) -> Result<()> {
        let view = self.view_info();
        let effects = self.pipeline.trigger(plugin, action, input, &view)?;
        self.apply_effects(effects);
        Ok(())
    }

    /// Configuration forms of this view's plugins, by plugin name
    pub fn plugin_config(&self) -> Vec<(String, Vec<ConfigField>)> {
        self.pipeline.config_forms()
    }

    /// Apply values edited in a plugin's configuration form
    ///
    /// Accepted values are written with the next settings save.
    pub fn configure_plugin(&mut self, plugin: &str, values: &SettingsMap) -> Result<()> {
        self.pipeline.configure(plugin, values)?;
        self.persist_requested = true;
        Ok(())
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PersistSettings => self.persist_requested = true,
                Effect::SetAcquisition(on) => {
                    if let Err(e) = self.acquire(on) {
                        warn!("Failed to switch acquisition {}: {}", on, e);
                    }
                }
                Effect::SetCursor(cursor) => self.cursor = cursor,
                Effect::SavePreset(_) | Effect::LoadPreset(_) => {
                    warn!("Unhandled pipeline effect {:?}", effect);
                }
            }
        }
    }

    /// Whether a plugin asked for the settings to be written; clears the request
    pub fn take_persist_request(&mut self) -> bool {
        std::mem::take(&mut self.persist_requested)
    }

    /// Read camera and plugin settings from this view's group
    ///
    /// The group's path becomes the view's key. Plugins without a stored
    /// group are handed an empty dictionary.
    pub fn read_settings(&mut self, scope: &mut Scope<'_>) {
        self.settings_path = Some(scope.path().clone());
        self.settings = CameraSettings::from_map(&scope.map(), self.viewport);

        if let Err(e) = self.source.set_endpoint(&self.settings.url) {
            warn!("Stored URL rejected, keeping {}: {}", self.source.endpoint().url, e);
            self.settings.url = self.source.endpoint().url;
        }
        if let Err(e) = self.source.set_rate(self.settings.fps) {
            warn!("Stored rate rejected: {}", e);
        }

        for name in self.pipeline.plugin_names() {
            let map = scope.group(&name).map();
            self.pipeline.read_settings(&name, &map);
        }
        debug!("Read settings for {}", scope.path());
    }

    /// Write camera and plugin settings into `scope`
    pub fn write_settings(&self, scope: &mut Scope<'_>) {
        scope.set_map(self.settings.to_map());
        for (name, map) in self.pipeline.write_settings() {
            scope.group(&name).replace_map(map);
        }
        debug!("Wrote settings for {}", scope.path());
    }

    /// Write into the group this view was read from
    pub fn save_to(&self, store: &mut SettingsStore) -> Result<()> {
        let path = self
            .settings_path
            .clone()
            .ok_or_else(|| MicroscopeError::settings("view has no settings group"))?;
        self.write_settings(&mut store.scope_at(path));
        Ok(())
    }

    /// Show the camera stored under `key` in this view
    ///
    /// `key` is a settings group path as carried by region clicks; a key
    /// without a stored group is taken as a URL. Only the camera fields are
    /// copied, the view keeps its own plugins and settings group.
    pub fn load_from(&mut self, store: &SettingsStore, key: &str) -> Result<()> {
        let path = SettingsPath::parse(key);
        let (url, fps, x_divs, y_divs) = if store.contains_group(&path) {
            let camera = CameraSettings::from_map(&store.group_map(&path), false);
            (camera.url, camera.fps, camera.x_divs, camera.y_divs)
        } else {
            (
                key.to_string(),
                self.settings.fps,
                self.settings.x_divs,
                self.settings.y_divs,
            )
        };

        self.set_url(&url)?;
        self.set_fps(fps)?;
        self.set_divisions(x_divs, y_divs);
        info!("Loaded {} into view", url);
        self.acquire(true)
    }

    /// Stop acquisition and shut down every plugin
    pub fn shutdown(&mut self) -> Result<()> {
        self.source.stop();
        self.pipeline.shutdown_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_settings_defaults() {
        let settings = CameraSettings::from_map(&SettingsMap::new(), true);
        assert_eq!(settings, CameraSettings::default());
        assert_eq!(settings.url, "http://localhost:9998/jpg/image.jpg");
        assert_eq!((settings.fps, settings.x_divs, settings.y_divs), (5, 5, 5));
        assert!(!settings.color);
        assert!(settings.scale.is_none());
    }

    #[test]
    fn test_camera_settings_clamp_and_scale() {
        let map = SettingsMap::from([
            ("fps".to_string(), 0i64.into()),
            ("xDivs".to_string(), 0i64.into()),
            ("color".to_string(), "true".into()),
            ("scaleW".to_string(), 320i64.into()),
        ]);

        let thumb = CameraSettings::from_map(&map, true);
        assert_eq!(thumb.fps, 1);
        assert_eq!(thumb.x_divs, 1);
        assert!(thumb.color);
        assert_eq!(thumb.scale, Some(ScaleHint::new(320, 200)));

        let main = CameraSettings::from_map(&map, false);
        assert!(main.scale.is_none());
    }

    #[test]
    fn test_camera_settings_map_round_trip() {
        let settings = CameraSettings {
            url: "http://cam/video.mjpg".to_string(),
            fps: 12,
            x_divs: 3,
            y_divs: 4,
            color: true,
            scale: Some(ScaleHint::new(0, 500)),
        };
        assert_eq!(CameraSettings::from_map(&settings.to_map(), true), settings);
    }

    #[test]
    fn test_scale_hint() {
        let frame = Frame::filled(200, 100, [0; 4]);
        assert_eq!(ScaleHint::new(100, 0).apply(frame.clone()).size(), Size::new(100, 50));
        assert_eq!(ScaleHint::new(0, 50).apply(frame.clone()).size(), Size::new(100, 50));
        assert_eq!(ScaleHint::new(0, 0).apply(frame).size(), Size::new(200, 100));
    }

    #[test]
    fn test_wheel_keeps_anchor() {
        let mut transform = ViewTransform::default();
        let anchor = Point::new(100, 40);
        transform.wheel(120, anchor);
        assert!((transform.scale - 1.05).abs() < 1e-9);

        let (x, y) = transform.map_to_scene(anchor);
        assert!((x - 100.0).abs() < 1e-9 && (y - 40.0).abs() < 1e-9);

        transform.wheel(-120, anchor);
        assert!((transform.scale - 1.0).abs() < 1e-9);
    }
}
