//! Persistent settings
//!
//! A nested key-value tree (window → container → camera → plugin → key)
//! persisted as JSON. Every reader supplies a default, so an empty store
//! always yields a complete configuration.

mod store;
mod value;

pub use store::{Scope, SettingsPath, SettingsStore};
pub use value::{get, get_or, FromSetting, SettingValue, SettingsMap};

/// Group holding window geometry and the container
pub const MAIN_WINDOW_GROUP: &str = "MainWindow";
/// Group holding the camera grid
pub const CONTAINER_GROUP: &str = "Container";

/// Group name of camera `index`
pub fn camera_group(index: usize) -> String {
    format!("Camera{}", index)
}
