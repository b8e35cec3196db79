//! Hierarchical settings store
//!
//! Settings form a tree of named groups holding typed values:
//!
//! ```text
//! MainWindow { size, pos }
//!   Container { cols, rows }
//!     Camera0 { url, fps, xDivs, yDivs, color, scaleW, scaleH }
//!       Crosshair { ... }
//!       Grid { ... }
//!     Camera1 { ... }
//! ```
//!
//! Access goes through [`Scope`] values that carry their path explicitly.
//! A nested scope borrows its parent, so leaving a group is tied to the
//! borrow ending and cannot be forgotten on an early return.

use crate::error::{MicroscopeError, Result};
use crate::settings::value::{FromSetting, SettingValue, SettingsMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application directory under the platform config dir
const APP_DIR: &str = "microscope";
/// Settings file name
const SETTINGS_FILE: &str = "settings.json";

/// Path of a group from the root, e.g. `MainWindow/Container/Camera0`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SettingsPath {
    segments: Vec<String>,
}

impl SettingsPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path; empty segments are ignored
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(Self::parse(name).segments);
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the innermost group
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for SettingsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Settings tree with an optional backing file
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    root: SettingsMap,
    file: Option<PathBuf>,
}

impl SettingsStore {
    /// Empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing file yields an empty store bound to
    /// that path
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let file = path.into();
        let root = match std::fs::read(&file) {
            Ok(bytes) if bytes.is_empty() => SettingsMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                MicroscopeError::settings(format!("failed to parse {}: {}", file.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, starting fresh", file.display());
                SettingsMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded settings from {}", file.display());
        Ok(Self {
            root,
            file: Some(file),
        })
    }

    /// Default location under the platform config directory
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
            .ok_or_else(|| MicroscopeError::settings("no config directory on this platform"))
    }

    /// Load from the default location
    pub fn open_default() -> Result<Self> {
        Self::load(Self::default_path()?)
    }

    /// Backing file, if any
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Write back to the backing file
    pub fn save(&self) -> Result<()> {
        let file = self
            .file
            .as_deref()
            .ok_or_else(|| MicroscopeError::settings("settings store has no backing file"))?;
        self.save_to(file)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.root)?;
        std::fs::write(path, json)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Scope at the root of the tree
    pub fn scope(&mut self) -> Scope<'_> {
        Scope {
            store: self,
            path: SettingsPath::root(),
        }
    }

    /// Scope at an arbitrary path
    pub fn scope_at(&mut self, path: SettingsPath) -> Scope<'_> {
        Scope { store: self, path }
    }

    /// Copy of a group's entries; empty when the group does not exist
    pub fn group_map(&self, path: &SettingsPath) -> SettingsMap {
        Self::find_group(&self.root, path.segments())
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_group(&self, path: &SettingsPath) -> bool {
        Self::find_group(&self.root, path.segments()).is_some()
    }

    pub fn root(&self) -> &SettingsMap {
        &self.root
    }

    fn find_group<'m>(map: &'m SettingsMap, segments: &[String]) -> Option<&'m SettingsMap> {
        match segments.split_first() {
            None => Some(map),
            Some((head, rest)) => Self::find_group(map.get(head)?.as_map()?, rest),
        }
    }

    /// Run `f` on a group, creating it (and any parents) as needed
    ///
    /// A non-group value in the way is replaced by an empty group.
    fn with_group<R>(
        map: &mut SettingsMap,
        segments: &[String],
        f: impl FnOnce(&mut SettingsMap) -> R,
    ) -> R {
        match segments.split_first() {
            None => f(map),
            Some((head, rest)) => {
                let entry = map
                    .entry(head.clone())
                    .or_insert_with(|| SettingValue::Map(SettingsMap::new()));
                match entry {
                    SettingValue::Map(inner) => Self::with_group(inner, rest, f),
                    other => {
                        let mut inner = SettingsMap::new();
                        let result = Self::with_group(&mut inner, rest, f);
                        *other = SettingValue::Map(inner);
                        result
                    }
                }
            }
        }
    }
}

/// A view of one group in a [`SettingsStore`]
pub struct Scope<'a> {
    store: &'a mut SettingsStore,
    path: SettingsPath,
}

impl<'a> Scope<'a> {
    pub fn path(&self) -> &SettingsPath {
        &self.path
    }

    /// Enter a nested group; the group is left when the returned scope drops
    pub fn group(&mut self, name: &str) -> Scope<'_> {
        Scope {
            path: self.path.join(name),
            store: &mut *self.store,
        }
    }

    /// Raw value at `key`
    pub fn value(&self, key: &str) -> Option<SettingValue> {
        SettingsStore::find_group(&self.store.root, self.path.segments())
            .and_then(|group| group.get(key))
            .cloned()
    }

    /// Typed value at `key`, or `default` when missing or unreadable
    pub fn value_or<T: FromSetting>(&self, key: &str, default: T) -> T {
        self.value(key)
            .and_then(|value| T::from_setting(&value))
            .unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<SettingValue>) {
        let value = value.into();
        SettingsStore::with_group(&mut self.store.root, self.path.segments(), |group| {
            group.insert(key.to_string(), value);
        });
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        SettingsStore::with_group(&mut self.store.root, self.path.segments(), |group| {
            group.remove(key)
        })
    }

    /// Every entry of this group, nested groups included
    pub fn map(&self) -> SettingsMap {
        self.store.group_map(&self.path)
    }

    /// Write every entry of `map` into this group, keeping other keys
    pub fn set_map(&mut self, map: SettingsMap) {
        SettingsStore::with_group(&mut self.store.root, self.path.segments(), |group| {
            group.extend(map);
        });
    }

    /// Replace the whole group, nested groups included
    pub fn replace_map(&mut self, map: SettingsMap) {
        SettingsStore::with_group(&mut self.store.root, self.path.segments(), |group| {
            *group = map;
        });
    }

    /// Names of the nested groups
    pub fn child_groups(&self) -> Vec<String> {
        SettingsStore::find_group(&self.store.root, self.path.segments())
            .map(|group| {
                group
                    .iter()
                    .filter(|(_, value)| value.as_map().is_some())
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.store.contains_group(&self.path.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_path_display_and_join() {
        let path = SettingsPath::parse("MainWindow/Container").join("Camera0");
        assert_eq!(path.to_string(), "MainWindow/Container/Camera0");
        assert_eq!(path.name(), Some("Camera0"));
        assert!(SettingsPath::root().is_root());
    }

    #[test]
    fn test_defaults_on_empty_store() {
        let mut store = SettingsStore::new();
        let mut scope = store.scope();
        let camera = scope.group("Camera0");
        assert_eq!(camera.value_or("fps", 5u32), 5);
        assert_eq!(camera.value_or("url", String::from("x")), "x");
        assert!(camera.map().is_empty());
    }

    #[test]
    fn test_nested_groups() {
        let mut store = SettingsStore::new();
        {
            let mut root = store.scope();
            let mut window = root.group("MainWindow");
            window.set_value("pos", Point::new(200, 200));
            let mut container = window.group("Container");
            container.set_value("cols", 2u32);
            let mut camera = container.group("Camera1");
            camera.group("Crosshair").set_value("visible", false);
        }

        let path = SettingsPath::parse("MainWindow/Container/Camera1/Crosshair");
        assert_eq!(
            store.group_map(&path).get("visible"),
            Some(&SettingValue::Bool(false))
        );

        let mut scope = store.scope_at(SettingsPath::parse("MainWindow"));
        assert_eq!(scope.value_or("pos", Point::default()), Point::new(200, 200));
        assert_eq!(scope.child_groups(), vec!["Container".to_string()]);
        assert_eq!(scope.group("Container").value_or("cols", 1u32), 2);
    }

    #[test]
    fn test_set_map_merges() {
        let mut store = SettingsStore::new();
        let mut scope = store.scope_at(SettingsPath::parse("Camera0/Zoom"));
        scope.set_value("keep", 1i64);

        let mut map = SettingsMap::new();
        map.insert("crop".into(), SettingValue::Int(3));
        scope.set_map(map);

        let all = scope.map();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("keep"), Some(&SettingValue::Int(1)));
    }

    #[test]
    fn test_replace_map_drops_stale_keys() {
        let mut store = SettingsStore::new();
        let mut scope = store.scope_at(SettingsPath::parse("Camera0/Zoom"));
        scope.set_value("crop", Point::new(1, 1));
        scope.replace_map(SettingsMap::new());
        assert!(!scope.contains("crop"));
        assert!(store.contains_group(&SettingsPath::parse("Camera0/Zoom")));
    }

    #[test]
    fn test_value_replaced_by_group() {
        let mut store = SettingsStore::new();
        store.scope().set_value("Camera0", 7i64);
        store.scope().group("Camera0").set_value("fps", 3u32);
        assert_eq!(
            store.scope().group("Camera0").value_or("fps", 0u32),
            3
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("settings.json");

        let mut store = SettingsStore::load(&file).unwrap();
        store
            .scope()
            .group("MainWindow")
            .set_value("size", Point::new(400, 400));
        store.save().unwrap();

        let mut loaded = SettingsStore::load(&file).unwrap();
        assert_eq!(loaded.root(), store.root());
        assert_eq!(
            loaded
                .scope()
                .group("MainWindow")
                .value_or("size", Point::default()),
            Point::new(400, 400)
        );
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, b"{ not json").unwrap();
        assert!(matches!(
            SettingsStore::load(&file),
            Err(MicroscopeError::Settings(_))
        ));
    }

    #[test]
    fn test_save_without_file() {
        assert!(SettingsStore::new().save().is_err());
    }
}
