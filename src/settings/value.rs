//! Setting values and their canonical conversions

use crate::geometry::{Point, Rect, Rgb, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A group's entries, keyed by name
pub type SettingsMap = BTreeMap<String, SettingValue>;

/// A persisted value
///
/// Serialized untagged so the backing file stays readable. Rectangles are
/// tried before points and sizes since their fields are a subset of a
/// rectangle's; all three reject unknown fields so arbitrary groups fall
/// through to [`SettingValue::Map`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Rect(Rect),
    Point(Point),
    Size(Size),
    /// Nested group or structured plugin value
    Map(SettingsMap),
}

impl SettingValue {
    pub fn as_map(&self) -> Option<&SettingsMap> {
        match self {
            SettingValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Int(value as i64)
    }
}

impl From<u32> for SettingValue {
    fn from(value: u32) -> Self {
        SettingValue::Int(value as i64)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Str(value)
    }
}

impl From<Point> for SettingValue {
    fn from(value: Point) -> Self {
        SettingValue::Point(value)
    }
}

impl From<Rect> for SettingValue {
    fn from(value: Rect) -> Self {
        SettingValue::Rect(value)
    }
}

impl From<Size> for SettingValue {
    fn from(value: Size) -> Self {
        SettingValue::Size(value)
    }
}

impl From<Rgb> for SettingValue {
    fn from(value: Rgb) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<SettingsMap> for SettingValue {
    fn from(value: SettingsMap) -> Self {
        SettingValue::Map(value)
    }
}

/// Typed read of a [`SettingValue`]
///
/// Returns `None` when the stored value cannot represent `Self`; callers
/// then fall back to their default.
pub trait FromSetting: Sized {
    fn from_setting(value: &SettingValue) -> Option<Self>;
}

impl FromSetting for bool {
    /// Accepts native booleans, `"true"`/`"false"` in any case, and 0/1
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            SettingValue::Int(0) => Some(false),
            SettingValue::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl FromSetting for i64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(i) => Some(*i),
            SettingValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromSetting for i32 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        i64::from_setting(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromSetting for u32 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        i64::from_setting(value).and_then(|i| u32::try_from(i).ok())
    }
}

impl FromSetting for String {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromSetting for Point {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Point(p) => Some(*p),
            _ => None,
        }
    }
}

impl FromSetting for Rect {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Rect(r) => Some(*r),
            _ => None,
        }
    }
}

impl FromSetting for Size {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Size(s) => Some(*s),
            _ => None,
        }
    }
}

impl FromSetting for Rgb {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromSetting for SettingsMap {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_map().cloned()
    }
}

impl FromSetting for SettingValue {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        Some(value.clone())
    }
}

/// Typed lookup in a plain map
pub fn get<T: FromSetting>(map: &SettingsMap, key: &str) -> Option<T> {
    map.get(key).and_then(T::from_setting)
}

/// Typed lookup with a default for missing or unreadable keys
pub fn get_or<T: FromSetting>(map: &SettingsMap, key: &str, default: T) -> T {
    get(map, key).unwrap_or(default)
}
