//! Main window geometry, persisted under the `MainWindow` group.

use crate::geometry::{Point, Size};
use crate::settings::Scope;

/// Window size and position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub size: Size,
    pub pos: Point,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            size: Size::new(400, 400),
            pos: Point::new(200, 200),
        }
    }
}

impl WindowGeometry {
    /// Read from the `MainWindow` scope
    pub fn read_settings(scope: &Scope<'_>) -> Self {
        let defaults = Self::default();
        Self {
            size: scope.value_or("size", defaults.size),
            pos: scope.value_or("pos", defaults.pos),
        }
    }

    pub fn write_settings(&self, scope: &mut Scope<'_>) {
        scope.set_value("size", self.size);
        scope.set_value("pos", self.pos);
    }
}
