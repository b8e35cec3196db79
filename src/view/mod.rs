//! Camera views
//!
//! - [`CameraView`] - one camera: acquisition, pipeline, displayed frame
//! - [`Container`] - a grid of thumbnail views
//! - [`WindowGeometry`] - persisted main window geometry
//!
//! A click on a thumbnail reports the camera's settings group (for example
//! `MainWindow/Container/Camera0`) so the host can load that camera into a
//! main view with [`CameraView::load_from`].

mod camera;
mod container;
mod window;

pub use camera::{
    CameraSettings, CameraView, RegionClickedHandler, ScaleHint, ViewTransform, DEFAULT_DIVS,
    WHEEL_ZOOM_FACTOR,
};
pub use container::{Cell, Container, ViewFactory};
pub use window::WindowGeometry;
