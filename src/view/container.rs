//! Camera Container
//!
//! A `cols x rows` grid of camera views. Size changes only mark the grid
//! dirty; views are created or torn down on the next [`Container::layout`]
//! pass, never in the middle of one.
//!
//! Views dropped by a shrink are gone: growing again creates fresh views
//! with default settings. Only what was written to the settings store
//! survives.

use crate::config::AcquisitionConfig;
use crate::error::Result;
use crate::plugins::PluginSet;
use crate::settings::{self, Scope, CONTAINER_GROUP};
use crate::video::Transport;
use crate::view::camera::CameraView;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything needed to create a view on demand
#[derive(Clone)]
pub struct ViewFactory {
    transport: Arc<dyn Transport>,
    plugins: PluginSet,
    config: AcquisitionConfig,
}

impl ViewFactory {
    pub fn new(transport: Arc<dyn Transport>, plugins: PluginSet, config: AcquisitionConfig) -> Self {
        Self {
            transport,
            plugins,
            config,
        }
    }

    /// Factory that talks HTTP
    #[cfg(feature = "http")]
    pub fn http(plugins: PluginSet, config: AcquisitionConfig) -> Result<Self> {
        let transport = crate::video::HttpTransport::new(config.request_timeout())?;
        Ok(Self::new(Arc::new(transport), plugins, config))
    }

    /// New thumbnail view
    pub fn build(&self) -> Result<CameraView> {
        CameraView::new(
            Arc::clone(&self.transport),
            &self.plugins,
            self.config.clone(),
        )
    }

    /// New main (non-thumbnail) view
    pub fn build_main(&self) -> Result<CameraView> {
        Ok(self.build()?.with_viewport(false))
    }
}

/// Placement of one view in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub index: usize,
    pub row: usize,
    pub col: usize,
}

/// Grid of camera views
pub struct Container {
    factory: ViewFactory,
    views: Vec<CameraView>,
    count: usize,
    cols: usize,
    rows: usize,
    horizontal: bool,
    dirty: bool,
    running: bool,
}

impl Container {
    /// Container with one view
    pub fn new(factory: ViewFactory) -> Result<Self> {
        let first = factory.build()?;
        Ok(Self {
            factory,
            views: vec![first],
            count: 1,
            cols: 1,
            rows: 1,
            horizontal: true,
            dirty: false,
            running: false,
        })
    }

    pub fn factory(&self) -> &ViewFactory {
        &self.factory
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Set the number of views; values below one become one
    ///
    /// The grid becomes one row (horizontal) or one column (vertical).
    pub fn set_count(&mut self, count: usize) {
        let count = count.max(1);
        if count != self.count {
            self.dirty = true;
        }
        self.count = count;
        let (cols, rows) = if self.horizontal {
            (count, 1)
        } else {
            (1, count)
        };
        if (cols, rows) != (self.cols, self.rows) {
            self.dirty = true;
        }
        self.cols = cols;
        self.rows = rows;
    }

    /// Grid dimensions as (cols, rows)
    pub fn size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Set the grid dimensions; the view count follows
    pub fn set_size(&mut self, cols: usize, rows: usize) {
        let (cols, rows) = (cols.max(1), rows.max(1));
        if (cols, rows) != (self.cols, self.rows) {
            self.dirty = true;
            self.cols = cols;
            self.rows = rows;
        }
        if self.count != cols * rows {
            self.dirty = true;
            self.count = cols * rows;
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.horizontal
    }

    pub fn is_vertical(&self) -> bool {
        !self.horizontal
    }

    /// Orientation used by [`set_count`](Self::set_count)
    pub fn set_horizontal(&mut self, horizontal: bool) {
        if self.horizontal != horizontal {
            self.dirty = true;
            self.horizontal = horizontal;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Apply pending size changes
    ///
    /// Surplus views are shut down and dropped; missing ones are created
    /// and, while the container runs, started.
    pub fn layout(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        while self.views.len() > self.count {
            if let Some(mut view) = self.views.pop() {
                debug!("Removing camera view {}", self.views.len());
                if let Err(e) = view.shutdown() {
                    warn!("Camera view did not shut down cleanly: {}", e);
                }
            }
        }
        while self.views.len() < self.count {
            let mut view = self.factory.build()?;
            if self.running {
                view.acquire(true)?;
            }
            debug!("Adding camera view {}", self.views.len());
            self.views.push(view);
        }

        self.dirty = false;
        info!(
            "Container laid out: {} views in {}x{}",
            self.views.len(),
            self.cols,
            self.rows
        );
        Ok(())
    }

    /// View `index`, if it exists
    pub fn camera(&self, index: usize) -> Option<&CameraView> {
        self.views.get(index)
    }

    pub fn camera_mut(&mut self, index: usize) -> Option<&mut CameraView> {
        self.views.get_mut(index)
    }

    pub fn views(&self) -> impl Iterator<Item = &CameraView> {
        self.views.iter()
    }

    pub fn views_mut(&mut self) -> impl Iterator<Item = &mut CameraView> {
        self.views.iter_mut()
    }

    /// Row-major placement of the existing views
    pub fn cells(&self) -> Vec<Cell> {
        (0..self.views.len().min(self.cols * self.rows))
            .map(|index| Cell {
                index,
                row: index / self.cols,
                col: index % self.cols,
            })
            .collect()
    }

    /// Start or stop every view
    pub fn start(&mut self, on: bool) -> Result<()> {
        self.running = on;
        for view in self.views.iter_mut() {
            view.acquire(on)?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drain pending frames of every view
    pub fn pump(&mut self) -> usize {
        self.views.iter_mut().map(CameraView::pump).sum()
    }

    /// Read the container group below `scope` and every view's camera group
    ///
    /// Missing camera groups yield default views; stored groups beyond the
    /// current count are ignored.
    pub fn read_settings(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let mut group = scope.group(CONTAINER_GROUP);
        let cols: u32 = group.value_or("cols", 1);
        let rows: u32 = group.value_or("rows", 1);
        self.set_size(cols as usize, rows as usize);
        self.layout()?;

        for (index, view) in self.views.iter_mut().enumerate() {
            view.read_settings(&mut group.group(&settings::camera_group(index)));
        }
        Ok(())
    }

    /// Write the container group and one camera group per view
    pub fn write_settings(&self, scope: &mut Scope<'_>) {
        let mut group = scope.group(CONTAINER_GROUP);
        group.set_value("cols", self.cols as u32);
        group.set_value("rows", self.rows as u32);

        for (index, view) in self.views.iter().enumerate() {
            view.write_settings(&mut group.group(&settings::camera_group(index)));
        }
    }

    /// Shut down every view
    pub fn shutdown(&mut self) -> Result<()> {
        self.running = false;
        let mut first_error = None;
        for view in self.views.iter_mut() {
            if let Err(e) = view.shutdown() {
                warn!("Camera view did not shut down cleanly: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{FrameStream, TransportError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn fetch(&self, url: &str, _timeout: Duration) -> std::result::Result<Vec<u8>, TransportError> {
            Err(TransportError::StreamClosed { url: url.to_string() })
        }

        async fn open_stream(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> std::result::Result<Box<dyn FrameStream>, TransportError> {
            Err(TransportError::StreamClosed { url: url.to_string() })
        }
    }

    fn container() -> Container {
        let factory = ViewFactory::new(
            Arc::new(NullTransport),
            PluginSet::empty(),
            AcquisitionConfig::default(),
        );
        Container::new(factory).unwrap()
    }

    #[test]
    fn test_count_clamped_and_lazy() {
        let mut container = container();
        container.set_count(0);
        assert_eq!(container.count(), 1);
        assert!(!container.is_dirty());

        container.set_count(3);
        assert!(container.is_dirty());
        assert_eq!(container.size(), (3, 1));
        assert!(container.camera(1).is_none());

        container.layout().unwrap();
        assert!(!container.is_dirty());
        assert!(container.camera(2).is_some());
    }

    #[test]
    fn test_vertical_orientation() {
        let mut container = container();
        container.set_horizontal(false);
        assert!(container.is_vertical());
        container.set_count(2);
        assert_eq!(container.size(), (1, 2));
    }

    #[test]
    fn test_set_size_sets_count_and_cells() {
        let mut container = container();
        container.set_size(2, 2);
        assert_eq!(container.count(), 4);
        container.layout().unwrap();

        let cells = container.cells();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[3], Cell { index: 3, row: 1, col: 1 });
    }

    #[test]
    fn test_shrink_drops_views() {
        let mut container = container();
        container.set_count(4);
        container.layout().unwrap();
        container.set_count(2);
        container.layout().unwrap();
        assert_eq!(container.views().count(), 2);
        assert!(container.camera(2).is_none());
    }
}
