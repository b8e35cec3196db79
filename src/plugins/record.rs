//! Record Plugin
//!
//! Appends every frame passing through the pipeline to a frame-sequence
//! file while recording, error placeholders included. Frames are returned
//! untouched.
//!
//! Nothing is persisted; a view always starts not recording.

use crate::config::RecordConfig;
use crate::error::{MicroscopeError, Result};
use crate::plugins::plugin::{
    ActionInput, ImageTransform, MenuAction, MenuItem, Plugin, PluginContext, PointerEvent,
    ViewInfo,
};
use crate::video::{Frame, FrameSequenceWriter};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Plugin name
pub const RECORD_PLUGIN: &str = "Record";

const ACTION_RECORD: &str = "record";

/// Frame recorder
pub struct RecordPlugin {
    config: RecordConfig,
    writer: Option<FrameSequenceWriter>,
    /// File of the last recording, kept after stop
    last_file: Option<PathBuf>,
}

impl RecordPlugin {
    pub fn new(config: RecordConfig) -> Self {
        Self {
            config,
            writer: None,
            last_file: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    /// Output file of the current or most recent recording
    pub fn last_file(&self) -> Option<&PathBuf> {
        self.last_file.as_ref()
    }

    /// Open a writer; on failure the plugin stays not recording
    pub fn start_recording(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }

        let writer = FrameSequenceWriter::create(&self.config).map_err(|e| {
            error!("Failed to start recording: {}", e);
            MicroscopeError::from(e)
        })?;

        debug!("Record plugin writing to {}", writer.path().display());
        self.last_file = Some(writer.path().to_path_buf());
        self.writer = Some(writer);
        Ok(())
    }

    /// Close the writer, if any
    pub fn stop_recording(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let manifest = writer.close()?;
        info!(
            "Recording stopped: {} frames in {}",
            manifest.frames, manifest.file
        );
        Ok(())
    }
}

impl Default for RecordPlugin {
    fn default() -> Self {
        Self::new(RecordConfig::default())
    }
}

impl ImageTransform for RecordPlugin {
    fn apply_image(&mut self, frame: Frame, _view: &ViewInfo) -> Frame {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_frame(&frame) {
                warn!("Recording write failed, stopping: {}", e);
                self.writer = None;
            }
        }
        frame
    }
}

impl Plugin for RecordPlugin {
    fn name(&self) -> &str {
        RECORD_PLUGIN
    }

    fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {}

    fn context_menu(&self) -> Vec<MenuItem> {
        let label = if self.is_recording() {
            "Stop recording"
        } else {
            "Start recording"
        };
        vec![MenuAction::new(ACTION_RECORD, label).into()]
    }

    fn trigger(&mut self, action: &str, _input: ActionInput, _ctx: &mut PluginContext) -> Result<()> {
        match action {
            ACTION_RECORD if self.is_recording() => self.stop_recording(),
            ACTION_RECORD => self.start_recording(),
            other => Err(MicroscopeError::plugin(format!(
                "Unknown record action '{}'",
                other
            ))),
        }
    }

    fn as_transform(&mut self) -> Option<&mut dyn ImageTransform> {
        Some(self)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop_recording()
    }
}
