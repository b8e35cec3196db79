//! Toggle Plugin
//!
//! A checkbox embedded in the view that starts and stops its acquisition.

use crate::error::{MicroscopeError, Result};
use crate::plugins::plugin::{
    ActionInput, Effect, MenuAction, MenuItem, Plugin, PluginContext, PointerEvent,
};
use tracing::debug;

/// Plugin name
pub const TOGGLE_PLUGIN: &str = "Toggle Plugin";

/// Action id of the embedded control
pub const ACTION_ACQUIRE: &str = "acquire";

/// Acquisition on/off control
pub struct TogglePlugin {
    checked: bool,
}

impl TogglePlugin {
    /// Starts checked
    pub fn new() -> Self {
        Self { checked: true }
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }
}

impl Default for TogglePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for TogglePlugin {
    fn name(&self) -> &str {
        TOGGLE_PLUGIN
    }

    fn handle_pointer(&mut self, _event: &PointerEvent, _ctx: &mut PluginContext) {}

    fn context_menu(&self) -> Vec<MenuItem> {
        Vec::new()
    }

    fn trigger(&mut self, action: &str, _input: ActionInput, ctx: &mut PluginContext) -> Result<()> {
        if action != ACTION_ACQUIRE {
            return Err(MicroscopeError::plugin(format!(
                "Unknown toggle action '{}'",
                action
            )));
        }

        self.checked = !self.checked;
        debug!("Acquisition toggled {}", if self.checked { "on" } else { "off" });
        ctx.emit(Effect::SetAcquisition(self.checked));
        Ok(())
    }

    fn control(&self) -> Option<MenuAction> {
        Some(MenuAction::new(ACTION_ACQUIRE, "").checked(self.checked))
    }
}
