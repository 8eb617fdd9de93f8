//! Per-callback view handed to tools

use tracing::trace;

use super::ToolHandle;
use crate::device::DeviceManager;
use crate::scene::{PickResult, PickSystem, ScenePath};
use crate::slot::{AxisState, InputSlot, ToolEvent, Transformation};

/// Attach or detach request issued while events are being processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolCommand {
    Add(ToolHandle, ScenePath),
    Remove(ToolHandle, ScenePath),
}

/// Pick results of the current trigger pass, computed on first use
#[derive(Debug, Default)]
pub(crate) struct PickCache {
    results: Option<Vec<PickResult>>,
}

impl PickCache {
    pub(crate) fn clear(&mut self) {
        self.results = None;
    }

    /// Casts the pointer ray once and keeps the hits until [`Self::clear`]
    pub(crate) fn results(
        &mut self,
        devices: &DeviceManager,
        pick_system: &mut dyn PickSystem,
    ) -> &[PickResult] {
        self.results.get_or_insert_with(|| {
            let Some(pointer) = devices.transformation(InputSlot::POINTER_TRANSFORMATION) else {
                trace!("no pointer transformation, empty pick");
                return Vec::new();
            };
            let (from, to) = pointer.pointer_ray();
            pick_system.compute_pick(from, to)
        })
    }
}

/// Everything a tool may look at or request during one callback
///
/// The context is only valid for the duration of the callback.
pub struct ToolContext<'a> {
    pub(crate) event: &'a ToolEvent,
    pub(crate) source: InputSlot,
    pub(crate) tool: ToolHandle,
    pub(crate) root_to_local: &'a ScenePath,
    pub(crate) attachments: &'a [ScenePath],
    pub(crate) devices: &'a DeviceManager,
    pub(crate) picks: &'a mut PickCache,
    pub(crate) pick_system: &'a mut dyn PickSystem,
    pub(crate) avatar_path: Option<&'a ScenePath>,
    pub(crate) commands: &'a mut Vec<ToolCommand>,
    pub(crate) rejected: bool,
}

impl<'a> ToolContext<'a> {
    /// The slot that triggered the callback, under the name the tool declared
    pub fn source(&self) -> InputSlot {
        self.source
    }

    /// The triggering event
    pub fn event(&self) -> &ToolEvent {
        self.event
    }

    /// Timestamp of the triggering event
    pub fn time(&self) -> i64 {
        self.event.time()
    }

    /// Timestamp of the last processed `SystemTime` event
    pub fn system_time(&self) -> i64 {
        self.devices.system_time()
    }

    /// Handle of the tool being called
    pub fn tool(&self) -> ToolHandle {
        self.tool
    }

    /// Current axis value of any slot
    pub fn axis_state(&self, slot: InputSlot) -> Option<AxisState> {
        self.devices.axis_state(slot)
    }

    /// Current transformation of any slot
    pub fn transformation(&self, slot: InputSlot) -> Option<Transformation> {
        self.devices.transformation(slot)
    }

    /// Path from the root to the node the tool is working on
    ///
    /// For pick tools this is the pick path; for always-active tools it is
    /// the attachment path.
    pub fn root_to_local(&self) -> &ScenePath {
        self.root_to_local
    }

    /// Longest prefix of [`Self::root_to_local`] at which the tool is attached
    pub fn root_to_tool_component(&self) -> ScenePath {
        self.attachments
            .iter()
            .filter(|path| self.root_to_local.starts_with(path))
            .max_by_key(|path| path.len())
            .cloned()
            .unwrap_or_else(|| self.root_to_local.clone())
    }

    /// Nearest pick hit along the pointer ray
    pub fn current_pick(&mut self) -> Option<&PickResult> {
        self.current_picks().first()
    }

    /// All pick hits along the pointer ray, nearest first
    pub fn current_picks(&mut self) -> &[PickResult] {
        self.picks.results(self.devices, &mut *self.pick_system)
    }

    /// Avatar path, falling back to the camera path
    pub fn avatar_path(&self) -> Option<&ScenePath> {
        self.avatar_path
    }

    /// Vetoes the activation in progress
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Attaches a tool once the current event has been processed
    pub fn add_tool(&mut self, tool: ToolHandle, path: ScenePath) {
        self.commands.push(ToolCommand::Add(tool, path));
    }

    /// Detaches a tool once the current event has been processed
    pub fn remove_tool(&mut self, tool: ToolHandle, path: ScenePath) {
        self.commands.push(ToolCommand::Remove(tool, path));
    }
}
