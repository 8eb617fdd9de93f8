//! Single-threaded event processing behind the [`super::ToolSystem`] lock

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, info, trace, warn};

use super::mouse_over::MouseOver;
use crate::config::ToolSystemConfig;
use crate::device::{DeviceManager, DeviceRegistry};
use crate::queue::ToolEventQueue;
use crate::scene::{NoPick, PickSystem, ScenePath, Viewer};
use crate::slot::{AxisState, EventSource, InputSlot, SlotRegistry, ToolEvent};
use crate::tool::{
    PickCache, SlotManager, Tool, ToolArena, ToolCommand, ToolContext, ToolError, ToolHandle,
    ToolManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Activate,
    Perform,
    Deactivate,
}

/// Reference-counted attachment of the mouse-over tool
#[derive(Debug)]
struct MouseOverSupport {
    tool: ToolHandle,
    users: usize,
}

pub(crate) struct ToolSystemCore {
    pub(crate) tools: ToolArena,
    pub(crate) devices: DeviceManager,
    pub(crate) slot_manager: SlotManager,
    pub(crate) tool_manager: ToolManager,
    viewer: Box<dyn Viewer>,
    pick_system: Box<dyn PickSystem>,
    picks: PickCache,
    comp_queue: VecDeque<ToolEvent>,
    trigger_queue: Vec<ToolEvent>,
    /// Paths each active tool is active on: the pick path for pick tools,
    /// every attachment path for always-active tools
    active_paths: IndexMap<ToolHandle, Vec<ScenePath>>,
    commands: Vec<ToolCommand>,
    empty_pick_path: ScenePath,
    mouse_over: MouseOverSupport,
    max_iterations: usize,
    scene_tools_initialized: bool,
    disposed: bool,
}

impl ToolSystemCore {
    pub(crate) fn new(
        viewer: Box<dyn Viewer>,
        config: &ToolSystemConfig,
        registry: &DeviceRegistry,
        slots: &SlotRegistry,
        queue: &ToolEventQueue,
    ) -> Self {
        let devices = DeviceManager::new(config, registry, slots, queue);
        let slot_manager = SlotManager::new(devices.aliases().clone());
        let mut tools = ToolArena::new();
        let mouse_over = tools.insert(Box::new(MouseOver::new(queue.clone())));
        let empty_pick_path = ScenePath::root(viewer.scene_root());

        info!(
            profile = %config.profile,
            raw_devices = devices.raw_device_ids().count(),
            virtual_devices = devices.virtual_device_count(),
            skipped = devices.skipped().len(),
            "tool system core ready"
        );

        Self {
            tools,
            devices,
            slot_manager,
            tool_manager: ToolManager::new(),
            viewer,
            pick_system: Box::new(NoPick),
            picks: PickCache::default(),
            comp_queue: VecDeque::new(),
            trigger_queue: Vec::new(),
            active_paths: IndexMap::new(),
            commands: Vec::new(),
            empty_pick_path,
            mouse_over: MouseOverSupport {
                tool: mouse_over,
                users: 0,
            },
            max_iterations: config.system.max_iterations,
            scene_tools_initialized: false,
            disposed: false,
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn scene_root(&self) -> ScenePath {
        ScenePath::root(self.viewer.scene_root())
    }

    /// Marks scene tools as installed; false if they already were
    pub(crate) fn mark_scene_tools_initialized(&mut self) -> bool {
        !std::mem::replace(&mut self.scene_tools_initialized, true)
    }

    pub(crate) fn register_tool(&mut self, tool: Box<dyn Tool>) -> ToolHandle {
        self.tools.insert(tool)
    }

    pub(crate) fn unregister_tool(&mut self, tool: ToolHandle) -> Result<Box<dyn Tool>, ToolError> {
        if self.tool_manager.is_attached(tool) {
            return Err(ToolError::StillAttached(tool));
        }
        self.tools.remove(tool).ok_or(ToolError::UnknownTool(tool))
    }

    pub(crate) fn set_pick_system(&mut self, pick_system: Box<dyn PickSystem>) {
        self.pick_system = pick_system;
        self.picks.clear();
    }

    pub(crate) fn empty_pick_path(&self) -> &ScenePath {
        &self.empty_pick_path
    }

    pub(crate) fn set_empty_pick_path(&mut self, path: ScenePath) {
        self.empty_pick_path = path;
    }

    pub(crate) fn avatar_path(&self) -> Option<ScenePath> {
        self.devices
            .avatar_path()
            .cloned()
            .or_else(|| self.viewer.camera_path())
    }

    pub(crate) fn set_avatar_path(&mut self, path: Option<ScenePath>) {
        self.devices.set_avatar_path(path);
    }

    pub(crate) fn active_paths(&self, tool: ToolHandle) -> Vec<ScenePath> {
        self.active_paths.get(&tool).cloned().unwrap_or_default()
    }

    pub(crate) fn take_commands(&mut self) -> Vec<ToolCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Applies a deferred attach or detach, logging failures
    pub(crate) fn apply(&mut self, command: ToolCommand) {
        let result = match command {
            ToolCommand::Add(tool, path) => self.add_tool(tool, path),
            ToolCommand::Remove(tool, path) => self.remove_tool(tool, path),
        };
        if let Err(error) = result {
            error!(%error, "deferred tool update failed");
        }
    }

    /// Runs one external event through devices and tools until the implicit
    /// devices report no further change
    pub(crate) fn process(&mut self, event: ToolEvent) {
        let system_time = (event.slot() == InputSlot::SYSTEM_TIME).then(|| event.time());
        self.comp_queue.push_back(event);

        let mut iterations = 0;
        loop {
            self.process_computational_queue();
            self.process_trigger_queue();

            let implicit = self.devices.update_implicit_devices(self.viewer.as_ref());
            if implicit.is_empty() {
                break;
            }
            iterations += 1;
            if iterations > self.max_iterations {
                warn!(
                    iterations,
                    "implicit devices did not settle, dropping pending events"
                );
                self.comp_queue.clear();
                break;
            }
            self.comp_queue.extend(implicit);
        }

        if let Some(time) = system_time {
            self.devices.set_system_time(time);
        }
    }

    fn process_computational_queue(&mut self) {
        while let Some(mut event) = self.comp_queue.pop_front() {
            self.devices.evaluate_event(&mut event, &mut self.comp_queue);
            if self.slot_manager.is_trigger(event.slot()) && !event.is_consumed() {
                self.trigger_queue.push(event);
            }
        }
    }

    fn process_trigger_queue(&mut self) {
        if self.trigger_queue.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.trigger_queue);
        self.picks.clear();

        let mut activated = IndexSet::new();
        let mut deactivated = IndexSet::new();
        let mut still_active = IndexSet::new();
        let mut pick_path: Option<ScenePath> = None;

        for event in &events {
            let slot = event.slot();
            let axis = self.devices.axis_state(slot);
            let mut no_trigger = true;

            if axis.is_some_and(AxisState::is_pressed) {
                let mut candidates = self.slot_manager.tools_activated_by(slot);
                candidates.retain(|tool| !activated.contains(tool));
                if !candidates.is_empty() {
                    let path = match &pick_path {
                        Some(path) => path.clone(),
                        None => {
                            let path = self.calculate_pick_path();
                            pick_path = Some(path.clone());
                            path
                        }
                    };
                    let selected = self.activate_closest(&path, &candidates, event);
                    no_trigger = selected.is_empty();
                    activated.extend(selected);
                }
            }

            if axis.is_some_and(AxisState::is_released) {
                let mut releasing = self.slot_manager.tools_deactivated_by(slot);
                for &tool in &activated {
                    if self.slot_manager.is_activation_slot_of(tool, slot, &self.tools) {
                        releasing.insert(tool);
                    }
                }
                releasing.retain(|tool| !deactivated.contains(tool));
                for &tool in &releasing {
                    self.deactivate_tool(tool, event);
                }
                no_trigger = releasing.is_empty();
                deactivated.extend(releasing);
            }

            if no_trigger {
                let mut active = self.slot_manager.active_tools_for(slot);
                active.retain(|tool| !deactivated.contains(tool));
                for &tool in &active {
                    self.perform_tool(tool, event);
                }
                still_active.extend(active);
            }
        }

        still_active.retain(|tool| !deactivated.contains(tool) && !activated.contains(tool));
        self.slot_manager
            .update_maps(&still_active, &activated, &deactivated, &self.tools);
    }

    fn calculate_pick_path(&mut self) -> ScenePath {
        let results = self.picks.results(&self.devices, self.pick_system.as_mut());
        match results.first() {
            Some(hit) => hit.path.clone(),
            None => self.empty_pick_path.clone(),
        }
    }

    /// Activates the candidates attached closest to the end of `path`
    ///
    /// When every tool at the closest level rejects, the search continues
    /// above it.
    fn activate_closest(
        &mut self,
        path: &ScenePath,
        candidates: &IndexSet<ToolHandle>,
        event: &ToolEvent,
    ) -> Vec<ToolHandle> {
        let mut level = path.len();
        let mut accepted = Vec::new();
        while accepted.is_empty() && level > 0 {
            let Some((found, selection)) =
                self.tool_manager
                    .select_tools_for_path(path, level, candidates)
            else {
                break;
            };
            for tool in selection {
                self.active_paths.insert(tool, vec![path.clone()]);
                let source = self.slot_manager.resolve_slot_for_tool(tool, event.slot());
                if self.invoke(tool, Phase::Activate, event, source, path) {
                    debug!(%tool, %path, "tool rejected activation");
                    self.active_paths.shift_remove(&tool);
                } else {
                    debug!(%tool, %path, "activated tool");
                    accepted.push(tool);
                }
            }
            level = found - 1;
        }
        accepted
    }

    fn deactivate_tool(&mut self, tool: ToolHandle, event: &ToolEvent) {
        let source = self.slot_manager.resolve_slot_for_tool(tool, event.slot());
        for path in self.active_paths(tool) {
            self.invoke(tool, Phase::Deactivate, event, source, &path);
        }
        if self.tool_manager.needs_pick(tool) {
            self.active_paths.shift_remove(&tool);
        }
        debug!(%tool, "deactivated tool");
    }

    fn perform_tool(&mut self, tool: ToolHandle, event: &ToolEvent) {
        let source = self.slot_manager.resolve_slot_for_tool(tool, event.slot());
        for path in self.active_paths(tool) {
            self.invoke(tool, Phase::Perform, event, source, &path);
        }
    }

    /// Calls one tool callback; returns whether the tool rejected
    fn invoke(
        &mut self,
        tool: ToolHandle,
        phase: Phase,
        event: &ToolEvent,
        source: InputSlot,
        path: &ScenePath,
    ) -> bool {
        let avatar = self.avatar_path();
        let Self {
            tools,
            devices,
            tool_manager,
            picks,
            pick_system,
            commands,
            ..
        } = self;
        let Some(instance) = tools.get_mut(tool) else {
            warn!(%tool, "callback for unregistered tool");
            return false;
        };

        trace!(%tool, ?phase, %path, "calling tool");
        let mut ctx = ToolContext {
            event,
            source,
            tool,
            root_to_local: path,
            attachments: tool_manager.attachments(tool),
            devices,
            picks,
            pick_system: pick_system.as_mut(),
            avatar_path: avatar.as_ref(),
            commands,
            rejected: false,
        };
        match phase {
            Phase::Activate => instance.activate(&mut ctx),
            Phase::Perform => instance.perform(&mut ctx),
            Phase::Deactivate => instance.deactivate(&mut ctx),
        }
        phase == Phase::Activate && ctx.rejected
    }

    fn removal_event(&self) -> ToolEvent {
        ToolEvent::new(
            EventSource::system(),
            self.devices.system_time(),
            InputSlot::REMOVE,
            None,
            None,
        )
    }

    /// Attaches `tool` at `path`
    pub(crate) fn add_tool(&mut self, tool: ToolHandle, path: ScenePath) -> Result<(), ToolError> {
        if !self.tools.contains(tool) {
            return Err(ToolError::UnknownTool(tool));
        }
        let activation = self.tools.activation_slots(tool);
        let needs_pick = !activation.is_empty();
        let first = self.tool_manager.add_tool(tool, path.clone(), needs_pick)?;
        debug!(%tool, %path, first, "attached tool");

        if !needs_pick {
            self.active_paths.entry(tool).or_default().push(path);
        }
        if first {
            self.slot_manager.register_tool(tool, &self.tools);
            if activation.contains(&InputSlot::POINTER_HIT) {
                self.mouse_over_added();
            }
        }
        Ok(())
    }

    /// Detaches `tool` from `path`, deactivating the instances it selected
    pub(crate) fn remove_tool(&mut self, tool: ToolHandle, path: ScenePath) -> Result<(), ToolError> {
        let needs_pick = self.tool_manager.needs_pick(tool);
        let last = self.tool_manager.remove_tool(tool, &path)?;
        debug!(%tool, %path, last, "detached tool");

        if let Some(paths) = self.active_paths.get(&tool).cloned() {
            // A pick instance ends only when `path` is the attachment that
            // selected it, i.e. the deepest attachment above the pick path
            let remaining = self.tool_manager.attachments(tool);
            let (ending, keep): (Vec<ScenePath>, Vec<ScenePath>) =
                paths.into_iter().partition(|active| {
                    if needs_pick {
                        active.starts_with(&path)
                            && !remaining
                                .iter()
                                .any(|other| other.len() > path.len() && active.starts_with(other))
                    } else {
                        *active == path
                    }
                });
            if !ending.is_empty() {
                let event = self.removal_event();
                for active in &ending {
                    self.invoke(tool, Phase::Deactivate, &event, InputSlot::REMOVE, active);
                }
                if needs_pick && !last {
                    let deactivated = IndexSet::from([tool]);
                    self.slot_manager.update_maps(
                        &IndexSet::new(),
                        &IndexSet::new(),
                        &deactivated,
                        &self.tools,
                    );
                }
            }
            if keep.is_empty() {
                self.active_paths.shift_remove(&tool);
            } else {
                self.active_paths.insert(tool, keep);
            }
        }

        if last {
            self.slot_manager.unregister_tool(tool);
            if self
                .tools
                .activation_slots(tool)
                .contains(&InputSlot::POINTER_HIT)
            {
                self.mouse_over_removed();
            }
        }
        Ok(())
    }

    fn mouse_over_added(&mut self) {
        if self.mouse_over.users == 0 {
            let root = self.scene_root();
            if let Err(error) = self.add_tool(self.mouse_over.tool, root) {
                error!(%error, "couldn't attach mouse-over support");
                return;
            }
            debug!("mouse-over support attached");
        }
        self.mouse_over.users += 1;
    }

    fn mouse_over_removed(&mut self) {
        match self.mouse_over.users {
            0 => {}
            1 => {
                self.mouse_over.users = 0;
                let root = self.scene_root();
                if let Err(error) = self.remove_tool(self.mouse_over.tool, root) {
                    error!(%error, "couldn't detach mouse-over support");
                }
                debug!("mouse-over support detached");
            }
            _ => self.mouse_over.users -= 1,
        }
    }

    /// Deactivates every active tool on every active path, then shuts down
    /// the devices
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let event = self.removal_event();
        let active: Vec<(ToolHandle, Vec<ScenePath>)> = self.active_paths.drain(..).collect();
        let count = active.len();
        for (tool, paths) in active {
            for path in &paths {
                self.invoke(tool, Phase::Deactivate, &event, InputSlot::REMOVE, path);
            }
        }
        self.commands.clear();
        self.comp_queue.clear();
        self.trigger_queue.clear();
        self.devices.dispose();
        info!(deactivated = count, "tool system disposed");
    }
}
