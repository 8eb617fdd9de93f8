//! The tool system: devices, slots and tools wired into one event pipeline
//!
//! A [`ToolSystem`] is a cheap clonable handle. Events enter through
//! [`ToolSystem::post_event`] (queued, processed on the queue's consumer
//! thread) or [`ToolSystem::process_event`] (processed on the calling
//! thread). Only one event is processed at a time; attach, detach and
//! dispose requests issued from inside a tool callback are applied once the
//! current event has been processed.

mod dispatch;
mod mouse_over;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use self::dispatch::ToolSystemCore;
use crate::config::{ConfigError, ToolSystemConfig};
use crate::device::{DeviceError, DeviceRegistry};
use crate::queue::{ToolEventQueue, ToolEventReceiver};
use crate::scene::{NodeId, PickSystem, ScenePath, Viewer};
use crate::slot::{AxisState, InputSlot, SlotRegistry, ToolEvent, Transformation};
use crate::tool::{Animator, AnimatorHandle, Tool, ToolCommand, ToolError, ToolHandle};

/// Errors surfaced by the [`ToolSystem`] API
#[derive(Debug, Error)]
pub enum ToolSystemError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The consumer thread of the event queue could not be spawned
    #[error("failed to start tool event queue: {0}")]
    Queue(#[from] std::io::Error),
    /// The empty pick path does not start at the scene root
    #[error("empty pick path {path} does not start at scene root {root:?}")]
    EmptyPickPath { path: ScenePath, root: NodeId },
    #[error("tool system is disposed")]
    Disposed,
}

/// Who is processing right now and what has to wait for it
#[derive(Debug, Default)]
struct Control {
    executing: Option<ThreadId>,
    disposed: bool,
    dispose_requested: bool,
    pending: Vec<ToolCommand>,
}

struct Shared {
    core: Mutex<ToolSystemCore>,
    control: Mutex<Control>,
    queue: ToolEventQueue,
    slots: SlotRegistry,
    animator: AnimatorHandle,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, ToolSystemCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.queue.dispose();
    }
}

/// Hands queued events back to the tool system without keeping it alive
struct QueueBridge(Weak<Shared>);

impl ToolEventReceiver for QueueBridge {
    fn process_tool_event(&self, event: ToolEvent) {
        if let Some(shared) = self.0.upgrade() {
            ToolSystem { shared }.process_event(event);
        }
    }
}

/// Handle to a running tool system
#[derive(Clone)]
pub struct ToolSystem {
    shared: Arc<Shared>,
}

impl ToolSystem {
    /// Builds a tool system with its own slot registry
    pub fn new(
        viewer: Box<dyn Viewer>,
        config: &ToolSystemConfig,
        registry: &DeviceRegistry,
    ) -> Result<Self, ToolSystemError> {
        Self::with_slots(viewer, config, registry, SlotRegistry::new())
    }

    /// Builds a tool system that names slots through `slots`
    ///
    /// The configuration is validated first; devices that fail to build are
    /// skipped and logged.
    pub fn with_slots(
        viewer: Box<dyn Viewer>,
        config: &ToolSystemConfig,
        registry: &DeviceRegistry,
        slots: SlotRegistry,
    ) -> Result<Self, ToolSystemError> {
        config.validate()?;
        let queue = ToolEventQueue::new();
        let core = ToolSystemCore::new(viewer, config, registry, &slots, &queue);
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                control: Mutex::new(Control::default()),
                queue,
                slots,
                animator: AnimatorHandle::default(),
            }),
        })
    }

    /// Slot names used by this system
    pub fn slots(&self) -> &SlotRegistry {
        &self.shared.slots
    }

    /// Producer handle of the event queue
    pub fn queue(&self) -> &ToolEventQueue {
        &self.shared.queue
    }

    /// Scheduling handle of the animator tool
    pub fn animator(&self) -> &AnimatorHandle {
        &self.shared.animator
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.control().disposed
    }

    /// Installs the animator at the scene root and starts the event queue
    pub fn initialize_scene_tools(&self) -> Result<(), ToolSystemError> {
        if self.is_disposed() {
            return Err(ToolSystemError::Disposed);
        }
        let root = {
            let mut core = self.shared.core();
            if !core.mark_scene_tools_initialized() {
                warn!("scene tools already initialized");
                return Ok(());
            }
            let animator = core.register_tool(Box::new(Animator::new(self.animator().clone())));
            let root = core.scene_root();
            core.add_tool(animator, root.clone())?;
            root
        };
        let bridge = QueueBridge(Arc::downgrade(&self.shared));
        self.shared.queue.start(Arc::new(bridge))?;
        info!(%root, "scene tools initialized");
        Ok(())
    }

    /// Hands a tool to the system; it does nothing until attached
    ///
    /// Must not be called from inside a tool callback.
    pub fn register_tool(&self, tool: Box<dyn Tool>) -> ToolHandle {
        self.shared.core().register_tool(tool)
    }

    /// Convenience for [`Self::register_tool`]
    pub fn register<T: Tool>(&self, tool: T) -> ToolHandle {
        self.register_tool(Box::new(tool))
    }

    /// Takes a detached tool back out of the system
    pub fn unregister_tool(&self, tool: ToolHandle) -> Result<Box<dyn Tool>, ToolSystemError> {
        Ok(self.shared.core().unregister_tool(tool)?)
    }

    /// Runs `f` on the registered tool if it is a `T`
    ///
    /// Must not be called from inside a tool callback.
    pub fn with_tool<T: Tool, R>(&self, tool: ToolHandle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.shared.core().tools.downcast_mut::<T>(tool).map(f)
    }

    /// Attaches `tool` at `path`
    ///
    /// From inside a tool callback the request is deferred until the
    /// current event has been processed and always returns `Ok`. From any
    /// other thread it waits for the event in progress.
    pub fn add_tool(&self, tool: ToolHandle, path: ScenePath) -> Result<(), ToolSystemError> {
        self.update(ToolCommand::Add(tool, path))
    }

    /// Detaches `tool` from `path`, deactivating it where it was active
    /// below `path`
    pub fn remove_tool(&self, tool: ToolHandle, path: ScenePath) -> Result<(), ToolSystemError> {
        self.update(ToolCommand::Remove(tool, path))
    }

    fn update(&self, command: ToolCommand) -> Result<(), ToolSystemError> {
        {
            let mut control = self.shared.control();
            if control.disposed {
                debug!(?command, "tool system disposed, ignoring tool update");
                return Err(ToolSystemError::Disposed);
            }
            if control.executing == Some(thread::current().id()) {
                trace!(?command, "deferring tool update");
                control.pending.push(command);
                return Ok(());
            }
        }
        let mut core = self.shared.core();
        match command {
            ToolCommand::Add(tool, path) => core.add_tool(tool, path)?,
            ToolCommand::Remove(tool, path) => core.remove_tool(tool, path)?,
        }
        Ok(())
    }

    /// Enqueues an event for the consumer thread
    ///
    /// Returns `false` when the event was dropped because the queue is not
    /// running.
    pub fn post_event(&self, event: ToolEvent) -> bool {
        self.shared.queue.add_event(event)
    }

    /// Processes one event on the calling thread
    ///
    /// Blocks while another thread is processing. Events arriving after
    /// [`Self::dispose`] are dropped.
    ///
    /// Mouse-over support posts its `PointerHit` events to the queue, so
    /// hover only works once [`Self::initialize_scene_tools`] has started it.
    pub fn process_event(&self, event: ToolEvent) {
        let mut core = self.shared.core();
        {
            let mut control = self.shared.control();
            if control.disposed || core.is_disposed() {
                trace!(slot = ?event.slot(), "tool system disposed, dropping event");
                return;
            }
            control.executing = Some(thread::current().id());
        }

        core.process(event);

        let dispose_requested = loop {
            let mut commands = core.take_commands();
            {
                let mut control = self.shared.control();
                commands.append(&mut control.pending);
                if commands.is_empty() {
                    control.executing = None;
                    break control.dispose_requested;
                }
            }
            for command in commands {
                core.apply(command);
            }
        };

        if dispose_requested {
            core.dispose();
            drop(core);
            self.shared.queue.dispose();
        }
    }

    /// Deactivates all active tools, disposes the devices and stops the
    /// queue
    ///
    /// From inside a tool callback disposal completes once the current event
    /// has been processed. Calling it again has no effect.
    pub fn dispose(&self) {
        {
            let mut control = self.shared.control();
            if control.disposed {
                return;
            }
            control.disposed = true;
            if control.executing == Some(thread::current().id()) {
                control.dispose_requested = true;
                debug!("dispose requested during event processing");
                return;
            }
        }
        self.shared.core().dispose();
        self.shared.queue.dispose();
    }

    /// Path used for avatar transformations, falling back to the camera path
    pub fn avatar_path(&self) -> Option<ScenePath> {
        self.shared.core().avatar_path()
    }

    /// Overrides the avatar path; `None` falls back to the camera path
    pub fn set_avatar_path(&self, path: Option<ScenePath>) {
        self.shared.core().set_avatar_path(path);
    }

    /// Path activations resolve against when the pick hits nothing
    pub fn empty_pick_path(&self) -> ScenePath {
        self.shared.core().empty_pick_path().clone()
    }

    /// Sets the empty pick path; `None` resets it to the scene root
    pub fn set_empty_pick_path(&self, path: Option<ScenePath>) -> Result<(), ToolSystemError> {
        let mut core = self.shared.core();
        let root = core.scene_root();
        let path = match path {
            None => root,
            Some(path) if path.starts_with(&root) => path,
            Some(path) => {
                let root = root.first().unwrap_or(NodeId(0));
                return Err(ToolSystemError::EmptyPickPath { path, root });
            }
        };
        core.set_empty_pick_path(path);
        Ok(())
    }

    /// Replaces the ray-cast implementation
    pub fn set_pick_system(&self, pick_system: Box<dyn PickSystem>) {
        self.shared.core().set_pick_system(pick_system);
    }

    /// Current axis value of a slot
    pub fn axis_state(&self, slot: InputSlot) -> Option<AxisState> {
        self.shared.core().devices.axis_state(slot)
    }

    /// Current transformation of a slot
    pub fn transformation(&self, slot: InputSlot) -> Option<Transformation> {
        self.shared.core().devices.transformation(slot)
    }

    /// Paths `tool` is currently active on; empty while inactive
    pub fn active_paths(&self, tool: ToolHandle) -> Vec<ScenePath> {
        self.shared.core().active_paths(tool)
    }

    /// Whether `tool` is currently active anywhere
    pub fn is_active(&self, tool: ToolHandle) -> bool {
        !self.active_paths(tool).is_empty()
    }

    /// Paths `tool` is attached at
    pub fn attachments(&self, tool: ToolHandle) -> Vec<ScenePath> {
        self.shared.core().tool_manager.attachments(tool).to_vec()
    }

    /// Trigger slots feeding `slot`
    pub fn resolve_slot(&self, slot: InputSlot) -> Vec<InputSlot> {
        self.shared
            .core()
            .slot_manager
            .resolve_slot(slot)
            .into_iter()
            .collect()
    }

    /// Descriptions of the configuration entries that were skipped
    pub fn skipped_devices(&self) -> Vec<String> {
        self.shared.core().devices.skipped().to_vec()
    }
}

impl std::fmt::Debug for ToolSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSystem")
            .field("disposed", &self.is_disposed())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}
