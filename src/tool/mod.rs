//! Tools and their bookkeeping
//!
//! A [`Tool`] is a behavior object attached to one or more scene paths. Tools
//! with activation slots are *pick tools*: a press on one of those slots picks
//! into the scene and activates the tools attached closest to the hit. Tools
//! without activation slots are *always active* on every path they are
//! attached to.
//!
//! Tools live in a [`ToolArena`] owned by the tool system and are addressed by
//! [`ToolHandle`]s everywhere else.

mod animator;
mod context;
mod manager;
mod slots;

use std::any::Any;
use std::fmt;

use thiserror::Error;

pub use animator::{Animator, AnimatorHandle, AnimatorTask};
pub use context::ToolContext;
pub(crate) use context::{PickCache, ToolCommand};
pub use manager::ToolManager;
pub use slots::SlotManager;

use crate::scene::ScenePath;
use crate::slot::InputSlot;

/// Errors of tool attachment bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The tool is already attached at this path
    #[error("tool {tool} is already attached at {path}")]
    DuplicateAttachment { tool: ToolHandle, path: ScenePath },
    /// The tool is not attached at this path
    #[error("tool {tool} is not attached at {path}")]
    UnknownAttachment { tool: ToolHandle, path: ScenePath },
    /// The handle does not name a registered tool
    #[error("unknown tool {0}")]
    UnknownTool(ToolHandle),
    /// The tool cannot be unregistered while it is attached
    #[error("tool {0} is still attached")]
    StillAttached(ToolHandle),
}

/// Arena index of a registered tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolHandle(usize);

impl ToolHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Behavior object driven by slot events
///
/// All callbacks run on the thread that processes tool events, one at a
/// time. A tool that calls [`ToolContext::reject`] from
/// [`Tool::activate`] is not activated.
pub trait Tool: Any + Send {
    /// Slots whose press activates the tool; empty for always-active tools
    fn activation_slots(&self) -> &[InputSlot];

    /// Slots the tool listens to while active; may change between events
    fn current_slots(&self) -> &[InputSlot];

    fn activate(&mut self, _ctx: &mut ToolContext<'_>) {}

    fn perform(&mut self, _ctx: &mut ToolContext<'_>) {}

    fn deactivate(&mut self, _ctx: &mut ToolContext<'_>) {}

    fn description(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Storage of registered tools
#[derive(Default)]
pub struct ToolArena {
    tools: Vec<Option<Box<dyn Tool>>>,
}

impl ToolArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tool and returns its handle
    pub fn insert(&mut self, tool: Box<dyn Tool>) -> ToolHandle {
        self.tools.push(Some(tool));
        ToolHandle(self.tools.len() - 1)
    }

    /// Takes a tool out of the arena; its handle is never reused
    pub fn remove(&mut self, handle: ToolHandle) -> Option<Box<dyn Tool>> {
        self.tools.get_mut(handle.0).and_then(Option::take)
    }

    pub fn get(&self, handle: ToolHandle) -> Option<&dyn Tool> {
        self.tools.get(handle.0).and_then(|t| t.as_deref())
    }

    pub fn get_mut(&mut self, handle: ToolHandle) -> Option<&mut Box<dyn Tool>> {
        self.tools.get_mut(handle.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, handle: ToolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Typed view of a tool
    pub fn downcast_ref<T: Tool>(&self, handle: ToolHandle) -> Option<&T> {
        let tool: &dyn Any = self.get(handle)?;
        tool.downcast_ref::<T>()
    }

    /// Mutable typed view of a tool
    pub fn downcast_mut<T: Tool>(&mut self, handle: ToolHandle) -> Option<&mut T> {
        let tool: &mut dyn Any = self.get_mut(handle)?.as_mut();
        tool.downcast_mut::<T>()
    }

    /// Activation slots of a tool, empty for unknown handles
    pub fn activation_slots(&self, handle: ToolHandle) -> Vec<InputSlot> {
        self.get(handle)
            .map(|t| t.activation_slots().to_vec())
            .unwrap_or_default()
    }

    /// Current slots of a tool, empty for unknown handles
    pub fn current_slots(&self, handle: ToolHandle) -> Vec<InputSlot> {
        self.get(handle)
            .map(|t| t.current_slots().to_vec())
            .unwrap_or_default()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.iter().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ToolArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.tools
                    .iter()
                    .flatten()
                    .map(|tool| tool.description()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        activation: Vec<InputSlot>,
    }

    impl Tool for Probe {
        fn activation_slots(&self) -> &[InputSlot] {
            &self.activation
        }

        fn current_slots(&self) -> &[InputSlot] {
            &[InputSlot::POINTER_TRANSFORMATION]
        }
    }

    #[test]
    fn test_arena_handles_are_not_reused() {
        let mut arena = ToolArena::new();
        let a = arena.insert(Box::new(Probe { activation: vec![] }));
        assert!(arena.remove(a).is_some());
        let b = arena.insert(Box::new(Probe { activation: vec![] }));
        assert_ne!(a, b);
        assert!(!arena.contains(a));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_downcast_and_slots() {
        let mut arena = ToolArena::new();
        let handle = arena.insert(Box::new(Probe {
            activation: vec![InputSlot::POINTER_HIT],
        }));
        let probe = arena.downcast_ref::<Probe>(handle).unwrap();
        assert_eq!(probe.activation, vec![InputSlot::POINTER_HIT]);
        assert_eq!(
            arena.current_slots(handle),
            vec![InputSlot::POINTER_TRANSFORMATION]
        );
        assert!(arena.activation_slots(ToolHandle(99)).is_empty());
    }
}
