//! Input slots and the registry that interns them
//!
//! A slot is a named logical input channel ("PointerTransformation",
//! "SystemTime", ...). Slots are interned by a [`SlotRegistry`] into small
//! integer ids; two slots with the same name compare equal.
//!
//! The registry is an explicit value owned by the tool system and shared by
//! reference with everything that needs to name slots (tools, devices,
//! configuration loading). There is no process-wide table.

mod alias;
mod axis;
mod event;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexSet;

pub use alias::AliasMap;
pub use axis::AxisState;
pub use event::{EventSource, ToolEvent, Transformation};

/// Interned identifier of a logical input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSlot(u32);

impl InputSlot {
    /// Elapsed system time, posted by the system timer
    pub const SYSTEM_TIME: InputSlot = InputSlot(0);
    /// World-space pointer frame; its -z axis is the pick ray
    pub const POINTER_TRANSFORMATION: InputSlot = InputSlot(1);
    /// Synthetic hover slot fed by mouse-over support
    pub const POINTER_HIT: InputSlot = InputSlot(2);
    /// Pointer position in normalized device coordinates
    pub const POINTER_NDC: InputSlot = InputSlot(3);
    /// Implicit: avatar (or camera) to world
    pub const AVATAR_TRANSFORMATION: InputSlot = InputSlot(4);
    /// Implicit: world to camera
    pub const WORLD_TO_CAMERA: InputSlot = InputSlot(5);
    /// Implicit: camera to normalized device coordinates
    pub const CAMERA_TO_NDC: InputSlot = InputSlot(6);
    /// Source slot of the synthetic deactivation sent when a tool is detached
    pub const REMOVE: InputSlot = InputSlot(7);

    /// Position of this slot in its registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Names of the pre-interned slots, in id order
const WELL_KNOWN: [&str; 8] = [
    "SystemTime",
    "PointerTransformation",
    "PointerHit",
    "PointerNDC",
    "AvatarTransformation",
    "WorldToCamera",
    "CameraToNDC",
    "remove",
];

/// Interns slot names into [`InputSlot`] ids
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct SlotRegistry {
    names: Arc<RwLock<IndexSet<Arc<str>>>>,
}

impl SlotRegistry {
    /// Creates a registry with the well-known slots already interned
    pub fn new() -> Self {
        let names = WELL_KNOWN.iter().map(|n| Arc::<str>::from(*n)).collect();
        Self {
            names: Arc::new(RwLock::new(names)),
        }
    }

    /// Returns the slot for `name`, interning it on first use
    pub fn slot(&self, name: &str) -> InputSlot {
        if let Some(slot) = self.lookup(name) {
            return slot;
        }
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        let (index, _) = names.insert_full(Arc::from(name));
        InputSlot(index as u32)
    }

    /// Returns the slot for `name` if it was interned before
    pub fn lookup(&self, name: &str) -> Option<InputSlot> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.get_index_of(name).map(|i| InputSlot(i as u32))
    }

    /// Name of an interned slot
    pub fn name(&self, slot: InputSlot) -> Option<Arc<str>> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.get_index(slot.index()).cloned()
    }

    /// Printable name, falling back to the raw id for foreign slots
    pub fn display(&self, slot: InputSlot) -> String {
        self.name(slot)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("#{}", slot.0))
    }

    /// Interns every name in `names`
    pub fn slots<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<InputSlot> {
        names.into_iter().map(|n| self.slot(n)).collect()
    }

    /// Number of interned slots
    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Always false: the well-known slots are interned on construction
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("len", &self.len())
            .finish()
    }
}
