//! Tool System
//!
//! Event routing between input devices and scene tools: raw devices feed
//! named slots, virtual devices derive new slots from existing ones, and
//! tools attached to scene paths are activated by picking and driven by the
//! slots they listen to.

/// Build-time information (version, timestamp, target, compiler)
pub mod build_info;

/// Device and slot graph configuration, loaded from profiles
pub mod config;

/// Raw and virtual devices and the slot values they produce
pub mod device;

/// Health checks for configurations
pub mod health;

/// Scene change tracking
pub mod proxy;

/// Coalescing event queue with its consumer thread
pub mod queue;

/// Contracts with the scene and viewer layer
pub mod scene;

/// Slots, axis states, transformations and events
pub mod slot;

/// The orchestrating tool system
pub mod system;

/// Tools, their attachments and slot bookkeeping
pub mod tool;

pub use config::{ConfigError, ToolSystemConfig};
pub use device::{DeviceError, DeviceRegistry};
pub use proxy::{SceneChange, ToolUpdateProxy};
pub use queue::ToolEventQueue;
pub use scene::{NodeId, PickResult, PickSystem, SceneGraph, ScenePath, Viewer};
pub use slot::{AxisState, EventSource, InputSlot, SlotRegistry, ToolEvent, Transformation};
pub use system::{ToolSystem, ToolSystemError};
pub use tool::{AnimatorHandle, Tool, ToolContext, ToolError, ToolHandle};
