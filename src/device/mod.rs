//! Slot values, raw devices and the virtual device graph
//!
//! The [`DeviceManager`] holds the current value of every slot. Raw device
//! events are recorded, copied to their aliases and fed to every virtual
//! device listening on the slot; derived events go back to the caller's
//! computational queue. The implicit camera and avatar slots are recomputed
//! from the viewer once per outer iteration of the tool system.
//!
//! The device graph is resolved once from a [`ToolSystemConfig`] and is not
//! changed afterwards. Devices that fail to build are logged and left out.

mod poller;
mod raw;
mod virtual_device;
mod virtuals;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

pub use poller::{Poller, SharedRawDevice};
pub use raw::{RawDevice, SystemTimer};
pub use virtual_device::{MissingSlot, VirtualDevice, VirtualDeviceContext};
pub use virtuals::{
    CoupledAxis, InvertMatrix, PointerTransformation, ProductMatrix, ReverseAxis, ThresholdButton,
};

use crate::config::{RawMapping, ToolSystemConfig};
use crate::queue::ToolEventQueue;
use crate::scene::{ScenePath, Viewer};
use crate::slot::{AliasMap, AxisState, EventSource, InputSlot, SlotRegistry, ToolEvent, Transformation};
use virtual_device::SlotValues;

/// Errors raised while building or mapping devices
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No factory is registered for the device kind
    #[error("unknown device kind '{0}'")]
    UnknownKind(String),
    /// The device has no channel with this name
    #[error("device '{device}' has no channel '{channel}'")]
    UnknownChannel { device: String, channel: String },
    /// An option value could not be used
    #[error("invalid value '{value}' for option '{key}'")]
    InvalidOption { key: String, value: String },
    /// A virtual device was configured with the wrong number of inputs
    #[error("{kind} expects {expected} input slots, got {found}")]
    InputCount {
        kind: String,
        expected: usize,
        found: usize,
    },
    /// A raw mapping produced its initial value on a different slot
    #[error("initial value for '{expected}' was posted on '{found}'")]
    SlotMismatch { expected: String, found: String },
    /// Driver-specific failure
    #[error("device driver failed: {0}")]
    Driver(String),
}

/// Factory for raw devices of one kind
pub type RawDeviceFactory = Box<dyn Fn() -> Box<dyn RawDevice> + Send + Sync>;
/// Factory for virtual devices of one kind
pub type VirtualDeviceFactory = Box<dyn Fn() -> Box<dyn VirtualDevice> + Send + Sync>;

/// Device kinds known to a tool system, keyed by their configuration name
pub struct DeviceRegistry {
    raw: BTreeMap<String, RawDeviceFactory>,
    virtuals: BTreeMap<String, VirtualDeviceFactory>,
}

impl DeviceRegistry {
    /// Registry without any kinds
    pub fn empty() -> Self {
        Self {
            raw: BTreeMap::new(),
            virtuals: BTreeMap::new(),
        }
    }

    /// Registry with the built-in raw and virtual kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_raw("system-timer", || Box::new(SystemTimer::new()));
        registry.register_virtual("product-matrix", || Box::<ProductMatrix>::default());
        registry.register_virtual("invert-matrix", || Box::<InvertMatrix>::default());
        registry.register_virtual("reverse-axis", || Box::<ReverseAxis>::default());
        registry.register_virtual("coupled-axis", || Box::<CoupledAxis>::default());
        registry.register_virtual("threshold-button", || Box::<ThresholdButton>::default());
        registry.register_virtual("pointer-transformation", || {
            Box::<PointerTransformation>::default()
        });
        registry
    }

    /// Registers (or replaces) a raw device kind
    pub fn register_raw<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn RawDevice> + Send + Sync + 'static,
    {
        self.raw.insert(kind.into(), Box::new(factory));
    }

    /// Registers (or replaces) a virtual device kind
    pub fn register_virtual<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn VirtualDevice> + Send + Sync + 'static,
    {
        self.virtuals.insert(kind.into(), Box::new(factory));
    }

    pub fn create_raw(&self, kind: &str) -> Result<Box<dyn RawDevice>, DeviceError> {
        self.raw
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| DeviceError::UnknownKind(kind.to_string()))
    }

    pub fn create_virtual(&self, kind: &str) -> Result<Box<dyn VirtualDevice>, DeviceError> {
        self.virtuals
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| DeviceError::UnknownKind(kind.to_string()))
    }

    pub fn knows_raw(&self, kind: &str) -> bool {
        self.raw.contains_key(kind)
    }

    pub fn knows_virtual(&self, kind: &str) -> bool {
        self.virtuals.contains_key(kind)
    }

    pub fn raw_kinds(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    pub fn virtual_kinds(&self) -> impl Iterator<Item = &str> {
        self.virtuals.keys().map(String::as_str)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("raw", &self.raw.keys().collect::<Vec<_>>())
            .field("virtual", &self.virtuals.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct VirtualEntry {
    device: Box<dyn VirtualDevice>,
    output: InputSlot,
}

/// Last implicit matrices handed out as events
#[derive(Debug, Clone, Copy)]
struct ImplicitCache {
    world_to_camera: Transformation,
    camera_to_ndc: Transformation,
    avatar: Transformation,
}

/// Owner of all slot values and devices of one tool system
pub struct DeviceManager {
    slots: SlotRegistry,
    values: SlotValues,
    aliases: AliasMap,
    alias_targets: HashMap<InputSlot, IndexSet<InputSlot>>,
    raw_devices: IndexMap<String, SharedRawDevice>,
    virtual_devices: Vec<VirtualEntry>,
    listeners: HashMap<InputSlot, Vec<usize>>,
    implicit: ImplicitCache,
    avatar_path: Option<ScenePath>,
    system_time: i64,
    matrix_epsilon: f64,
    poller: Option<Poller>,
    skipped: Vec<String>,
    disposed: bool,
}

impl DeviceManager {
    /// Builds devices, mappings, constants and aliases from `config`
    ///
    /// Construction never fails as a whole: each device or mapping that
    /// cannot be built is logged, recorded in [`Self::skipped`] and left out.
    pub fn new(
        config: &ToolSystemConfig,
        registry: &DeviceRegistry,
        slots: &SlotRegistry,
        queue: &ToolEventQueue,
    ) -> Self {
        let mut manager = Self {
            slots: slots.clone(),
            values: SlotValues::default(),
            aliases: AliasMap::from_mappings(&config.virtual_mappings, slots),
            alias_targets: HashMap::new(),
            raw_devices: IndexMap::new(),
            virtual_devices: Vec::new(),
            listeners: HashMap::new(),
            implicit: ImplicitCache {
                world_to_camera: Transformation::IDENTITY,
                camera_to_ndc: Transformation::IDENTITY,
                avatar: Transformation::IDENTITY,
            },
            avatar_path: None,
            system_time: now_millis(),
            matrix_epsilon: config.system.matrix_epsilon,
            poller: None,
            skipped: Vec::new(),
            disposed: false,
        };

        for device in &config.raw_devices {
            let created = registry.create_raw(&device.kind).and_then(|mut raw| {
                raw.initialize(&device.options, queue.clone())?;
                Ok(raw)
            });
            match created {
                Ok(raw) => {
                    info!(device = %device.id, kind = %device.kind, "started raw device");
                    manager
                        .raw_devices
                        .insert(device.id.clone(), Arc::new(Mutex::new(raw)));
                }
                Err(error) => {
                    info!(device = %device.id, %error, "couldn't create raw device");
                    manager.skipped.push(format!("raw device '{}': {}", device.id, error));
                }
            }
        }

        for mapping in &config.raw_mappings {
            if let Err(error) = manager.map_raw(mapping) {
                info!(device = %mapping.device, source = %mapping.source, %error, "cannot map slot");
                manager.skipped.push(format!(
                    "mapping '{}:{}': {}",
                    mapping.device, mapping.source, error
                ));
            }
        }

        for constant in &config.constants {
            let slot = slots.slot(&constant.slot);
            if let Some(axis) = constant.axis {
                manager.values.set_axis(slot, AxisState::new(axis));
            }
            let matrix = constant
                .transformation
                .as_deref()
                .and_then(|values| <&[f64; 16]>::try_from(values).ok());
            if let Some(values) = matrix {
                manager
                    .values
                    .set_transformation(slot, Transformation::from_row_major(values));
            }
            debug!(slot = %constant.slot, "created virtual constant");
        }

        // Pointer at the origin looking down -z until a driver writes it
        for slot in [
            InputSlot::POINTER_TRANSFORMATION,
            InputSlot::AVATAR_TRANSFORMATION,
            InputSlot::WORLD_TO_CAMERA,
            InputSlot::CAMERA_TO_NDC,
        ] {
            manager
                .values
                .set_transformation(slot, Transformation::IDENTITY);
        }

        for device in &config.virtual_devices {
            let inputs = slots.slots(device.inputs.iter().map(String::as_str));
            let output = slots.slot(&device.output);
            let created = registry.create_virtual(&device.kind).and_then(|mut virtual_device| {
                virtual_device.initialize(&inputs, output, &device.options)?;
                Ok(virtual_device)
            });
            match created {
                Ok(virtual_device) => {
                    manager.add_virtual(virtual_device, &inputs, output);
                    info!(kind = %device.kind, output = %device.output, "created virtual device");
                }
                Err(error) => {
                    info!(kind = %device.kind, %error, "virtual device failed");
                    manager.skipped.push(format!(
                        "virtual device '{}' -> '{}': {}",
                        device.kind, device.output, error
                    ));
                }
            }
        }

        // Aliases take the value of their trigger slots. With several
        // triggers the latest value wins.
        for mapping in &config.virtual_mappings {
            let target = slots.slot(&mapping.target);
            for trigger in manager.aliases.resolve(target) {
                manager.alias_targets.entry(trigger).or_default().insert(target);
                let axis = manager.values.axis(trigger);
                let transformation = manager.values.transformation(trigger);
                manager.values.record(target, axis, transformation);
            }
        }

        let polling: Vec<SharedRawDevice> = manager
            .raw_devices
            .values()
            .filter(|device| {
                device
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_polling()
            })
            .cloned()
            .collect();
        if !polling.is_empty() {
            let interval = Duration::from_millis(config.system.poll_interval_ms.max(1));
            match Poller::spawn(polling, interval) {
                Ok(poller) => manager.poller = Some(poller),
                Err(error) => warn!(%error, "couldn't start poller, polling devices stay silent"),
            }
        }

        manager
    }

    fn map_raw(&mut self, mapping: &RawMapping) -> Result<(), DeviceError> {
        let device = self
            .raw_devices
            .get(&mapping.device)
            .ok_or_else(|| DeviceError::UnknownKind(mapping.device.clone()))?;
        let target = self.slots.slot(&mapping.target);
        let initial = device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_raw_device(&mapping.source, target)?;
        if initial.slot() != target {
            return Err(DeviceError::SlotMismatch {
                expected: mapping.target.clone(),
                found: self.slots.display(initial.slot()),
            });
        }
        self.values
            .record(target, initial.axis_state(), initial.transformation());
        debug!(device = %mapping.device, source = %mapping.source, target = %mapping.target, "mapped raw slot");
        Ok(())
    }

    fn add_virtual(&mut self, mut device: Box<dyn VirtualDevice>, inputs: &[InputSlot], output: InputSlot) {
        let index = self.virtual_devices.len();
        for &input in inputs {
            let mut probe = ToolEvent::new(
                EventSource::system(),
                self.system_time,
                input,
                self.values.axis(input),
                self.values.transformation(input),
            );
            let mut ctx = VirtualDeviceContext::new(&mut probe, &self.values);
            match device.process(&mut ctx) {
                Ok(Some(initial)) => {
                    self.values.record(
                        initial.slot(),
                        initial.axis_state(),
                        initial.transformation(),
                    );
                }
                Ok(None) => {}
                Err(MissingSlot(slot)) => {
                    debug!(device = device.name(), slot = %self.slots.display(slot), "no initial value yet");
                }
            }
            self.listeners.entry(input).or_default().push(index);
        }
        self.virtual_devices.push(VirtualEntry { device, output });
    }

    /// Current axis value of `slot`
    pub fn axis_state(&self, slot: InputSlot) -> Option<AxisState> {
        self.values.axis(slot)
    }

    /// Current transformation of `slot`
    pub fn transformation(&self, slot: InputSlot) -> Option<Transformation> {
        self.values.transformation(slot)
    }

    /// Overwrites the axis value without producing an event
    pub fn set_axis_state(&mut self, slot: InputSlot, state: AxisState) {
        self.values.set_axis(slot, state);
    }

    /// Overwrites the transformation without producing an event
    pub fn set_transformation(&mut self, slot: InputSlot, transformation: Transformation) {
        self.values.set_transformation(slot, transformation);
    }

    /// Records `event`, updates its aliases and runs dependent virtual devices
    ///
    /// Each device may append one derived event to `out`. A device that asks
    /// for a slot without a value is skipped for this event.
    pub fn evaluate_event(&mut self, event: &mut ToolEvent, out: &mut VecDeque<ToolEvent>) {
        let slot = event.slot();
        if slot != InputSlot::SYSTEM_TIME {
            trace!(slot = %self.slots.display(slot), source = %event.source(), "evaluating event");
        }
        let (axis, transformation) = (event.axis_state(), event.transformation());
        self.values.record(slot, axis, transformation);

        let mut fed = vec![slot];
        if let Some(targets) = self.alias_targets.get(&slot) {
            for &target in targets {
                self.values.record(target, axis, transformation);
                fed.push(target);
            }
        }

        let mut devices: IndexSet<usize> = IndexSet::new();
        for fed_slot in fed {
            devices.extend(self.listeners.get(&fed_slot).into_iter().flatten().copied());
        }
        for index in devices {
            let entry = &mut self.virtual_devices[index];
            let mut ctx = VirtualDeviceContext::new(event, &self.values);
            match entry.device.process(&mut ctx) {
                Ok(Some(derived)) => out.push_back(derived),
                Ok(None) => {}
                Err(MissingSlot(missing)) => {
                    warn!(
                        device = entry.device.name(),
                        output = %self.slots.display(entry.output),
                        slot = %self.slots.display(missing),
                        "slot for virtual device missing"
                    );
                }
            }
        }
    }

    /// Recomputes the camera and avatar matrices from the viewer
    ///
    /// Returns events, in the order world-to-camera, camera-to-NDC, avatar,
    /// for the matrices that changed since the last call.
    pub fn update_implicit_devices(&mut self, viewer: &dyn Viewer) -> Vec<ToolEvent> {
        let epsilon = self.matrix_epsilon;
        let mut changed = Vec::new();
        let camera_path = viewer.camera_path();

        if let Some(camera) = &camera_path {
            let world_to_camera = Transformation::new(viewer.path_matrix(camera).inverse());
            if !world_to_camera.approx_eq(&self.implicit.world_to_camera, epsilon) {
                self.implicit.world_to_camera = world_to_camera;
                changed.push((InputSlot::WORLD_TO_CAMERA, world_to_camera));
            }
            let camera_to_ndc = viewer
                .camera_to_ndc()
                .map(Transformation::new)
                .unwrap_or(Transformation::IDENTITY);
            if !camera_to_ndc.approx_eq(&self.implicit.camera_to_ndc, epsilon) {
                self.implicit.camera_to_ndc = camera_to_ndc;
                changed.push((InputSlot::CAMERA_TO_NDC, camera_to_ndc));
            }
        }

        if let Some(path) = self.avatar_path.as_ref().or(camera_path.as_ref()) {
            let avatar = Transformation::new(viewer.path_matrix(path));
            if !avatar.approx_eq(&self.implicit.avatar, epsilon) {
                self.implicit.avatar = avatar;
                changed.push((InputSlot::AVATAR_TRANSFORMATION, avatar));
            }
        }

        changed
            .into_iter()
            .map(|(slot, t)| {
                ToolEvent::from_transformation(EventSource::implicit(), self.system_time, slot, t)
            })
            .collect()
    }

    /// Path whose matrix feeds `AvatarTransformation`; `None` follows the camera
    pub fn set_avatar_path(&mut self, path: Option<ScenePath>) {
        self.avatar_path = path;
    }

    pub fn avatar_path(&self) -> Option<&ScenePath> {
        self.avatar_path.as_ref()
    }

    /// Timestamp of the last processed `SystemTime` event
    pub fn system_time(&self) -> i64 {
        self.system_time
    }

    pub fn set_system_time(&mut self, time: i64) {
        self.system_time = time;
    }

    /// Alias graph of this configuration
    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    /// Ids of the raw devices that were started
    pub fn raw_device_ids(&self) -> impl Iterator<Item = &str> {
        self.raw_devices.keys().map(String::as_str)
    }

    /// Number of virtual devices that were built
    pub fn virtual_device_count(&self) -> usize {
        self.virtual_devices.len()
    }

    /// Devices and mappings left out during construction, with the reason
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stops polling, disposes raw devices and drops every slot value
    ///
    /// Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        for (id, device) in self.raw_devices.drain(..) {
            device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispose();
            debug!(device = %id, "disposed raw device");
        }
        self.virtual_devices.clear();
        self.listeners.clear();
        self.alias_targets.clear();
        self.values.clear();
        info!("device manager disposed");
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("raw_devices", &self.raw_devices.keys().collect::<Vec<_>>())
            .field("virtual_devices", &self.virtual_devices.len())
            .field("system_time", &self.system_time)
            .field("disposed", &self.disposed)
            .finish()
    }
}
