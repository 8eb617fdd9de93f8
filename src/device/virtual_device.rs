//! Derived devices computed from other slots

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::DeviceError;
use crate::slot::{AxisState, InputSlot, ToolEvent, Transformation};

/// A virtual device asked for a slot that has no current value
///
/// Raised per device and per event; the device manager logs it and skips the
/// device for that event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("slot {0:?} has no current value")]
pub struct MissingSlot(pub InputSlot);

/// Current value of every slot
#[derive(Debug, Default)]
pub(crate) struct SlotValues {
    axes: HashMap<InputSlot, AxisState>,
    transformations: HashMap<InputSlot, Transformation>,
}

impl SlotValues {
    pub(crate) fn axis(&self, slot: InputSlot) -> Option<AxisState> {
        self.axes.get(&slot).copied()
    }

    pub(crate) fn transformation(&self, slot: InputSlot) -> Option<Transformation> {
        self.transformations.get(&slot).copied()
    }

    pub(crate) fn set_axis(&mut self, slot: InputSlot, axis: AxisState) {
        self.axes.insert(slot, axis);
    }

    pub(crate) fn set_transformation(&mut self, slot: InputSlot, transformation: Transformation) {
        self.transformations.insert(slot, transformation);
    }

    /// Records both payloads of an event; an absent payload clears the value
    pub(crate) fn record(
        &mut self,
        slot: InputSlot,
        axis: Option<AxisState>,
        transformation: Option<Transformation>,
    ) {
        match axis {
            Some(axis) => self.axes.insert(slot, axis),
            None => self.axes.remove(&slot),
        };
        match transformation {
            Some(t) => self.transformations.insert(slot, t),
            None => self.transformations.remove(&slot),
        };
    }

    pub(crate) fn clear(&mut self) {
        self.axes.clear();
        self.transformations.clear();
    }
}

/// What a virtual device sees while processing one event
pub struct VirtualDeviceContext<'a> {
    event: &'a mut ToolEvent,
    values: &'a SlotValues,
}

impl<'a> VirtualDeviceContext<'a> {
    pub(crate) fn new(event: &'a mut ToolEvent, values: &'a SlotValues) -> Self {
        Self { event, values }
    }

    /// The event being evaluated
    pub fn event(&self) -> &ToolEvent {
        self.event
    }

    /// Current axis value of `slot`
    pub fn axis_state(&self, slot: InputSlot) -> Result<AxisState, MissingSlot> {
        self.values.axis(slot).ok_or(MissingSlot(slot))
    }

    /// Current transformation of `slot`
    pub fn transformation(&self, slot: InputSlot) -> Result<Transformation, MissingSlot> {
        self.values.transformation(slot).ok_or(MissingSlot(slot))
    }

    /// Keeps the triggering event away from tools
    pub fn consume_event(&mut self) {
        self.event.consume();
    }
}

/// Function from upstream slot values to at most one derived event
pub trait VirtualDevice: Send {
    /// Binds the device to its ordered inputs and its output slot
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError>;

    /// Evaluates the device for the event in `ctx`
    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot>;

    /// Short human-readable name for logs
    fn name(&self) -> &str;
}
