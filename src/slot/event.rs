//! Tool events and their payloads

use std::fmt;
use std::sync::Arc;

use glam::{DMat4, DVec4};

use super::{AxisState, InputSlot};

/// Immutable 4x4 matrix payload for positional and orientation slots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation(DMat4);

impl Transformation {
    /// The identity transformation
    pub const IDENTITY: Transformation = Transformation(DMat4::IDENTITY);

    /// Wraps a matrix
    pub fn new(matrix: DMat4) -> Self {
        Self(matrix)
    }

    /// Builds a transformation from 16 row-major entries
    pub fn from_row_major(values: &[f64; 16]) -> Self {
        Self(DMat4::from_cols_array(values).transpose())
    }

    /// Returns the 16 entries in row-major order
    pub fn to_row_major(&self) -> [f64; 16] {
        self.0.transpose().to_cols_array()
    }

    /// Pure translation
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self(DMat4::from_translation(glam::DVec3::new(x, y, z)))
    }

    /// Underlying matrix
    pub fn matrix(&self) -> DMat4 {
        self.0
    }

    /// Inverse transformation
    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// `self * other`
    pub fn multiply(&self, other: &Transformation) -> Self {
        Self(self.0 * other.0)
    }

    /// Homogeneous position of the frame's origin
    pub fn origin(&self) -> DVec4 {
        self.0.w_axis
    }

    /// Pick ray of a pointer frame: from its origin along its -z axis
    pub fn pointer_ray(&self) -> (DVec4, DVec4) {
        (self.0.w_axis, -self.0.z_axis)
    }

    /// Entry-wise comparison with absolute tolerance `epsilon`
    pub fn approx_eq(&self, other: &Transformation, epsilon: f64) -> bool {
        self.0.abs_diff_eq(other.0, epsilon)
    }
}

impl Default for Transformation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<DMat4> for Transformation {
    fn from(matrix: DMat4) -> Self {
        Self(matrix)
    }
}

/// Identifies who produced an event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventSource(Arc<str>);

impl EventSource {
    /// Creates a source with the given name
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Source of implicit camera/avatar updates
    pub fn implicit() -> Self {
        Self::new("implicit")
    }

    /// Source of events synthesized by the tool system itself
    pub fn system() -> Self {
        Self::new("tool-system")
    }

    /// Name of the source
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventSource {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A new value for one slot
///
/// By convention of the slot's type only one of the axis state and the
/// transformation is meaningful. Events are only mutated by queue coalescing
/// ([`ToolEvent::replace_with`]) and by consumption.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEvent {
    source: EventSource,
    time: i64,
    slot: InputSlot,
    axis: Option<AxisState>,
    transformation: Option<Transformation>,
    consumed: bool,
}

impl ToolEvent {
    /// Creates an event carrying both payload kinds
    pub fn new(
        source: EventSource,
        time: i64,
        slot: InputSlot,
        axis: Option<AxisState>,
        transformation: Option<Transformation>,
    ) -> Self {
        Self {
            source,
            time,
            slot,
            axis,
            transformation,
            consumed: false,
        }
    }

    /// Creates an axis event
    pub fn from_axis(source: EventSource, time: i64, slot: InputSlot, axis: AxisState) -> Self {
        Self::new(source, time, slot, Some(axis), None)
    }

    /// Creates a transformation event
    pub fn from_transformation(
        source: EventSource,
        time: i64,
        slot: InputSlot,
        transformation: Transformation,
    ) -> Self {
        Self::new(source, time, slot, None, Some(transformation))
    }

    /// Producer of the event
    pub fn source(&self) -> &EventSource {
        &self.source
    }

    /// Timestamp in milliseconds
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Slot the event updates
    pub fn slot(&self) -> InputSlot {
        self.slot
    }

    /// Axis payload
    pub fn axis_state(&self) -> Option<AxisState> {
        self.axis
    }

    /// Transformation payload
    pub fn transformation(&self) -> Option<Transformation> {
        self.transformation
    }

    /// Marks the event so it never reaches a tool
    pub fn consume(&mut self) {
        self.consumed = true;
    }

    /// Whether a virtual device consumed the event
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Whether `newer` can be merged into this queued event
    ///
    /// Requires the same slot and source, the same payload shape, and an axis
    /// change that does not cross a sign, press or release edge.
    pub fn can_replace(&self, newer: &ToolEvent) -> bool {
        if self.slot != newer.slot || self.source != newer.source {
            return false;
        }
        if self.transformation.is_some() != newer.transformation.is_some() {
            return false;
        }
        match (self.axis, newer.axis) {
            (None, None) => true,
            (Some(old), Some(new)) => old.can_coalesce(new),
            _ => false,
        }
    }

    /// Overwrites timestamp and payload with those of `newer`
    pub fn replace_with(&mut self, newer: ToolEvent) {
        self.time = newer.time;
        self.axis = newer.axis;
        self.transformation = newer.transformation;
    }
}
