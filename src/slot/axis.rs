//! One-dimensional control values

use serde::{Deserialize, Serialize};

/// Scalar control value with pressed/released edge semantics
///
/// Buttons report [`AxisState::PRESSED`] and [`AxisState::ORIGIN`]; analog
/// axes report values in `[-1, 1]`. A state never changes in place, a new
/// reading is a new value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisState(f64);

impl AxisState {
    /// Fully pressed button
    pub const PRESSED: AxisState = AxisState(1.0);
    /// Released button / centered axis
    pub const ORIGIN: AxisState = AxisState(0.0);
    /// Fully pressed in the negative direction
    pub const MINUS_PRESSED: AxisState = AxisState(-1.0);

    /// Magnitude from which an axis counts as pressed
    pub const PRESS_THRESHOLD: f64 = 0.5;
    /// Magnitude below which an axis counts as released
    pub const RELEASE_EPSILON: f64 = 1e-9;

    /// Creates a state, mapping NaN to the origin
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::ORIGIN
        } else {
            Self(value)
        }
    }

    /// Creates a button state
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed { Self::PRESSED } else { Self::ORIGIN }
    }

    /// Raw scalar value
    pub fn value(self) -> f64 {
        self.0
    }

    /// True when the magnitude reaches [`Self::PRESS_THRESHOLD`]
    pub fn is_pressed(self) -> bool {
        self.0.abs() >= Self::PRESS_THRESHOLD
    }

    /// True when the value is (numerically) zero
    pub fn is_released(self) -> bool {
        self.0.abs() < Self::RELEASE_EPSILON
    }

    /// Whether `newer` may overwrite this reading without losing an edge
    ///
    /// Identical readings always merge. Otherwise both values must be strictly
    /// on the same side of zero (`a * b > 0`) and agree on both the pressed and
    /// the released flag.
    pub fn can_coalesce(self, newer: AxisState) -> bool {
        if self == newer {
            return true;
        }
        if self.0 * newer.0 <= 0.0 {
            return false;
        }
        self.is_pressed() == newer.is_pressed() && self.is_released() == newer.is_released()
    }
}

impl From<f64> for AxisState {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}
