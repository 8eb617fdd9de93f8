//! Built-in virtual device kinds

use std::collections::BTreeMap;

use glam::{DMat4, DVec3, DVec4};

use super::DeviceError;
use super::virtual_device::{MissingSlot, VirtualDevice, VirtualDeviceContext};
use crate::slot::{AxisState, EventSource, InputSlot, ToolEvent, Transformation};

fn expect_inputs(kind: &str, inputs: &[InputSlot], count: usize) -> Result<(), DeviceError> {
    if inputs.len() != count {
        return Err(DeviceError::InputCount {
            kind: kind.to_string(),
            expected: count,
            found: inputs.len(),
        });
    }
    Ok(())
}

fn output_event(ctx: &VirtualDeviceContext<'_>, output: InputSlot) -> (EventSource, i64, InputSlot) {
    (ctx.event().source().clone(), ctx.event().time(), output)
}

/// `output = in0 * in1`
#[derive(Debug, Default)]
pub struct ProductMatrix {
    left: Option<InputSlot>,
    right: Option<InputSlot>,
    output: Option<InputSlot>,
}

impl VirtualDevice for ProductMatrix {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        _options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 2)?;
        self.left = Some(inputs[0]);
        self.right = Some(inputs[1]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(left), Some(right), Some(output)) = (self.left, self.right, self.output) else {
            return Ok(None);
        };
        let product = ctx.transformation(left)?.multiply(&ctx.transformation(right)?);
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_transformation(source, time, slot, product)))
    }

    fn name(&self) -> &str {
        "product-matrix"
    }
}

/// `output = in0^-1`
#[derive(Debug, Default)]
pub struct InvertMatrix {
    input: Option<InputSlot>,
    output: Option<InputSlot>,
}

impl VirtualDevice for InvertMatrix {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        _options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 1)?;
        self.input = Some(inputs[0]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Ok(None);
        };
        let inverse = ctx.transformation(input)?.inverse();
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_transformation(source, time, slot, inverse)))
    }

    fn name(&self) -> &str {
        "invert-matrix"
    }
}

/// `output = -in0`
#[derive(Debug, Default)]
pub struct ReverseAxis {
    input: Option<InputSlot>,
    output: Option<InputSlot>,
}

impl VirtualDevice for ReverseAxis {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        _options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 1)?;
        self.input = Some(inputs[0]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Ok(None);
        };
        let value = ctx.axis_state(input)?.value();
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_axis(
            source,
            time,
            slot,
            AxisState::new(-value),
        )))
    }

    fn name(&self) -> &str {
        "reverse-axis"
    }
}

/// Two buttons coupled into one axis: plus pressed gives 1, minus pressed
/// gives -1, both or neither give 0
///
/// Emits only when the coupled value changes.
#[derive(Debug, Default)]
pub struct CoupledAxis {
    plus: Option<InputSlot>,
    minus: Option<InputSlot>,
    output: Option<InputSlot>,
    last: Option<AxisState>,
}

impl VirtualDevice for CoupledAxis {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        _options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 2)?;
        self.plus = Some(inputs[0]);
        self.minus = Some(inputs[1]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(plus), Some(minus), Some(output)) = (self.plus, self.minus, self.output) else {
            return Ok(None);
        };
        // An input that never reported counts as released
        let pressed = |slot| ctx.axis_state(slot).is_ok_and(AxisState::is_pressed);
        let value = match (pressed(plus), pressed(minus)) {
            (true, false) => AxisState::PRESSED,
            (false, true) => AxisState::MINUS_PRESSED,
            _ => AxisState::ORIGIN,
        };
        if self.last == Some(value) {
            return Ok(None);
        }
        self.last = Some(value);
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_axis(source, time, slot, value)))
    }

    fn name(&self) -> &str {
        "coupled-axis"
    }
}

/// Turns an analog axis into a button
///
/// Option `threshold` (default 0.5): the button is pressed while the input's
/// magnitude reaches the threshold. Emits only on edges.
#[derive(Debug)]
pub struct ThresholdButton {
    input: Option<InputSlot>,
    output: Option<InputSlot>,
    threshold: f64,
    last: Option<bool>,
}

impl Default for ThresholdButton {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            threshold: AxisState::PRESS_THRESHOLD,
            last: None,
        }
    }
}

impl VirtualDevice for ThresholdButton {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 1)?;
        if let Some(raw) = options.get("threshold") {
            self.threshold = raw
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t > 0.0)
                .ok_or_else(|| DeviceError::InvalidOption {
                    key: "threshold".to_string(),
                    value: raw.clone(),
                })?;
        }
        self.input = Some(inputs[0]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Ok(None);
        };
        let pressed = ctx.axis_state(input)?.value().abs() >= self.threshold;
        if self.last == Some(pressed) {
            return Ok(None);
        }
        self.last = Some(pressed);
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_axis(
            source,
            time,
            slot,
            AxisState::from_pressed(pressed),
        )))
    }

    fn name(&self) -> &str {
        "threshold-button"
    }
}

/// World-space pointer frame from a normalized-device-coordinate pointer
///
/// Inputs, in order: the NDC pointer (a transformation whose translation
/// holds the NDC x/y), world-to-camera and camera-to-NDC. The output frame
/// sits on the near plane under the pointer and its -z axis points along the
/// pick ray into the scene.
#[derive(Debug, Default)]
pub struct PointerTransformation {
    ndc: Option<InputSlot>,
    world_to_camera: Option<InputSlot>,
    camera_to_ndc: Option<InputSlot>,
    output: Option<InputSlot>,
}

impl PointerTransformation {
    fn frame(ndc: DVec4, world_to_ndc: DMat4) -> Option<DMat4> {
        let ndc_to_world = world_to_ndc.inverse();
        let unproject = |z: f64| {
            let p = ndc_to_world * DVec4::new(ndc.x, ndc.y, z, 1.0);
            (p.w.abs() > f64::EPSILON).then(|| p.truncate() / p.w)
        };
        let near = unproject(-1.0)?;
        let far = unproject(1.0)?;
        let direction = (far - near).try_normalize()?;

        let z_axis = -direction;
        let up = if z_axis.y.abs() > 0.999 {
            DVec3::Z
        } else {
            DVec3::Y
        };
        let x_axis = up.cross(z_axis).try_normalize()?;
        let y_axis = z_axis.cross(x_axis);
        Some(DMat4::from_cols(
            x_axis.extend(0.0),
            y_axis.extend(0.0),
            z_axis.extend(0.0),
            near.extend(1.0),
        ))
    }
}

impl VirtualDevice for PointerTransformation {
    fn initialize(
        &mut self,
        inputs: &[InputSlot],
        output: InputSlot,
        _options: &BTreeMap<String, String>,
    ) -> Result<(), DeviceError> {
        expect_inputs(self.name(), inputs, 3)?;
        self.ndc = Some(inputs[0]);
        self.world_to_camera = Some(inputs[1]);
        self.camera_to_ndc = Some(inputs[2]);
        self.output = Some(output);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut VirtualDeviceContext<'_>,
    ) -> Result<Option<ToolEvent>, MissingSlot> {
        let (Some(ndc), Some(world_to_camera), Some(camera_to_ndc), Some(output)) =
            (self.ndc, self.world_to_camera, self.camera_to_ndc, self.output)
        else {
            return Ok(None);
        };
        let pointer = ctx.transformation(ndc)?.origin();
        let world_to_ndc = ctx
            .transformation(camera_to_ndc)?
            .multiply(&ctx.transformation(world_to_camera)?);
        let Some(frame) = Self::frame(pointer, world_to_ndc.matrix()) else {
            return Ok(None);
        };
        let (source, time, slot) = output_event(ctx, output);
        Ok(Some(ToolEvent::from_transformation(
            source,
            time,
            slot,
            Transformation::new(frame),
        )))
    }

    fn name(&self) -> &str {
        "pointer-transformation"
    }
}
