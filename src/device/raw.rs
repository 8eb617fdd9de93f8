//! Raw device drivers and the built-in system timer

use std::collections::BTreeMap;

use tracing::debug;

use super::DeviceError;
use crate::queue::ToolEventQueue;
use crate::slot::{AxisState, EventSource, InputSlot, ToolEvent};

/// Driver for one hardware (or synthetic) input source
///
/// A raw device posts [`ToolEvent`]s for its mapped channels to the tool event
/// queue. Event-driven devices post from their own callbacks; polling devices
/// return `true` from [`RawDevice::is_polling`] and are sampled by the device
/// manager's poller thread.
pub trait RawDevice: Send {
    /// Configures the device and hands it the queue to post events to
    fn initialize(
        &mut self,
        options: &BTreeMap<String, String>,
        queue: ToolEventQueue,
    ) -> Result<(), DeviceError>;

    /// Routes the device channel `raw` to `target`
    ///
    /// Returns the initial value of the channel, which must be an event on
    /// `target`.
    fn map_raw_device(&mut self, raw: &str, target: InputSlot) -> Result<ToolEvent, DeviceError>;

    /// Whether the poller should call [`RawDevice::poll`]
    fn is_polling(&self) -> bool {
        false
    }

    /// Samples the device; `now` is wall-clock time in milliseconds
    fn poll(&mut self, _now: i64) {}

    /// Releases the device; no events are posted afterwards
    fn dispose(&mut self);
}

/// Polling device that posts the elapsed milliseconds since the previous tick
///
/// Exposes the single channel `tick`.
#[derive(Debug, Default)]
pub struct SystemTimer {
    queue: Option<ToolEventQueue>,
    slot: Option<InputSlot>,
    source: Option<EventSource>,
    last_tick: Option<i64>,
}

impl SystemTimer {
    /// Channel name of the timer
    pub const CHANNEL: &'static str = "tick";

    pub fn new() -> Self {
        Self::default()
    }
}

impl RawDevice for SystemTimer {
    fn initialize(
        &mut self,
        options: &BTreeMap<String, String>,
        queue: ToolEventQueue,
    ) -> Result<(), DeviceError> {
        let name = options
            .get("name")
            .map(String::as_str)
            .unwrap_or("system-timer");
        self.source = Some(EventSource::new(name));
        self.queue = Some(queue);
        Ok(())
    }

    fn map_raw_device(&mut self, raw: &str, target: InputSlot) -> Result<ToolEvent, DeviceError> {
        if raw != Self::CHANNEL {
            return Err(DeviceError::UnknownChannel {
                device: "system-timer".to_string(),
                channel: raw.to_string(),
            });
        }
        self.slot = Some(target);
        let source = self.source.clone().unwrap_or_else(EventSource::system);
        Ok(ToolEvent::from_axis(source, 0, target, AxisState::ORIGIN))
    }

    fn is_polling(&self) -> bool {
        true
    }

    fn poll(&mut self, now: i64) {
        let (Some(queue), Some(slot), Some(source)) = (&self.queue, self.slot, &self.source) else {
            return;
        };
        let delta = self.last_tick.map_or(0, |last| (now - last).max(0));
        self.last_tick = Some(now);
        queue.add_event(ToolEvent::from_axis(
            source.clone(),
            now,
            slot,
            AxisState::new(delta as f64),
        ));
    }

    fn dispose(&mut self) {
        debug!("system timer disposed");
        self.queue = None;
        self.slot = None;
    }
}
