//! Pointer-hit synthesis for tools that activate on `PointerHit`

use tracing::{debug, trace};

use crate::queue::ToolEventQueue;
use crate::scene::{NodeId, ScenePath};
use crate::slot::{AxisState, EventSource, InputSlot, ToolEvent};
use crate::tool::{Tool, ToolContext};

/// Always-active tool on the pointer slot
///
/// Picks on every pointer update and posts `PointerHit` pressed when the
/// pointer enters a geometry and released when it leaves. Moving from one
/// geometry straight onto another posts a release followed by a press.
/// Attached at the scene root only while some registered tool activates on
/// `PointerHit`.
#[derive(Debug)]
pub(crate) struct MouseOver {
    queue: ToolEventQueue,
    source: EventSource,
    last_hit: Option<(ScenePath, NodeId)>,
}

impl MouseOver {
    pub(crate) fn new(queue: ToolEventQueue) -> Self {
        Self {
            queue,
            source: EventSource::new("mouse-over"),
            last_hit: None,
        }
    }

    /// Posts a `PointerHit` edge; returns whether the queue accepted it
    fn fire(&self, time: i64, pressed: bool) -> bool {
        let posted = self.queue.add_event(ToolEvent::from_axis(
            self.source.clone(),
            time,
            InputSlot::POINTER_HIT,
            AxisState::from_pressed(pressed),
        ));
        if !posted {
            debug!(pressed, "event queue not running, pointer hit dropped");
        }
        posted
    }
}

impl Tool for MouseOver {
    fn activation_slots(&self) -> &[InputSlot] {
        &[]
    }

    fn current_slots(&self) -> &[InputSlot] {
        &[InputSlot::POINTER_TRANSFORMATION]
    }

    fn perform(&mut self, ctx: &mut ToolContext<'_>) {
        let time = ctx.system_time();
        let hit = ctx
            .current_pick()
            .and_then(|pick| pick.geometry.map(|geometry| (pick.path.clone(), geometry)));

        match (self.last_hit.take(), hit) {
            (None, None) => {}
            (Some(_), None) => {
                trace!("pointer left geometry");
                self.fire(time, false);
            }
            (None, Some(hit)) => {
                trace!(path = %hit.0, "pointer entered geometry");
                self.fire(time, true);
                self.last_hit = Some(hit);
            }
            (Some(previous), Some(hit)) => {
                if previous != hit {
                    self.fire(time, false);
                    self.fire(time, true);
                }
                self.last_hit = Some(hit);
            }
        }
    }

    fn description(&self) -> &str {
        "mouse-over support"
    }
}
