//! Coalescing single-consumer event queue
//!
//! Producers (raw device callbacks, the polling thread, mouse-over support)
//! only ever call [`ToolEventQueue::add_event`]. One consumer thread drains
//! the queue in FIFO order and hands every event to a [`ToolEventReceiver`].
//!
//! On insert the queue looks for the latest queued event of the same slot and
//! source. If that event [can be replaced](ToolEvent::can_replace) its payload
//! is overwritten in place and the queue does not grow, which keeps the queue
//! bounded under event storms. Queue position is preserved, so delivery order
//! relative to other slots does not change.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::slot::ToolEvent;

/// Consumer side of a [`ToolEventQueue`]
pub trait ToolEventReceiver: Send + Sync {
    /// Handles one dequeued event on the consumer thread
    fn process_tool_event(&self, event: ToolEvent);
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<ToolEvent>,
    started: bool,
    running: bool,
    coalesced: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
    available: Condvar,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe producer handle; clones share the same queue
#[derive(Debug, Clone, Default)]
pub struct ToolEventQueue {
    inner: Arc<Inner>,
}

impl ToolEventQueue {
    /// Creates a stopped queue; events are dropped until [`Self::start`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the consumer thread
    ///
    /// Starting twice is a no-op; a queue cannot be restarted after
    /// [`Self::dispose`].
    pub fn start(&self, receiver: Arc<dyn ToolEventReceiver>) -> std::io::Result<()> {
        {
            let mut state = self.inner.lock();
            if state.started {
                warn!("tool event queue already started");
                return Ok(());
            }
            state.started = true;
            state.running = true;
        }
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("tool-event-queue".to_string())
            .spawn(move || consume(inner, receiver))?;
        *self
            .inner
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("tool event queue started");
        Ok(())
    }

    /// Enqueues an event, merging it into a pending one when possible
    ///
    /// Returns `false` if the queue is not running and the event was dropped.
    pub fn add_event(&self, event: ToolEvent) -> bool {
        let mut state = self.inner.lock();
        if !state.running {
            trace!(slot = ?event.slot(), "queue not running, dropping event");
            return false;
        }
        if place_event(&mut state.events, event) {
            state.coalesced += 1;
        }
        self.inner.available.notify_one();
        true
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether no events are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the consumer is accepting events
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Number of events merged into pending ones so far
    pub fn coalesced_count(&self) -> u64 {
        self.inner.lock().coalesced
    }

    /// Stops the consumer, drops pending events and joins the thread
    ///
    /// When called from the consumer thread itself the thread is not joined;
    /// it exits as soon as the current event returns.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.lock();
            state.running = false;
            state.events.clear();
        }
        self.inner.available.notify_all();

        let handle = self
            .inner
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.thread().id() != thread::current().id()
            && handle.join().is_err()
        {
            warn!("tool event consumer panicked");
        }
        debug!("tool event queue disposed");
    }
}

/// Merges `event` into the latest queued event of the same slot and source,
/// or appends it. Returns true when merged.
fn place_event(events: &mut VecDeque<ToolEvent>, event: ToolEvent) -> bool {
    for queued in events.iter_mut().rev() {
        if queued.slot() == event.slot() && queued.source() == event.source() {
            if queued.can_replace(&event) {
                queued.replace_with(event);
                return true;
            }
            break;
        }
    }
    events.push_back(event);
    false
}

fn consume(inner: Arc<Inner>, receiver: Arc<dyn ToolEventReceiver>) {
    loop {
        let event = {
            let mut state = inner.lock();
            while state.running && state.events.is_empty() {
                state = inner
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !state.running {
                break;
            }
            state.events.pop_front()
        };
        if let Some(event) = event {
            receiver.process_tool_event(event);
        }
    }
    debug!("tool event consumer stopped");
}
