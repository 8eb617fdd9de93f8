//! Always-active tool that drives scheduled animation tasks from system time

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::trace;

use super::{Tool, ToolContext};
use crate::slot::InputSlot;

/// Animation callback: `(time_ms, delta_ms) -> keep_running`
pub type AnimatorTask = Box<dyn FnMut(i64, i64) -> bool + Send>;

#[derive(Default)]
struct Schedule {
    tasks: IndexMap<String, AnimatorTask>,
    running: bool,
    cancelled: HashSet<String>,
}

/// Shared handle for scheduling tasks on an [`Animator`]
///
/// Tasks may schedule and deschedule (including themselves) while running.
#[derive(Clone, Default)]
pub struct AnimatorHandle {
    schedule: Arc<Mutex<Schedule>>,
}

impl AnimatorHandle {
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `task` under `key`, replacing any task with the same key
    pub fn schedule<F>(&self, key: impl Into<String>, task: F)
    where
        F: FnMut(i64, i64) -> bool + Send + 'static,
    {
        let key = key.into();
        let mut schedule = self.lock();
        schedule.cancelled.remove(&key);
        schedule.tasks.insert(key, Box::new(task));
    }

    /// Removes the task under `key`; returns whether one was scheduled
    pub fn deschedule(&self, key: &str) -> bool {
        let mut schedule = self.lock();
        if schedule.tasks.shift_remove(key).is_some() {
            return true;
        }
        if schedule.running {
            return schedule.cancelled.insert(key.to_string());
        }
        false
    }

    /// Whether a task is waiting under `key`
    ///
    /// Tasks that are running right now are not reported.
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.lock().tasks.contains_key(key)
    }

    /// Number of scheduled tasks
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every task once; tasks returning false are dropped
    pub(crate) fn run(&self, time: i64, delta: i64) {
        let mut running = {
            let mut schedule = self.lock();
            schedule.running = true;
            std::mem::take(&mut schedule.tasks)
        };
        running.retain(|key, task| {
            let keep = task(time, delta);
            if !keep {
                trace!(task = %key, "animation finished");
            }
            keep
        });

        let mut schedule = self.lock();
        // Tasks scheduled while running replace the ones that just ran
        let added = std::mem::take(&mut schedule.tasks);
        let cancelled = std::mem::take(&mut schedule.cancelled);
        running.retain(|key, _| !cancelled.contains(key) && !added.contains_key(key));
        running.extend(added);
        schedule.tasks = running;
        schedule.running = false;
    }
}

impl fmt::Debug for AnimatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatorHandle")
            .field("tasks", &self.lock().tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Calls the scheduled tasks on every `SystemTime` event
///
/// The delta is the axis value of the `SystemTime` slot, which the system
/// timer sets to the milliseconds elapsed since its previous tick.
#[derive(Debug, Default)]
pub struct Animator {
    handle: AnimatorHandle,
}

impl Animator {
    pub fn new(handle: AnimatorHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &AnimatorHandle {
        &self.handle
    }
}

impl Tool for Animator {
    fn activation_slots(&self) -> &[InputSlot] {
        &[]
    }

    fn current_slots(&self) -> &[InputSlot] {
        &[InputSlot::SYSTEM_TIME]
    }

    fn perform(&mut self, ctx: &mut ToolContext<'_>) {
        let delta = ctx
            .axis_state(InputSlot::SYSTEM_TIME)
            .map_or(0, |axis| axis.value() as i64);
        self.handle.run(ctx.time(), delta);
    }

    fn description(&self) -> &str {
        "animator"
    }
}
