//! Background sampling of polling raw devices

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{RawDevice, now_millis};

/// A raw device shared between the device manager and the poller
pub type SharedRawDevice = Arc<Mutex<Box<dyn RawDevice>>>;

/// Polls a fixed set of devices at a fixed interval on its own thread
///
/// Each device manager owns at most one poller. Dropping the poller stops
/// the thread.
#[derive(Debug)]
pub struct Poller {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Starts polling `devices` every `interval`
    pub fn spawn(devices: Vec<SharedRawDevice>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("raw-device-poller".to_string())
            .spawn(move || {
                debug!(devices = devices.len(), ?interval, "poller started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let now = now_millis();
                    for device in &devices {
                        device
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .poll(now);
                    }
                }
                debug!("poller stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for the current round to finish
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The thread may already be gone; a closed channel stops it too
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("poller thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
