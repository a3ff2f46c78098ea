//! Matches repaint markers to hardware update completion.
//!
//! The compositor records one [`CompletedMarker`] per processed repaint. Callers
//! that want to know when their repaint is on the glass register a wait for
//! the same (window, marker) pair. The correlator thread pairs the two up,
//! issues the blocking `wait_for_update_complete` for the hardware marker at
//! most once, and runs the caller's callback.
//!
//! Waits never hang: a wait for marker 0, a wait older than the timeout, a
//! record with no hardware marker and a record past its resolution deadline
//! all count as done.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quill_core::config::CompositorConfig;

use crate::clock::Clock;
use crate::driver::DisplayDriver;
use crate::error::CompositorError;
use crate::window::WindowId;
use crate::worker::{join_with_timeout, spawn_worker};

/// Runs once a wait is resolved.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

struct PendingWait {
    marker: u64,
    window: Option<WindowId>,
    callback: Completion,
    deadline: Instant,
}

/// What the compositor did for one repaint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMarker {
    /// Marker of the last update sent to the display, 0 if none was sent.
    pub hardware_marker: u32,
    pub marker: u64,
    pub window: Option<WindowId>,
    /// Set once a hardware wait has been issued for `hardware_marker`.
    pub waited: bool,
    pub resolve_deadline: Instant,
    pub cleanup_deadline: Instant,
}

impl CompletedMarker {
    fn matches(&self, window: Option<WindowId>, marker: u64) -> bool {
        self.window == window && self.marker == marker
    }

    fn is_settled(&self, now: Instant) -> bool {
        self.hardware_marker == 0 || self.waited || now >= self.resolve_deadline
    }
}

#[derive(Default)]
struct State {
    pending: VecDeque<PendingWait>,
    completed: Vec<CompletedMarker>,
    stopping: bool,
    dirty: bool,
}

pub struct Correlator {
    driver: Arc<dyn DisplayDriver>,
    clock: Arc<dyn Clock>,
    wait_timeout: Duration,
    completed_ttl: Duration,
    tick_interval: Duration,
    shutdown_timeout: Duration,
    state: Mutex<State>,
    wake: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Correlator {
    pub fn new(driver: Arc<dyn DisplayDriver>, clock: Arc<dyn Clock>, config: &CompositorConfig) -> Self {
        Self {
            driver,
            clock,
            wait_timeout: config.wait_timeout(),
            completed_ttl: config.completed_ttl(),
            tick_interval: config.correlator_tick(),
            shutdown_timeout: config.shutdown_timeout(),
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// Starts the worker thread. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), CompositorError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        *worker = Some(spawn_worker("quill-correlator", move || Self::run(weak))?);
        tracing::info!("Correlator thread started");
        Ok(())
    }

    fn run(weak: Weak<Self>) {
        loop {
            let Some(this) = weak.upgrade() else {
                break;
            };
            {
                let mut state = this.state.lock();
                if !state.stopping && !state.dirty {
                    this.wake.wait_for(&mut state, this.tick_interval);
                }
                if state.stopping {
                    break;
                }
            }
            this.tick();
        }
        tracing::info!("Correlator thread stopped");
    }

    /// Registers `callback` to run once `marker` of `window` (or of a global
    /// repaint when `None`) has been displayed.
    ///
    /// Resolves on the calling thread when the marker is 0, when the
    /// correlator is stopping, or when a matching record already exists.
    pub fn add_wait(&self, window: Option<WindowId>, marker: u64, callback: Completion) {
        {
            let mut state = self.state.lock();
            let known = state.completed.iter().rev().any(|c| c.matches(window, marker));
            if !(state.stopping || marker == 0 || known) {
                let deadline = self.clock.now() + self.wait_timeout;
                state.pending.push_back(PendingWait {
                    marker,
                    window,
                    callback,
                    deadline,
                });
                state.dirty = true;
                self.wake.notify_one();
                return;
            }
        }
        tracing::trace!(?window, marker, "Wait resolved immediately");
        callback();
    }

    /// Records that the compositor finished the repaint tagged `marker`.
    /// `hardware_marker` 0 means no hardware update is outstanding.
    pub fn record_completed(&self, window: Option<WindowId>, marker: u64, hardware_marker: u32, waited: bool) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.completed.push(CompletedMarker {
            hardware_marker,
            marker,
            window,
            waited,
            resolve_deadline: now + self.wait_timeout,
            cleanup_deadline: now + self.completed_ttl,
        });
        state.dirty = true;
        self.wake.notify_one();
    }

    /// Runs one resolution pass over the pending waits.
    pub fn tick(&self) {
        let now = self.clock.now();
        let mut hardware: Vec<(u32, Completion)> = Vec::new();
        let mut ready: Vec<Completion> = Vec::new();
        {
            let mut state = self.state.lock();
            state.dirty = false;
            let State {
                pending, completed, ..
            } = &mut *state;

            let mut unresolved = VecDeque::with_capacity(pending.len());
            for wait in pending.drain(..) {
                if wait.marker == 0 {
                    ready.push(wait.callback);
                    continue;
                }
                if now >= wait.deadline {
                    tracing::debug!(window = ?wait.window, marker = wait.marker, "Wait timed out");
                    ready.push(wait.callback);
                    continue;
                }
                match completed
                    .iter_mut()
                    .rev()
                    .find(|c| c.matches(wait.window, wait.marker))
                {
                    Some(record) if record.is_settled(now) => ready.push(wait.callback),
                    Some(record) => {
                        record.waited = true;
                        hardware.push((record.hardware_marker, wait.callback));
                    }
                    None => unresolved.push_back(wait),
                }
            }
            *pending = unresolved;
            completed.retain(|c| now < c.cleanup_deadline);
        }

        for (hardware_marker, callback) in hardware {
            if let Err(e) = self.driver.wait_for_update_complete(hardware_marker) {
                tracing::warn!(hardware_marker, error = %e, "Waiting for update completion failed");
            }
            callback();
        }
        for callback in ready {
            callback();
        }
    }

    /// Whether a pending wait still refers to `id`.
    pub fn references_window(&self, id: WindowId) -> bool {
        self.state.lock().pending.iter().any(|w| w.window == Some(id))
    }

    pub fn pending_waits(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn completed_records(&self) -> Vec<CompletedMarker> {
        self.state.lock().completed.clone()
    }

    /// Stops the worker and resolves every wait still pending.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.stopping = true;
            self.wake.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            join_with_timeout(handle, "quill-correlator", self.shutdown_timeout);
        }
        let remaining = self.drain();
        if remaining > 0 {
            tracing::info!(remaining, "Resolved outstanding waits on shutdown");
        }
    }

    fn drain(&self) -> usize {
        let pending: Vec<PendingWait> = self.state.lock().pending.drain(..).collect();
        let count = pending.len();
        for wait in pending {
            (wait.callback)();
        }
        count
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.state.get_mut().stopping = true;
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::driver::SimulatedDriver;
    use pretty_assertions::assert_eq;
    use quill_buffer_manager::PixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<SimulatedDriver>, Arc<ManualClock>, Correlator) {
        let driver = Arc::new(SimulatedDriver::new(8, 8, PixelFormat::Rgb16).unwrap());
        let clock = Arc::new(ManualClock::new());
        let correlator = Correlator::new(driver.clone(), clock.clone(), &CompositorConfig::default());
        (driver, clock, correlator)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Completion) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let make = move || -> Completion {
            let shared = Arc::clone(&shared);
            Box::new(move || {
                shared.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_marker_zero_resolves_immediately() {
        let (_, _, correlator) = setup();
        let (count, callback) = counter();
        correlator.add_wait(None, 0, callback());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(correlator.pending_waits(), 0);
    }

    #[test]
    fn test_hardware_wait_issued_once() {
        let (driver, _, correlator) = setup();
        let (count, callback) = counter();
        correlator.add_wait(None, 5, callback());
        correlator.add_wait(None, 5, callback());
        correlator.record_completed(None, 5, 42, false);
        correlator.tick();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(driver.waits(), vec![42]);
        assert!(correlator.completed_records()[0].waited);
    }

    #[test]
    fn test_wait_after_record_resolves_without_hardware_wait() {
        let (driver, _, correlator) = setup();
        let (count, callback) = counter();
        correlator.record_completed(None, 8, 23, false);
        correlator.add_wait(None, 8, callback());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(correlator.pending_waits(), 0);

        correlator.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(driver.waits().is_empty());
    }

    #[test]
    fn test_unmatched_wait_resolves_after_timeout() {
        let (driver, clock, correlator) = setup();
        let (count, callback) = counter();
        correlator.add_wait(None, 6, callback());
        clock.advance(CompositorConfig::default().wait_timeout() - Duration::from_millis(1));
        correlator.tick();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(1));
        correlator.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(correlator.pending_waits(), 0);
        assert!(driver.waits().is_empty());

        correlator.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unmatched_wait_is_requeued() {
        let (_, _, correlator) = setup();
        let (count, callback) = counter();
        correlator.add_wait(None, 9, callback());
        correlator.tick();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(correlator.pending_waits(), 1);
    }

    #[test]
    fn test_records_are_purged_after_ttl() {
        let (_, clock, correlator) = setup();
        correlator.record_completed(None, 1, 0, false);
        clock.advance(CompositorConfig::default().completed_ttl() + Duration::from_millis(1));
        correlator.tick();
        assert!(correlator.completed_records().is_empty());
    }

    #[test]
    fn test_past_resolve_deadline_skips_hardware_wait() {
        let (driver, clock, correlator) = setup();
        let (count, callback) = counter();
        correlator.record_completed(None, 3, 17, false);
        clock.advance(CompositorConfig::default().wait_timeout() + Duration::from_millis(1));
        correlator.add_wait(None, 3, callback());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        correlator.tick();
        assert!(driver.waits().is_empty());
    }

    #[test]
    fn test_worker_resolves_and_shutdown_drains() {
        let (driver, _, correlator) = setup();
        let correlator = Arc::new(correlator);
        correlator.start().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        correlator.add_wait(None, 11, Box::new(move || tx.send(()).unwrap()));
        correlator.record_completed(None, 11, 99, false);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(driver.waits(), vec![99]);

        let (count, callback) = counter();
        correlator.add_wait(None, 12, callback());
        correlator.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        correlator.add_wait(None, 13, callback());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
