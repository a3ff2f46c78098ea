//! The compositor loop.
//!
//! A single worker thread owns painting. It takes [`RepaintRequest`]s in
//! submission order, paints the affected area of the framebuffer from the
//! visible windows, sends one display update per painted rectangle and hands
//! the result to the [`Correlator`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use quill_buffer_manager::{Color, PixelBuffer};
use quill_core::config::CompositorConfig;
use quill_core::types::{Rect, Region};

use crate::correlator::{Completion, Correlator};
use crate::driver::{DisplayDriver, UpdateRequest};
use crate::error::CompositorError;
use crate::supervisor::ProcessSupervisor;
use crate::waveform::{select_waveform, UpdateMode, WaveformMode};
use crate::window::Window;
use crate::worker::{join_with_timeout, spawn_worker};

/// How long the loop sleeps on an empty queue before looking at deferred
/// windows again.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Source of the z-ordered window list.
pub trait WindowStack: Send + Sync {
    /// All windows, bottom to top.
    fn sorted_windows(&self) -> Vec<Arc<Window>>;
}

/// One unit of work for the compositor loop.
pub struct RepaintRequest {
    /// `None` repaints everything under `region`.
    pub window: Option<Arc<Window>>,
    /// Window coordinates for a window repaint, screen coordinates otherwise.
    pub region: Rect,
    /// `None` selects the waveform from the painted pixels.
    pub waveform: Option<WaveformMode>,
    pub marker: u64,
    pub callback: Option<Completion>,
}

impl RepaintRequest {
    pub fn global(region: Rect) -> Self {
        Self {
            window: None,
            region,
            waveform: None,
            marker: 0,
            callback: None,
        }
    }

    fn is_global(&self) -> bool {
        self.window.is_none()
    }
}

impl std::fmt::Debug for RepaintRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepaintRequest")
            .field("window", &self.window.as_ref().map(|w| w.id()))
            .field("region", &self.region)
            .field("waveform", &self.waveform)
            .field("marker", &self.marker)
            .finish()
    }
}

enum Next {
    Request(RepaintRequest),
    Idle,
    Interrupted,
}

#[derive(Default)]
struct QueueState {
    requests: VecDeque<RepaintRequest>,
    interrupted: bool,
}

#[derive(Default)]
struct RepaintQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl RepaintQueue {
    /// Hands the request back if the queue no longer accepts work.
    fn push(&self, request: RepaintRequest) -> Result<(), RepaintRequest> {
        let mut state = self.state.lock();
        if state.interrupted {
            return Err(request);
        }
        state.requests.push_back(request);
        self.ready.notify_one();
        Ok(())
    }

    fn next(&self, timeout: Duration) -> Next {
        let mut state = self.state.lock();
        if state.interrupted {
            return Next::Interrupted;
        }
        if state.requests.is_empty() {
            self.ready.wait_for(&mut state, timeout);
        }
        if state.interrupted {
            return Next::Interrupted;
        }
        match state.requests.pop_front() {
            Some(request) => Next::Request(request),
            None => Next::Idle,
        }
    }

    fn try_pop(&self) -> Option<RepaintRequest> {
        self.state.lock().requests.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.state.lock().requests.is_empty()
    }

    fn len(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn interrupt(&self) -> Vec<RepaintRequest> {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.ready.notify_all();
        state.requests.drain(..).collect()
    }
}

pub struct Compositor {
    driver: Arc<dyn DisplayDriver>,
    correlator: Arc<Correlator>,
    supervisor: Arc<dyn ProcessSupervisor>,
    stack: RwLock<Option<Weak<dyn WindowStack>>>,
    queue: RepaintQueue,
    next_hardware_marker: AtomicU32,
    temperature: i32,
    deferred: Mutex<Vec<Arc<Window>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Compositor {
    pub fn new(
        driver: Arc<dyn DisplayDriver>,
        correlator: Arc<Correlator>,
        supervisor: Arc<dyn ProcessSupervisor>,
        config: &CompositorConfig,
        temperature: i32,
    ) -> Self {
        Self {
            driver,
            correlator,
            supervisor,
            stack: RwLock::new(None),
            queue: RepaintQueue::default(),
            next_hardware_marker: AtomicU32::new(1),
            temperature,
            deferred: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    pub fn set_stack(&self, stack: Weak<dyn WindowStack>) {
        *self.stack.write() = Some(stack);
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn driver(&self) -> &Arc<dyn DisplayDriver> {
        &self.driver
    }

    pub fn screen_rect(&self) -> Rect {
        self.driver.screen_rect()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Starts the worker thread. The first thing it does is clear the screen.
    pub fn start(self: &Arc<Self>) -> Result<(), CompositorError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        *worker = Some(spawn_worker("quill-compositor", move || Self::run(weak))?);
        tracing::info!("Compositor thread started");
        Ok(())
    }

    fn run(weak: Weak<Self>) {
        if let Some(this) = weak.upgrade() {
            this.clear_screen();
        }
        loop {
            let Some(this) = weak.upgrade() else {
                break;
            };
            match this.queue.next(IDLE_POLL) {
                Next::Request(request) => {
                    this.process(request);
                    if this.queue.is_empty() {
                        this.reap_deferred();
                    }
                }
                Next::Idle => this.reap_deferred(),
                Next::Interrupted => break,
            }
        }
        tracing::info!("Compositor thread stopped");
    }

    /// Queues a repaint. After shutdown the request is resolved at once
    /// without painting.
    pub fn enqueue(&self, request: RepaintRequest) {
        tracing::trace!(?request, "Queueing repaint");
        if let Err(request) = self.queue.push(request) {
            self.resolve_unpainted(request);
        }
    }

    /// Processes everything queued so far on the calling thread.
    pub fn run_pending(&self) -> usize {
        let mut processed = 0;
        while let Some(request) = self.queue.try_pop() {
            self.process(request);
            processed += 1;
        }
        self.reap_deferred();
        processed
    }

    fn process(&self, mut request: RepaintRequest) {
        let hardware_marker = self.redraw(&request);
        let window = request.window.as_ref().map(|w| w.id());
        self.correlator
            .record_completed(window, request.marker, hardware_marker, false);
        if let Some(callback) = request.callback.take() {
            callback();
        }
    }

    fn resolve_unpainted(&self, mut request: RepaintRequest) {
        let window = request.window.as_ref().map(|w| w.id());
        self.correlator.record_completed(window, request.marker, 0, false);
        if let Some(callback) = request.callback.take() {
            callback();
        }
    }

    fn next_hardware_marker(&self) -> u32 {
        loop {
            let marker = self.next_hardware_marker.fetch_add(1, Ordering::Relaxed);
            if marker != 0 {
                return marker;
            }
        }
    }

    fn send_update(&self, rect: Rect, waveform: WaveformMode) -> Option<u32> {
        let mode = if rect == self.screen_rect() {
            UpdateMode::Full
        } else {
            UpdateMode::Partial
        };
        let update = UpdateRequest {
            rect,
            waveform,
            mode,
            marker: self.next_hardware_marker(),
            temperature: self.temperature,
        };
        tracing::debug!(?rect, ?waveform, ?mode, marker = update.marker, "Sending screen update");
        match self.driver.send_update(&update) {
            Ok(()) => Some(update.marker),
            Err(e) => {
                tracing::warn!(?rect, error = %e, "Screen update failed");
                None
            }
        }
    }

    /// Clears the panel to white with a flashing full refresh.
    pub fn clear_screen(&self) {
        let framebuffer = self.driver.framebuffer();
        framebuffer.fill(Color::WHITE);
        let screen = self.screen_rect();
        let mut last = None;
        for waveform in [WaveformMode::Initialize, WaveformMode::HighQualityGrayscale] {
            if let Some(marker) = self.send_update(screen, waveform) {
                last = Some(marker);
            }
        }
        if let Some(marker) = last {
            if let Err(e) = self.driver.wait_for_update_complete(marker) {
                tracing::warn!(error = %e, "Waiting for screen clear failed");
            }
        }
    }

    /// Windows that can be painted, bottom to top.
    pub fn visible_stack(&self) -> Vec<Arc<Window>> {
        let Some(stack) = self.stack.read().as_ref().and_then(Weak::upgrade) else {
            return Vec::new();
        };
        stack
            .sorted_windows()
            .into_iter()
            .filter(|window| {
                if !window.visible() {
                    return false;
                }
                if !window.is_system() && !self.supervisor.process_group_exists(window.pgid()) {
                    tracing::warn!(window = %window.id(), pgid = window.pgid(), "Window without running process");
                    return false;
                }
                if window.buffer().is_none() {
                    tracing::warn!(window = %window.id(), "Window without frame buffer");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Paints `request` and sends its updates. Returns the hardware marker
    /// of the last update sent, 0 when nothing reached the display.
    fn redraw(&self, request: &RepaintRequest) -> u32 {
        let screen = self.screen_rect();
        let target = match &request.window {
            Some(window) => {
                let geometry = window.bounds();
                request
                    .region
                    .translated(geometry.x, geometry.y)
                    .intersected(&geometry)
                    .intersected(&screen)
            }
            None => request.region.intersected(&screen),
        };
        if target.is_empty() {
            tracing::warn!(?request, "Repaint region does not intersect the screen");
            return 0;
        }

        let stack = self.visible_stack();
        let mut region = Region::from_rect(target);
        if let Some(window) = &request.window {
            let Some(position) = stack.iter().position(|w| Arc::ptr_eq(w, window)) else {
                tracing::debug!(window = %window.id(), "Skipping repaint of window that is not visible");
                return 0;
            };
            for above in &stack[position + 1..] {
                let covered = above.bounds().intersected(&target);
                if !covered.is_empty() {
                    region.subtract(covered);
                }
            }
            if region.is_empty() {
                tracing::debug!(window = %window.id(), "Repaint fully occluded");
                return 0;
            }
        }

        let framebuffer = self.driver.framebuffer();
        for rect in region.iter() {
            match &request.window {
                Some(window) => paint_window(&framebuffer, window, *rect),
                None => {
                    framebuffer.fill_rect(*rect, framebuffer.format().background());
                    for window in &stack {
                        paint_window(&framebuffer, window, *rect);
                    }
                }
            }
        }

        let mut hardware_marker = 0;
        for rect in region.iter() {
            let waveform = request
                .waveform
                .unwrap_or_else(|| select_waveform(&framebuffer, *rect));
            if let Some(marker) = self.send_update(*rect, waveform) {
                hardware_marker = marker;
            }
        }
        tracing::trace!(global = request.is_global(), rects = region.rects().len(), "Repaint done");
        hardware_marker
    }

    /// Keeps a closed window alive until no queued work or pending wait can
    /// refer to it.
    pub fn defer_destroy(&self, window: Arc<Window>) {
        self.deferred.lock().push(window);
    }

    pub fn deferred_windows(&self) -> usize {
        self.deferred.lock().len()
    }

    fn reap_deferred(&self) {
        if !self.queue.is_empty() {
            return;
        }
        let reaped: Vec<Arc<Window>> = {
            let mut deferred = self.deferred.lock();
            let (keep, reap): (Vec<_>, Vec<_>) = deferred
                .drain(..)
                .partition(|window| self.correlator.references_window(window.id()));
            *deferred = keep;
            reap
        };
        for window in reaped {
            tracing::debug!(window = %window.id(), "Releasing closed window");
        }
    }

    /// Stops the loop, resolves queued requests without painting and stops
    /// the correlator.
    pub fn shutdown(&self) {
        let drained = self.queue.interrupt();
        if let Some(handle) = self.worker.lock().take() {
            join_with_timeout(handle, "quill-compositor", self.shutdown_timeout);
        }
        let count = drained.len();
        for request in drained {
            self.resolve_unpainted(request);
        }
        if count > 0 {
            tracing::info!(count, "Resolved queued repaints on shutdown");
        }
        self.deferred.lock().clear();
        self.correlator.shutdown();
    }
}

fn paint_window(framebuffer: &PixelBuffer, window: &Window, rect: Rect) {
    if let Some(buffer) = window.buffer() {
        framebuffer.draw_buffer(&buffer, window.bounds().top_left(), rect);
    }
}
