//! The window registry.
//!
//! Owns every open [`Window`], keeps them sorted by z order, routes repaint
//! requests to the compositor and fans host input out to visible windows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use quill_buffer_manager::{BufferManager, PixelFormat};
use quill_core::config::CompositorConfig;
use quill_core::types::Rect;

use crate::clock::Clock;
use crate::compositor::{Compositor, RepaintRequest, WindowStack};
use crate::input::{translate_touch, HostInputEvent};
use crate::supervisor::{ProcessSupervisor, SupervisorEvent};
use crate::waveform::WaveformMode;
use crate::window::{Window, WindowFlags, WindowId, WindowNotification, WindowParams, WindowState};

/// Markers generated for synchronous repaints start above anything a client
/// can send on the wire.
const INTERNAL_MARKER_BASE: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyMode {
    /// Block the caller until the repaint is on the display.
    Sync,
    Async,
}

/// What a window needs from whoever manages it.
pub trait WindowHost: Send + Sync {
    /// Requests a repaint. `target` of `None` repaints every window under
    /// `region` in screen coordinates.
    fn dirty(
        &self,
        target: Option<Arc<Window>>,
        region: Rect,
        waveform: Option<WaveformMode>,
        marker: u64,
        mode: DirtyMode,
    );

    /// Parks `window` at the sentinel `z` and re-resolves z order, as one
    /// step with respect to other restacks.
    fn restack(&self, window: &Window, z: i32);
}

#[derive(Default)]
struct WindowMap {
    by_id: HashMap<WindowId, Arc<Window>>,
    /// Insertion order, used to break z ties.
    order: Vec<WindowId>,
}

impl WindowMap {
    fn in_order(&self) -> Vec<Arc<Window>> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

pub struct Registry {
    weak_self: Weak<Registry>,
    compositor: Arc<Compositor>,
    supervisor: Arc<dyn ProcessSupervisor>,
    buffers: Arc<BufferManager>,
    clock: Arc<dyn Clock>,
    timings: CompositorConfig,
    screen: Rect,
    service_pgid: i32,
    windows: RwLock<WindowMap>,
    /// Bottom to top, as of the last sort.
    sorted: RwLock<Vec<Arc<Window>>>,
    /// Held across every z assignment and the sort that follows it.
    stacking: Mutex<()>,
    enabled: AtomicBool,
    next_internal_marker: AtomicU64,
}

impl Registry {
    /// Creates the registry and registers it as the compositor's window stack.
    pub fn new(
        compositor: Arc<Compositor>,
        supervisor: Arc<dyn ProcessSupervisor>,
        buffers: Arc<BufferManager>,
        clock: Arc<dyn Clock>,
        timings: &CompositorConfig,
        service_pgid: i32,
    ) -> Arc<Self> {
        let registry = Arc::new_cyclic(|weak_self| Registry {
            weak_self: weak_self.clone(),
            screen: compositor.screen_rect(),
            compositor,
            supervisor,
            buffers,
            clock,
            timings: timings.clone(),
            service_pgid,
            windows: RwLock::new(WindowMap::default()),
            sorted: RwLock::new(Vec::new()),
            stacking: Mutex::new(()),
            enabled: AtomicBool::new(true),
            next_internal_marker: AtomicU64::new(INTERNAL_MARKER_BASE),
        });
        let stack: Weak<Registry> = Arc::downgrade(&registry);
        registry.compositor.set_stack(stack);
        registry
    }

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn service_pgid(&self) -> i32 {
        self.service_pgid
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    /// Creates a window owned by `caller`. `None` geometry covers the screen.
    pub fn create_window(&self, caller: i32, geometry: Option<Rect>, format: PixelFormat) -> Option<Arc<Window>> {
        if !self.supervisor.has_permission(caller, "gui") {
            tracing::debug!(caller, operation = "create_window", "DENY");
            return None;
        }
        self.build_window(caller, WindowFlags::empty(), geometry, format)
    }

    /// Creates the service's own background window, shown at the bottom of
    /// the stack.
    pub fn create_system_window(&self, geometry: Option<Rect>, format: PixelFormat) -> Option<Arc<Window>> {
        let window = self.build_window(self.service_pgid, WindowFlags::SYSTEM, geometry, format)?;
        window.set_visible(self.service_pgid, true);
        Some(window)
    }

    fn build_window(
        &self,
        pgid: i32,
        flags: WindowFlags,
        geometry: Option<Rect>,
        format: PixelFormat,
    ) -> Option<Arc<Window>> {
        let host: Weak<dyn WindowHost> = self.weak_self.clone();
        let params = WindowParams {
            pgid,
            service_pgid: self.service_pgid,
            flags,
            screen: self.screen,
            geometry: geometry.unwrap_or(self.screen),
            format,
            enabled: self.enabled.load(Ordering::SeqCst),
            buffers: Arc::clone(&self.buffers),
            host,
            correlator: Arc::clone(self.compositor.correlator()),
            clock: Arc::clone(&self.clock),
            wait_timeout: self.timings.wait_timeout(),
            ping_interval: self.timings.ping_interval(),
            ping_deadline: self.timings.ping_deadline(),
        };
        let window = match Window::new(params) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(pgid, error = %e, "Failed to create window");
                return None;
            }
        };

        let registry = self.weak_self.clone();
        window.subscribe(Box::new(move |window: &Window, notification: &WindowNotification| {
            if *notification == WindowNotification::Closed {
                if let Some(registry) = registry.upgrade() {
                    registry.forget(window.id());
                }
            }
        }));

        {
            let mut windows = self.windows.write();
            windows.by_id.insert(window.id(), Arc::clone(&window));
            windows.order.push(window.id());
        }
        self.sort_windows();
        tracing::info!(window = %window.id(), pgid, path = window.path(), "Window created");
        Some(window)
    }

    /// Drops a closed window and hands it to the compositor for deferred
    /// destruction.
    fn forget(&self, id: WindowId) {
        let removed = {
            let mut windows = self.windows.write();
            windows.order.retain(|other| *other != id);
            windows.by_id.remove(&id)
        };
        if let Some(window) = removed {
            self.sort_windows();
            self.compositor.defer_destroy(window);
        }
    }

    fn can_see(&self, caller: i32, window: &Window) -> bool {
        caller == self.service_pgid || caller == window.pgid()
    }

    /// The caller's windows, or all windows for the service itself.
    pub fn list_windows(&self, caller: i32, visible_only: bool) -> Vec<Arc<Window>> {
        self.windows
            .read()
            .in_order()
            .into_iter()
            .filter(|w| self.can_see(caller, w))
            .filter(|w| !visible_only || w.visible())
            .collect()
    }

    pub fn get_window(&self, caller: i32, id: WindowId) -> Option<Arc<Window>> {
        let window = self.windows.read().by_id.get(&id).cloned()?;
        if self.can_see(caller, &window) {
            Some(window)
        } else {
            tracing::debug!(caller, window = %id, operation = "get_window", "DENY");
            None
        }
    }

    pub fn window_by_path(&self, caller: i32, path: &str) -> Option<Arc<Window>> {
        let id = self
            .windows
            .read()
            .by_id
            .values()
            .find(|w| w.path() == path)
            .map(|w| w.id())?;
        self.get_window(caller, id)
    }

    pub fn window_count(&self) -> usize {
        self.windows.read().by_id.len()
    }

    /// Re-sorts the stack and assigns canonical z values. Raised windows get
    /// 0, 1, 2... from the bottom up, lowered windows -1, -2... from the top
    /// down, and system windows stay underneath both. Ties keep insertion
    /// order.
    pub fn sort_windows(&self) {
        let _stacking = self.stacking.lock();
        self.sort_locked();
    }

    fn sort_locked(&self) {
        let all = self.windows.read().in_order();
        let (system, mut others): (Vec<_>, Vec<_>) = all.into_iter().partition(|w| w.is_system());
        others.sort_by_key(|w| w.z());
        let (raised, lowered): (Vec<_>, Vec<_>) = others.into_iter().partition(|w| w.state().is_raised());

        for (index, window) in raised.iter().enumerate() {
            window.set_z(index as i32);
        }
        for (index, window) in lowered.iter().rev().enumerate() {
            window.set_z(-(index as i32) - 1);
        }

        let mut sorted = system;
        sorted.extend(lowered);
        sorted.extend(raised);
        *self.sorted.write() = sorted;
    }

    /// Routes a repaint to the compositor. `Sync` blocks until the repaint
    /// has been displayed and must not be called from the compositor thread.
    pub fn dirty(
        &self,
        target: Option<Arc<Window>>,
        region: Rect,
        waveform: Option<WaveformMode>,
        marker: u64,
        mode: DirtyMode,
    ) {
        if let Some(window) = target.as_ref().filter(|w| w.state() == WindowState::Closed) {
            tracing::debug!(window = %window.id(), marker, "Rejecting repaint of closed window");
            self.compositor
                .correlator()
                .record_completed(Some(window.id()), marker, 0, false);
            return;
        }
        match mode {
            DirtyMode::Async => self.compositor.enqueue(RepaintRequest {
                window: target,
                region,
                waveform,
                marker,
                callback: None,
            }),
            DirtyMode::Sync => {
                let marker = if marker == 0 {
                    self.next_internal_marker.fetch_add(1, Ordering::Relaxed)
                } else {
                    marker
                };
                let (tx, rx) = mpsc::channel();
                // Registered before queueing so the record cannot be missed.
                self.compositor.correlator().add_wait(
                    target.as_ref().map(|w| w.id()),
                    marker,
                    Box::new(move || {
                        let _ = tx.send(());
                    }),
                );
                self.compositor.enqueue(RepaintRequest {
                    window: target,
                    region,
                    waveform,
                    marker,
                    callback: None,
                });
                if rx.recv_timeout(self.timings.wait_timeout() * 2).is_err() {
                    tracing::warn!(marker, "Synchronous repaint was not resolved in time");
                }
            }
        }
    }

    /// Forwards host input to every visible window whose process is running.
    pub fn dispatch_input(&self, event: &HostInputEvent) {
        let targets: Vec<Arc<Window>> = self
            .sorted
            .read()
            .iter()
            .filter(|w| w.visible() && !self.supervisor.is_paused(w.pgid()))
            .cloned()
            .collect();
        match event {
            HostInputEvent::Touch(touch) => {
                let translated = translate_touch(touch, self.screen);
                for window in &targets {
                    window.forward_touch(&translated);
                }
            }
            HostInputEvent::Tablet(tablet) => {
                for window in &targets {
                    window.forward_tablet(tablet);
                }
            }
            HostInputEvent::Key(key) => {
                for window in &targets {
                    window.forward_key(key);
                }
            }
        }
    }

    fn windows_of(&self, pgid: i32) -> Vec<Arc<Window>> {
        self.windows
            .read()
            .in_order()
            .into_iter()
            .filter(|w| w.pgid() == pgid)
            .collect()
    }

    pub fn close_windows(&self, pgid: i32) {
        for window in self.windows_of(pgid) {
            window.close(self.service_pgid);
        }
    }

    pub fn lower_windows(&self, pgid: i32) {
        for window in self.windows_of(pgid) {
            window.lower(self.service_pgid);
        }
    }

    pub fn raise_windows(&self, pgid: i32) {
        for window in self.windows_of(pgid) {
            window.raise(self.service_pgid);
        }
    }

    pub fn handle_supervisor_event(&self, event: SupervisorEvent) {
        tracing::debug!(?event, "Supervisor event");
        match event {
            SupervisorEvent::Paused(pgid) => {
                for window in self.windows_of(pgid) {
                    window.set_visible(self.service_pgid, false);
                }
            }
            SupervisorEvent::Resumed(pgid) => {
                for window in self.windows_of(pgid) {
                    window.set_visible(self.service_pgid, true);
                }
            }
            SupervisorEvent::Exited(pgid) => self.close_windows(pgid),
            SupervisorEvent::Foreground(pgid) => self.raise_windows(pgid),
            SupervisorEvent::Background(pgid) => self.lower_windows(pgid),
        }
    }

    /// Services every window's generic event pipe.
    pub fn service_clients(&self, now: Instant) {
        let windows = self.windows.read().in_order();
        for window in windows {
            window.service_events(now);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        tracing::debug!(enabled, "Window registry enabled state changed");
        self.enabled.store(enabled, Ordering::SeqCst);
        for window in self.windows.read().in_order() {
            window.set_enabled(enabled);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl WindowStack for Registry {
    fn sorted_windows(&self) -> Vec<Arc<Window>> {
        self.sorted.read().clone()
    }
}

impl WindowHost for Registry {
    fn dirty(
        &self,
        target: Option<Arc<Window>>,
        region: Rect,
        waveform: Option<WaveformMode>,
        marker: u64,
        mode: DirtyMode,
    ) {
        Registry::dirty(self, target, region, waveform, marker, mode);
    }

    fn restack(&self, window: &Window, z: i32) {
        let _stacking = self.stacking.lock();
        window.set_z(z);
        self.sort_locked();
    }
}
