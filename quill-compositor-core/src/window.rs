//! Client windows.
//!
//! A [`Window`] is one client's surface: a screen rectangle, a pixel buffer the
//! client draws into, a visibility state and four event pipes. Every
//! client-facing operation takes the caller's process group id and is only
//! honoured for the owning group or the privileged service group. Denied calls
//! log `DENY` at debug level and return an empty value.

use std::collections::BTreeSet;
use std::fmt;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use quill_buffer_manager::{BufferManager, PixelBuffer, PixelFormat};
use quill_core::types::{Point, Rect};
use uuid::Uuid;

use crate::channel::{ChannelKind, EventChannel};
use crate::clock::Clock;
use crate::correlator::{Completion, Correlator};
use crate::error::CompositorError;
use crate::input::{KeyEvent, PointState, TabletEvent, TouchEvent, TouchType};
use crate::protocol::WindowEvent;
use crate::registry::{DirtyMode, WindowHost};
use crate::waveform::WaveformMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        WindowId(Uuid::new_v4())
    }

    /// Object path the window is published under.
    pub fn path(&self) -> String {
        format!("/window/{}", self.0.simple())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u32 {
        /// The background window owned by the service itself. Always at the
        /// bottom of the stack and never dropped for a missing process group.
        const SYSTEM = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowState {
    Raised,
    RaisedHidden,
    Lowered,
    LoweredHidden,
    Closed,
}

impl WindowState {
    pub fn raised(self) -> Self {
        match self {
            WindowState::Lowered => WindowState::Raised,
            WindowState::LoweredHidden => WindowState::RaisedHidden,
            other => other,
        }
    }

    pub fn lowered(self) -> Self {
        match self {
            WindowState::Raised => WindowState::Lowered,
            WindowState::RaisedHidden => WindowState::LoweredHidden,
            other => other,
        }
    }

    pub fn with_visible(self, visible: bool) -> Self {
        match (self, visible) {
            (WindowState::Raised | WindowState::RaisedHidden, true) => WindowState::Raised,
            (WindowState::Raised | WindowState::RaisedHidden, false) => WindowState::RaisedHidden,
            (WindowState::Lowered | WindowState::LoweredHidden, true) => WindowState::Lowered,
            (WindowState::Lowered | WindowState::LoweredHidden, false) => WindowState::LoweredHidden,
            (WindowState::Closed, _) => WindowState::Closed,
        }
    }

    pub fn closed(self) -> Self {
        WindowState::Closed
    }

    /// Raised or Lowered, without the Hidden suffix.
    pub fn is_shown(self) -> bool {
        matches!(self, WindowState::Raised | WindowState::Lowered)
    }

    pub fn is_raised(self) -> bool {
        matches!(self, WindowState::Raised | WindowState::RaisedHidden)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowNotification {
    GeometryChanged { old: Rect, new: Rect },
    BufferChanged,
    StateChanged(WindowState),
    ZChanged(i32),
    Closed,
}

pub type WindowObserver = Box<dyn Fn(&Window, &WindowNotification) + Send + Sync>;

/// Everything needed to build a window.
pub(crate) struct WindowParams {
    pub pgid: i32,
    pub service_pgid: i32,
    pub flags: WindowFlags,
    pub screen: Rect,
    pub geometry: Rect,
    pub format: PixelFormat,
    pub enabled: bool,
    pub buffers: Arc<BufferManager>,
    pub host: Weak<dyn WindowHost>,
    pub correlator: Arc<Correlator>,
    pub clock: Arc<dyn Clock>,
    pub wait_timeout: Duration,
    pub ping_interval: Duration,
    pub ping_deadline: Duration,
}

struct WindowInner {
    geometry: Rect,
    z: i32,
    format: PixelFormat,
    state: WindowState,
    buffer: Option<Arc<PixelBuffer>>,
    touch_slots: BTreeSet<i32>,
}

impl WindowInner {
    fn shown_on(&self, screen: &Rect) -> bool {
        self.state.is_shown() && self.buffer.is_some() && self.geometry.intersects(screen)
    }
}

struct Channels {
    touch: EventChannel,
    tablet: EventChannel,
    key: EventChannel,
    event: EventChannel,
}

impl Channels {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            touch: EventChannel::new(ChannelKind::Touch)?,
            tablet: EventChannel::new(ChannelKind::Tablet)?,
            key: EventChannel::new(ChannelKind::Key)?,
            event: EventChannel::new(ChannelKind::Event)?,
        })
    }

    fn get(&self, kind: ChannelKind) -> &EventChannel {
        match kind {
            ChannelKind::Touch => &self.touch,
            ChannelKind::Tablet => &self.tablet,
            ChannelKind::Key => &self.key,
            ChannelKind::Event => &self.event,
        }
    }
}

/// Ping bookkeeping for the generic event pipe.
#[derive(Debug)]
struct Liveness {
    next_ping: Instant,
    awaiting_since: Option<Instant>,
    unresponsive: bool,
}

pub struct Window {
    id: WindowId,
    path: String,
    pgid: i32,
    service_pgid: i32,
    flags: WindowFlags,
    screen: Rect,
    inner: Mutex<WindowInner>,
    enabled: AtomicBool,
    last_marker: AtomicU64,
    channels: Channels,
    observers: RwLock<Vec<WindowObserver>>,
    liveness: Mutex<Liveness>,
    buffers: Arc<BufferManager>,
    host: Weak<dyn WindowHost>,
    correlator: Arc<Correlator>,
    wait_timeout: Duration,
    ping_interval: Duration,
    ping_deadline: Duration,
}

impl Window {
    pub(crate) fn new(params: WindowParams) -> Result<Arc<Self>, CompositorError> {
        let id = WindowId::new();
        let now = params.clock.now();
        let window = Arc::new(Self {
            id,
            path: id.path(),
            pgid: params.pgid,
            service_pgid: params.service_pgid,
            flags: params.flags,
            screen: params.screen,
            inner: Mutex::new(WindowInner {
                geometry: Rect::default(),
                z: 0,
                format: params.format,
                state: WindowState::LoweredHidden,
                buffer: None,
                touch_slots: BTreeSet::new(),
            }),
            enabled: AtomicBool::new(params.enabled),
            last_marker: AtomicU64::new(0),
            channels: Channels::new()?,
            observers: RwLock::new(Vec::new()),
            liveness: Mutex::new(Liveness {
                next_ping: now + params.ping_interval,
                awaiting_since: None,
                unresponsive: false,
            }),
            buffers: params.buffers,
            host: params.host,
            correlator: params.correlator,
            wait_timeout: params.wait_timeout,
            ping_interval: params.ping_interval,
            ping_deadline: params.ping_deadline,
        });
        tracing::debug!(window = %id, pgid = params.pgid, geometry = ?params.geometry, "Created window");
        window.create_frame_buffer(params.geometry);
        Ok(window)
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn flags(&self) -> WindowFlags {
        self.flags
    }

    pub fn is_system(&self) -> bool {
        self.flags.contains(WindowFlags::SYSTEM)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        if self.state() == WindowState::Closed {
            return;
        }
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn subscribe(&self, observer: WindowObserver) {
        self.observers.write().push(observer);
    }

    fn permitted(&self, caller: i32, operation: &'static str) -> bool {
        if caller == self.pgid || caller == self.service_pgid {
            tracing::trace!(window = %self.id, caller, operation, "ALLOW");
            true
        } else {
            tracing::debug!(window = %self.id, caller, operation, "DENY");
            false
        }
    }

    fn emit(&self, notification: WindowNotification) {
        match notification {
            WindowNotification::GeometryChanged { new, .. } => {
                self.channels.event.send(&WindowEvent::Geometry {
                    x: new.x,
                    y: new.y,
                    width: new.width,
                    height: new.height,
                    z: self.z(),
                });
            }
            WindowNotification::BufferChanged => {
                let (size_in_bytes, bytes_per_line, format) = self.image_info();
                self.channels.event.send(&WindowEvent::ImageInfo {
                    size_in_bytes,
                    bytes_per_line,
                    format: format.code(),
                });
                self.channels.event.send(&WindowEvent::FrameBuffer);
            }
            _ => {}
        }
        for observer in self.observers.read().iter() {
            observer(self, &notification);
        }
    }

    fn host(&self) -> Option<Arc<dyn WindowHost>> {
        self.host.upgrade()
    }

    fn image_info(&self) -> (u64, u64, PixelFormat) {
        let inner = self.inner.lock();
        match &inner.buffer {
            Some(buffer) => (
                buffer.size_in_bytes() as u64,
                buffer.stride() as u64,
                buffer.format(),
            ),
            None => (0, 0, PixelFormat::Invalid),
        }
    }

    // Accessors used by the registry and the compositor. They bypass the
    // permission check.

    /// Screen geometry.
    pub fn bounds(&self) -> Rect {
        self.inner.lock().geometry
    }

    pub fn z(&self) -> i32 {
        self.inner.lock().z
    }

    pub(crate) fn set_z(&self, z: i32) {
        let changed = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.z, z) != z
        };
        if changed {
            self.emit(WindowNotification::ZChanged(z));
        }
    }

    pub fn state(&self) -> WindowState {
        self.inner.lock().state
    }

    pub fn last_marker(&self) -> u64 {
        self.last_marker.load(Ordering::SeqCst)
    }

    pub fn buffer(&self) -> Option<Arc<PixelBuffer>> {
        self.inner.lock().buffer.clone()
    }

    /// Shown, backed by a buffer and at least partly on screen.
    pub fn visible(&self) -> bool {
        self.inner.lock().shown_on(&self.screen)
    }

    /// The window's own extent, at the origin.
    fn local_rect(&self) -> Rect {
        let geometry = self.bounds();
        Rect::new(0, 0, geometry.width, geometry.height)
    }

    // Client-facing operations.

    /// A descriptor for the window's shared pixel buffer.
    pub fn frame_buffer(&self, caller: i32) -> Option<OwnedFd> {
        if !self.permitted(caller, "frame_buffer") {
            return None;
        }
        let buffer = self.buffer()?;
        match buffer.share_fd() {
            Ok(fd) => fd,
            Err(e) => {
                tracing::warn!(window = %self.id, error = %e, "Failed to share frame buffer");
                None
            }
        }
    }

    pub fn size_in_bytes(&self, caller: i32) -> u64 {
        if !self.permitted(caller, "size_in_bytes") {
            return 0;
        }
        self.image_info().0
    }

    pub fn bytes_per_line(&self, caller: i32) -> u64 {
        if !self.permitted(caller, "bytes_per_line") {
            return 0;
        }
        self.image_info().1
    }

    pub fn format(&self, caller: i32) -> PixelFormat {
        if !self.permitted(caller, "format") {
            return PixelFormat::Invalid;
        }
        self.image_info().2
    }

    pub fn geometry(&self, caller: i32) -> Rect {
        if !self.permitted(caller, "geometry") {
            return Rect::default();
        }
        self.bounds()
    }

    pub fn is_visible(&self, caller: i32) -> bool {
        self.permitted(caller, "is_visible") && self.visible()
    }

    pub fn touch_event_pipe(&self, caller: i32) -> Option<UnixStream> {
        self.pipe(caller, ChannelKind::Touch)
    }

    pub fn tablet_event_pipe(&self, caller: i32) -> Option<UnixStream> {
        self.pipe(caller, ChannelKind::Tablet)
    }

    pub fn key_event_pipe(&self, caller: i32) -> Option<UnixStream> {
        self.pipe(caller, ChannelKind::Key)
    }

    pub fn event_pipe(&self, caller: i32) -> Option<UnixStream> {
        self.pipe(caller, ChannelKind::Event)
    }

    fn pipe(&self, caller: i32, kind: ChannelKind) -> Option<UnixStream> {
        if !self.permitted(caller, kind.name()) {
            return None;
        }
        match self.channels.get(kind).client_handle() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(window = %self.id, channel = kind.name(), error = %e, "Failed to hand out event pipe");
                None
            }
        }
    }

    /// Replaces the window's geometry and buffer.
    pub fn set_geometry(self: &Arc<Self>, caller: i32, geometry: Rect) {
        if !self.permitted(caller, "set_geometry") {
            return;
        }
        let was_visible = self.visible();
        let old = self.bounds();
        if !self.create_frame_buffer(geometry) {
            return;
        }
        self.repaint_after_move(was_visible, old);
    }

    /// Resizes in place and returns the new buffer's descriptor.
    pub fn resize(self: &Arc<Self>, caller: i32, width: i32, height: i32) -> Option<OwnedFd> {
        if !self.permitted(caller, "resize") {
            return None;
        }
        let origin = self.bounds().top_left();
        self.set_geometry(caller, Rect::new(origin.x, origin.y, width, height));
        self.frame_buffer(caller)
    }

    /// Moves the window, keeping its size and buffer.
    pub fn move_to(self: &Arc<Self>, caller: i32, x: i32, y: i32) {
        if !self.permitted(caller, "move") {
            return;
        }
        let was_visible = self.visible();
        let (old, new) = {
            let mut inner = self.inner.lock();
            if inner.state == WindowState::Closed {
                return;
            }
            let old = inner.geometry;
            inner.geometry = inner.geometry.moved_to(Point::new(x, y));
            (old, inner.geometry)
        };
        if old == new {
            return;
        }
        self.emit(WindowNotification::GeometryChanged { old, new });
        self.repaint_after_move(was_visible, old);
    }

    fn repaint_after_move(self: &Arc<Self>, was_visible: bool, old: Rect) {
        let Some(host) = self.host() else {
            return;
        };
        if was_visible {
            host.dirty(None, old, None, 0, DirtyMode::Async);
        }
        if self.visible() {
            host.dirty(Some(Arc::clone(self)), self.local_rect(), None, 0, DirtyMode::Async);
        }
    }

    /// Releases the current buffer and allocates one for `geometry`.
    /// Returns whether anything changed.
    pub(crate) fn create_frame_buffer(&self, geometry: Rect) -> bool {
        let old = {
            let mut inner = self.inner.lock();
            if inner.state == WindowState::Closed {
                return false;
            }
            if inner.buffer.is_some() && inner.geometry == geometry {
                tracing::warn!(window = %self.id, ?geometry, "No need to resize");
                return false;
            }
            if let Some(previous) = inner.buffer.take() {
                self.buffers.release(previous);
            }
            let old = std::mem::replace(&mut inner.geometry, geometry);
            if geometry.is_empty() {
                tracing::warn!(window = %self.id, ?geometry, "Invalid geometry for frame buffer");
            } else {
                match self
                    .buffers
                    .allocate(geometry.width as u32, geometry.height as u32, inner.format)
                {
                    Ok(buffer) => inner.buffer = Some(buffer),
                    Err(e) => {
                        tracing::warn!(window = %self.id, error = %e, "Unable to create frame buffer");
                    }
                }
            }
            old
        };
        tracing::debug!(window = %self.id, ?geometry, "Frame buffer created");
        if old != geometry {
            self.emit(WindowNotification::GeometryChanged { old, new: geometry });
        }
        self.emit(WindowNotification::BufferChanged);
        true
    }

    /// Queues a repaint of `region` (window coordinates, whole window if
    /// `None`). A window that is not visible resolves `marker` at once.
    pub fn repaint(
        self: &Arc<Self>,
        caller: i32,
        region: Option<Rect>,
        waveform: Option<WaveformMode>,
        marker: u64,
    ) {
        if !self.permitted(caller, "repaint") {
            return;
        }
        if marker != 0 {
            self.last_marker.store(marker, Ordering::SeqCst);
        }
        let region = region.unwrap_or_else(|| self.local_rect());
        match self.host() {
            Some(host) if self.visible() => {
                host.dirty(Some(Arc::clone(self)), region, waveform, marker, DirtyMode::Async);
            }
            _ => {
                tracing::trace!(window = %self.id, marker, "Repaint of hidden window");
                self.correlator.record_completed(Some(self.id), marker, 0, false);
            }
        }
    }

    pub fn raise(self: &Arc<Self>, caller: i32) {
        if !self.permitted(caller, "raise") {
            return;
        }
        let Some((before, after)) = self.restack(WindowState::raised, i32::MAX) else {
            return;
        };
        self.channels.event.send(&WindowEvent::Raise);
        if before != after {
            self.emit(WindowNotification::StateChanged(after));
        }
        if self.visible() {
            if let Some(host) = self.host() {
                host.dirty(Some(Arc::clone(self)), self.local_rect(), None, 0, DirtyMode::Async);
            }
        }
    }

    pub fn lower(self: &Arc<Self>, caller: i32) {
        if !self.permitted(caller, "lower") {
            return;
        }
        let was_visible = self.visible();
        let Some((before, after)) = self.restack(WindowState::lowered, i32::MIN) else {
            return;
        };
        self.channels.event.send(&WindowEvent::Lower);
        if before != after {
            self.emit(WindowNotification::StateChanged(after));
        }
        if was_visible {
            if let Some(host) = self.host() {
                host.dirty(None, self.bounds(), None, 0, DirtyMode::Async);
            }
        }
    }

    /// Applies a raise/lower transition, parks the window at the sentinel z
    /// and has the host re-sort. In-flight touch sequences are cancelled.
    fn restack(&self, transition: fn(WindowState) -> WindowState, z: i32) -> Option<(WindowState, WindowState)> {
        let (before, after, slots) = {
            let mut inner = self.inner.lock();
            if inner.state == WindowState::Closed {
                return None;
            }
            let before = inner.state;
            inner.state = transition(before);
            (before, inner.state, std::mem::take(&mut inner.touch_slots))
        };
        self.cancel_touches(slots);
        match self.host() {
            Some(host) => host.restack(self, z),
            None => self.set_z(z),
        }
        Some((before, after))
    }

    fn cancel_touches(&self, slots: BTreeSet<i32>) {
        if !slots.is_empty() {
            tracing::debug!(window = %self.id, slots = slots.len(), "Cancelling touch sequence");
            self.channels
                .touch
                .send(&WindowEvent::Touch(TouchEvent::cancel(slots)));
        }
    }

    pub fn set_visible(self: &Arc<Self>, caller: i32, visible: bool) {
        if !self.permitted(caller, "set_visible") {
            return;
        }
        let was_visible = self.visible();
        let changed = {
            let mut inner = self.inner.lock();
            let before = inner.state;
            inner.state = before.with_visible(visible);
            (before != inner.state).then_some(inner.state)
        };
        let Some(state) = changed else {
            return;
        };
        self.emit(WindowNotification::StateChanged(state));
        let Some(host) = self.host() else {
            return;
        };
        if self.visible() {
            host.dirty(Some(Arc::clone(self)), self.local_rect(), None, 0, DirtyMode::Async);
        } else if was_visible {
            host.dirty(None, self.bounds(), None, 0, DirtyMode::Async);
        }
    }

    /// Closes the window. Safe to call more than once.
    pub fn close(&self, caller: i32) {
        if !self.permitted(caller, "close") {
            return;
        }
        let (was_visible, geometry) = {
            let mut inner = self.inner.lock();
            if inner.state == WindowState::Closed {
                return;
            }
            let was_visible = inner.shown_on(&self.screen);
            inner.state = inner.state.closed();
            inner.touch_slots.clear();
            (was_visible, inner.geometry)
        };
        self.enabled.store(false, Ordering::SeqCst);
        for kind in ChannelKind::ALL {
            self.channels.get(kind).close();
        }
        tracing::debug!(window = %self.id, "Closed window");
        self.emit(WindowNotification::StateChanged(WindowState::Closed));
        self.emit(WindowNotification::Closed);
        if was_visible {
            if let Some(host) = self.host() {
                host.dirty(None, geometry, None, 0, DirtyMode::Async);
            }
        }
    }

    /// Runs `callback` once `marker` of this window has been displayed.
    pub fn wait_for_marker(&self, caller: i32, marker: u64, callback: Completion) {
        if !self.permitted(caller, "wait_for_marker") {
            callback();
            return;
        }
        self.correlator.add_wait(Some(self.id), marker, callback);
    }

    /// Blocks until the last marker passed to `repaint` has been displayed.
    pub fn wait_for_last_update(&self, caller: i32) {
        if !self.permitted(caller, "wait_for_last_update") {
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.correlator.add_wait(
            Some(self.id),
            self.last_marker(),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        if rx.recv_timeout(self.wait_timeout * 2).is_err() {
            tracing::warn!(window = %self.id, "Gave up waiting for last update");
        }
    }

    // Input forwarding.

    pub(crate) fn forward_touch(&self, event: &TouchEvent) {
        {
            let mut inner = self.inner.lock();
            match event.event_type {
                TouchType::Cancel => inner.touch_slots.clear(),
                _ => {
                    for point in &event.points {
                        if point.state == PointState::Release {
                            inner.touch_slots.remove(&point.id);
                        } else {
                            inner.touch_slots.insert(point.id);
                        }
                    }
                }
            }
        }
        self.channels.touch.send(&WindowEvent::Touch(event.clone()));
    }

    pub(crate) fn forward_tablet(&self, event: &TabletEvent) {
        self.channels.tablet.send(&WindowEvent::Tablet(*event));
    }

    pub(crate) fn forward_key(&self, event: &KeyEvent) {
        self.channels.key.send(&WindowEvent::Key(*event));
    }

    // Generic event pipe.

    /// Applies a message the owner sent on the generic event pipe.
    pub fn handle_message(self: &Arc<Self>, event: WindowEvent) {
        let owner = self.pgid;
        match event {
            WindowEvent::Repaint {
                x,
                y,
                width,
                height,
                waveform,
                marker,
            } => self.repaint(
                owner,
                Some(Rect::new(x, y, width, height)),
                WaveformMode::from_wire(waveform),
                u64::from(marker),
            ),
            WindowEvent::WaitForPaint { marker } => {
                let weak = Arc::downgrade(self);
                self.wait_for_marker(
                    owner,
                    u64::from(marker),
                    Box::new(move || {
                        if let Some(window) = weak.upgrade() {
                            window.channels.event.send(&WindowEvent::WaitForPaint { marker });
                        }
                    }),
                );
            }
            WindowEvent::Geometry {
                x, y, width, height, ..
            } => {
                let current = self.bounds();
                if current.width == width && current.height == height {
                    self.move_to(owner, x, y);
                } else {
                    self.set_geometry(owner, Rect::new(x, y, width, height));
                }
            }
            WindowEvent::Raise => self.raise(owner),
            WindowEvent::Lower => self.lower(owner),
            WindowEvent::Close => self.close(owner),
            WindowEvent::FrameBuffer => self.emit(WindowNotification::BufferChanged),
            WindowEvent::Ping => self.pong(),
            WindowEvent::Invalid => {
                tracing::warn!(window = %self.id, "Invalid message on event pipe");
            }
            other => {
                tracing::debug!(window = %self.id, message = other.type_code(), "Ignoring message from client");
            }
        }
    }

    fn pong(&self) {
        let mut liveness = self.liveness.lock();
        liveness.awaiting_since = None;
        if liveness.unresponsive {
            liveness.unresponsive = false;
            tracing::info!(window = %self.id, pgid = self.pgid, "Window owner is responsive again");
        }
    }

    /// Whether the owner answered the last ping in time.
    pub fn is_responsive(&self) -> bool {
        !self.liveness.lock().unresponsive
    }

    /// Drains the generic event pipe and runs the ping timers.
    pub fn service_events(self: &Arc<Self>, now: Instant) {
        if !self.is_enabled() || self.state() == WindowState::Closed {
            return;
        }
        match self.channels.event.try_recv() {
            Ok(events) => {
                for event in events {
                    self.handle_message(event);
                }
            }
            Err(e) => {
                tracing::warn!(window = %self.id, error = %e, "Malformed data on event pipe");
            }
        }
        self.check_liveness(now);
    }

    fn check_liveness(&self, now: Instant) {
        let send_ping = {
            let mut liveness = self.liveness.lock();
            if let Some(since) = liveness.awaiting_since {
                if !liveness.unresponsive && now >= since + self.ping_deadline {
                    liveness.unresponsive = true;
                    tracing::warn!(
                        window = %self.id,
                        pgid = self.pgid,
                        deadline = ?self.ping_deadline,
                        "Window owner is not servicing its event pipe"
                    );
                }
                false
            } else if now >= liveness.next_ping {
                liveness.awaiting_since = Some(now);
                liveness.next_ping = now + self.ping_interval;
                true
            } else {
                false
            }
        };
        if send_ping {
            self.channels.event.send(&WindowEvent::Ping);
        }
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("pgid", &self.pgid)
            .field("flags", &self.flags)
            .field("geometry", &self.bounds())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Some(buffer) = self.inner.get_mut().buffer.take() {
            self.buffers.release(buffer);
        }
        tracing::debug!(window = %self.id, "Destroyed window");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use WindowState::*;

    #[rstest]
    #[case(Raised, Raised, Lowered, Raised, RaisedHidden)]
    #[case(RaisedHidden, RaisedHidden, LoweredHidden, Raised, RaisedHidden)]
    #[case(Lowered, Raised, Lowered, Lowered, LoweredHidden)]
    #[case(LoweredHidden, RaisedHidden, LoweredHidden, Lowered, LoweredHidden)]
    #[case(Closed, Closed, Closed, Closed, Closed)]
    fn test_state_transitions(
        #[case] from: WindowState,
        #[case] raised: WindowState,
        #[case] lowered: WindowState,
        #[case] shown: WindowState,
        #[case] hidden: WindowState,
    ) {
        assert_eq!(from.raised(), raised);
        assert_eq!(from.lowered(), lowered);
        assert_eq!(from.with_visible(true), shown);
        assert_eq!(from.with_visible(false), hidden);
        assert_eq!(from.closed(), Closed);
    }

    #[test]
    fn test_window_paths_are_unique() {
        let a = WindowId::new();
        let b = WindowId::new();
        assert_ne!(a, b);
        assert!(a.path().starts_with("/window/"));
        assert_eq!(a.path().len(), "/window/".len() + 32);
    }
}
