#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{self, Read};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use parking_lot::Mutex;
use quill_buffer_manager::{AnonymousAllocator, BufferManager, PixelFormat};
use quill_compositor_core::{
    Compositor, Correlator, FrameReader, ManualClock, ProcessSupervisor, Registry, SimulatedDriver,
    WindowEvent,
};
use quill_core::config::CompositorConfig;

pub const SERVICE: i32 = 1;
pub const OWNER: i32 = 4242;
pub const OTHER: i32 = 5151;

/// Supervisor whose answers the test controls.
#[derive(Default)]
pub struct FakeSupervisor {
    pub paused: Mutex<HashSet<i32>>,
    pub gone: Mutex<HashSet<i32>>,
    pub denied: Mutex<HashSet<i32>>,
}

impl ProcessSupervisor for FakeSupervisor {
    fn process_group_exists(&self, pgid: i32) -> bool {
        !self.gone.lock().contains(&pgid)
    }

    fn is_paused(&self, pgid: i32) -> bool {
        self.paused.lock().contains(&pgid)
    }

    fn has_permission(&self, pgid: i32, _permission: &str) -> bool {
        !self.denied.lock().contains(&pgid)
    }
}

/// The compositor pieces without worker threads. Work is driven by
/// [`Harness::flush`].
pub struct Harness {
    pub driver: Arc<SimulatedDriver>,
    pub clock: Arc<ManualClock>,
    pub supervisor: Arc<FakeSupervisor>,
    pub correlator: Arc<Correlator>,
    pub compositor: Arc<Compositor>,
    pub registry: Arc<Registry>,
}

impl Harness {
    pub fn new(width: u32, height: u32) -> Self {
        let driver = Arc::new(SimulatedDriver::new(width, height, PixelFormat::Rgb16).unwrap());
        let clock = Arc::new(ManualClock::new());
        let supervisor = Arc::new(FakeSupervisor::default());
        let config = CompositorConfig::default();
        let correlator = Arc::new(Correlator::new(driver.clone(), clock.clone(), &config));
        let compositor = Arc::new(Compositor::new(
            driver.clone(),
            correlator.clone(),
            supervisor.clone(),
            &config,
            0x18,
        ));
        let registry = Registry::new(
            compositor.clone(),
            supervisor.clone(),
            Arc::new(BufferManager::new(Box::new(AnonymousAllocator))),
            clock.clone(),
            &config,
            SERVICE,
        );
        Self {
            driver,
            clock,
            supervisor,
            correlator,
            compositor,
            registry,
        }
    }

    /// Paints everything queued, then runs one correlator pass.
    pub fn flush(&self) {
        self.compositor.run_pending();
        self.correlator.tick();
    }
}

/// Reads whatever is buffered on a client pipe without blocking.
pub fn drain_events(stream: &mut UnixStream) -> Vec<WindowEvent> {
    stream.set_nonblocking(true).unwrap();
    let mut reader = FrameReader::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => reader.push(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    let mut events = Vec::new();
    while let Some(event) = reader.next_event().unwrap() {
        events.push(event);
    }
    events
}
