//! Wiring of the compositor pieces into a running service.

use std::sync::Arc;

use nix::unistd::getpgrp;
use quill_buffer_manager::BufferManager;
use quill_core::config::CoreConfig;

use crate::clock::{Clock, SystemClock};
use crate::compositor::Compositor;
use crate::correlator::Correlator;
use crate::driver::{DisplayDriver, MxcfbDriver};
use crate::error::CompositorError;
use crate::registry::Registry;
use crate::supervisor::ProcessSupervisor;

/// A started compositor: the registry, the compositor loop and the
/// correlator, sharing one display driver.
pub struct CompositorContext {
    driver: Arc<dyn DisplayDriver>,
    compositor: Arc<Compositor>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
}

impl CompositorContext {
    /// Opens the framebuffer named by the configuration and starts both
    /// worker threads. Failing to open the framebuffer is fatal.
    pub fn start(config: &CoreConfig, supervisor: Arc<dyn ProcessSupervisor>) -> Result<Self, CompositorError> {
        let driver = MxcfbDriver::open(&config.display).map_err(|e| {
            tracing::error!(device = ?config.display.device, error = %e, "Cannot open framebuffer");
            e
        })?;
        Self::start_with_driver(
            config,
            Arc::new(driver),
            supervisor,
            Arc::new(SystemClock),
            getpgrp().as_raw(),
        )
    }

    /// Starts the compositor on an existing driver. `service_pgid` is the
    /// process group allowed to act on every window.
    pub fn start_with_driver(
        config: &CoreConfig,
        driver: Arc<dyn DisplayDriver>,
        supervisor: Arc<dyn ProcessSupervisor>,
        clock: Arc<dyn Clock>,
        service_pgid: i32,
    ) -> Result<Self, CompositorError> {
        let correlator = Arc::new(Correlator::new(
            Arc::clone(&driver),
            Arc::clone(&clock),
            &config.compositor,
        ));
        let compositor = Arc::new(Compositor::new(
            Arc::clone(&driver),
            Arc::clone(&correlator),
            Arc::clone(&supervisor),
            &config.compositor,
            config.display.temperature,
        ));
        let registry = Registry::new(
            Arc::clone(&compositor),
            supervisor,
            Arc::new(BufferManager::shared_memory()),
            Arc::clone(&clock),
            &config.compositor,
            service_pgid,
        );

        correlator.start()?;
        if let Err(e) = compositor.start() {
            correlator.shutdown();
            return Err(e);
        }
        tracing::info!(screen = ?driver.screen_rect(), service_pgid, "Compositor started");
        Ok(Self {
            driver,
            compositor,
            registry,
            clock,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    pub fn driver(&self) -> &Arc<dyn DisplayDriver> {
        &self.driver
    }

    /// Services client event pipes. The host calls this from its event loop.
    pub fn service_clients(&self) {
        self.registry.service_clients(self.clock.now());
    }

    /// Stops the compositor loop and the correlator. Safe to call twice.
    pub fn shutdown(&self) {
        self.registry.set_enabled(false);
        self.compositor.shutdown();
    }
}

impl Drop for CompositorContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
