//! Display drivers: the i.MX EPDC framebuffer and an in-memory stand-in.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::MmapOptions;
use parking_lot::Mutex;
use quill_buffer_manager::{AnonymousAllocator, BufferAllocator, PixelBuffer, PixelFormat};
use quill_core::config::DisplayConfig;
use quill_core::types::Rect;

use crate::error::CompositorError;
use crate::waveform::{UpdateMode, WaveformMode};

/// One refresh of a screen area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub rect: Rect,
    pub waveform: WaveformMode,
    pub mode: UpdateMode,
    /// Hardware marker, never zero.
    pub marker: u32,
    pub temperature: i32,
}

/// The hardware boundary. Only the compositor and correlator threads call it.
pub trait DisplayDriver: Send + Sync {
    fn screen_rect(&self) -> Rect;

    /// The buffer scanned out by the display controller.
    fn framebuffer(&self) -> Arc<PixelBuffer>;

    fn send_update(&self, request: &UpdateRequest) -> Result<(), CompositorError>;

    /// Blocks until the update tagged `marker` has been shown.
    fn wait_for_update_complete(&self, marker: u32) -> Result<(), CompositorError>;
}

mod mxcfb {
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Rect {
        pub top: u32,
        pub left: u32,
        pub width: u32,
        pub height: u32,
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct AltBufferData {
        pub phys_addr: u32,
        pub width: u32,
        pub height: u32,
        pub alt_update_region: Rect,
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UpdateData {
        pub update_region: Rect,
        pub waveform_mode: u32,
        pub update_mode: u32,
        pub update_marker: u32,
        pub temp: i32,
        pub flags: u32,
        pub dither_mode: i32,
        pub quant_bit: i32,
        pub alt_buffer_data: AltBufferData,
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UpdateMarkerData {
        pub update_marker: u32,
        pub collision_test: u32,
    }

    nix::ioctl_write_ptr!(send_update, b'F', 0x2E, UpdateData);
    nix::ioctl_readwrite!(wait_for_update_complete, b'F', 0x2F, UpdateMarkerData);
}

/// Driver for `/dev/fb0` on i.MX e-paper controllers.
pub struct MxcfbDriver {
    device: File,
    framebuffer: Arc<PixelBuffer>,
    screen: Rect,
}

impl MxcfbDriver {
    /// Opens and maps the framebuffer device described by `config`.
    pub fn open(config: &DisplayConfig) -> Result<Self, CompositorError> {
        let format = PixelFormat::from_name(&config.pixel_format).ok_or_else(|| {
            CompositorError::Driver(format!("unsupported pixel format {}", config.pixel_format))
        })?;
        let unavailable = |source| CompositorError::FramebufferUnavailable {
            path: config.device.clone(),
            source,
        };
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(unavailable)?;

        let stride = config
            .stride
            .map(|s| s as usize)
            .unwrap_or_else(|| format.stride_for(config.width));
        let size = stride * config.height as usize;
        // SAFETY: the framebuffer device's memory stays mapped for the life of the device handle.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&device) }.map_err(unavailable)?;
        let framebuffer = PixelBuffer::from_parts(map, None, config.width, config.height, stride, format)?;

        tracing::info!(
            device = ?config.device,
            width = config.width,
            height = config.height,
            stride,
            %format,
            "Opened framebuffer"
        );
        Ok(Self {
            screen: framebuffer.rect(),
            framebuffer: Arc::new(framebuffer),
            device,
        })
    }
}

impl DisplayDriver for MxcfbDriver {
    fn screen_rect(&self) -> Rect {
        self.screen
    }

    fn framebuffer(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.framebuffer)
    }

    fn send_update(&self, request: &UpdateRequest) -> Result<(), CompositorError> {
        let rect = request.rect.intersected(&self.screen);
        let data = mxcfb::UpdateData {
            update_region: mxcfb::Rect {
                top: rect.y as u32,
                left: rect.x as u32,
                width: rect.width as u32,
                height: rect.height as u32,
            },
            waveform_mode: request.waveform.code(),
            update_mode: request.mode.code(),
            update_marker: request.marker,
            temp: request.temperature,
            ..Default::default()
        };
        // SAFETY: `data` is a live, correctly laid out mxcfb_update_data.
        unsafe { mxcfb::send_update(self.device.as_raw_fd(), &data) }
            .map_err(|e| CompositorError::Driver(format!("MXCFB_SEND_UPDATE failed: {e}")))?;
        Ok(())
    }

    fn wait_for_update_complete(&self, marker: u32) -> Result<(), CompositorError> {
        let mut data = mxcfb::UpdateMarkerData {
            update_marker: marker,
            collision_test: 0,
        };
        // SAFETY: `data` is a live, correctly laid out mxcfb_update_marker_data.
        unsafe { mxcfb::wait_for_update_complete(self.device.as_raw_fd(), &mut data) }.map_err(|e| {
            CompositorError::Driver(format!("MXCFB_WAIT_FOR_UPDATE_COMPLETE failed: {e}"))
        })?;
        Ok(())
    }
}

/// In-memory display that records every update and wait it receives.
pub struct SimulatedDriver {
    framebuffer: Arc<PixelBuffer>,
    screen: Rect,
    updates: Mutex<Vec<UpdateRequest>>,
    waits: Mutex<Vec<u32>>,
    fail_updates: AtomicBool,
}

impl SimulatedDriver {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, CompositorError> {
        let framebuffer = AnonymousAllocator.allocate(width, height, format)?;
        Ok(Self {
            screen: framebuffer.rect(),
            framebuffer: Arc::new(framebuffer),
            updates: Mutex::new(Vec::new()),
            waits: Mutex::new(Vec::new()),
            fail_updates: AtomicBool::new(false),
        })
    }

    /// Makes subsequent `send_update` calls fail.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<UpdateRequest> {
        self.updates.lock().clone()
    }

    /// Hardware markers passed to `wait_for_update_complete`, in call order.
    pub fn waits(&self) -> Vec<u32> {
        self.waits.lock().clone()
    }

    pub fn clear_history(&self) {
        self.updates.lock().clear();
        self.waits.lock().clear();
    }
}

impl DisplayDriver for SimulatedDriver {
    fn screen_rect(&self) -> Rect {
        self.screen
    }

    fn framebuffer(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.framebuffer)
    }

    fn send_update(&self, request: &UpdateRequest) -> Result<(), CompositorError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(CompositorError::Driver("simulated update failure".to_string()));
        }
        self.updates.lock().push(*request);
        Ok(())
    }

    fn wait_for_update_complete(&self, marker: u32) -> Result<(), CompositorError> {
        self.waits.lock().push(marker);
        Ok(())
    }
}
