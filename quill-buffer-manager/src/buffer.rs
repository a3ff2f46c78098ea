//! Pixel buffers backed by shared memory, and the manager that hands them out.
//!
//! Window buffers live in sealed memfds so the owning client can map them
//! while the compositor reads them. The seals forbid growing or shrinking the
//! file, which keeps the compositor's mapping valid for the buffer's lifetime.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::ops::ControlFlow;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::{Mutex, RwLock};
use quill_core::types::{Point, Rect};

use crate::error::BufferError;
use crate::format::{Color, PixelFormat};

/// Unique identifier of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn new_unique() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        BufferId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A mapped image: `height` lines of `stride` bytes in `format`.
///
/// The mapping is dropped before the backing file, so the pages are unmapped
/// before the descriptor is closed.
#[derive(Debug)]
pub struct PixelBuffer {
    id: BufferId,
    map: RwLock<MmapMut>,
    file: Option<File>,
    sealed: bool,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Wraps an existing mapping. `file` is the descriptor backing it, if any.
    pub fn from_parts(
        map: MmapMut,
        file: Option<File>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, BufferError> {
        if format == PixelFormat::Invalid {
            return Err(BufferError::UnsupportedFormat(format));
        }
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(BufferError::InvalidGeometry { width, height });
        }
        let line = width as usize * format.bytes_per_pixel();
        let required = stride.max(line) * height as usize;
        if stride < line || map.len() < required {
            return Err(BufferError::MappingTooSmall {
                len: map.len(),
                required,
            });
        }
        Ok(Self {
            id: BufferId::new_unique(),
            map: RwLock::new(map),
            file,
            sealed: false,
            width,
            height,
            stride,
            format,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per line.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn size_in_bytes(&self) -> usize {
        self.stride * self.height as usize
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The buffer's extent at the origin.
    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    /// Duplicates the backing descriptor for handing to a client.
    pub fn share_fd(&self) -> Result<Option<OwnedFd>, BufferError> {
        match &self.file {
            Some(file) => Ok(Some(OwnedFd::from(file.try_clone()?))),
            None => Ok(None),
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if !self.rect().contains_point(Point::new(x, y)) {
            return None;
        }
        Some(y as usize * self.stride + x as usize * self.format.bytes_per_pixel())
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        let offset = self.offset(x, y)?;
        let map = self.map.read();
        Some(self.format.decode(&map[offset..]))
    }

    pub fn set_pixel(&self, x: i32, y: i32, color: Color) {
        if let Some(offset) = self.offset(x, y) {
            let mut map = self.map.write();
            self.format.encode(color, &mut map[offset..]);
        }
    }

    pub fn fill(&self, color: Color) {
        self.fill_rect(self.rect(), color);
    }

    /// Fills `rect`, clipped to the buffer, with `color`.
    pub fn fill_rect(&self, rect: Rect, color: Color) {
        let area = rect.intersected(&self.rect());
        if area.is_empty() {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let mut pattern = [0u8; 4];
        self.format.encode(color, &mut pattern);
        let pattern = &pattern[..bpp];

        let mut map = self.map.write();
        for y in area.top()..area.bottom() {
            let start = y as usize * self.stride + area.left() as usize * bpp;
            let line = &mut map[start..start + area.width as usize * bpp];
            for pixel in line.chunks_exact_mut(bpp) {
                pixel.copy_from_slice(pattern);
            }
        }
    }

    /// Copies `src`, placed with its top-left corner at `at`, into this
    /// buffer. Only pixels inside `clip` are written. Pixels are replaced,
    /// not blended, converting between formats when they differ.
    pub fn draw_buffer(&self, src: &PixelBuffer, at: Point, clip: Rect) {
        if std::ptr::eq(self, src) {
            tracing::warn!(buffer = self.id.0, "Refusing to draw a buffer into itself");
            return;
        }
        let area = clip
            .intersected(&self.rect())
            .intersected(&src.rect().translated(at.x, at.y));
        if area.is_empty() {
            return;
        }

        let src_bpp = src.format.bytes_per_pixel();
        let dst_bpp = self.format.bytes_per_pixel();
        let width = area.width as usize;
        let src_map = src.map.read();
        let mut dst_map = self.map.write();

        for y in area.top()..area.bottom() {
            let src_start = (y - at.y) as usize * src.stride + (area.left() - at.x) as usize * src_bpp;
            let dst_start = y as usize * self.stride + area.left() as usize * dst_bpp;
            let src_line = &src_map[src_start..src_start + width * src_bpp];
            let dst_line = &mut dst_map[dst_start..dst_start + width * dst_bpp];
            if src.format == self.format {
                dst_line.copy_from_slice(src_line);
            } else {
                for (s, d) in src_line
                    .chunks_exact(src_bpp)
                    .zip(dst_line.chunks_exact_mut(dst_bpp))
                {
                    self.format.encode(src.format.decode(s), d);
                }
            }
        }
    }

    /// Visits the pixels of `rect` row by row until `visit` breaks.
    pub fn scan<F>(&self, rect: Rect, mut visit: F)
    where
        F: FnMut(Color) -> ControlFlow<()>,
    {
        let area = rect.intersected(&self.rect());
        if area.is_empty() {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let map = self.map.read();
        for y in area.top()..area.bottom() {
            let start = y as usize * self.stride + area.left() as usize * bpp;
            for pixel in map[start..start + area.width as usize * bpp].chunks_exact(bpp) {
                if visit(self.format.decode(pixel)).is_break() {
                    return;
                }
            }
        }
    }

    /// Runs `f` with read access to the raw pixel bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let map = self.map.read();
        f(&map[..self.size_in_bytes()])
    }

    /// Runs `f` with write access to the raw pixel bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let size = self.size_in_bytes();
        let mut map = self.map.write();
        f(&mut map[..size])
    }
}

/// Source of pixel buffer memory.
pub trait BufferAllocator: Send + Sync {
    fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> Result<PixelBuffer, BufferError>;
}

fn checked_size(width: u32, height: u32, format: PixelFormat) -> Result<(usize, usize), BufferError> {
    if format == PixelFormat::Invalid {
        return Err(BufferError::UnsupportedFormat(format));
    }
    if width == 0 || height == 0 {
        return Err(BufferError::InvalidGeometry { width, height });
    }
    let stride = format.stride_for(width);
    let size = stride
        .checked_mul(height as usize)
        .ok_or(BufferError::InvalidGeometry { width, height })?;
    Ok((stride, size))
}

/// Allocates buffers in sealed, size-fixed memfds that can be shared with clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemfdAllocator;

impl MemfdAllocator {
    fn create_memfd(name: &str, size: usize) -> Result<File, BufferError> {
        let c_name = CString::new(name).map_err(|e| {
            BufferError::MemfdCreate(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        // SAFETY: `c_name` is a valid NUL-terminated string for the duration of the call.
        let fd = unsafe {
            libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING)
        };
        if fd < 0 {
            return Err(BufferError::MemfdCreate(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by memfd_create and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };
        file.set_len(size as u64)
            .map_err(|source| BufferError::Truncate { size, source })?;

        // SAFETY: plain fcntl on a descriptor we own.
        let rc = unsafe {
            libc::fcntl(
                file.as_raw_fd(),
                libc::F_ADD_SEALS,
                libc::F_SEAL_SEAL | libc::F_SEAL_SHRINK | libc::F_SEAL_GROW,
            )
        };
        if rc < 0 {
            return Err(BufferError::Seal(std::io::Error::last_os_error()));
        }
        Ok(file)
    }
}

impl BufferAllocator for MemfdAllocator {
    fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> Result<PixelBuffer, BufferError> {
        let (stride, size) = checked_size(width, height, format)?;
        let file = Self::create_memfd("quill-window", size)?;
        // SAFETY: the file is sealed against shrinking, so the mapping cannot be truncated under us.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(BufferError::Map)?;
        let mut buffer = PixelBuffer::from_parts(map, Some(file), width, height, stride, format)?;
        buffer.sealed = true;
        Ok(buffer)
    }
}

/// Allocates private anonymous mappings. Used for off-screen framebuffers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAllocator;

impl BufferAllocator for AnonymousAllocator {
    fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> Result<PixelBuffer, BufferError> {
        let (stride, size) = checked_size(width, height, format)?;
        let map = MmapMut::map_anon(size).map_err(BufferError::Map)?;
        PixelBuffer::from_parts(map, None, width, height, stride, format)
    }
}

/// Hands out window buffers and tracks the ones still alive.
pub struct BufferManager {
    allocator: Box<dyn BufferAllocator>,
    buffers: Mutex<HashMap<BufferId, Weak<PixelBuffer>>>,
}

impl BufferManager {
    pub fn new(allocator: Box<dyn BufferAllocator>) -> Self {
        Self {
            allocator,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// A manager backed by sealed memfds.
    pub fn shared_memory() -> Self {
        Self::new(Box::new(MemfdAllocator))
    }

    /// Allocates a buffer cleared to the format's background color.
    pub fn allocate(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<PixelBuffer>, BufferError> {
        let buffer = self.allocator.allocate(width, height, format)?;
        buffer.fill(format.background());
        let buffer = Arc::new(buffer);

        let mut buffers = self.buffers.lock();
        buffers.retain(|_, weak| weak.strong_count() > 0);
        buffers.insert(buffer.id(), Arc::downgrade(&buffer));
        tracing::debug!(
            buffer = buffer.id().as_u64(),
            width,
            height,
            %format,
            bytes = buffer.size_in_bytes(),
            "Allocated pixel buffer"
        );
        Ok(buffer)
    }

    pub fn get(&self, id: BufferId) -> Option<Arc<PixelBuffer>> {
        self.buffers.lock().get(&id).and_then(Weak::upgrade)
    }

    /// Stops tracking `buffer` and drops the caller's reference. The memory is
    /// unmapped once the last reference is gone.
    pub fn release(&self, buffer: Arc<PixelBuffer>) {
        let id = buffer.id();
        self.buffers.lock().remove(&id);
        let still_shared = Arc::strong_count(&buffer) > 1;
        drop(buffer);
        tracing::debug!(buffer = id.as_u64(), still_shared, "Released pixel buffer");
    }

    /// Number of tracked buffers that are still alive.
    pub fn live_buffers(&self) -> usize {
        self.buffers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::shared_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn anon(width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        AnonymousAllocator.allocate(width, height, format).unwrap()
    }

    #[test]
    fn test_unique_buffer_ids() {
        assert_ne!(BufferId::new_unique(), BufferId::new_unique());
    }

    #[test]
    fn test_memfd_buffer_is_sealed_and_sized() {
        let buffer = MemfdAllocator.allocate(100, 50, PixelFormat::Rgb16).unwrap();
        assert!(buffer.is_sealed());
        assert_eq!(buffer.stride(), 200);
        assert_eq!(buffer.size_in_bytes(), 10_000);

        let fd = buffer.raw_fd().unwrap();
        // SAFETY: fcntl query on a descriptor owned by `buffer`.
        let seals = unsafe { libc::fcntl(fd, libc::F_GET_SEALS) };
        assert!(seals & libc::F_SEAL_GROW != 0);
        assert!(seals & libc::F_SEAL_SHRINK != 0);
        assert!(seals & libc::F_SEAL_SEAL != 0);

        let shared = buffer.share_fd().unwrap().unwrap();
        let file = File::from(shared);
        assert_eq!(file.metadata().unwrap().len(), 10_000);
        assert!(file.set_len(20_000).is_err());
    }

    #[test]
    fn test_rejects_empty_and_invalid() {
        assert!(matches!(
            AnonymousAllocator.allocate(0, 10, PixelFormat::Rgb16),
            Err(BufferError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            MemfdAllocator.allocate(10, 10, PixelFormat::Invalid),
            Err(BufferError::UnsupportedFormat(PixelFormat::Invalid))
        ));
    }

    #[test]
    fn test_fill_rect_clips() {
        let buffer = anon(10, 10, PixelFormat::Rgb16);
        buffer.fill(Color::WHITE);
        buffer.fill_rect(Rect::new(8, 8, 5, 5), Color::BLACK);
        assert_eq!(buffer.pixel(9, 9), Some(Color::BLACK));
        assert_eq!(buffer.pixel(7, 7), Some(Color::WHITE));
        assert_eq!(buffer.pixel(10, 10), None);
    }

    #[test]
    fn test_draw_buffer_converts_and_clips() {
        let screen = anon(20, 20, PixelFormat::Rgb16);
        screen.fill(Color::WHITE);
        let window = anon(10, 10, PixelFormat::Argb32);
        window.fill(Color::BLACK);

        screen.draw_buffer(&window, Point::new(15, 15), Rect::new(0, 0, 18, 18));
        assert_eq!(screen.pixel(15, 15), Some(Color::BLACK));
        assert_eq!(screen.pixel(17, 17), Some(Color::BLACK));
        assert_eq!(screen.pixel(18, 18), Some(Color::WHITE));
        assert_eq!(screen.pixel(14, 15), Some(Color::WHITE));
    }

    #[test]
    fn test_draw_buffer_replaces_with_transparency() {
        let screen = anon(4, 4, PixelFormat::Argb32);
        screen.fill(Color::WHITE);
        let window = anon(4, 4, PixelFormat::Argb32);
        window.fill(Color::TRANSPARENT);
        screen.draw_buffer(&window, Point::ZERO, screen.rect());
        assert_eq!(screen.pixel(0, 0), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_scan_stops_on_break() {
        let buffer = anon(4, 4, PixelFormat::Grayscale8);
        buffer.fill(Color::WHITE);
        let mut visited = 0;
        buffer.scan(buffer.rect(), |_| {
            visited += 1;
            if visited == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_manager_tracks_and_releases() {
        let manager = BufferManager::new(Box::new(AnonymousAllocator));
        let buffer = manager.allocate(8, 8, PixelFormat::Argb32).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some(Color::TRANSPARENT));
        let id = buffer.id();
        assert!(manager.get(id).is_some());
        assert_eq!(manager.live_buffers(), 1);

        manager.release(buffer);
        assert!(manager.get(id).is_none());
        assert_eq!(manager.live_buffers(), 0);

        let opaque = manager.allocate(8, 8, PixelFormat::Rgb16).unwrap();
        assert_eq!(opaque.pixel(7, 7), Some(Color::WHITE));
    }
}
