//! # Frames
//!
//! A [`Frame`] is a cheap, clonable handle to packed pixel storage plus the
//! [`FormatContext`] describing it. Storage drawn from a
//! [`FrameBufferPool`](crate::pool::FrameBufferPool) returns to that pool when
//! the last handle is dropped.
//!
//! Frames produced by GPU kernels are returned as soon as their work is
//! submitted. Such frames carry a [`FrameCompletion`]; reading the pixels
//! (or calling [`Frame::wait`]) blocks until the device has written them.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{FilterError, Result};
use crate::format::{ColorSpace, FormatContext};
use crate::pool::PoolShared;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_storage_id() -> u64 {
    NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Pending work that will fill a frame's pixels.
pub trait FrameCompletion: Send + Sync {
    fn is_complete(&self) -> bool;

    /// Blocks until the work has finished and writes its result into `dest`.
    /// Calling it again after success is a no-op.
    fn resolve(&self, dest: &mut [u8]) -> Result<()>;
}

pub(crate) struct PixelStorage {
    id: u64,
    bytes: RwLock<Vec<u8>>,
    origin: Option<Weak<PoolShared>>,
}

impl Drop for PixelStorage {
    fn drop(&mut self) {
        if let Some(pool) = self.origin.take().and_then(|weak| weak.upgrade()) {
            pool.recycle(self.id, std::mem::take(self.bytes.get_mut()));
        }
    }
}

#[derive(Clone)]
pub struct Frame {
    format: FormatContext,
    storage: Arc<PixelStorage>,
    completion: Option<Arc<dyn FrameCompletion>>,
}

impl Frame {
    /// Wraps caller-owned pixels. `bytes` must be tightly packed.
    pub fn new(format: FormatContext, bytes: Vec<u8>) -> Result<Self> {
        let expected = format.byte_len().ok_or_else(|| {
            FilterError::InvalidFormat(format!("{} overflows buffer size", format))
        })?;
        if bytes.len() != expected {
            return Err(FilterError::InvalidFormat(format!(
                "{} needs {} bytes, got {}",
                format,
                expected,
                bytes.len()
            )));
        }
        Ok(Self::from_parts(next_storage_id(), format, bytes, None))
    }

    /// A frame with every pixel set to `pixel` (one entry per channel).
    pub fn filled(format: FormatContext, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != format.layout.bytes_per_pixel() {
            return Err(FilterError::InvalidFormat(format!(
                "{} pixels have {} channels, got {}",
                format.layout,
                format.layout.bytes_per_pixel(),
                pixel.len()
            )));
        }
        let bytes = pixel.repeat(format.pixel_count());
        Self::new(format, bytes)
    }

    pub(crate) fn pooled(
        id: u64,
        format: FormatContext,
        bytes: Vec<u8>,
        origin: Weak<PoolShared>,
    ) -> Self {
        Self::from_parts(id, format, bytes, Some(origin))
    }

    fn from_parts(
        id: u64,
        format: FormatContext,
        bytes: Vec<u8>,
        origin: Option<Weak<PoolShared>>,
    ) -> Self {
        Self {
            format,
            storage: Arc::new(PixelStorage {
                id,
                bytes: RwLock::new(bytes),
                origin,
            }),
            completion: None,
        }
    }

    pub(crate) fn with_completion(mut self, completion: Arc<dyn FrameCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Identity of the underlying storage. Pooled buffers keep their id
    /// across reuse.
    pub fn id(&self) -> u64 {
        self.storage.id
    }

    pub fn format(&self) -> FormatContext {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.format.color_space
    }

    /// Both handles point at the same pixel storage.
    pub fn shares_storage(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn is_pooled(&self) -> bool {
        self.storage.origin.is_some()
    }

    /// True once all device work writing this frame has landed.
    pub fn is_ready(&self) -> bool {
        self.completion
            .as_ref()
            .map_or(true, |completion| completion.is_complete())
    }

    /// Blocks until pending device work has written the pixels.
    pub fn wait(&self) -> Result<()> {
        if let Some(completion) = &self.completion {
            if !completion.is_complete() {
                let mut bytes = self.storage.bytes.write();
                completion.resolve(&mut bytes)?;
            }
        }
        Ok(())
    }

    pub fn pixels(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.wait()?;
        Ok(self.storage.bytes.read())
    }

    pub fn pixels_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.wait()?;
        Ok(self.storage.bytes.write())
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.pixels()?.clone())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.storage.id)
            .field("format", &self.format)
            .field("pooled", &self.is_pooled())
            .field("ready", &self.is_ready())
            .finish()
    }
}
