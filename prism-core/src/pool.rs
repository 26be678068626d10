//! # Frame Buffer Pools
//!
//! Reusable output buffers sized to one [`FormatContext`]. Live-view filters
//! cannot tolerate allocation jitter, so pools are pre-warmed when a filter is
//! initialized and steady-state frames recycle the same storage.
//!
//! ```text
//! ┌─────────────┐ acquire ┌────────┐  drop last handle  ┌─────────────┐
//! │ free list   │────────►│ Frame  │───────────────────►│ free list   │
//! └─────────────┘         └────────┘                    └─────────────┘
//! ```
//!
//! A pool never holds more buffers than its allocation threshold, which starts
//! at the pool's minimum buffer count; `acquire` fails with
//! [`FilterError::PoolExhausted`] instead of blocking when all of them are in
//! flight.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{FilterError, Result};
use crate::format::FormatContext;
use crate::frame::{next_storage_id, Frame};

/// Largest width or height a pool accepts unless configured otherwise.
pub const DEFAULT_MAX_DIMENSION: u32 = 16384;

pub(crate) struct PoolShared {
    format: FormatContext,
    byte_len: usize,
    min_buffers: usize,
    state: Mutex<PoolState>,
    recycled: AtomicU64,
}

struct PoolState {
    free: Vec<(u64, Vec<u8>)>,
    allocated: usize,
    threshold: usize,
}

impl PoolShared {
    pub(crate) fn recycle(&self, id: u64, bytes: Vec<u8>) {
        if bytes.len() != self.byte_len {
            return;
        }
        self.state.lock().free.push((id, bytes));
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: usize,
    pub available: usize,
    pub recycled: u64,
    pub threshold: usize,
}

#[derive(Clone)]
pub struct FrameBufferPool {
    shared: Arc<PoolShared>,
}

impl FrameBufferPool {
    pub fn format(&self) -> FormatContext {
        self.shared.format
    }

    pub fn min_buffers(&self) -> usize {
        self.shared.min_buffers
    }

    pub fn threshold(&self) -> usize {
        self.shared.state.lock().threshold
    }

    /// Same pool, not merely an equal format.
    pub fn ptr_eq(&self, other: &FrameBufferPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Draws a buffer, allocating only while under the threshold.
    pub fn acquire(&self) -> Result<Frame> {
        let mut state = self.shared.state.lock();
        if let Some((id, bytes)) = state.free.pop() {
            drop(state);
            return Ok(Frame::pooled(
                id,
                self.shared.format,
                bytes,
                Arc::downgrade(&self.shared),
            ));
        }

        if state.allocated >= state.threshold {
            return Err(FilterError::PoolExhausted {
                threshold: state.threshold,
            });
        }
        state.allocated += 1;
        drop(state);

        let bytes = match allocate(self.shared.byte_len) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.shared.state.lock().allocated -= 1;
                return Err(err);
            }
        };
        Ok(Frame::pooled(
            next_storage_id(),
            self.shared.format,
            bytes,
            Arc::downgrade(&self.shared),
        ))
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            allocated: state.allocated,
            available: state.free.len(),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
            threshold: state.threshold,
        }
    }
}

impl std::fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferPool")
            .field("format", &self.shared.format)
            .field("stats", &self.stats())
            .finish()
    }
}

fn allocate(len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| FilterError::AllocationFailed(len))?;
    bytes.resize(len, 0);
    Ok(bytes)
}

/// Creates and pre-warms pools. Holds no pools itself; each filter owns the
/// pool it builds.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolManager {
    max_dimension: u32,
}

impl Default for BufferPoolManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl BufferPoolManager {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn create_pool(&self, format: &FormatContext, min_buffers: usize) -> Result<FrameBufferPool> {
        let byte_len = format.validate(self.max_dimension)?;
        debug!("Creating buffer pool for {} (min {} buffers)", format, min_buffers);
        Ok(FrameBufferPool {
            shared: Arc::new(PoolShared {
                format: *format,
                byte_len,
                min_buffers,
                state: Mutex::new(PoolState {
                    free: Vec::with_capacity(min_buffers),
                    allocated: 0,
                    threshold: min_buffers.max(1),
                }),
                recycled: AtomicU64::new(0),
            }),
        })
    }

    /// Sets the pool's allocation threshold and allocates up to it, so later
    /// acquisitions never allocate. Free buffers above a lowered threshold are
    /// released. Returns the number of buffers warmed.
    pub fn prewarm(&self, pool: &FrameBufferPool, threshold: usize) -> Result<usize> {
        let threshold = threshold.max(1);
        {
            let mut state = pool.shared.state.lock();
            state.threshold = threshold;
            while state.allocated > threshold && state.free.pop().is_some() {
                state.allocated -= 1;
            }
        }

        let mut held = Vec::with_capacity(threshold);
        loop {
            match pool.acquire() {
                Ok(frame) => held.push(frame),
                Err(FilterError::PoolExhausted { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        let warmed = held.len();
        drop(held);

        debug!("Pre-warmed {} buffers for {}", warmed, pool.format());
        Ok(warmed)
    }

    /// Draws one buffer from `pool`.
    pub fn acquire(&self, pool: &FrameBufferPool) -> Result<Frame> {
        pool.acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ColorSpace, PixelLayout};

    #[test]
    fn buffers_match_pool_geometry() {
        let manager = BufferPoolManager::default();
        for format in [
            FormatContext::rgba(3, 5),
            FormatContext::new(7, 2, PixelLayout::Bgra8, ColorSpace::DisplayP3),
            FormatContext::new(1, 9, PixelLayout::Gray8, ColorSpace::Bt709),
        ] {
            let pool = manager.create_pool(&format, 2).unwrap();
            let frame = pool.acquire().unwrap();
            assert_eq!(frame.format(), format);
            assert_eq!(frame.pixels().unwrap().len(), format.byte_len().unwrap());
        }
    }

    #[test]
    fn rejects_impossible_geometry() {
        let manager = BufferPoolManager::new(64);
        assert!(manager.create_pool(&FormatContext::rgba(0, 4), 3).is_err());
        assert!(manager.create_pool(&FormatContext::rgba(65, 4), 3).is_err());
    }

    #[test]
    fn released_buffers_are_reused() {
        let pool = BufferPoolManager::default()
            .create_pool(&FormatContext::rgba(4, 4), 1)
            .unwrap();
        let first = pool.acquire().unwrap();
        let id = first.id();
        drop(first);

        let second = pool.acquire().unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(pool.stats().recycled, 1);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn prewarm_then_threshold_holds() {
        let manager = BufferPoolManager::default();
        let pool = manager.create_pool(&FormatContext::rgba(8, 8), 3).unwrap();
        assert_eq!(manager.prewarm(&pool, 3).unwrap(), 3);
        assert_eq!(pool.stats().available, 3);

        let held: Vec<Frame> = (0..3).map(|_| manager.acquire(&pool).unwrap()).collect();
        assert!(matches!(
            pool.acquire(),
            Err(FilterError::PoolExhausted { threshold: 3 })
        ));

        drop(held);
        assert!(pool.acquire().is_ok());
        assert_eq!(pool.stats().allocated, 3);
    }

    #[test]
    fn unwarmed_pool_is_bounded_by_min_buffers() {
        let pool = BufferPoolManager::default()
            .create_pool(&FormatContext::rgba(2, 2), 3)
            .unwrap();
        assert_eq!(pool.threshold(), 3);

        let held: Vec<Frame> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        assert!(matches!(
            pool.acquire(),
            Err(FilterError::PoolExhausted { threshold: 3 })
        ));
        assert_eq!(pool.stats().allocated, 3);
        drop(held);
    }

    #[test]
    fn zero_min_buffers_still_allows_one() {
        let pool = BufferPoolManager::default()
            .create_pool(&FormatContext::rgba(2, 2), 0)
            .unwrap();
        let _held = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
    }

    #[test]
    fn prewarm_honours_requested_threshold() {
        let manager = BufferPoolManager::default();
        let pool = manager.create_pool(&FormatContext::rgba(2, 2), 4).unwrap();
        assert_eq!(manager.prewarm(&pool, 6).unwrap(), 6);
        assert_eq!(pool.threshold(), 6);

        assert_eq!(manager.prewarm(&pool, 2).unwrap(), 2);
        assert_eq!(pool.threshold(), 2);
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.stats().available, 2);
    }

    #[test]
    fn buffers_outliving_pool_are_freed() {
        let pool = BufferPoolManager::default()
            .create_pool(&FormatContext::rgba(2, 2), 1)
            .unwrap();
        let frame = pool.acquire().unwrap();
        drop(pool);
        assert_eq!(frame.pixels().unwrap().len(), 16);
    }
}
