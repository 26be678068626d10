//! # Filter Contract
//!
//! Every filter, CPU graph or GPU kernel, follows the same lifecycle:
//!
//! ```text
//!            initialize(format)              reset()
//! Uninit ─────────────────────────► Ready ───────────► Uninit
//!                                    │ ▲
//!                                    └─┘ run(frames, pool, options)
//! ```
//!
//! `initialize` is idempotent while already initialized; a format change is
//! handled by the dispatcher calling `reset` followed by `initialize`.

use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::{FilterCategory, FilterId};
use crate::error::{FilterError, Result};
use crate::format::{ColorSpace, FormatContext};
use crate::frame::Frame;
use crate::options::OptionBag;
use crate::pool::{BufferPoolManager, FrameBufferPool};

/// Lifecycle data every filter carries.
#[derive(Debug, Default)]
pub struct FilterState {
    initialized: bool,
    input_format: Option<FormatContext>,
    output_format: Option<FormatContext>,
    pool: Option<FrameBufferPool>,
}

impl FilterState {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn input_format(&self) -> Option<FormatContext> {
        self.input_format
    }

    pub fn output_format(&self) -> Option<FormatContext> {
        self.output_format
    }

    pub fn pool(&self) -> Option<&FrameBufferPool> {
        self.pool.as_ref()
    }

    /// Creates and pre-warms the output pool for `format`. Returns `false`
    /// without touching anything when already initialized.
    pub fn initialize(
        &mut self,
        pools: &BufferPoolManager,
        format: &FormatContext,
        min_buffers: usize,
    ) -> Result<bool> {
        if self.initialized {
            return Ok(false);
        }
        let pool = pools.create_pool(format, min_buffers)?;
        pools.prewarm(&pool, min_buffers)?;

        self.input_format = Some(*format);
        self.output_format = Some(*format);
        self.pool = Some(pool);
        self.initialized = true;
        Ok(true)
    }

    /// Forgets formats and releases the pool reference. Frames still in
    /// flight keep their storage alive.
    pub fn clear(&mut self) {
        self.initialized = false;
        self.input_format = None;
        self.output_format = None;
        self.pool = None;
    }
}

/// A single image-processing operation.
pub trait Filter: Send {
    fn id(&self) -> FilterId;

    fn state(&self) -> &FilterState;

    /// Allocates per-format resources and pre-warms the output pool.
    /// No-op when already initialized.
    fn initialize(&mut self, format: &FormatContext, min_buffers: usize) -> Result<()>;

    /// Drops per-format resources; the filter returns to uninitialized.
    fn reset(&mut self);

    /// Produces one output frame. `frames` is non-empty and homogeneous.
    /// Fails with [`FilterError::NotInitialized`] before `initialize`.
    fn run(
        &mut self,
        frames: &[Frame],
        pool: &FrameBufferPool,
        color_space: ColorSpace,
        options: &OptionBag,
    ) -> Result<Frame>;
}

/// Returns its first input untouched.
pub struct Passthrough {
    pools: BufferPoolManager,
    state: FilterState,
}

impl Passthrough {
    pub fn new(pools: BufferPoolManager) -> Self {
        Self {
            pools,
            state: FilterState::default(),
        }
    }
}

impl Filter for Passthrough {
    fn id(&self) -> FilterId {
        FilterId::Passthrough
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn initialize(&mut self, format: &FormatContext, min_buffers: usize) -> Result<()> {
        self.state.initialize(&self.pools, format, min_buffers)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn run(
        &mut self,
        frames: &[Frame],
        _pool: &FrameBufferPool,
        _color_space: ColorSpace,
        _options: &OptionBag,
    ) -> Result<Frame> {
        if !self.state.is_initialized() {
            return Err(FilterError::NotInitialized(FilterId::Passthrough));
        }
        frames.first().cloned().ok_or(FilterError::NoInputFrames)
    }
}

// ============================================================================
// Filter Handle
// ============================================================================

/// A registered filter instance. The lock serializes lifecycle changes and
/// runs on the same instance; distinct filters never contend.
pub struct FilterHandle {
    id: FilterId,
    category: FilterCategory,
    inner: Mutex<Box<dyn Filter>>,
}

impl FilterHandle {
    pub fn new(filter: Box<dyn Filter>) -> Self {
        let id = filter.id();
        Self {
            id,
            category: id.category(),
            inner: Mutex::new(filter),
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn category(&self) -> FilterCategory {
        self.category
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().state().is_initialized()
    }

    pub fn input_format(&self) -> Option<FormatContext> {
        self.inner.lock().state().input_format()
    }

    pub fn pool(&self) -> Option<FrameBufferPool> {
        self.inner.lock().state().pool().cloned()
    }

    pub fn initialize(&self, format: &FormatContext, min_buffers: usize) -> Result<()> {
        self.inner.lock().initialize(format, min_buffers)
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Runs with the filter's own pool. Fails if not initialized.
    pub fn run(&self, frames: &[Frame], options: &OptionBag) -> Result<Frame> {
        let mut filter = self.inner.lock();
        let pool = filter
            .state()
            .pool()
            .cloned()
            .ok_or(FilterError::NotInitialized(self.id))?;
        let color_space = frames
            .first()
            .map(Frame::color_space)
            .unwrap_or_default();
        filter.run(frames, &pool, color_space, options)
    }

    /// Brings the filter in line with `format` and runs it, all under one
    /// lock so a concurrent caller cannot reset it mid-frame.
    pub(crate) fn execute(
        &self,
        frames: &[Frame],
        format: &FormatContext,
        min_buffers: usize,
        options: &OptionBag,
    ) -> Result<Frame> {
        let mut filter = self.inner.lock();

        if filter.state().is_initialized() && filter.state().input_format() != Some(*format) {
            debug!("{} re-initializing for {}", self.id, format);
            filter.reset();
        }
        if !filter.state().is_initialized() {
            filter.initialize(format, min_buffers)?;
        }

        let pool = filter
            .state()
            .pool()
            .cloned()
            .ok_or(FilterError::NotInitialized(self.id))?;
        let result = filter.run(frames, &pool, format.color_space, options);

        if let Err(FilterError::Device(err)) = &result {
            if err.is_device_lost() {
                debug!("{} dropping GPU resources after device loss", self.id);
                filter.reset();
            }
        }
        result
    }
}

impl std::fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterHandle")
            .field("id", &self.id)
            .field("category", &self.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> FilterHandle {
        FilterHandle::new(Box::new(Passthrough::new(BufferPoolManager::default())))
    }

    #[test]
    fn run_before_initialize_fails() {
        let handle = handle();
        let frame = Frame::filled(FormatContext::rgba(2, 2), &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            handle.run(&[frame], &OptionBag::new()),
            Err(FilterError::NotInitialized(FilterId::Passthrough))
        ));
    }

    #[test]
    fn initialize_is_idempotent() {
        let handle = handle();
        let format = FormatContext::rgba(4, 4);
        handle.initialize(&format, 3).unwrap();
        let pool = handle.pool().unwrap();
        handle.initialize(&format, 3).unwrap();
        assert!(handle.pool().unwrap().ptr_eq(&pool));
        assert_eq!(pool.stats().allocated, 3);
    }

    #[test]
    fn reset_clears_state() {
        let handle = handle();
        handle.initialize(&FormatContext::rgba(4, 4), 3).unwrap();
        handle.reset();
        assert!(!handle.is_initialized());
        assert!(handle.pool().is_none());
        assert!(handle.input_format().is_none());
    }

    #[test]
    fn execute_reinitializes_on_format_change() {
        let handle = handle();
        let small = FormatContext::rgba(2, 2);
        let large = FormatContext::rgba(8, 8);

        let frame = Frame::filled(small, &[5, 5, 5, 5]).unwrap();
        let out = handle.execute(&[frame.clone()], &small, 3, &OptionBag::new()).unwrap();
        assert!(out.shares_storage(&frame));
        let first_pool = handle.pool().unwrap();

        let frame = Frame::filled(large, &[5, 5, 5, 5]).unwrap();
        handle.execute(&[frame], &large, 3, &OptionBag::new()).unwrap();
        assert_eq!(handle.input_format(), Some(large));
        assert!(!handle.pool().unwrap().ptr_eq(&first_pool));
    }

    #[test]
    fn initialize_failure_leaves_filter_uninitialized() {
        let handle = FilterHandle::new(Box::new(Passthrough::new(BufferPoolManager::new(16))));
        assert!(handle.initialize(&FormatContext::rgba(32, 32), 3).is_err());
        assert!(!handle.is_initialized());
    }
}
