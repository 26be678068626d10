//! Dispatcher behavior end to end: selection, lifecycle, pooling and
//! multi-frame input checks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use prism_core::{
    BufferPoolManager, ColorSpace, Filter, FilterError, FilterId, FilterPipeline, FilterRegistry,
    FilterState, FormatContext, Frame, FrameBufferPool, GpuError, MemorySettings, OptionBag,
    OptionValue, OptionsResolver, PipelineConfig, PixelLayout, Result,
};

#[derive(Default)]
struct Counters {
    initializations: AtomicUsize,
    resets: AtomicUsize,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// Returned once by the next `run`.
    fail_with: Mutex<Option<GpuError>>,
}

/// Returns its input and records every lifecycle call.
struct Instrumented {
    id: FilterId,
    pools: BufferPoolManager,
    state: FilterState,
    counters: Arc<Counters>,
}

impl Instrumented {
    fn new(id: FilterId, counters: Arc<Counters>) -> Self {
        Self {
            id,
            pools: BufferPoolManager::default(),
            state: FilterState::default(),
            counters,
        }
    }
}

impl Filter for Instrumented {
    fn id(&self) -> FilterId {
        self.id
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn initialize(&mut self, format: &FormatContext, min_buffers: usize) -> Result<()> {
        if self.state.initialize(&self.pools, format, min_buffers)? {
            self.counters.initializations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        self.state.clear();
    }

    fn run(
        &mut self,
        frames: &[Frame],
        _pool: &FrameBufferPool,
        _color_space: ColorSpace,
        _options: &OptionBag,
    ) -> Result<Frame> {
        if let Some(err) = self.counters.fail_with.lock().take() {
            return Err(err.into());
        }
        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        Ok(frames[0].clone())
    }
}

fn instrumented_pipeline(id: FilterId) -> (FilterPipeline, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let registry = FilterRegistry::new(BufferPoolManager::default(), None);
    registry
        .register(Box::new(Instrumented::new(id, counters.clone())))
        .unwrap();
    let pipeline = FilterPipeline::new(
        Arc::new(registry),
        OptionsResolver::default(),
        PipelineConfig::default(),
    );
    (pipeline, counters)
}

fn solid(format: FormatContext, value: u8) -> Frame {
    Frame::new(format, vec![value; format.byte_len().unwrap()]).unwrap()
}

#[test]
fn passthrough_returns_input_unchanged() {
    let pipeline = FilterPipeline::with_defaults();
    let frame = solid(FormatContext::rgba(3, 3), 42);

    let out = pipeline.run_frame(&frame, None).unwrap();
    assert!(out.shares_storage(&frame));

    let out = pipeline.run_frame(&frame, Some(FilterId::Passthrough)).unwrap();
    assert!(out.shares_storage(&frame));
    assert_eq!(out.to_vec().unwrap(), vec![42; 36]);
}

#[test]
fn outputs_match_input_geometry() {
    let pipeline = FilterPipeline::with_defaults();
    for layout in [PixelLayout::Rgba8, PixelLayout::Bgra8, PixelLayout::Gray8] {
        let format = FormatContext::new(5, 3, layout, ColorSpace::DisplayP3);
        let a = solid(format, 90);
        let b = solid(format, 200);

        for id in FilterId::ALL {
            if id.is_gpu_kernel() {
                continue;
            }
            let out = if id.is_multi_frame() {
                pipeline.run_frames(&[a.clone(), b.clone()], Some(id))
            } else {
                pipeline.run_frame(&a, Some(id))
            }
            .unwrap();
            assert_eq!(out.format(), format, "{} on {}", id, layout);
            assert_eq!(out.pixels().unwrap().len(), format.byte_len().unwrap());
        }
    }
}

#[test]
fn initialize_twice_keeps_pool() {
    let pipeline = FilterPipeline::with_defaults();
    let handle = pipeline.registry().lookup(FilterId::Emboss).unwrap();
    let format = FormatContext::rgba(6, 6);

    handle.initialize(&format, 3).unwrap();
    let pool = handle.pool().unwrap();
    handle.initialize(&format, 3).unwrap();
    assert!(handle.pool().unwrap().ptr_eq(&pool));

    pipeline.run_frame(&solid(format, 1), Some(FilterId::Emboss)).unwrap();
    assert!(handle.pool().unwrap().ptr_eq(&pool));
    assert_eq!(pool.stats().allocated, 3);
}

#[test]
fn format_change_reinitializes_once() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Sepia);
    pipeline.select_filter(FilterId::Sepia);

    let small = solid(FormatContext::rgba(2, 2), 0);
    let large = solid(FormatContext::rgba(4, 4), 0);

    pipeline.run_frame(&small, None).unwrap();
    pipeline.run_frame(&small, None).unwrap();
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 1);
    assert_eq!(counters.resets.load(Ordering::SeqCst), 0);

    pipeline.run_frame(&large, None).unwrap();
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 2);
    assert_eq!(counters.resets.load(Ordering::SeqCst), 1);
    assert_eq!(counters.runs.load(Ordering::SeqCst), 3);
    assert_eq!(
        pipeline.registry().lookup(FilterId::Sepia).unwrap().input_format(),
        Some(FormatContext::rgba(4, 4))
    );
}

#[test]
fn color_space_change_reinitializes() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Grayscale);
    let srgb = FormatContext::rgba(2, 2);
    let mut p3 = srgb;
    p3.color_space = ColorSpace::DisplayP3;

    pipeline.run_frame(&solid(srgb, 0), Some(FilterId::Grayscale)).unwrap();
    pipeline.run_frame(&solid(p3, 0), Some(FilterId::Grayscale)).unwrap();
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 2);
}

#[test]
fn heterogeneous_inputs_rejected_before_initialize() {
    let pipeline = FilterPipeline::with_defaults();
    let a = solid(FormatContext::rgba(4, 4), 10);
    let b = solid(FormatContext::rgba(4, 5), 10);

    let err = pipeline
        .run_frames(&[a, b], Some(FilterId::Difference))
        .unwrap_err();
    assert!(matches!(
        err,
        FilterError::HeterogeneousInputs { expected, found }
            if expected == FormatContext::rgba(4, 4) && found == FormatContext::rgba(4, 5)
    ));

    let handle = pipeline.registry().lookup(FilterId::Difference).unwrap();
    assert!(!handle.is_initialized());
    assert!(handle.pool().is_none());
}

#[test]
fn layout_mismatch_is_heterogeneous() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Lighten);
    let a = solid(FormatContext::rgba(2, 2), 0);
    let b = solid(FormatContext::new(2, 2, PixelLayout::Bgra8, ColorSpace::Srgb), 0);

    assert!(pipeline.run_frames(&[a, b], Some(FilterId::Lighten)).is_err());
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 0);
}

#[test]
fn runs_on_one_instance_never_overlap() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Vignette);
    let frame = solid(FormatContext::rgba(2, 2), 7);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5 {
                    pipeline.run_frame(&frame, Some(FilterId::Vignette)).unwrap();
                }
            });
        }
    });

    assert_eq!(counters.runs.load(Ordering::SeqCst), 20);
    assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 1);
}

#[test]
fn invert_turns_white_black() {
    let pipeline = FilterPipeline::with_defaults();
    pipeline.select_filter(FilterId::Invert);

    let white = Frame::filled(FormatContext::rgba(2, 2), &[255, 255, 255, 255]).unwrap();
    let out = pipeline.run_frame(&white, None).unwrap();

    assert_eq!(out.width(), 2);
    assert_eq!(out.height(), 2);
    assert_eq!(out.to_vec().unwrap(), [0, 0, 0, 255].repeat(4));
    assert!(!out.shares_storage(&white));
}

#[test]
fn unknown_filter_is_reported() {
    let registry = Arc::new(FilterRegistry::new(BufferPoolManager::default(), None));
    assert!(registry.lookup(FilterId::Invert).is_none());

    let pipeline = FilterPipeline::new(registry, OptionsResolver::default(), PipelineConfig::default());
    let frame = solid(FormatContext::rgba(2, 2), 0);
    assert!(matches!(
        pipeline.run_frame(&frame, Some(FilterId::Invert)),
        Err(FilterError::UnknownFilter(FilterId::Invert))
    ));
}

#[test]
fn fourth_outstanding_buffer_is_refused() {
    let manager = BufferPoolManager::default();
    let pool = manager.create_pool(&FormatContext::rgba(8, 8), 3).unwrap();
    manager.prewarm(&pool, 3).unwrap();

    let held: Vec<Frame> = (0..3).map(|_| manager.acquire(&pool).unwrap()).collect();
    assert!(matches!(
        manager.acquire(&pool),
        Err(FilterError::PoolExhausted { threshold: 3 })
    ));
    drop(held);
    assert!(manager.acquire(&pool).is_ok());
}

#[test]
fn dispatcher_surfaces_pool_exhaustion() {
    let pipeline = FilterPipeline::with_defaults();
    pipeline.select_filter(FilterId::Invert);
    let frame = solid(FormatContext::rgba(4, 4), 128);

    let held: Vec<Frame> = (0..3).map(|_| pipeline.run_frame(&frame, None).unwrap()).collect();
    let err = pipeline.run_frame(&frame, None).unwrap_err();
    assert!(matches!(err, FilterError::PoolExhausted { .. }));
    assert!(err.is_transient());

    drop(held);
    assert!(pipeline.run_frame(&frame, None).is_ok());
}

#[test]
fn settings_reach_the_filter() {
    let settings = Arc::new(MemorySettings::new());
    settings.set("brightness.amount", OptionValue::Float(-1.0));
    let config = PipelineConfig::default();
    let registry = Arc::new(FilterRegistry::builtin(config.pool_manager(), None));
    let pipeline = FilterPipeline::new(registry, OptionsResolver::new(settings.clone()), config);

    let frame = solid(FormatContext::rgba(2, 2), 200);
    let out = pipeline.run_frame(&frame, Some(FilterId::Brightness)).unwrap();
    assert_eq!(out.to_vec().unwrap(), [0, 0, 0, 200].repeat(4));

    settings.set("brightness.amount", OptionValue::Bool(true));
    let out = pipeline.run_frame(&frame, Some(FilterId::Brightness)).unwrap();
    assert_eq!(out.to_vec().unwrap(), vec![200; 16]);
}

#[test]
fn gpu_filter_without_device_fails_cleanly() {
    let pipeline = FilterPipeline::with_defaults();
    let frame = solid(FormatContext::rgba(4, 4), 0);
    assert!(matches!(
        pipeline.run_frame(&frame, Some(FilterId::ChannelRemap)),
        Err(FilterError::Device(GpuError::Unavailable))
    ));
    let handle = pipeline.registry().lookup(FilterId::ChannelRemap).unwrap();
    assert!(!handle.is_initialized());
}

#[test]
fn device_loss_resets_the_filter() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Emboss);
    let handle = pipeline.registry().lookup(FilterId::Emboss).unwrap();
    let frame = solid(FormatContext::rgba(2, 2), 0);

    pipeline.run_frame(&frame, Some(FilterId::Emboss)).unwrap();
    *counters.fail_with.lock() = Some(GpuError::Lost);
    assert!(matches!(
        pipeline.run_frame(&frame, Some(FilterId::Emboss)),
        Err(FilterError::Device(GpuError::Lost))
    ));
    assert!(!handle.is_initialized());
    assert!(handle.pool().is_none());
    assert_eq!(counters.resets.load(Ordering::SeqCst), 1);

    pipeline.run_frame(&frame, Some(FilterId::Emboss)).unwrap();
    assert!(handle.is_initialized());
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 2);
}

#[test]
fn other_device_errors_keep_the_filter_initialized() {
    let (pipeline, counters) = instrumented_pipeline(FilterId::Laplacian);
    let handle = pipeline.registry().lookup(FilterId::Laplacian).unwrap();
    let frame = solid(FormatContext::rgba(2, 2), 0);

    *counters.fail_with.lock() = Some(GpuError::Validation("bad binding".into()));
    let err = pipeline
        .run_frame(&frame, Some(FilterId::Laplacian))
        .unwrap_err();
    assert!(matches!(err, FilterError::Device(GpuError::Validation(_))));
    assert!(err.is_transient());
    assert!(handle.is_initialized());
    let pool = handle.pool().unwrap();

    pipeline.run_frame(&frame, Some(FilterId::Laplacian)).unwrap();
    assert!(handle.pool().unwrap().ptr_eq(&pool));
    assert_eq!(counters.initializations.load(Ordering::SeqCst), 1);
    assert_eq!(counters.resets.load(Ordering::SeqCst), 0);
}
