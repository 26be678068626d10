//! # GPU Compute
//!
//! Shared wgpu device, cached compute kernels and the deferred readback
//! that lets a GPU filter return its frame before the device has finished.
//!
//! ```text
//! upload ─► dispatch ─► copy to staging ─► submit ─► Frame (pending)
//!                                                        │ pixels()/wait()
//!                                                        ▼
//!                                                 poll + map + copy rows
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, info, warn};

use crate::error::{FilterError, GpuError, Result};
use crate::format::FormatContext;
use crate::frame::FrameCompletion;

pub mod channel_remap;

/// A compiled compute pipeline plus the layout its bind groups use.
pub struct ComputeKernel {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub workgroup: [u32; 2],
}

/// Device, queue and kernel cache shared by every GPU filter.
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    kernels: Mutex<HashMap<&'static str, Arc<ComputeKernel>>>,
    lost: AtomicBool,
}

impl GpuContext {
    /// Requests a high-performance adapter and device.
    pub async fn new() -> std::result::Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_name = adapter.get_info().name;
        info!("Using GPU: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    label: Some("prism_device"),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self::from_parts(Arc::new(device), Arc::new(queue), adapter_name))
    }

    pub fn blocking() -> std::result::Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }

    /// Wraps a device the host application already owns.
    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, adapter_name: String) -> Self {
        Self {
            device,
            queue,
            adapter_name,
            kernels: Mutex::new(HashMap::new()),
            lost: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Flags the device as lost. Filters fail with [`GpuError::Lost`] and
    /// drop their resources until a new context is supplied.
    pub fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            warn!("GPU device {} marked lost", self.adapter_name);
            self.kernels.lock().clear();
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> std::result::Result<(), GpuError> {
        if self.is_lost() {
            return Err(GpuError::Lost);
        }
        Ok(())
    }

    /// Compiles `wgsl` once per label. The source's `WG_X`/`WG_Y`
    /// placeholders are replaced with a workgroup size the device supports.
    pub fn kernel(
        &self,
        label: &'static str,
        wgsl: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> std::result::Result<Arc<ComputeKernel>, GpuError> {
        self.ensure_live()?;
        if let Some(kernel) = self.kernels.lock().get(label) {
            return Ok(kernel.clone());
        }

        let workgroup = workgroup_size(&self.device.limits())?;
        let source = wgsl
            .replace("WG_X", &workgroup[0].to_string())
            .replace("WG_Y", &workgroup[1].to_string());

        let kernel = self.scoped(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            ComputeKernel {
                pipeline,
                bind_group_layout,
                workgroup,
            }
        })?;

        debug!("Compiled kernel {} ({}x{})", label, workgroup[0], workgroup[1]);
        let kernel = Arc::new(kernel);
        self.kernels.lock().insert(label, kernel.clone());
        Ok(kernel)
    }

    /// Runs `f` inside validation and out-of-memory error scopes.
    pub fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> std::result::Result<T, GpuError> {
        self.ensure_live()?;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(err) => Err(err.into()),
            None => Ok(value),
        }
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_name)
            .field("lost", &self.is_lost())
            .finish()
    }
}

/// Largest square workgroup of 16x16 or 8x8 the device accepts.
pub fn workgroup_size(limits: &wgpu::Limits) -> std::result::Result<[u32; 2], GpuError> {
    for side in [16u32, 8] {
        if side * side <= limits.max_compute_invocations_per_workgroup
            && side <= limits.max_compute_workgroup_size_x
            && side <= limits.max_compute_workgroup_size_y
        {
            return Ok([side, side]);
        }
    }
    Err(GpuError::WorkgroupTooLarge {
        requested: 64,
        limit: limits.max_compute_invocations_per_workgroup,
    })
}

/// Rejects frames larger than the device's 2D texture limit.
pub fn ensure_texture_fits(format: &FormatContext, limits: &wgpu::Limits) -> Result<()> {
    let max = limits.max_texture_dimension_2d;
    if format.width > max || format.height > max {
        return Err(FilterError::InvalidFormat(format!(
            "{}x{} exceeds the device texture limit of {}",
            format.width, format.height, max
        )));
    }
    Ok(())
}

/// Workgroups needed to cover a `width` x `height` grid.
pub fn dispatch_grid(width: u32, height: u32, workgroup: [u32; 2]) -> (u32, u32) {
    (width.div_ceil(workgroup[0]), height.div_ceil(workgroup[1]))
}

/// Row pitch satisfying the texture-to-buffer copy alignment.
pub fn padded_row_bytes(row_bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    row_bytes.div_ceil(align) * align
}

// ============================================================================
// Staging Buffers
// ============================================================================

/// Recycled MAP_READ buffers of one size.
pub(crate) struct StagingRing {
    size: u64,
    free: Mutex<Vec<wgpu::Buffer>>,
}

impl StagingRing {
    pub(crate) fn new(device: &wgpu::Device, size: u64, count: usize) -> Self {
        let free = (0..count).map(|_| Self::allocate(device, size)).collect();
        Self {
            size,
            free: Mutex::new(free),
        }
    }

    fn allocate(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub(crate) fn take(&self, device: &wgpu::Device) -> wgpu::Buffer {
        if let Some(buffer) = self.free.lock().pop() {
            return buffer;
        }
        debug!("Staging ring empty, allocating {} bytes", self.size);
        Self::allocate(device, self.size)
    }

    pub(crate) fn give(&self, buffer: wgpu::Buffer) {
        self.free.lock().push(buffer);
    }

    pub(crate) fn available(&self) -> usize {
        self.free.lock().len()
    }
}

// ============================================================================
// Readback
// ============================================================================

type MapResult = std::result::Result<(), wgpu::BufferAsyncError>;

/// Copies a submitted kernel's output out of a staging buffer on demand.
pub(crate) struct GpuReadback {
    device: Arc<wgpu::Device>,
    ring: Arc<StagingRing>,
    staging: Option<wgpu::Buffer>,
    row_bytes: usize,
    padded_row_bytes: usize,
    rows: usize,
    pending: Mutex<Option<mpsc::Receiver<MapResult>>>,
    done: AtomicBool,
}

impl GpuReadback {
    /// Starts mapping `staging`. Call after the copy into it was submitted.
    pub(crate) fn start(
        device: Arc<wgpu::Device>,
        ring: Arc<StagingRing>,
        staging: wgpu::Buffer,
        row_bytes: usize,
        padded_row_bytes: usize,
        rows: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        Self {
            device,
            ring,
            staging: Some(staging),
            row_bytes,
            padded_row_bytes,
            rows,
            pending: Mutex::new(Some(rx)),
            done: AtomicBool::new(false),
        }
    }
}

impl FrameCompletion for GpuReadback {
    fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn resolve(&self, dest: &mut [u8]) -> Result<()> {
        let mut pending = self.pending.lock();
        if self.done.load(Ordering::Acquire) {
            return Ok(());
        }
        let rx = pending
            .take()
            .ok_or_else(|| GpuError::Readback("previous readback attempt failed".into()))?;
        let staging = self
            .staging
            .as_ref()
            .ok_or_else(|| GpuError::Readback("staging buffer released".into()))?;

        let _ = self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(GpuError::Readback(err.to_string()).into()),
            Err(_) => return Err(GpuError::Lost.into()),
        }

        {
            let data = staging.slice(..).get_mapped_range();
            for (src, out) in data
                .chunks(self.padded_row_bytes)
                .zip(dest.chunks_mut(self.row_bytes))
                .take(self.rows)
            {
                out.copy_from_slice(&src[..self.row_bytes]);
            }
        }
        staging.unmap();
        self.done.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for GpuReadback {
    fn drop(&mut self) {
        // Buffers still mapping are not safe to hand out again.
        if self.done.load(Ordering::Acquire) {
            if let Some(staging) = self.staging.take() {
                self.ring.give(staging);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_prefers_16x16() {
        assert_eq!(workgroup_size(&wgpu::Limits::default()).unwrap(), [16, 16]);
    }

    #[test]
    fn workgroup_falls_back_to_8x8() {
        let limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 128,
            ..wgpu::Limits::default()
        };
        assert_eq!(workgroup_size(&limits).unwrap(), [8, 8]);
    }

    #[test]
    fn tiny_devices_are_rejected() {
        let limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 32,
            ..wgpu::Limits::default()
        };
        assert!(matches!(
            workgroup_size(&limits),
            Err(GpuError::WorkgroupTooLarge { limit: 32, .. })
        ));
    }

    #[test]
    fn oversized_frames_fail_before_texture_creation() {
        let limits = wgpu::Limits::downlevel_defaults();
        let uhd = FormatContext::rgba(3840, 2160);
        assert!(matches!(
            ensure_texture_fits(&uhd, &limits),
            Err(FilterError::InvalidFormat(_))
        ));
        assert!(ensure_texture_fits(&FormatContext::rgba(2048, 2048), &limits).is_ok());
        assert!(ensure_texture_fits(&uhd, &wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(dispatch_grid(1920, 1080, [16, 16]), (120, 68));
        assert_eq!(dispatch_grid(1, 1, [8, 8]), (1, 1));
    }

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_row_bytes(8), 256);
        assert_eq!(padded_row_bytes(256), 256);
        assert_eq!(padded_row_bytes(1920 * 4), 7680);
    }
}
