//! Channel remap compute kernel.
//!
//! Routes, scales and optionally inverts each output channel from any input
//! channel. Parameters are logical (R, G, B, A); they are translated to the
//! frame's physical byte order before upload, so BGRA frames need no
//! swizzle pass.

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use tracing::info;

use super::{
    dispatch_grid, ensure_texture_fits, padded_row_bytes, ComputeKernel, GpuContext, GpuReadback,
    StagingRing,
};
use crate::catalog::params::ChannelRemapParams;
use crate::catalog::FilterId;
use crate::error::{FilterError, GpuError, Result};
use crate::filter::{Filter, FilterState};
use crate::format::{ColorSpace, FormatContext};
use crate::frame::Frame;
use crate::options::{FromOptions, OptionBag};
use crate::pool::{BufferPoolManager, FrameBufferPool};

/// Uniform record; layout matches `Params` in [`SHADER_CHANNEL_REMAP`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ChannelRemapUniform {
    pub sources: [u32; 4],
    pub invert: [u32; 4],
    pub gain: [f32; 4],
}

impl ChannelRemapUniform {
    /// Rewrites logical channel routing for a layout whose channel `c` is
    /// stored at byte `offsets[c]`.
    pub fn physical(params: &ChannelRemapParams, offsets: [usize; 4]) -> Self {
        let gains = params.gains();
        let mut uniform = Self::zeroed();
        for c in 0..4 {
            let slot = offsets[c];
            uniform.sources[slot] = offsets[params.sources[c].min(3) as usize] as u32;
            uniform.invert[slot] = params.invert[c] as u32;
            uniform.gain[slot] = gains[c];
        }
        uniform
    }
}

pub const SHADER_CHANNEL_REMAP: &str = r#"
struct Params {
    sources: vec4<u32>,
    invert: vec4<u32>,
    gain: vec4<f32>,
}

@group(0) @binding(0) var input_tex: texture_2d<f32>;
@group(0) @binding(1) var output_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<uniform> params: Params;

@compute @workgroup_size(WG_X, WG_Y, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let dims = textureDimensions(input_tex);
    if (id.x >= dims.x || id.y >= dims.y) {
        return;
    }

    let texel = textureLoad(input_tex, vec2<i32>(id.xy), 0);
    var out = vec4<f32>(0.0);
    for (var c = 0u; c < 4u; c = c + 1u) {
        var v = texel[params.sources[c]] * params.gain[c];
        if (params.invert[c] != 0u) {
            v = 1.0 - v;
        }
        out[c] = clamp(v, 0.0, 1.0);
    }

    textureStore(output_tex, vec2<i32>(id.xy), out);
}
"#;

fn layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        // Input texture
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        // Output texture
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu::TextureFormat::Rgba8Unorm,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        // Parameters uniform
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ]
}

/// Per-format device resources.
struct RemapResources {
    kernel: Arc<ComputeKernel>,
    input: wgpu::Texture,
    output: wgpu::Texture,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    staging: Arc<StagingRing>,
    extent: wgpu::Extent3d,
    offsets: [usize; 4],
    row_bytes: u32,
    padded_row_bytes: u32,
}

impl RemapResources {
    fn create(
        gpu: &GpuContext,
        format: &FormatContext,
        offsets: [usize; 4],
        staging_buffers: usize,
    ) -> std::result::Result<Self, GpuError> {
        let kernel = gpu.kernel("channel_remap", SHADER_CHANNEL_REMAP, &layout_entries())?;

        let extent = wgpu::Extent3d {
            width: format.width,
            height: format.height,
            depth_or_array_layers: 1,
        };
        let row_bytes = format.width * 4;
        let padded = padded_row_bytes(row_bytes);

        gpu.scoped(|device| {
            let texture = |label, usage| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: extent,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage,
                    view_formats: &[],
                })
            };
            let input = texture(
                "remap_input",
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            let output = texture(
                "remap_output",
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            );

            let params = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("remap_params"),
                size: std::mem::size_of::<ChannelRemapUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let input_view = input.create_view(&wgpu::TextureViewDescriptor::default());
            let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("remap_bind_group"),
                layout: &kernel.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&input_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&output_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            });

            let staging = Arc::new(StagingRing::new(
                device,
                padded as u64 * format.height as u64,
                staging_buffers,
            ));

            Self {
                kernel: kernel.clone(),
                input,
                output,
                params,
                bind_group,
                staging,
                extent,
                offsets,
                row_bytes,
                padded_row_bytes: padded,
            }
        })
    }
}

/// GPU channel remap filter.
pub struct ChannelRemapFilter {
    pools: BufferPoolManager,
    gpu: Option<Arc<GpuContext>>,
    state: FilterState,
    resources: Option<RemapResources>,
}

impl ChannelRemapFilter {
    pub fn new(pools: BufferPoolManager, gpu: Option<Arc<GpuContext>>) -> Self {
        Self {
            pools,
            gpu,
            state: FilterState::default(),
            resources: None,
        }
    }

    fn context(&self) -> std::result::Result<&Arc<GpuContext>, GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::Unavailable)?;
        if gpu.is_lost() {
            return Err(GpuError::Lost);
        }
        Ok(gpu)
    }
}

impl Filter for ChannelRemapFilter {
    fn id(&self) -> FilterId {
        FilterId::ChannelRemap
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn initialize(&mut self, format: &FormatContext, min_buffers: usize) -> Result<()> {
        if self.state.is_initialized() {
            return Ok(());
        }
        let offsets = format
            .layout
            .channel_offsets()
            .ok_or(FilterError::UnsupportedLayout {
                filter: FilterId::ChannelRemap,
                layout: format.layout,
            })?;
        format.validate(self.pools.max_dimension())?;

        let gpu = self.context()?.clone();
        ensure_texture_fits(format, &gpu.device().limits())?;
        let resources = RemapResources::create(&gpu, format, offsets, min_buffers.max(1))?;
        self.state.initialize(&self.pools, format, min_buffers)?;
        self.resources = Some(resources);

        info!("Channel remap ready for {} on {}", format, gpu.adapter_name());
        Ok(())
    }

    fn reset(&mut self) {
        self.resources = None;
        self.state.clear();
    }

    fn run(
        &mut self,
        frames: &[Frame],
        pool: &FrameBufferPool,
        _color_space: ColorSpace,
        options: &OptionBag,
    ) -> Result<Frame> {
        let resources = match (&self.resources, self.state.is_initialized()) {
            (Some(resources), true) => resources,
            _ => return Err(FilterError::NotInitialized(FilterId::ChannelRemap)),
        };
        let gpu = self.context()?;
        let primary = frames.first().ok_or(FilterError::NoInputFrames)?;

        let params = ChannelRemapParams::from_options(options);
        let uniform = ChannelRemapUniform::physical(&params, resources.offsets);

        let output = pool.acquire()?;
        let pixels = primary.pixels()?;
        let staging = resources.staging.take(gpu.device());

        let submitted = gpu.scoped(|device| {
            let queue = gpu.queue();
            queue.write_buffer(&resources.params, 0, bytemuck::bytes_of(&uniform));
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &resources.input,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(resources.row_bytes),
                    rows_per_image: Some(resources.extent.height),
                },
                resources.extent,
            );

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("remap_encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("remap_pass"),
                    timestamp_writes: None,
                });
                let (x, y) = dispatch_grid(
                    resources.extent.width,
                    resources.extent.height,
                    resources.kernel.workgroup,
                );
                pass.set_pipeline(&resources.kernel.pipeline);
                pass.set_bind_group(0, &resources.bind_group, &[]);
                pass.dispatch_workgroups(x, y, 1);
            }

            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: &resources.output,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &staging,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(resources.padded_row_bytes),
                        rows_per_image: Some(resources.extent.height),
                    },
                },
                resources.extent,
            );

            queue.submit(Some(encoder.finish()));
        });
        drop(pixels);
        if let Err(err) = submitted {
            resources.staging.give(staging);
            return Err(err.into());
        }

        let readback = GpuReadback::start(
            gpu.device().clone(),
            resources.staging.clone(),
            staging,
            resources.row_bytes as usize,
            resources.padded_row_bytes as usize,
            resources.extent.height as usize,
        );
        Ok(output.with_completion(Arc::new(readback)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::recipes::recipe;
    use crate::format::PixelLayout;
    use crate::graph::Canvas;
    use crate::options::{OptionKey, OptionValue};

    #[test]
    fn uniform_is_three_vec4s() {
        assert_eq!(std::mem::size_of::<ChannelRemapUniform>(), 48);
    }

    #[test]
    fn rgba_routing_is_unchanged() {
        let params = ChannelRemapParams {
            sources: [2, 1, 0, 3],
            invert: [true, false, false, false],
            intensity: 0.5,
        };
        let uniform = ChannelRemapUniform::physical(&params, [0, 1, 2, 3]);
        assert_eq!(uniform.sources, [2, 1, 0, 3]);
        assert_eq!(uniform.invert, [1, 0, 0, 0]);
        assert_eq!(uniform.gain, [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn bgra_routing_is_translated() {
        // Red output takes green; in BGRA red lives at byte 2, green at 1.
        let params = ChannelRemapParams {
            sources: [1, 1, 2, 3],
            invert: [false, false, true, false],
            intensity: 1.0,
        };
        let uniform = ChannelRemapUniform::physical(&params, [2, 1, 0, 3]);
        assert_eq!(uniform.sources[2], 1);
        assert_eq!(uniform.sources[0], 0);
        assert_eq!(uniform.invert, [1, 0, 0, 0]);
    }

    #[test]
    fn without_device_initialize_reports_unavailable() {
        let mut filter = ChannelRemapFilter::new(BufferPoolManager::default(), None);
        assert!(matches!(
            filter.initialize(&FormatContext::rgba(4, 4), 3),
            Err(FilterError::Device(GpuError::Unavailable))
        ));
        assert!(!filter.state().is_initialized());
    }

    #[test]
    fn gray_frames_are_rejected() {
        let mut filter = ChannelRemapFilter::new(BufferPoolManager::default(), None);
        let gray = FormatContext::new(4, 4, PixelLayout::Gray8, ColorSpace::Srgb);
        assert!(matches!(
            filter.initialize(&gray, 3),
            Err(FilterError::UnsupportedLayout { .. })
        ));
    }

    struct FailedUpload;

    impl crate::frame::FrameCompletion for FailedUpload {
        fn is_complete(&self) -> bool {
            false
        }

        fn resolve(&self, _dest: &mut [u8]) -> Result<()> {
            Err(GpuError::Readback("upstream failed".into()).into())
        }
    }

    #[test]
    fn failed_run_keeps_staging_buffers() {
        let Ok(gpu) = GpuContext::blocking() else {
            eprintln!("skipping: no GPU adapter");
            return;
        };
        let format = FormatContext::rgba(8, 8);
        let mut filter = ChannelRemapFilter::new(BufferPoolManager::default(), Some(Arc::new(gpu)));
        filter.initialize(&format, 3).unwrap();
        let pool = filter.state().pool().cloned().unwrap();
        let ring = filter.resources.as_ref().unwrap().staging.clone();
        assert_eq!(ring.available(), 3);

        let broken = Frame::filled(format, &[0, 0, 0, 255])
            .unwrap()
            .with_completion(Arc::new(FailedUpload));
        for _ in 0..4 {
            assert!(filter
                .run(&[broken.clone()], &pool, ColorSpace::Srgb, &OptionBag::new())
                .is_err());
        }
        assert_eq!(ring.available(), 3);
    }

    #[test]
    fn gpu_output_matches_cpu_recipe() {
        let Ok(gpu) = GpuContext::blocking() else {
            eprintln!("skipping: no GPU adapter");
            return;
        };
        let gpu = Arc::new(gpu);

        for layout in [PixelLayout::Rgba8, PixelLayout::Bgra8] {
            let format = FormatContext::new(37, 5, layout, ColorSpace::Srgb);
            let bytes: Vec<u8> = (0..format.byte_len().unwrap()).map(|i| (i * 7 % 256) as u8).collect();
            let input = Frame::new(format, bytes.clone()).unwrap();

            let options = OptionBag::new()
                .with(OptionKey::RedSource, OptionValue::Int(2))
                .with(OptionKey::BlueSource, OptionValue::Int(0))
                .with(OptionKey::InvertGreen, OptionValue::Bool(true));

            let mut filter = ChannelRemapFilter::new(BufferPoolManager::default(), Some(gpu.clone()));
            filter.initialize(&format, 3).unwrap();
            let pool = filter.state().pool().cloned().unwrap();
            let output = filter.run(&[input], &pool, ColorSpace::Srgb, &options).unwrap();

            let mut canvas = Canvas::decode(&bytes, &format);
            recipe(FilterId::ChannelRemap)(&options, ColorSpace::Srgb).apply(&mut canvas, &[]);
            let mut expected = vec![0; bytes.len()];
            canvas.encode(&mut expected, layout, ColorSpace::Srgb.luma_coefficients());

            let actual = output.to_vec().unwrap();
            assert!(output.is_ready());
            for (a, e) in actual.iter().zip(&expected) {
                assert!(a.abs_diff(*e) <= 1, "{:?}: {} vs {}", layout, a, e);
            }
        }
    }
}
