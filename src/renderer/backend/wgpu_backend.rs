//! wgpu implementation of [`RenderBackend`]

use std::num::NonZeroU64;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    AddressMode, CullMode, DepthCompare, DrawCall, DrawTextures, FramebufferDesc, FramebufferHandle,
    FramebufferInfo, MeshHandle, PassDesc, PassTarget, ProgramHandle, ProgramLayout, RenderBackend,
    SamplerType, TextureDesc, TextureDimension, TextureHandle, TextureInfo, check_completeness,
};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Vertex;
use crate::renderer::pool::ResourcePool;

/// Largest uniform block a program may declare
pub const MAX_UNIFORM_BLOCK_SIZE: u32 = 4096;

/// Size of one uniform arena buffer
const UNIFORM_CHUNK_SIZE: u64 = 256 * 1024;

struct GpuTexture {
    texture: wgpu::Texture,
    sample_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    info: TextureInfo,
}

struct GpuFramebuffer {
    color: Option<wgpu::TextureView>,
    depth: Option<wgpu::TextureView>,
    info: FramebufferInfo,
}

struct LinkedProgram {
    layout: ProgramLayout,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    linked: Option<LinkedProgram>,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    color_format: Option<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    depth_write: bool,
    depth_compare: DepthCompare,
    cull: CullMode,
    wireframe: bool,
    color_write: bool,
}

/// One dynamically-offset uniform buffer plus its CPU-side staging copy
struct UniformChunk {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    staging: Vec<u8>,
}

/// Per-frame bump allocator for uniform blocks.
///
/// Blocks are copied into staging memory during the frame and uploaded in
/// one `write_buffer` per chunk just before submit.
struct UniformArena {
    chunks: Vec<UniformChunk>,
    current: usize,
    alignment: u64,
}

impl UniformArena {
    fn new(alignment: u32) -> Self {
        Self {
            chunks: Vec::new(),
            current: 0,
            alignment: u64::from(alignment.max(16)),
        }
    }

    fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.staging.clear();
        }
        self.current = 0;
    }

    /// Stage a block, returning the chunk index and dynamic offset
    fn push(&mut self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout, bytes: &[u8]) -> (usize, u32) {
        loop {
            if self.current == self.chunks.len() {
                self.chunks.push(Self::new_chunk(device, layout, self.chunks.len()));
            }
            let chunk = &mut self.chunks[self.current];
            let offset = (chunk.staging.len() as u64).next_multiple_of(self.alignment);
            if offset + u64::from(MAX_UNIFORM_BLOCK_SIZE) <= UNIFORM_CHUNK_SIZE {
                chunk.staging.resize(offset as usize, 0);
                chunk.staging.extend_from_slice(bytes);
                return (self.current, offset as u32);
            }
            self.current += 1;
        }
    }

    fn new_chunk(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, index: usize) -> UniformChunk {
        log::debug!("Allocating uniform chunk {}", index);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Arena"),
            size: UNIFORM_CHUNK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Arena Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(u64::from(MAX_UNIFORM_BLOCK_SIZE)),
                }),
            }],
        });
        UniformChunk {
            buffer,
            bind_group,
            staging: Vec::with_capacity(UNIFORM_CHUNK_SIZE as usize),
        }
    }

    fn upload(&self, queue: &wgpu::Queue) {
        for chunk in &self.chunks[..self.chunks.len().min(self.current + 1)] {
            if !chunk.staging.is_empty() {
                queue.write_buffer(&chunk.buffer, 0, &chunk.staging);
            }
        }
    }
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

struct ActivePass {
    pass: wgpu::RenderPass<'static>,
    desc: PassDesc,
    color_format: Option<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
}

/// Backend driving a wgpu device and window surface
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    wireframe: bool,
    uniform_layout: wgpu::BindGroupLayout,
    arena: UniformArena,
    textures: ResourcePool<GpuTexture>,
    framebuffers: ResourcePool<GpuFramebuffer>,
    programs: ResourcePool<GpuProgram>,
    meshes: ResourcePool<GpuMesh>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_groups: FxHashMap<(ProgramHandle, DrawTextures), wgpu::BindGroup>,
    frame: Option<Frame>,
    active: Option<ActivePass>,
}

impl WgpuBackend {
    /// Create the device and configure the window surface
    pub async fn new(window: Arc<Window>, vsync: bool) -> RenderResult<Self> {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Device(format!("failed to create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::Device("no compatible GPU adapter".into()))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let wireframe = adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE);
        let required_features = if wireframe {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Lantern Device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Device(format!("failed to create device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Device("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Block Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        log::info!(
            "Surface {}x{} {:?}, wireframe {}",
            size.0,
            size.1,
            surface_format,
            if wireframe { "supported" } else { "unsupported" }
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            wireframe,
            uniform_layout,
            arena: UniformArena::new(alignment),
            textures: ResourcePool::new(),
            framebuffers: ResourcePool::new(),
            programs: ResourcePool::new(),
            meshes: ResourcePool::new(),
            pipelines: FxHashMap::default(),
            texture_groups: FxHashMap::default(),
            frame: None,
            active: None,
        })
    }

    /// Run `f` inside a validation error scope
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    fn attachment_view(texture: &GpuTexture, layer: u32) -> wgpu::TextureView {
        texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Attachment View"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    fn build_pipeline(&self, key: &PipelineKey) -> RenderResult<wgpu::RenderPipeline> {
        let program = self.programs.get(key.program.0).ok_or_else(ProgramHandle::unknown)?;
        let linked = program
            .linked
            .as_ref()
            .ok_or_else(|| RenderError::ProgramNotLinked(program.label.clone()))?;

        log::debug!("Building pipeline for `{}`", program.label);

        let write_mask = if key.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        let targets = [key.color_format.map(|format| wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask,
        })];
        let color_targets: &[Option<wgpu::ColorTargetState>] = if key.color_format.is_some() { &targets } else { &[] };

        let (pipeline, error) = self.scoped(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&linked.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    targets: color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: match key.cull {
                        CullMode::None => None,
                        CullMode::Back => Some(wgpu::Face::Back),
                        CullMode::Front => Some(wgpu::Face::Front),
                    },
                    polygon_mode: if key.wireframe {
                        wgpu::PolygonMode::Line
                    } else {
                        wgpu::PolygonMode::Fill
                    },
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: key.depth_write,
                    depth_compare: match key.depth_compare {
                        DepthCompare::Less => wgpu::CompareFunction::Less,
                        DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
                        DepthCompare::Always => wgpu::CompareFunction::Always,
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });

        match error {
            Some(err) => Err(RenderError::validation(&program.label, err.to_string())),
            None => Ok(pipeline),
        }
    }

    fn texture_group(&mut self, program: ProgramHandle, textures: &[TextureHandle]) -> RenderResult<()> {
        let key = (program, DrawTextures::from_slice(textures));
        if self.texture_groups.contains_key(&key) {
            return Ok(());
        }
        let record = self.programs.get(program.0).ok_or_else(ProgramHandle::unknown)?;
        let linked = record
            .linked
            .as_ref()
            .ok_or_else(|| RenderError::ProgramNotLinked(record.label.clone()))?;
        let Some(layout) = linked.texture_layout.as_ref() else {
            return Ok(());
        };

        let mut entries = Vec::with_capacity(textures.len() * 2);
        for (k, (handle, sampler)) in textures.iter().zip(&linked.layout.samplers).enumerate() {
            let texture = self.textures.get(handle.0).ok_or_else(TextureHandle::unknown)?;
            if texture.info.kind() != sampler.accepts() {
                return Err(RenderError::validation(
                    &record.label,
                    format!(
                        "sampler {} expects a {}, got a {}",
                        k,
                        sampler.accepts().name(),
                        texture.info.kind().name()
                    ),
                ));
            }
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * k as u32,
                resource: wgpu::BindingResource::TextureView(&texture.sample_view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * k as u32 + 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&record.label),
            layout,
            entries: &entries,
        });
        self.texture_groups.insert(key, group);
        Ok(())
    }

    fn record_draw(&mut self, active: &mut ActivePass, call: &DrawCall<'_>) -> RenderResult<()> {
        let program = self.programs.get(call.program.0).ok_or_else(ProgramHandle::unknown)?;
        let linked = program
            .linked
            .as_ref()
            .ok_or_else(|| RenderError::ProgramNotLinked(program.label.clone()))?;
        if call.uniforms.len() != linked.layout.uniform_size as usize {
            return Err(RenderError::PassState(format!(
                "`{}` uniform block is {} bytes, expected {}",
                program.label,
                call.uniforms.len(),
                linked.layout.uniform_size
            )));
        }
        if call.textures.len() != linked.layout.samplers.len() {
            return Err(RenderError::PassState(format!(
                "`{}` got {} textures for {} samplers",
                program.label,
                call.textures.len(),
                linked.layout.samplers.len()
            )));
        }

        let desc = &active.desc;
        let (depth_write, depth_compare) = match (desc.depth_test, linked.layout.depth) {
            (false, _) => (desc.depth_write, DepthCompare::Always),
            (true, Some(state)) => (state.write && desc.depth_write, state.compare),
            (true, None) => (desc.depth_write, DepthCompare::Less),
        };
        let key = PipelineKey {
            program: call.program,
            color_format: active.color_format,
            depth_format: active.depth_format,
            depth_write,
            depth_compare,
            cull: desc.cull,
            wireframe: desc.wireframe && self.wireframe,
            color_write: desc.color_write,
        };
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.build_pipeline(&key)?;
            self.pipelines.insert(key, pipeline);
        }
        self.texture_group(call.program, call.textures)?;

        let mesh = self.meshes.get(call.mesh.0).ok_or_else(MeshHandle::unknown)?;
        let (chunk, offset) = self.arena.push(&self.device, &self.uniform_layout, call.uniforms);

        let pass = &mut active.pass;
        if let Some(pipeline) = self.pipelines.get(&key) {
            pass.set_pipeline(pipeline);
        }
        pass.set_bind_group(0, &self.arena.chunks[chunk].bind_group, &[offset]);
        if let Some(group) = self
            .texture_groups
            .get(&(call.program, DrawTextures::from_slice(call.textures)))
        {
            pass.set_bind_group(1, group, &[]);
        }
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::InvalidSize {
                label: desc.label.clone(),
                width: desc.width,
                height: desc.height,
            });
        }

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let wgpu_desc = wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.dimension.layers(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage,
            view_formats: &[],
        };

        let texture = match data {
            Some(bytes) => {
                if bytes.len() != desc.data_len() {
                    return Err(RenderError::TextureLoad(format!(
                        "`{}` expects {} bytes, got {}",
                        desc.label,
                        desc.data_len(),
                        bytes.len()
                    )));
                }
                self.device
                    .create_texture_with_data(&self.queue, &wgpu_desc, wgpu::util::TextureDataOrder::LayerMajor, bytes)
            }
            None => self.device.create_texture(&wgpu_desc),
        };

        let depth = desc.format.is_depth();
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            aspect: if depth {
                wgpu::TextureAspect::DepthOnly
            } else {
                wgpu::TextureAspect::All
            },
            ..Default::default()
        });

        let address_mode = match desc.address_mode {
            AddressMode::Repeat if !depth => wgpu::AddressMode::Repeat,
            _ => wgpu::AddressMode::ClampToEdge,
        };
        let filter = if depth {
            wgpu::FilterMode::Nearest
        } else {
            wgpu::FilterMode::Linear
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let handle = TextureHandle(self.textures.insert(GpuTexture {
            texture,
            sample_view,
            sampler,
            info: desc.info(),
        }));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> RenderResult<()> {
        let gpu = self.textures.remove(texture.0).ok_or_else(TextureHandle::unknown)?;
        self.texture_groups.retain(|(_, textures), _| !textures.contains(&texture));
        gpu.texture.destroy();
        Ok(())
    }

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        self.textures.get(texture.0).map(|t| t.info)
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle> {
        let info = check_completeness(desc, |t| self.textures.get(t.0).map(|g| g.info))?;
        let view = |attachment: Option<&super::Attachment>| {
            attachment.and_then(|a| {
                self.textures
                    .get(a.texture.0)
                    .map(|t| Self::attachment_view(t, a.layer))
            })
        };
        let framebuffer = GpuFramebuffer {
            color: view(desc.color.as_ref()),
            depth: view(desc.depth.as_ref()),
            info,
        };
        log::debug!("Framebuffer `{}` complete at {}x{}", desc.label, info.width, info.height);
        Ok(FramebufferHandle(self.framebuffers.insert(framebuffer)))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> RenderResult<()> {
        self.framebuffers
            .remove(framebuffer.0)
            .map(drop)
            .ok_or_else(FramebufferHandle::unknown)
    }

    fn compile_program(&mut self, label: &str, source: &str) -> RenderResult<ProgramHandle> {
        let (module, error) = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(err) = error {
            return Err(RenderError::ShaderCompile {
                label: label.to_string(),
                message: err.to_string(),
            });
        }
        Ok(ProgramHandle(self.programs.insert(GpuProgram {
            label: label.to_string(),
            module,
            linked: None,
        })))
    }

    fn link_program(&mut self, program: ProgramHandle, layout: &ProgramLayout) -> RenderResult<()> {
        let record = self.programs.get(program.0).ok_or_else(ProgramHandle::unknown)?;
        if record.linked.is_some() {
            return Err(RenderError::AlreadyLinked(record.label.clone()));
        }
        if layout.uniform_size > MAX_UNIFORM_BLOCK_SIZE {
            return Err(RenderError::validation(
                &record.label,
                format!(
                    "uniform block of {} bytes exceeds {}",
                    layout.uniform_size, MAX_UNIFORM_BLOCK_SIZE
                ),
            ));
        }

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::with_capacity(layout.samplers.len() * 2);
        for (k, sampler) in layout.samplers.iter().enumerate() {
            let (sample_type, view_dimension, sampler_binding) = match sampler {
                SamplerType::Texture2d => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                    wgpu::SamplerBindingType::Filtering,
                ),
                SamplerType::TextureCube => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                    wgpu::SamplerBindingType::Filtering,
                ),
                SamplerType::Depth2d => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2,
                    wgpu::SamplerBindingType::NonFiltering,
                ),
                SamplerType::DepthCube => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::Cube,
                    wgpu::SamplerBindingType::NonFiltering,
                ),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 * k as u32,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 * k as u32 + 1,
                visibility,
                ty: wgpu::BindingType::Sampler(sampler_binding),
                count: None,
            });
        }

        let texture_layout = (!entries.is_empty()).then(|| {
            self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&record.label),
                entries: &entries,
            })
        });
        let mut groups = vec![&self.uniform_layout];
        groups.extend(texture_layout.as_ref());
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&record.label),
            bind_group_layouts: &groups,
            push_constant_ranges: &[],
        });

        let linked = LinkedProgram {
            layout: layout.clone(),
            texture_layout,
            pipeline_layout,
        };
        if let Some(record) = self.programs.get_mut(program.0) {
            record.linked = Some(linked);
        }
        Ok(())
    }

    fn destroy_program(&mut self, program: ProgramHandle) -> RenderResult<()> {
        self.programs.remove(program.0).ok_or_else(ProgramHandle::unknown)?;
        self.pipelines.retain(|key, _| key.program != program);
        self.texture_groups.retain(|(p, _), _| *p != program);
        Ok(())
    }

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshHandle> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::Device(format!("mesh `{label}` has no geometry")));
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(MeshHandle(self.meshes.insert(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()> {
        let gpu = self.meshes.remove(mesh.0).ok_or_else(MeshHandle::unknown)?;
        gpu.vertex_buffer.destroy();
        gpu.index_buffer.destroy();
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            log::debug!("Resized surface to {}x{}", width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn supports_wireframe(&self) -> bool {
        self.wireframe
    }

    fn begin_frame(&mut self) -> RenderResult<bool> {
        if self.frame.is_some() {
            return Err(RenderError::PassState("frame already open".into()));
        }
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(false);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timed out, skipping frame");
                return Ok(false);
            }
            Err(e) => return Err(RenderError::Device(format!("surface error: {e:?}"))),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.arena.reset();
        self.frame = Some(Frame { output, view, encoder });
        Ok(true)
    }

    fn begin_pass(&mut self, desc: &PassDesc) -> RenderResult<()> {
        if self.active.is_some() {
            return Err(RenderError::PassState(format!(
                "`{}` begun while another pass is open",
                desc.label
            )));
        }
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| RenderError::PassState(format!("`{}` begun outside a frame", desc.label)))?;

        let (color_view, depth_view, color_format, depth_format, width, height) = match desc.target {
            PassTarget::Screen => (
                Some(&frame.view),
                None,
                Some(self.config.format),
                None,
                self.config.width,
                self.config.height,
            ),
            PassTarget::Framebuffer(handle) => {
                let fb = self.framebuffers.get(handle.0).ok_or_else(FramebufferHandle::unknown)?;
                (
                    fb.color.as_ref(),
                    fb.depth.as_ref(),
                    fb.info.color_format.map(|f| f.to_wgpu()),
                    fb.info.depth_format.map(|f| f.to_wgpu()),
                    fb.info.width,
                    fb.info.height,
                )
            }
        };

        let vp = desc.viewport;
        if vp.x + vp.width > width || vp.y + vp.height > height || vp.width == 0 || vp.height == 0 {
            return Err(RenderError::PassState(format!(
                "`{}` viewport {}x{} does not fit its {}x{} target",
                desc.label, vp.width, vp.height, width, height
            )));
        }
        if desc.depth_test && depth_view.is_none() {
            return Err(RenderError::PassState(format!(
                "`{}` tests depth but its target has no depth attachment",
                desc.label
            )));
        }

        let color_load = match desc.clear_color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = desc.clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);

        let color_attachment = color_view.map(|view| wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
        });
        let mut pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        pass.set_viewport(vp.x as f32, vp.y as f32, vp.width as f32, vp.height as f32, 0.0, 1.0);

        self.active = Some(ActivePass {
            pass,
            desc: desc.clone(),
            color_format: if color_view.is_some() { color_format } else { None },
            depth_format,
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        let mut active = self
            .active
            .take()
            .ok_or_else(|| RenderError::PassState("draw outside a pass".into()))?;
        let result = self.record_draw(&mut active, call);
        self.active = Some(active);
        result
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        self.active
            .take()
            .map(drop)
            .ok_or_else(|| RenderError::PassState("end_pass without an open pass".into()))
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if self.active.is_some() {
            return Err(RenderError::PassState("end_frame with a pass still open".into()));
        }
        let frame = self
            .frame
            .take()
            .ok_or_else(|| RenderError::PassState("end_frame outside a frame".into()))?;
        self.arena.upload(&self.queue);
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.output.present();
        Ok(())
    }
}
