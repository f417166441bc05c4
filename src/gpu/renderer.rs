//! wgpu implementation of [`GraphicsBackend`].
//!
//! Draws into a canvas surface in the browser, or into an offscreen texture
//! that the CLI reads back into PNG frames.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::mesh::{MeshData, PointVertex};
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::gpu::{FrameDescription, GraphicsBackend, MaterialHandle, MeshHandle, PointsHandle, RenderError};
use crate::material::{MaterialUniforms, StandardMaterial};

/// Maximum number of draws (meshes plus point fields) per frame.
/// Each draw takes one slot of the dynamic uniform buffer.
const MAX_DRAWS_PER_FRAME: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    emissive: [f32; 4],
    params: [f32; 4],
    // 112 bytes of data + 144 bytes padding
    _padding: [[f32; 4]; 9],
}

const _: () = assert!(std::mem::size_of::<DrawUniforms>() == UNIFORM_ALIGNMENT);

impl DrawUniforms {
    fn mesh(model: glam::Mat4, material: &MaterialUniforms) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: material.color,
            emissive: material.emissive,
            params: material.params,
            _padding: [[0.0; 4]; 9],
        }
    }

    fn points(model: glam::Mat4, size: f32, opacity: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: [1.0, 1.0, 1.0, opacity],
            emissive: [0.0; 4],
            params: [size, 0.0, 0.0, 0.0],
            _padding: [[0.0; 4]; 9],
        }
    }
}

enum Target {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct GpuPoints {
    buffer: wgpu::Buffer,
    count: u32,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    size: wgpu::Extent3d,
    depth_view: wgpu::TextureView,

    mesh_pipeline: wgpu::RenderPipeline,
    points_pipeline: wgpu::RenderPipeline,
    additive_points_pipeline: wgpu::RenderPipeline,

    camera_buffer: wgpu::Buffer,
    lighting_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

fn create_depth_view(device: &wgpu::Device, size: wgpu::Extent3d) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_offscreen_texture(device: &wgpu::Device, size: wgpu::Extent3d) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl GpuContext {
    fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: Target,
        format: wgpu::TextureFormat,
        size: wgpu::Extent3d,
    ) -> Self {
        let globals_layout = pipeline::create_globals_layout(&device);
        let draw_layout = pipeline::create_draw_layout(&device, UNIFORM_ALIGNMENT as u64);

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform Buffer"),
            size: std::mem::size_of::<crate::camera::CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lighting_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lighting Uniform Buffer"),
            size: std::mem::size_of::<crate::lighting::LightingUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lighting_buffer.as_entire_binding(),
                },
            ],
            label: Some("globals_bind_group"),
        });

        // One slot per draw, selected with a dynamic offset
        let draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_DRAWS_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &draw_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_ALIGNMENT as u64),
                }),
            }],
            label: Some("draw_bind_group"),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &draw_layout],
            push_constant_ranges: &[],
        });

        let mesh_pipeline = pipeline::create_mesh_pipeline(&device, &layout, format);
        let points_pipeline = pipeline::create_points_pipeline(&device, &layout, format, false);
        let additive_points_pipeline = pipeline::create_points_pipeline(&device, &layout, format, true);
        let depth_view = create_depth_view(&device, size);

        Self {
            device,
            queue,
            target,
            size,
            depth_view,
            mesh_pipeline,
            points_pipeline,
            additive_points_pipeline,
            camera_buffer,
            lighting_buffer,
            globals_bind_group,
            draw_buffer,
            draw_bind_group,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let size = extent(width, height);
        if size == self.size {
            return;
        }
        self.size = size;
        self.depth_view = create_depth_view(&self.device, size);

        match &mut self.target {
            Target::Surface { surface, config } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(&self.device, config);
            }
            Target::Offscreen { texture } => {
                *texture = create_offscreen_texture(&self.device, size);
            }
        }
    }
}

/// Graphics context plus every buffer created on it, keyed by handle.
pub struct WgpuBackend {
    context: Option<GpuContext>,
    meshes: HashMap<MeshHandle, GpuMesh>,
    points: HashMap<PointsHandle, GpuPoints>,
    materials: HashMap<MaterialHandle, MaterialUniforms>,
    next_handle: u32,
}

impl WgpuBackend {
    fn from_context(context: GpuContext) -> Self {
        Self {
            context: Some(context),
            meshes: HashMap::new(),
            points: HashMap::new(),
            materials: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Headless backend rendering into a readable texture.
    pub async fn new_offscreen(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let size = extent(width, height);
        let texture = create_offscreen_texture(&device, size);
        log::info!("Offscreen backend {}x{} on {}", size.width, size.height, adapter.get_info().name);

        Ok(Self::from_context(GpuContext::new(
            device,
            queue,
            Target::Offscreen { texture },
            OFFSCREEN_FORMAT,
            size,
        )))
    }

    /// Backend drawing into an existing surface. The drawing buffer keeps a
    /// transparent background where the surface allows it.
    pub async fn with_surface(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        limits: wgpu::Limits,
    ) -> Result<Self, RenderError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f: &wgpu::TextureFormat| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .iter()
            .copied()
            .find(|m| *m == wgpu::CompositeAlphaMode::PreMultiplied)
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = extent(width, height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self::from_context(GpuContext::new(
            device,
            queue,
            Target::Surface { surface, config },
            format,
            size,
        )))
    }

    /// Backend for a page canvas. Sized from the canvas drawing buffer.
    #[cfg(target_arch = "wasm32")]
    pub async fn new_for_canvas(canvas: web_sys::HtmlCanvasElement) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let (width, height) = (canvas.width(), canvas.height());
        let target = wgpu::SurfaceTarget::Canvas(canvas);
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        Self::with_surface(&instance, surface, width, height, wgpu::Limits::downlevel_webgl2_defaults()).await
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.context.as_ref().map(|ctx| (ctx.size.width, ctx.size.height))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn next_handle(&mut self) -> u32 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn context(&self) -> Result<&GpuContext, RenderError> {
        self.context.as_ref().ok_or(RenderError::Released)
    }

    /// Copy the last rendered offscreen frame out as tightly packed RGBA8.
    pub fn read_frame(&self) -> Result<Vec<u8>, RenderError> {
        let ctx = self.context()?;
        let Target::Offscreen { texture } = &ctx.target else {
            return Err(RenderError::Readback("surface targets cannot be read back".into()));
        };
        let (width, height) = (ctx.size.width, ctx.size.height);

        // Rows are copied with 256-byte alignment
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            ctx.size,
        );
        ctx.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        output_buffer.unmap();

        Ok(pixels)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, RenderError> {
        if mesh.vertices.len() > u16::MAX as usize + 1 {
            return Err(RenderError::MeshTooLarge(mesh.vertices.len()));
        }
        let ctx = self.context()?;

        let vertex_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let gpu_mesh = GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        };
        let handle = MeshHandle(self.next_handle());
        self.meshes.insert(handle, gpu_mesh);
        Ok(handle)
    }

    fn upload_points(&mut self, points: &[PointVertex]) -> Result<PointsHandle, RenderError> {
        let ctx = self.context()?;
        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Instance Buffer"),
            contents: bytemuck::cast_slice(points),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let handle = PointsHandle(self.next_handle());
        self.points.insert(
            handle,
            GpuPoints {
                buffer,
                count: points.len() as u32,
            },
        );
        Ok(handle)
    }

    fn create_material(&mut self, material: &StandardMaterial) -> Result<MaterialHandle, RenderError> {
        self.context()?;
        let handle = MaterialHandle(self.next_handle());
        self.materials.insert(handle, material.to_uniforms());
        Ok(handle)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.resize(width, height);
        }
    }

    fn render(&mut self, frame: &FrameDescription) -> Result<(), RenderError> {
        let Self {
            context,
            meshes,
            points,
            materials,
            ..
        } = self;
        let ctx = context.as_mut().ok_or(RenderError::Released)?;

        let requested = frame.meshes.len() + frame.points.len();
        if requested > MAX_DRAWS_PER_FRAME {
            log::warn!("{} draws requested, only {} are drawn", requested, MAX_DRAWS_PER_FRAME);
        }

        // Resolve handles and fill the per-draw slots before the pass begins
        let fallback_material = StandardMaterial::default().to_uniforms();
        let mut slots: Vec<DrawUniforms> = Vec::with_capacity(requested.min(MAX_DRAWS_PER_FRAME));
        let mut mesh_draws: Vec<(u32, &GpuMesh)> = Vec::new();
        let mut point_draws: Vec<(u32, &GpuPoints, bool)> = Vec::new();

        for draw in &frame.meshes {
            if slots.len() >= MAX_DRAWS_PER_FRAME {
                break;
            }
            let Some(gpu_mesh) = meshes.get(&draw.mesh) else {
                log::warn!("Skipping draw of unknown mesh {:?}", draw.mesh);
                continue;
            };
            if gpu_mesh.index_count == 0 {
                continue;
            }
            let material = materials.get(&draw.material).unwrap_or(&fallback_material);
            mesh_draws.push(((slots.len() * UNIFORM_ALIGNMENT) as u32, gpu_mesh));
            slots.push(DrawUniforms::mesh(draw.model, material));
        }

        for draw in &frame.points {
            if slots.len() >= MAX_DRAWS_PER_FRAME {
                break;
            }
            let Some(gpu_points) = points.get(&draw.points) else {
                log::warn!("Skipping draw of unknown point field {:?}", draw.points);
                continue;
            };
            if gpu_points.count == 0 {
                continue;
            }
            point_draws.push(((slots.len() * UNIFORM_ALIGNMENT) as u32, gpu_points, draw.additive));
            slots.push(DrawUniforms::points(draw.model, draw.size, draw.opacity));
        }

        ctx.queue.write_buffer(&ctx.camera_buffer, 0, bytemuck::bytes_of(&frame.camera));
        ctx.queue.write_buffer(&ctx.lighting_buffer, 0, bytemuck::bytes_of(&frame.lighting));
        if !slots.is_empty() {
            ctx.queue.write_buffer(&ctx.draw_buffer, 0, bytemuck::cast_slice(&slots));
        }

        let (view, surface_texture) = match &ctx.target {
            Target::Surface { surface, config } => match surface.get_current_texture() {
                Ok(output) => (
                    output.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    Some(output),
                ),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("Surface lost, reconfiguring");
                    surface.configure(&ctx.device, config);
                    return Ok(());
                }
                Err(e) => return Err(RenderError::Surface(e.to_string())),
            },
            Target::Offscreen { texture } => (texture.create_view(&wgpu::TextureViewDescriptor::default()), None),
        };

        let [r, g, b, a] = frame.clear_color;
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Scene Encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &ctx.globals_bind_group, &[]);

            // Opaque geometry first so point fields depth-test against it
            if !mesh_draws.is_empty() {
                pass.set_pipeline(&ctx.mesh_pipeline);
                for (offset, gpu_mesh) in &mesh_draws {
                    pass.set_bind_group(1, &ctx.draw_bind_group, &[*offset]);
                    pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(gpu_mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..gpu_mesh.index_count, 0, 0..1);
                }
            }

            for (offset, gpu_points, additive) in &point_draws {
                pass.set_pipeline(if *additive {
                    &ctx.additive_points_pipeline
                } else {
                    &ctx.points_pipeline
                });
                pass.set_bind_group(1, &ctx.draw_bind_group, &[*offset]);
                pass.set_vertex_buffer(0, gpu_points.buffer.slice(..));
                pass.draw(0..6, 0..gpu_points.count);
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        if let Some(output) = surface_texture {
            output.present();
        }
        Ok(())
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&handle) {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
    }

    fn release_points(&mut self, handle: PointsHandle) {
        if let Some(points) = self.points.remove(&handle) {
            points.buffer.destroy();
        }
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        self.materials.remove(&handle);
    }

    fn release_context(&mut self) {
        for (_, mesh) in self.meshes.drain() {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        for (_, points) in self.points.drain() {
            points.buffer.destroy();
        }
        self.materials.clear();

        if let Some(ctx) = self.context.take() {
            ctx.device.destroy();
            log::debug!("Graphics context released");
        }
    }
}
