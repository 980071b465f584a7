use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3};
use winit::window::Window;

use robo_core::components::{Camera, MeshHandle, MeshRenderer, Tint, Transform};
use robo_core::world::SceneWorld;

use crate::camera::CameraState;
use crate::mesh::{MeshCache, Vertex3D};

const SHADER_SOURCE: &str = include_str!("shader.wgsl");
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Sky blue, 0x87CEEB in linear space.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.242,
    g: 0.617,
    b: 0.831,
    a: 1.0,
};

/// Stride of one draw in the dynamic uniform buffer (the minimum offset alignment).
pub const DRAW_UNIFORM_SIZE: u64 = 256;
const INITIAL_DRAW_CAPACITY: usize = 1024;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model_matrix: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub _padding: [f32; 28],
}

impl DrawUniforms {
    pub fn new(model: Mat4, tint: [f32; 3], opacity: f32) -> Self {
        let normal = Mat4::from_mat3(Mat3::from_mat4(model).inverse().transpose());
        Self {
            model_matrix: model.to_cols_array_2d(),
            normal_matrix: normal.to_cols_array_2d(),
            tint: [tint[0], tint[1], tint[2], opacity],
            _padding: [0.0; 28],
        }
    }
}

/// One dynamic-offset uniform slot per draw, grown on demand.
pub struct DrawUniformPool {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
    capacity: usize,
}

impl DrawUniformPool {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(DRAW_UNIFORM_SIZE),
                    },
                    count: None,
                }],
            });
        let (buffer, bind_group) = Self::allocate(device, &bind_group_layout, INITIAL_DRAW_CAPACITY);
        Self {
            buffer,
            bind_group,
            bind_group_layout,
            capacity: INITIAL_DRAW_CAPACITY,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer"),
            size: capacity as u64 * DRAW_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniform Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(DRAW_UNIFORM_SIZE),
                }),
            }],
        });
        (buffer, bind_group)
    }

    pub fn ensure_capacity(&mut self, device: &wgpu::Device, draws: usize) {
        if draws <= self.capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        tracing::debug!("Growing draw uniform pool to {} slots", capacity);
        let (buffer, bind_group) = Self::allocate(device, &self.bind_group_layout, capacity);
        self.buffer = buffer;
        self.bind_group = bind_group;
        self.capacity = capacity;
    }
}

/// One mesh instance to draw this frame.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub mesh: MeshHandle,
    pub model: Mat4,
    pub tint: [f32; 3],
    pub opacity: f32,
}

impl DrawItem {
    pub fn is_blended(&self) -> bool {
        self.opacity < 1.0
    }
}

/// Gather visible mesh instances. Opaque items come first, then blended ones back to front.
pub fn collect_draws(scene: &SceneWorld, eye: Vec3) -> Vec<DrawItem> {
    let mut opaque = Vec::new();
    let mut blended = Vec::new();
    for (entity, (transform, renderer)) in scene.world.query::<(&Transform, &MeshRenderer)>().iter() {
        if !scene.is_visible(entity) {
            continue;
        }
        let opacity = scene.effective_opacity(entity);
        if opacity <= 0.0 {
            continue;
        }
        let tint = scene
            .world
            .get::<&Tint>(entity)
            .map(|t| t.0)
            .unwrap_or([1.0, 1.0, 1.0]);
        for &mesh in &renderer.meshes {
            let item = DrawItem {
                mesh,
                model: transform.world_matrix,
                tint,
                opacity,
            };
            if item.is_blended() {
                blended.push(item);
            } else {
                opaque.push(item);
            }
        }
    }

    let distance = |item: &DrawItem| item.model.w_axis.truncate().distance_squared(eye);
    blended.sort_by(|a, b| distance(b).total_cmp(&distance(a)));
    opaque.extend(blended);
    opaque
}

/// GPU state created after the window is available.
pub struct GpuState {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
}

impl GpuState {
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        let (depth_texture, depth_view) = create_depth_texture(&self.device, width, height);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;
    }
}

/// Initialize the wgpu device and surface.
pub async fn init_gpu(window: Arc<Window>) -> GpuState {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let surface = instance
        .create_surface(Arc::clone(&window))
        .expect("Failed to create surface");

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .expect("Failed to find suitable GPU adapter");

    let adapter_info = adapter.get_info();
    tracing::info!(
        "GPU adapter: {} ({:?})",
        adapter_info.name,
        adapter_info.backend
    );

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Robot Viewer Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await
        .expect("Failed to create device");

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(surface_caps.formats[0]);

    tracing::info!("Surface format: {:?}", surface_format);

    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let (depth_texture, depth_view) = create_depth_texture(&device, config.width, config.height);

    GpuState {
        window,
        surface,
        device,
        queue,
        config,
        depth_texture,
        depth_view,
    }
}

pub fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    blended: bool,
) -> wgpu::RenderPipeline {
    let label = if blended { "Blended Mesh Pipeline" } else { "Opaque Mesh Pipeline" };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex3D::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(if blended {
                    wgpu::BlendState::ALPHA_BLENDING
                } else {
                    wgpu::BlendState::REPLACE
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: !blended,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Forward renderer: opaque pass then alpha-blended pass over the scene world.
pub struct Renderer {
    pub camera: CameraState,
    draw_pool: DrawUniformPool,
    opaque_pipeline: wgpu::RenderPipeline,
    blended_pipeline: wgpu::RenderPipeline,
    uniforms: Vec<DrawUniforms>,
}

impl Renderer {
    pub fn new(gpu: &GpuState) -> Self {
        let device = &gpu.device;
        let camera = CameraState::new(device);
        let draw_pool = DrawUniformPool::new(device);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&camera.bind_group_layout, &draw_pool.bind_group_layout],
            push_constant_ranges: &[],
        });

        let opaque_pipeline = create_mesh_pipeline(device, gpu.config.format, &layout, &shader, false);
        let blended_pipeline = create_mesh_pipeline(device, gpu.config.format, &layout, &shader, true);

        Self {
            camera,
            draw_pool,
            opaque_pipeline,
            blended_pipeline,
            uniforms: Vec::new(),
        }
    }

    /// Render one frame.
    pub fn render(
        &mut self,
        gpu: &GpuState,
        scene: &SceneWorld,
        meshes: &MeshCache,
        lens: &Camera,
        view: Mat4,
        eye: Vec3,
    ) {
        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("Surface error: {:?}", e);
                return;
            }
        };

        self.camera.update(&gpu.queue, lens, view, eye);

        let draws: Vec<DrawItem> = collect_draws(scene, eye)
            .into_iter()
            .filter(|d| meshes.get(d.mesh).is_some())
            .collect();
        self.draw_pool.ensure_capacity(&gpu.device, draws.len());
        self.uniforms.clear();
        self.uniforms
            .extend(draws.iter().map(|d| DrawUniforms::new(d.model, d.tint, d.opacity)));
        if !self.uniforms.is_empty() {
            gpu.queue
                .write_buffer(&self.draw_pool.buffer, 0, bytemuck::cast_slice(&self.uniforms));
        }

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Forward Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.camera.bind_group, &[]);

            let mut blending = false;
            render_pass.set_pipeline(&self.opaque_pipeline);
            for (draw_index, item) in (0_u32..).zip(&draws) {
                let Some(gpu_mesh) = meshes.get(item.mesh) else {
                    continue;
                };
                if item.is_blended() && !blending {
                    render_pass.set_pipeline(&self.blended_pipeline);
                    blending = true;
                }
                let dynamic_offset = draw_index * DRAW_UNIFORM_SIZE as u32;
                render_pass.set_bind_group(1, &self.draw_pool.bind_group, &[dynamic_offset]);
                render_pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(gpu_mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..gpu_mesh.index_count, 0, 0..1);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robo_core::components::Opacity;

    #[test]
    fn test_draw_uniform_fills_stride() {
        assert_eq!(std::mem::size_of::<DrawUniforms>() as u64, DRAW_UNIFORM_SIZE);
    }

    #[test]
    fn test_normal_matrix_undoes_nonuniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let u = DrawUniforms::new(model, [1.0; 3], 1.0);
        let normal = Mat4::from_cols_array_2d(&u.normal_matrix);
        let n = normal.transform_vector3(Vec3::X);
        assert!((n.x - 0.5).abs() < 1e-6);
        assert_eq!(u.tint[3], 1.0);
    }

    fn mesh_node(scene: &mut SceneWorld, z: f32, parent: Option<hecs::Entity>) -> hecs::Entity {
        let e = scene.add_node(None, Transform::from_position(Vec3::new(0.0, 0.0, z)), parent);
        scene
            .world
            .insert_one(e, MeshRenderer { meshes: vec![MeshHandle(0)] })
            .unwrap();
        e
    }

    #[test]
    fn test_collect_draws_orders_and_filters() {
        let mut scene = SceneWorld::new();
        let solid = mesh_node(&mut scene, 0.0, None);
        let near = mesh_node(&mut scene, 5.0, None);
        let far = mesh_node(&mut scene, -5.0, None);
        let invisible = mesh_node(&mut scene, 1.0, None);
        let hidden_parent = scene.add_node(None, Transform::default(), None);
        mesh_node(&mut scene, 2.0, Some(hidden_parent));
        scene.set_opacity(near, 0.5);
        scene.set_opacity(far, 0.5);
        scene.set_opacity(invisible, 0.0);
        scene.set_hidden(hidden_parent, true);
        scene.world.insert_one(far, Tint([0.1, 0.2, 0.3])).unwrap();
        scene.update_transforms();

        let draws = collect_draws(&scene, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(draws.len(), 3);
        assert!(!draws[0].is_blended());
        assert_eq!(draws[0].model.w_axis.z, 0.0);
        // far blended item first
        assert_eq!(draws[1].model.w_axis.z, -5.0);
        assert_eq!(draws[1].tint, [0.1, 0.2, 0.3]);
        assert_eq!(draws[2].model.w_axis.z, 5.0);
        assert!(scene.world.get::<&Opacity>(solid).is_err());
    }
}
