use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use robo_core::components::Camera;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_projection: [[f32; 4]; 4], // offset 0
    pub position: [f32; 4],             // offset 64, w unused
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_projection: Mat4::IDENTITY.to_cols_array_2d(),
            position: [0.0; 4],
        }
    }
}

impl CameraUniform {
    pub fn new(lens: &Camera, view: Mat4, eye: Vec3) -> Self {
        Self {
            view_projection: (lens.projection() * view).to_cols_array_2d(),
            position: eye.extend(1.0).to_array(),
        }
    }
}

/// Directional lights plus ambient; `w` of each entry is the intensity.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniforms {
    pub ambient: [f32; 4],
    /// Direction the light shines from, normalized.
    pub key: [f32; 4],
    pub fill: [f32; 4],
}

impl Default for LightingUniforms {
    fn default() -> Self {
        let key = Vec3::new(5.0, 10.0, 5.0).normalize();
        let fill = Vec3::new(-5.0, 5.0, -5.0).normalize();
        Self {
            ambient: [1.0, 1.0, 1.0, 1.2],
            key: [key.x, key.y, key.z, 1.2],
            fill: [fill.x, fill.y, fill.z, 0.6],
        }
    }
}

/// Camera and lighting uniforms, bound together as group 0.
pub struct CameraState {
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub light_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraState {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[uniform_entry(0), uniform_entry(1)],
            });

        let uniform = CameraUniform::default();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lighting Uniform Buffer"),
            contents: bytemuck::cast_slice(&[LightingUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
        });

        CameraState {
            uniform,
            buffer,
            light_buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn update(&mut self, queue: &wgpu::Queue, lens: &Camera, view: Mat4, eye: Vec3) {
        self.uniform = CameraUniform::new(lens, view, eye);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 48);
    }

    #[test]
    fn test_target_projects_to_screen_centre() {
        let lens = Camera::default();
        let eye = Vec3::new(0.0, 20.0, 60.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let uniform = CameraUniform::new(&lens, view, eye);
        let clip = Mat4::from_cols_array_2d(&uniform.view_projection) * Vec3::ZERO.extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_default_lights_match_scene_rig() {
        let lights = LightingUniforms::default();
        assert_eq!(lights.ambient[3], 1.2);
        assert_eq!(lights.key[3], 1.2);
        assert_eq!(lights.fill[3], 0.6);
        let key = Vec3::new(lights.key[0], lights.key[1], lights.key[2]);
        assert!((key.length() - 1.0).abs() < 1e-5);
    }
}
