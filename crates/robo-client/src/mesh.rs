use std::f32::consts::{PI, TAU};

use wgpu::util::DeviceExt;

use robo_core::components::MeshHandle;

/// 3D vertex for mesh rendering. Material base colour is baked into `color`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex3D {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex3D>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    fn white(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// CPU-side geometry. Built off the render thread, uploaded by [`MeshCache::add`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// UV sphere centred on the origin.
    pub fn sphere(radius: f32, rings: u32, sectors: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let theta = PI * ring as f32 / rings as f32;
            for sector in 0..=sectors {
                let phi = TAU * sector as f32 / sectors as f32;
                let n = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
                vertices.push(Vertex3D::white([radius * n[0], radius * n[1], radius * n[2]], n));
            }
        }

        for ring in 0..rings {
            for sector in 0..sectors {
                let curr_row = ring * (sectors + 1);
                let next_row = (ring + 1) * (sectors + 1);

                // CCW winding when viewed from outside the sphere
                indices.extend_from_slice(&[
                    curr_row + sector,
                    next_row + sector + 1,
                    next_row + sector,
                    curr_row + sector,
                    curr_row + sector + 1,
                    next_row + sector + 1,
                ]);
            }
        }

        Self { vertices, indices }
    }

    /// Flat annulus in the XZ plane with outer radius 1, facing +Y.
    pub fn ring(inner_radius: f32, segments: u32) -> Self {
        let mut vertices = Vec::with_capacity(2 * (segments as usize + 1));
        let mut indices = Vec::with_capacity(6 * segments as usize);

        for i in 0..=segments {
            let a = TAU * i as f32 / segments as f32;
            let (s, c) = a.sin_cos();
            vertices.push(Vertex3D::white([c * inner_radius, 0.0, s * inner_radius], [0.0, 1.0, 0.0]));
            vertices.push(Vertex3D::white([c, 0.0, s], [0.0, 1.0, 0.0]));
        }
        for i in 0..segments {
            let inner = 2 * i;
            let outer = inner + 1;
            let next_inner = inner + 2;
            let next_outer = inner + 3;
            indices.extend_from_slice(&[inner, next_inner, outer, outer, next_inner, next_outer]);
        }

        Self { vertices, indices }
    }

    /// Open cylinder from y = 0 (radius 1) to y = 1 (radius `top_radius`).
    pub fn beam(top_radius: f32, segments: u32) -> Self {
        let mut vertices = Vec::with_capacity(2 * (segments as usize + 1));
        let mut indices = Vec::with_capacity(6 * segments as usize);
        let slope = 1.0 - top_radius;

        for i in 0..=segments {
            let a = TAU * i as f32 / segments as f32;
            let (s, c) = a.sin_cos();
            let normal = glam::Vec3::new(c, slope, s).normalize().to_array();
            vertices.push(Vertex3D::white([c, 0.0, s], normal));
            vertices.push(Vertex3D::white([c * top_radius, 1.0, s * top_radius], normal));
        }
        for i in 0..segments {
            let bottom = 2 * i;
            let top = bottom + 1;
            indices.extend_from_slice(&[bottom, top, bottom + 2, top, top + 2, bottom + 2]);
        }

        Self { vertices, indices }
    }
}

/// A mesh uploaded to the GPU.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, label: &str, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh VB: {}", label)),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh IB: {}", label)),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }
}

/// Every mesh uploaded this session, addressed by [`MeshHandle`].
#[derive(Default)]
pub struct MeshCache {
    meshes: Vec<GpuMesh>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: &wgpu::Device, label: &str, data: &MeshData) -> MeshHandle {
        let handle = MeshHandle(self.meshes.len());
        self.meshes.push(GpuMesh::upload(device, label, data));
        handle
    }

    /// Upload a model's meshes in order. Returns the handle offset of the first one.
    pub fn add_all(&mut self, device: &wgpu::Device, label: &str, meshes: &[MeshData]) -> usize {
        let base = self.meshes.len();
        for (i, data) in meshes.iter().enumerate() {
            self.add(device, &format!("{}#{}", label, i), data);
        }
        base
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Generate smooth normals by accumulating face normals at each vertex using the index buffer.
pub fn generate_smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![glam::Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 < positions.len() && i1 < positions.len() && i2 < positions.len() {
            let v0 = glam::Vec3::from(positions[i0]);
            let v1 = glam::Vec3::from(positions[i1]);
            let v2 = glam::Vec3::from(positions[i2]);
            // Area weighted: the cross product is left unnormalized
            let face_normal = (v1 - v0).cross(v2 - v0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }
    }

    normals
        .iter()
        .map(|n| {
            let normalized = n.normalize_or_zero();
            if normalized == glam::Vec3::ZERO {
                [0.0, 1.0, 0.0]
            } else {
                normalized.to_array()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_index_in_range(mesh: &MeshData) -> bool {
        mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len())
    }

    #[test]
    fn test_sphere_vertices_on_radius() {
        let mesh = MeshData::sphere(2.0, 8, 12);
        assert_eq!(mesh.vertices.len(), 9 * 13);
        assert_eq!(mesh.indices.len(), 8 * 12 * 6);
        assert!(max_index_in_range(&mesh));
        for v in &mesh.vertices {
            let r = glam::Vec3::from(v.position).length();
            assert!((r - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_ring_is_flat_annulus() {
        let mesh = MeshData::ring(0.8, 32);
        assert!(max_index_in_range(&mesh));
        for v in &mesh.vertices {
            assert_eq!(v.position[1], 0.0);
            let r = glam::Vec2::new(v.position[0], v.position[2]).length();
            assert!((0.8 - 1e-4..=1.0 + 1e-4).contains(&r));
        }
    }

    #[test]
    fn test_beam_tapers_to_top() {
        let mesh = MeshData::beam(0.5, 16);
        assert!(max_index_in_range(&mesh));
        for v in &mesh.vertices {
            let r = glam::Vec2::new(v.position[0], v.position[2]).length();
            if v.position[1] == 0.0 {
                assert!((r - 1.0).abs() < 1e-4);
            } else {
                assert_eq!(v.position[1], 1.0);
                assert!((r - 0.5).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_smooth_normals_of_flat_quad_point_up() {
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 0.0, 0.0]];
        let normals = generate_smooth_normals(&positions, &[0, 1, 2, 0, 2, 3]);
        for n in normals {
            assert!((glam::Vec3::from(n) - glam::Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn test_smooth_normals_default_for_unreferenced_vertex() {
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [5.0, 5.0, 5.0]];
        let normals = generate_smooth_normals(&positions, &[0, 1, 2]);
        assert_eq!(normals[3], [0.0, 1.0, 0.0]);
    }
}
