use glam::{Mat4, Quat, Vec3};

/// Transform component. Present on every scene node.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub world_matrix: Mat4,
    pub parent: Option<hecs::Entity>,
    pub dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world_matrix: Mat4::IDENTITY,
            parent: None,
            dirty: true,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Rotation a node had when it was loaded. Limb swing is composed on top of it.
#[derive(Debug, Clone, Copy)]
pub struct RestPose {
    pub rotation: Quat,
}

/// Meshes drawn with this node's world matrix (one per glTF primitive).
#[derive(Debug, Clone, Default)]
pub struct MeshRenderer {
    pub meshes: Vec<MeshHandle>,
}

/// Newtype handle into the client's mesh cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub usize);

/// Human-readable node name as it appeared in the source asset.
#[derive(Debug, Clone)]
pub struct NodeName(pub Option<String>);

/// Ordered child list, kept alongside `Transform::parent` so traversal is stable.
#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);

/// Per-node opacity multiplier. Nodes without it are fully opaque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opacity(pub f32);

/// Flat colour multiplier applied on top of vertex colours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint(pub [f32; 3]);

/// Perspective camera parameters.
#[derive(Debug, Clone)]
pub struct Camera {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

impl Camera {
    /// Recompute the aspect ratio after a surface resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect_ratio = width as f32 / height.max(1) as f32;
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        )
    }
}

/// Marker component: node (and its subtree) is hidden from rendering.
pub struct Hidden;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_resize_updates_aspect() {
        let mut camera = Camera::default();
        camera.resize(800, 400);
        assert!((camera.aspect_ratio - 2.0).abs() < 1e-6);
        // zero height must not divide by zero
        camera.resize(800, 0);
        assert!(camera.aspect_ratio.is_finite());
    }
}
