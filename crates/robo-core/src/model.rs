//! Loaded model description and its instantiation into the scene world.

use glam::{Quat, Vec3};

use crate::components::{MeshHandle, MeshRenderer, Transform};
use crate::world::SceneWorld;

/// One node of a loaded asset, with its local transform and children.
#[derive(Debug, Clone, Default)]
pub struct NodeDesc {
    pub name: Option<String>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub meshes: Vec<MeshHandle>,
    pub children: Vec<NodeDesc>,
}

impl NodeDesc {
    pub fn group(name: Option<String>, children: Vec<NodeDesc>) -> Self {
        Self {
            name,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            children,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeDesc::count).sum::<usize>()
    }

    /// Shift every mesh handle by `base`, used once meshes are uploaded.
    pub fn offset_meshes(&mut self, base: usize) {
        for mesh in &mut self.meshes {
            mesh.0 += base;
        }
        for child in &mut self.children {
            child.offset_meshes(base);
        }
    }
}

/// Axis-aligned bounds in model space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// A model ready to be placed: a single root (the scene group) plus bounds.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    pub source: String,
    pub root: NodeDesc,
    pub bounds: Option<Bounds>,
}

impl SceneWorld {
    /// Spawn `desc` and its descendants under `parent`. Returns the new root.
    pub fn instantiate(&mut self, desc: &NodeDesc, parent: Option<hecs::Entity>) -> hecs::Entity {
        let transform = Transform {
            position: desc.translation,
            rotation: desc.rotation,
            scale: desc.scale,
            ..Default::default()
        };
        let entity = if desc.meshes.is_empty() {
            self.add_node(desc.name.clone(), transform, parent)
        } else {
            let renderer = MeshRenderer {
                meshes: desc.meshes.clone(),
            };
            self.add_node_with(desc.name.clone(), transform, parent, (renderer,))
        };
        for child in &desc.children {
            self.instantiate(child, Some(entity));
        }
        entity
    }
}
