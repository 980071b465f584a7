use std::collections::HashMap;

use hecs::World;

use crate::components::*;

/// Central scene state: the ECS world plus a registry of named top-level nodes.
pub struct SceneWorld {
    pub world: World,
    /// Maps well-known node keys ("character", "environment", ...) to entities.
    pub entity_registry: HashMap<String, hecs::Entity>,
}

impl Default for SceneWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneWorld {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            entity_registry: HashMap::new(),
        }
    }

    /// Add a node under `parent` (or as a root). Returns the new entity.
    pub fn add_node(&mut self, name: Option<String>, transform: Transform, parent: Option<hecs::Entity>) -> hecs::Entity {
        let mut builder = Self::node_builder(name, transform, parent);
        self.spawn_linked(&mut builder, parent)
    }

    /// Like [`add_node`](Self::add_node), with `extra` components spawned alongside.
    pub fn add_node_with(
        &mut self,
        name: Option<String>,
        transform: Transform,
        parent: Option<hecs::Entity>,
        extra: impl hecs::DynamicBundle,
    ) -> hecs::Entity {
        let mut builder = Self::node_builder(name, transform, parent);
        builder.add_bundle(extra);
        self.spawn_linked(&mut builder, parent)
    }

    fn node_builder(name: Option<String>, transform: Transform, parent: Option<hecs::Entity>) -> hecs::EntityBuilder {
        let transform = Transform {
            parent,
            dirty: true,
            ..transform
        };
        let rest = RestPose {
            rotation: transform.rotation,
        };
        let mut builder = hecs::EntityBuilder::new();
        builder
            .add(NodeName(name))
            .add(transform)
            .add(rest)
            .add(Children::default());
        builder
    }

    fn spawn_linked(&mut self, builder: &mut hecs::EntityBuilder, parent: Option<hecs::Entity>) -> hecs::Entity {
        let entity = self.world.spawn(builder.build());
        if let Some(parent) = parent {
            if let Ok(mut children) = self.world.get::<&mut Children>(parent) {
                children.0.push(entity);
            }
        }
        entity
    }

    /// Add a node and register it under `key`, replacing any previous registration.
    pub fn add_registered(&mut self, key: &str, transform: Transform) -> hecs::Entity {
        if let Some(old) = self.entity_registry.remove(key) {
            self.remove_node(old);
        }
        let entity = self.add_node(Some(key.to_string()), transform, None);
        self.entity_registry.insert(key.to_string(), entity);
        entity
    }

    pub fn registered(&self, key: &str) -> Option<hecs::Entity> {
        self.entity_registry
            .get(key)
            .copied()
            .filter(|e| self.world.contains(*e))
    }

    /// Remove a node and its whole subtree. Returns the number of despawned entities.
    pub fn remove_node(&mut self, entity: hecs::Entity) -> usize {
        let subtree = self.traverse(entity);
        if subtree.is_empty() {
            return 0;
        }

        let parent = self
            .world
            .get::<&Transform>(entity)
            .ok()
            .and_then(|t| t.parent);
        if let Some(parent) = parent {
            if let Ok(mut children) = self.world.get::<&mut Children>(parent) {
                children.0.retain(|c| *c != entity);
            }
        }

        let mut removed = 0;
        for e in subtree {
            if self.world.despawn(e).is_ok() {
                removed += 1;
            }
        }
        self.entity_registry.retain(|_, e| *e != entity);
        removed
    }

    /// Pre-order traversal of the subtree rooted at `root` (root first).
    pub fn traverse(&self, root: hecs::Entity) -> Vec<hecs::Entity> {
        let mut order = Vec::new();
        if !self.world.contains(root) {
            return order;
        }
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            order.push(entity);
            if let Ok(children) = self.world.get::<&Children>(entity) {
                // Reverse so the first child is visited first.
                for child in children.0.iter().rev() {
                    if self.world.contains(*child) {
                        stack.push(*child);
                    }
                }
            }
        }
        order
    }

    pub fn set_hidden(&mut self, entity: hecs::Entity, hidden: bool) {
        if hidden {
            let _ = self.world.insert_one(entity, Hidden);
        } else {
            let _ = self.world.remove_one::<Hidden>(entity);
        }
    }

    pub fn set_opacity(&mut self, entity: hecs::Entity, opacity: f32) {
        let _ = self.world.insert_one(entity, Opacity(opacity.clamp(0.0, 1.0)));
    }

    /// A node is visible when neither it nor any ancestor carries `Hidden`.
    pub fn is_visible(&self, entity: hecs::Entity) -> bool {
        let mut cursor = Some(entity);
        while let Some(e) = cursor {
            if self.world.get::<&Hidden>(e).is_ok() {
                return false;
            }
            cursor = self.world.get::<&Transform>(e).ok().and_then(|t| t.parent);
        }
        true
    }

    /// Product of the node's opacity and every ancestor's opacity.
    pub fn effective_opacity(&self, entity: hecs::Entity) -> f32 {
        let mut opacity = 1.0;
        let mut cursor = Some(entity);
        while let Some(e) = cursor {
            if let Ok(o) = self.world.get::<&Opacity>(e) {
                opacity *= o.0;
            }
            cursor = self.world.get::<&Transform>(e).ok().and_then(|t| t.parent);
        }
        opacity
    }

    pub fn node_name(&self, entity: hecs::Entity) -> Option<String> {
        self.world
            .get::<&NodeName>(entity)
            .ok()
            .and_then(|n| n.0.clone())
    }

    /// Set a node's local rotation to its rest rotation followed by a turn about local X.
    pub fn set_local_pitch(&mut self, entity: hecs::Entity, angle: f32) {
        let rest = self
            .world
            .get::<&RestPose>(entity)
            .map(|r| r.rotation)
            .unwrap_or(glam::Quat::IDENTITY);
        if let Ok(mut transform) = self.world.get::<&mut Transform>(entity) {
            transform.rotation = rest * glam::Quat::from_rotation_x(angle);
            transform.dirty = true;
        }
    }

    pub fn update_transforms(&mut self) {
        crate::transform::update_transforms(&mut self.world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(scene: &mut SceneWorld) -> (hecs::Entity, hecs::Entity, hecs::Entity, hecs::Entity) {
        let root = scene.add_node(Some("root".into()), Transform::default(), None);
        let a = scene.add_node(Some("a".into()), Transform::default(), Some(root));
        let a1 = scene.add_node(None, Transform::default(), Some(a));
        let b = scene.add_node(Some("b".into()), Transform::default(), Some(root));
        (root, a, a1, b)
    }

    #[test]
    fn test_add_node_with_spawns_extra_components() {
        let mut scene = SceneWorld::new();
        let root = scene.add_node(None, Transform::default(), None);
        let e = scene.add_node_with(
            Some("mesh".into()),
            Transform::from_position(glam::Vec3::X),
            Some(root),
            (MeshRenderer { meshes: vec![MeshHandle(4)] }, Opacity(0.25)),
        );
        assert_eq!(scene.world.get::<&MeshRenderer>(e).unwrap().meshes, vec![MeshHandle(4)]);
        assert_eq!(scene.effective_opacity(e), 0.25);
        assert_eq!(scene.world.get::<&Transform>(e).unwrap().parent, Some(root));
        assert_eq!(scene.traverse(root), vec![root, e]);
    }

    #[test]
    fn test_traverse_is_preorder() {
        let mut scene = SceneWorld::new();
        let (root, a, a1, b) = tree(&mut scene);
        assert_eq!(scene.traverse(root), vec![root, a, a1, b]);
    }

    #[test]
    fn test_remove_node_removes_subtree() {
        let mut scene = SceneWorld::new();
        let (root, a, a1, b) = tree(&mut scene);
        assert_eq!(scene.remove_node(a), 2);
        assert!(!scene.world.contains(a1));
        assert_eq!(scene.traverse(root), vec![root, b]);
    }

    #[test]
    fn test_hidden_ancestor_hides_descendants() {
        let mut scene = SceneWorld::new();
        let (root, _a, a1, _b) = tree(&mut scene);
        assert!(scene.is_visible(a1));
        scene.set_hidden(root, true);
        assert!(!scene.is_visible(a1));
        scene.set_hidden(root, false);
        assert!(scene.is_visible(a1));
    }

    #[test]
    fn test_effective_opacity_multiplies() {
        let mut scene = SceneWorld::new();
        let (root, a, a1, _b) = tree(&mut scene);
        scene.set_opacity(root, 0.5);
        scene.set_opacity(a, 0.5);
        assert!((scene.effective_opacity(a1) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_registered_replacement_removes_old_tree() {
        let mut scene = SceneWorld::new();
        let first = scene.add_registered("character", Transform::default());
        let child = scene.add_node(None, Transform::default(), Some(first));
        let second = scene.add_registered("character", Transform::default());
        assert!(!scene.world.contains(first));
        assert!(!scene.world.contains(child));
        assert_eq!(scene.registered("character"), Some(second));
    }

    #[test]
    fn test_local_pitch_composes_with_rest() {
        let mut scene = SceneWorld::new();
        let rest = glam::Quat::from_rotation_y(1.0);
        let node = scene.add_node(
            None,
            Transform {
                rotation: rest,
                ..Default::default()
            },
            None,
        );
        scene.set_local_pitch(node, 0.3);
        let rot = scene.world.get::<&Transform>(node).unwrap().rotation;
        let expected = rest * glam::Quat::from_rotation_x(0.3);
        assert!(rot.abs_diff_eq(expected, 1e-6));
        scene.set_local_pitch(node, 0.0);
        let rot = scene.world.get::<&Transform>(node).unwrap().rotation;
        assert!(rot.abs_diff_eq(rest, 1e-6));
    }
}
