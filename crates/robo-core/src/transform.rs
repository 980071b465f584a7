use std::collections::HashMap;

use glam::Mat4;
use hecs::World;

use crate::components::Transform;

/// Compute world matrices for all entities with Transform components.
/// Parents are resolved before children regardless of hierarchy depth.
pub fn update_transforms(world: &mut World) {
    let mut nodes: HashMap<hecs::Entity, (Option<hecs::Entity>, Mat4)> = HashMap::new();
    for (entity, transform) in world.query_mut::<&Transform>() {
        nodes.insert(entity, (transform.parent, transform.local_matrix()));
    }

    let mut resolved: HashMap<hecs::Entity, Mat4> = HashMap::with_capacity(nodes.len());
    let entities: Vec<hecs::Entity> = nodes.keys().copied().collect();
    for entity in entities {
        resolve(entity, &nodes, &mut resolved);
    }

    for (entity, transform) in world.query_mut::<&mut Transform>() {
        if let Some(world_matrix) = resolved.get(&entity) {
            transform.world_matrix = *world_matrix;
            transform.dirty = false;
        }
    }
}

fn resolve(
    entity: hecs::Entity,
    nodes: &HashMap<hecs::Entity, (Option<hecs::Entity>, Mat4)>,
    resolved: &mut HashMap<hecs::Entity, Mat4>,
) -> Mat4 {
    if let Some(m) = resolved.get(&entity) {
        return *m;
    }

    // Walk up to the first resolved ancestor (or a root), then fold back down.
    let mut chain = vec![entity];
    let mut base = Mat4::IDENTITY;
    let mut cursor = entity;
    while let Some((Some(parent), _)) = nodes.get(&cursor) {
        if let Some(m) = resolved.get(parent) {
            base = *m;
            break;
        }
        if !nodes.contains_key(parent) || chain.contains(parent) {
            // Dangling parent or a cycle: treat the chain top as a root.
            break;
        }
        chain.push(*parent);
        cursor = *parent;
    }

    let mut acc = base;
    for node in chain.iter().rev() {
        let local = nodes.get(node).map(|(_, m)| *m).unwrap_or(Mat4::IDENTITY);
        acc *= local;
        resolved.insert(*node, acc);
    }
    acc
}
