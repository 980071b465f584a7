//! glTF/GLB model loading.
//!
//! Loading runs on a worker thread and produces GPU-free data: a [`NodeDesc`]
//! tree whose mesh handles index into the returned [`MeshData`] list, plus
//! model-space bounds. The engine uploads the meshes, shifts the handles with
//! [`NodeDesc::offset_meshes`] and hands the result to the viewer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use glam::{Mat4, Quat, Vec3};

use robo_core::bindings::PartList;
use robo_core::components::MeshHandle;
use robo_core::model::{Bounds, ModelAsset, NodeDesc};

use crate::mesh::{generate_smooth_normals, MeshData, Vertex3D};

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

#[derive(Debug)]
pub enum AssetError {
    Io(String),
    Gltf(gltf::Error),
    /// The file parsed but contains no drawable geometry.
    Empty,
    /// The file relies on an extension we do not decode.
    Unsupported(String),
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::Io(msg) => write!(f, "Asset IO error: {}", msg),
            AssetError::Gltf(e) => write!(f, "glTF error: {}", e),
            AssetError::Empty => write!(f, "glTF file contains no meshes"),
            AssetError::Unsupported(ext) => write!(f, "Unsupported glTF extension: {}", ext),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<gltf::Error> for AssetError {
    fn from(e: gltf::Error) -> Self {
        match e {
            gltf::Error::Io(io) => AssetError::Io(io.to_string()),
            other => AssetError::Gltf(other),
        }
    }
}

/// A parsed model whose meshes have not been uploaded yet.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub asset: ModelAsset,
    pub meshes: Vec<MeshData>,
}

impl LoadedModel {
    /// Rebase mesh handles after the meshes were appended to a cache at `base`.
    pub fn into_asset(mut self, base: usize) -> ModelAsset {
        self.asset.root.offset_meshes(base);
        self.asset
    }
}

/// Parse a glTF or GLB file from disk.
pub fn load_model(path: &Path) -> Result<LoadedModel, AssetError> {
    let bytes = std::fs::read(path).map_err(|e| AssetError::Io(format!("{}: {}", path.display(), e)))?;

    // Required extensions are checked before validation, which rejects them generically.
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(&bytes)?;
    if let Some(ext) = document
        .extensions_required()
        .find(|ext| *ext == DRACO_EXTENSION)
    {
        return Err(AssetError::Unsupported(ext.to_string()));
    }
    let document = gltf::Document::from_json(document.into_json())?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetError::Empty)?;

    let mut builder = TreeBuilder {
        buffers: &buffers,
        meshes: Vec::new(),
        bounds: None,
    };
    let children = scene
        .nodes()
        .map(|node| builder.node(&node, Mat4::IDENTITY))
        .collect();
    let root = NodeDesc::group(scene.name().map(String::from), children);

    if builder.meshes.is_empty() {
        return Err(AssetError::Empty);
    }

    let source = path.display().to_string();
    tracing::info!(
        "Loaded '{}': {} nodes, {} meshes, bounds {:?}",
        source,
        root.count(),
        builder.meshes.len(),
        builder.bounds.map(|b| b.size())
    );

    Ok(LoadedModel {
        asset: ModelAsset {
            source,
            root,
            bounds: builder.bounds,
        },
        meshes: builder.meshes,
    })
}

struct TreeBuilder<'a> {
    buffers: &'a [gltf::buffer::Data],
    meshes: Vec<MeshData>,
    bounds: Option<Bounds>,
}

impl TreeBuilder<'_> {
    /// Convert one node and its subtree. `parent_world` only feeds the bounds.
    fn node(&mut self, node: &gltf::Node, parent_world: Mat4) -> NodeDesc {
        let (translation, rotation, scale) = node.transform().decomposed();
        let translation = Vec3::from(translation);
        let rotation = Quat::from_array(rotation);
        let scale = Vec3::from(scale);
        let world = parent_world * Mat4::from_scale_rotation_translation(scale, rotation, translation);

        let mut handles = Vec::new();
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if let Some(data) = self.primitive(&primitive, world) {
                    handles.push(MeshHandle(self.meshes.len()));
                    self.meshes.push(data);
                }
            }
        }

        let children = node.children().map(|child| self.node(&child, world)).collect();

        NodeDesc {
            name: node.name().map(String::from),
            translation,
            rotation,
            scale,
            meshes: handles,
            children,
        }
    }

    /// Read one primitive in node-local space, baking the material colour into vertices.
    fn primitive(&mut self, primitive: &gltf::Primitive, world: Mat4) -> Option<MeshData> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::warn!("Skipping non-triangle primitive ({:?})", primitive.mode());
            return None;
        }

        let buffers = self.buffers;
        let reader = primitive.reader(|buf| buffers.get(buf.index()).map(|d| &d.0[..]));
        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();

        let indices: Vec<u32> = match reader.read_indices() {
            Some(read) => read.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|n| n.collect())
            .unwrap_or_else(|| generate_smooth_normals(&positions, &indices));
        let colors: Vec<[f32; 4]> = reader
            .read_colors(0)
            .map(|c| c.into_rgba_f32().collect())
            .unwrap_or_default();
        let factor = primitive
            .material()
            .pbr_metallic_roughness()
            .base_color_factor();

        let vertices: Vec<Vertex3D> = positions
            .iter()
            .enumerate()
            .map(|(i, position)| {
                let vertex = colors.get(i).copied().unwrap_or([1.0; 4]);
                Vertex3D {
                    position: *position,
                    normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                    color: [
                        vertex[0] * factor[0],
                        vertex[1] * factor[1],
                        vertex[2] * factor[2],
                        vertex[3] * factor[3],
                    ],
                }
            })
            .collect();

        for position in &positions {
            let p = world.transform_point3(Vec3::from(*position));
            let point = Bounds { min: p, max: p };
            self.bounds = Some(match self.bounds {
                Some(b) => b.union(point),
                None => point,
            });
        }

        let data = MeshData { vertices, indices };
        (!data.is_empty()).then_some(data)
    }
}

/// Flatten a loaded model into its part list without instantiating it.
pub fn part_names(asset: &ModelAsset) -> Vec<String> {
    fn walk(node: &NodeDesc, out: &mut Vec<Option<String>>) {
        out.push(node.name.clone());
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut names = Vec::new();
    walk(&asset.root, &mut names);
    let parts = PartList::from_nodes(names.into_iter().map(|name| (name, ())));
    parts.iter().map(|p| p.name.clone()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Character,
    Environment,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Character => "character",
            AssetKind::Environment => "environment",
        }
    }
}

/// Result of a background load, delivered to the frame loop.
pub struct AssetMessage {
    pub kind: AssetKind,
    pub path: PathBuf,
    pub result: Result<LoadedModel, AssetError>,
}

/// Loads models on worker threads; completions are drained once per frame.
pub struct AssetLoader {
    tx: mpsc::Sender<AssetMessage>,
    rx: mpsc::Receiver<AssetMessage>,
    in_flight: usize,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, in_flight: 0 }
    }

    pub fn request(&mut self, kind: AssetKind, path: PathBuf) {
        tracing::info!("Loading {} from {}", kind.as_str(), path.display());
        let tx = self.tx.clone();
        self.in_flight += 1;
        std::thread::spawn(move || {
            let result = load_model(&path);
            let _ = tx.send(AssetMessage { kind, path, result });
        });
    }

    /// Collect finished loads (non-blocking).
    pub fn poll(&mut self) -> Vec<AssetMessage> {
        let done: Vec<AssetMessage> = self.rx.try_iter().collect();
        self.in_flight -= done.len().min(self.in_flight);
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> ModelAsset {
        ModelAsset {
            source: "bot.glb".into(),
            root: NodeDesc::group(
                Some("Scene".into()),
                vec![
                    NodeDesc::group(Some("Body".into()), vec![NodeDesc::group(None, vec![])]),
                    NodeDesc::group(Some(String::new()), vec![]),
                ],
            ),
            bounds: None,
        }
    }

    #[test]
    fn test_part_names_preorder_with_placeholders() {
        assert_eq!(part_names(&asset()), vec!["Scene", "Body", "Part_2", "Part_3"]);
    }

    #[test]
    fn test_into_asset_offsets_handles() {
        let mut root = NodeDesc::group(None, vec![]);
        root.meshes = vec![MeshHandle(0), MeshHandle(1)];
        let loaded = LoadedModel {
            asset: ModelAsset {
                source: "x".into(),
                root,
                bounds: None,
            },
            meshes: vec![MeshData::default(), MeshData::default()],
        };
        let asset = loaded.into_asset(7);
        assert_eq!(asset.root.meshes, vec![MeshHandle(7), MeshHandle(8)]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_model(Path::new("/nonexistent/robot.glb"));
        assert!(matches!(result, Err(AssetError::Io(_))));
    }

    #[test]
    fn test_draco_required_is_unsupported() {
        let path = std::env::temp_dir().join(format!("robo-viewer-draco-{}.gltf", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "asset": {"version": "2.0"},
                "extensionsUsed": ["KHR_draco_mesh_compression"],
                "extensionsRequired": ["KHR_draco_mesh_compression"]
            }"#,
        )
        .unwrap();
        let result = load_model(&path);
        std::fs::remove_file(&path).unwrap();
        match result {
            Err(AssetError::Unsupported(ext)) => assert_eq!(ext, DRACO_EXTENSION),
            other => panic!("expected unsupported extension, got {:?}", other.map(|m| m.meshes.len())),
        }
    }

    #[test]
    fn test_loader_reports_failure_over_channel() {
        let mut loader = AssetLoader::new();
        loader.request(AssetKind::Environment, PathBuf::from("/nonexistent/env.glb"));
        assert_eq!(loader.in_flight(), 1);
        let mut messages = Vec::new();
        for _ in 0..200 {
            messages.extend(loader.poll());
            if !messages.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, AssetKind::Environment);
        assert!(messages[0].result.is_err());
        assert_eq!(loader.in_flight(), 0);
    }
}
