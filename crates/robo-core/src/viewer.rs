//! Frame driver: owns every piece of controller state and applies it to the
//! scene world once per frame.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use glam::Vec3;
use hecs::Entity;
use serde::Serialize;

use crate::bindings::{BindingError, PartBindings, PartList, Role};
use crate::camera_follow::{CameraFollow, CameraRig};
use crate::components::{MeshHandle, MeshRenderer, Opacity, Tint, Transform};
use crate::config::ControllerConfig;
use crate::events::{names, EventBus};
use crate::fade::FadeRamp;
use crate::intent::{FrameIntent, InputAggregator, InputSnapshot};
use crate::locomotion::{CharacterPose, HeadingState, LimbPose, LocomotionController, WalkCycle};
use crate::model::ModelAsset;
use crate::overlay::{BowState, JumpState};
use crate::panel::{PanelState, PanelView, PositionReadout};
use crate::teleport::{TeleportEffect, TeleportFrame};
use crate::world::SceneWorld;

pub const CHARACTER_KEY: &str = "character";
pub const ENVIRONMENT_KEY: &str = "environment";
const TELEPORT_KEY: &str = "teleport";

const EVENT_LOG_CAPACITY: usize = 256;
const PARTICLE_TINT: [f32; 3] = [0.4, 0.9, 1.0];
const RING_TINT: [f32; 3] = [0.3, 0.7, 1.0];
const BEAM_TINT: [f32; 3] = [0.7, 0.95, 1.0];
const BEAM_RADIUS: f32 = 6.0;

/// Unit meshes the teleport ensemble is drawn with.
#[derive(Debug, Clone, Copy)]
pub struct TeleportMeshes {
    pub particle: MeshHandle,
    /// Flat ring of radius 1 in the XZ plane.
    pub ring: MeshHandle,
    /// Tapered cylinder of height 1 and bottom radius 1.
    pub beam: MeshHandle,
}

struct TeleportNodes {
    particles: Vec<Entity>,
    rings: Vec<Entity>,
    beam: Entity,
}

struct ActiveTeleport {
    effect: TeleportEffect,
    nodes: Option<TeleportNodes>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerError {
    Binding(BindingError),
    InvalidSpeed(String),
    NoModel,
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::Binding(e) => write!(f, "{}", e),
            ViewerError::InvalidSpeed(v) => write!(f, "Invalid speed multiplier '{}'", v),
            ViewerError::NoModel => write!(f, "No character model loaded"),
        }
    }
}

impl std::error::Error for ViewerError {}

impl From<BindingError> for ViewerError {
    fn from(e: BindingError) -> Self {
        ViewerError::Binding(e)
    }
}

/// Parse a speed value typed by a user.
pub fn parse_speed(text: &str) -> Result<f32, ViewerError> {
    text.trim()
        .parse::<f32>()
        .map_err(|_| ViewerError::InvalidSpeed(text.to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameReport {
    pub intent: FrameIntent,
    pub moving: bool,
}

/// Everything the command socket reports for `get_state`.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerState {
    pub frame: u64,
    pub has_character: bool,
    pub has_environment: bool,
    pub pose: CharacterPose,
    pub heading: HeadingState,
    pub walk: WalkCycle,
    pub limbs: LimbPose,
    pub jump: JumpState,
    pub bow: BowState,
    pub speed_multiplier: f32,
    pub camera_position: Vec3,
    pub camera_target: Vec3,
    pub teleport_progress: Option<f32>,
    pub fading: bool,
    pub readout: Option<PositionReadout>,
    pub bindings: BTreeMap<String, Option<usize>>,
    pub part_count: usize,
}

pub struct Viewer {
    pub config: ControllerConfig,
    pub scene: SceneWorld,
    pub events: EventBus,
    pub panel: PanelState,
    input: InputAggregator,
    locomotion: LocomotionController,
    jump: JumpState,
    bow: BowState,
    camera: CameraFollow,
    bindings: PartBindings<Entity>,
    parts: PartList<Entity>,
    teleport: Option<ActiveTeleport>,
    teleport_meshes: Option<TeleportMeshes>,
    fade: Option<FadeRamp>,
}

impl Viewer {
    pub fn new(config: ControllerConfig) -> Self {
        let camera = CameraFollow::new(CameraRig::from_config(&config), config.camera_initial_position);
        Self {
            scene: SceneWorld::new(),
            events: EventBus::new(EVENT_LOG_CAPACITY),
            panel: PanelState::default(),
            input: InputAggregator::new(&config),
            locomotion: LocomotionController::new(&config),
            jump: JumpState::default(),
            bow: BowState::default(),
            camera,
            bindings: PartBindings::default(),
            parts: PartList::default(),
            teleport: None,
            teleport_meshes: None,
            fade: None,
            config,
        }
    }

    pub fn set_teleport_meshes(&mut self, meshes: TeleportMeshes) {
        self.teleport_meshes = Some(meshes);
    }

    pub fn character(&self) -> Option<Entity> {
        self.scene.registered(CHARACTER_KEY)
    }

    pub fn environment(&self) -> Option<Entity> {
        self.scene.registered(ENVIRONMENT_KEY)
    }

    pub fn pose(&self) -> &CharacterPose {
        &self.locomotion.pose
    }

    pub fn heading(&self) -> &HeadingState {
        &self.locomotion.heading
    }

    pub fn limbs(&self) -> &LimbPose {
        &self.locomotion.limbs
    }

    pub fn jump(&self) -> &JumpState {
        &self.jump
    }

    pub fn bow(&self) -> &BowState {
        &self.bow
    }

    pub fn camera(&self) -> &CameraFollow {
        &self.camera
    }

    pub fn parts(&self) -> &PartList<Entity> {
        &self.parts
    }

    pub fn bindings(&self) -> &PartBindings<Entity> {
        &self.bindings
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.locomotion.speed_multiplier
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleport.is_some()
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Replace the character with a freshly loaded model.
    pub fn load_character(&mut self, asset: &ModelAsset) -> Entity {
        self.cancel_teleport();
        self.fade = None;
        if self.bindings.clear_all() {
            self.events.emit_simple(names::BINDINGS_CLEARED);
        }

        let scale = asset
            .bounds
            .map(|b| b.max_dimension())
            .filter(|d| *d > 0.0)
            .map_or(1.0, |d| self.config.character_size / d);

        self.reset_motion();
        let root = self.scene.add_registered(
            CHARACTER_KEY,
            Transform {
                position: self.locomotion.pose.position,
                rotation: self.locomotion.pose.rotation(),
                scale: Vec3::splat(scale),
                ..Default::default()
            },
        );
        let model_root = self.scene.instantiate(&asset.root, Some(root));
        let nodes = self.scene.traverse(model_root);
        self.parts = PartList::from_nodes(nodes.into_iter().map(|e| (self.scene.node_name(e), e)));

        tracing::info!(
            "Loaded character '{}': {} parts, scale {:.3}",
            asset.source,
            self.parts.len(),
            scale
        );
        let mut data = HashMap::new();
        data.insert("source".to_string(), serde_json::json!(asset.source));
        data.insert("parts".to_string(), serde_json::json!(self.parts.len()));
        self.events.emit(names::MODEL_LOADED, data);

        if self.config.teleport {
            self.start_teleport(root);
        }

        self.apply_pose();
        self.scene.update_transforms();
        root
    }

    pub fn load_environment(&mut self, asset: &ModelAsset) -> Entity {
        let scale = self.config.environment_scale;
        let height = asset.bounds.map_or(0.0, |b| b.size().y);
        let root = self.scene.add_registered(
            ENVIRONMENT_KEY,
            Transform {
                position: Vec3::new(0.0, -height / 2.0 * scale, 0.0),
                scale: Vec3::splat(scale),
                ..Default::default()
            },
        );
        self.scene.instantiate(&asset.root, Some(root));
        self.scene.update_transforms();

        tracing::info!("Loaded environment '{}' at scale {}x", asset.source, scale);
        self.events
            .emit_with(names::ENVIRONMENT_LOADED, "source", serde_json::json!(asset.source));
        root
    }

    /// Record a failed load. The viewer carries on without the asset.
    pub fn asset_failed(&mut self, kind: &str, source: &str, message: &str) {
        tracing::error!("Failed to load {} '{}': {}", kind, source, message);
        let mut data = HashMap::new();
        data.insert("kind".to_string(), serde_json::json!(kind));
        data.insert("source".to_string(), serde_json::json!(source));
        data.insert("message".to_string(), serde_json::json!(message));
        self.events.emit(names::ASSET_FAILED, data);
    }

    pub fn assign_part(&mut self, role: Role, index: usize) -> Result<String, ViewerError> {
        let entry = self.parts.get(index)?;
        let (node, name) = (entry.node, entry.name.clone());
        if let Some(previous) = self.bindings.assign(role, node) {
            self.release_part(previous);
        }
        tracing::info!("{} assigned to: {}", role, name);

        let mut data = HashMap::new();
        data.insert("role".to_string(), serde_json::json!(role.as_str()));
        data.insert("index".to_string(), serde_json::json!(index));
        data.insert("name".to_string(), serde_json::json!(name));
        self.events.emit(names::PART_ASSIGNED, data);
        Ok(name)
    }

    /// Returns the index of the part that was bound, if any.
    pub fn unassign_part(&mut self, role: Role) -> Option<usize> {
        let previous = self.bindings.unassign(role)?;
        self.release_part(previous);
        self.events
            .emit_with(names::PART_UNASSIGNED, "role", serde_json::json!(role.as_str()));
        self.part_index(previous)
    }

    pub fn reset_parts(&mut self) {
        let bound: Vec<Entity> = self.bindings.bound().map(|(_, e)| e).collect();
        self.bindings.clear_all();
        for entity in bound {
            self.release_part(entity);
        }
        tracing::info!("Part bindings cleared");
        self.events.emit_simple(names::BINDINGS_CLEARED);
    }

    /// Put a part back to its rest rotation unless another role still drives it.
    fn release_part(&mut self, entity: Entity) {
        if self.bindings.bound().all(|(_, e)| e != entity) {
            self.scene.set_local_pitch(entity, 0.0);
        }
    }

    fn part_index(&self, entity: Entity) -> Option<usize> {
        self.parts.iter().find(|p| p.node == entity).map(|p| p.index)
    }

    pub fn set_speed(&mut self, value: f32) -> Result<(), ViewerError> {
        if !self.config.accepts_speed(value) {
            return Err(ViewerError::InvalidSpeed(value.to_string()));
        }
        self.locomotion.speed_multiplier = value;
        Ok(())
    }

    pub fn test_walk(&mut self) {
        self.locomotion.walk.start_test(self.config.test_walk_frames);
    }

    /// Same as the jump key: needs a model and a grounded character.
    pub fn test_jump(&mut self) -> bool {
        if self.character().is_none() {
            return false;
        }
        self.try_jump()
    }

    fn try_jump(&mut self) -> bool {
        if self.jump.trigger(self.config.jump_strength) {
            self.events.emit_simple(names::JUMP_STARTED);
            true
        } else {
            false
        }
    }

    pub fn reset_position(&mut self) {
        self.reset_motion();
        self.apply_pose();
        self.scene.update_transforms();
        tracing::info!("Character reset to spawn position");
        self.events.emit_simple(names::POSITION_RESET);
    }

    fn reset_motion(&mut self) {
        self.locomotion.reset(&self.config);
        self.jump.reset();
        self.bow.reset();
    }

    /// Advance one frame from an input snapshot.
    pub fn frame(&mut self, snapshot: &InputSnapshot) -> FrameReport {
        // Latches update even without a model so a held key does not fire on load.
        let intent = self.input.aggregate(snapshot);
        let mut report = FrameReport {
            intent,
            moving: false,
        };

        if self.character().is_some() {
            let step = self.locomotion.step(&intent, &self.config);
            report.moving = step.moving;
            if step.reverse_toggled {
                self.events.emit_with(
                    names::REVERSE_TOGGLED,
                    "reversing",
                    serde_json::json!(self.locomotion.heading.reversing),
                );
            }

            if intent.jump {
                self.try_jump();
            }
            if intent.bow && self.bow.trigger() {
                self.events.emit_simple(names::BOW_STARTED);
            }

            let bow = self.bow.step(self.config.bow_speed, self.config.bow_amplitude);
            self.locomotion.pose.pitch = bow.pitch;
            if bow.finished {
                self.events.emit_simple(names::BOW_FINISHED);
            }

            if self.jump.step(
                &mut self.locomotion.pose.position.y,
                self.config.ground_level,
                self.config.gravity,
            ) {
                self.events.emit_simple(names::JUMP_LANDED);
            }

            self.camera.update(&self.locomotion.pose);
            self.apply_pose();
        }

        self.step_teleport();
        self.step_fade();

        self.scene.update_transforms();
        self.events.flush();
        self.events.advance_frame();
        report
    }

    /// Push the controller pose onto the character root and bound limbs.
    fn apply_pose(&mut self) {
        let Some(root) = self.character() else {
            return;
        };
        if let Ok(mut transform) = self.scene.world.get::<&mut Transform>(root) {
            transform.position = self.locomotion.pose.position;
            transform.rotation = self.locomotion.pose.rotation();
            transform.dirty = true;
        }
        let bound: Vec<(Role, Entity)> = self.bindings.bound().collect();
        for (role, entity) in bound {
            self.scene.set_local_pitch(entity, self.locomotion.limbs.angle(role));
        }
    }

    fn start_teleport(&mut self, character: Entity) {
        self.scene.set_hidden(character, true);
        let origin = self.locomotion.pose.position;
        let effect = TeleportEffect::new(origin, &self.config);
        let nodes = match self.teleport_meshes {
            Some(meshes) => Some(self.spawn_teleport_nodes(&effect, meshes)),
            None => None,
        };
        tracing::info!(
            "Teleport started: {} particles, {} rings",
            effect.particle_count(),
            effect.ring_count()
        );
        self.teleport = Some(ActiveTeleport { effect, nodes });
        self.events.emit_simple(names::TELEPORT_STARTED);
    }

    fn spawn_teleport_nodes(&mut self, effect: &TeleportEffect, meshes: TeleportMeshes) -> TeleportNodes {
        let root = self
            .scene
            .add_registered(TELEPORT_KEY, Transform::from_position(effect.origin));
        let spawn = |scene: &mut SceneWorld, name: &str, mesh: MeshHandle, tint: [f32; 3]| {
            scene.add_node_with(
                Some(name.to_string()),
                Transform::default(),
                Some(root),
                (MeshRenderer { meshes: vec![mesh] }, Tint(tint), Opacity(0.0)),
            )
        };
        let particles = (0..effect.particle_count())
            .map(|_| spawn(&mut self.scene, "teleport_particle", meshes.particle, PARTICLE_TINT))
            .collect();
        let rings = (0..effect.ring_count())
            .map(|_| spawn(&mut self.scene, "teleport_ring", meshes.ring, RING_TINT))
            .collect();
        let beam = spawn(&mut self.scene, "teleport_beam", meshes.beam, BEAM_TINT);
        TeleportNodes { particles, rings, beam }
    }

    fn step_teleport(&mut self) {
        let Some(active) = self.teleport.as_mut() else {
            return;
        };
        let frame = active.effect.step();
        if let Some(nodes) = &active.nodes {
            apply_teleport_frame(&mut self.scene, nodes, &frame);
        }
        if !frame.finished {
            return;
        }

        self.cancel_teleport();
        if let Some(character) = self.character() {
            self.scene.set_hidden(character, false);
            self.scene.set_opacity(character, 0.0);
            self.fade = Some(FadeRamp::fade_in(
                self.config.fade_steps,
                self.config.fade_frames_per_step,
            ));
        }
        tracing::info!("Teleport finished");
        self.events.emit_simple(names::TELEPORT_FINISHED);
    }

    /// Tear down any teleport ensemble without revealing the model.
    fn cancel_teleport(&mut self) {
        if self.teleport.take().is_some() {
            if let Some(root) = self.scene.registered(TELEPORT_KEY) {
                self.scene.remove_node(root);
            }
        }
    }

    fn step_fade(&mut self) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        let value = fade.advance();
        let complete = fade.is_complete();
        if let (Some(character), Some(value)) = (self.character(), value) {
            self.scene.set_opacity(character, value);
        }
        if complete {
            self.fade = None;
            if let Some(character) = self.character() {
                self.scene.set_opacity(character, 1.0);
            }
            self.events.emit_simple(names::FADE_FINISHED);
        }
    }

    pub fn readout(&self) -> Option<PositionReadout> {
        self.character()
            .map(|_| PositionReadout::new(self.locomotion.pose.position, self.config.origin_offset))
    }

    pub fn panel_view(&self) -> PanelView {
        self.panel
            .view(&self.parts, &self.bindings, self.speed_multiplier(), self.readout())
    }

    pub fn state(&self) -> ViewerState {
        let bindings = self
            .bindings
            .iter()
            .map(|(role, e)| (role.as_str().to_string(), e.and_then(|e| self.part_index(e))))
            .collect();
        ViewerState {
            frame: self.events.frame(),
            has_character: self.character().is_some(),
            has_environment: self.environment().is_some(),
            pose: self.locomotion.pose,
            heading: self.locomotion.heading,
            walk: self.locomotion.walk,
            limbs: self.locomotion.limbs,
            jump: self.jump,
            bow: self.bow,
            speed_multiplier: self.speed_multiplier(),
            camera_position: self.camera.position,
            camera_target: self.camera.target,
            teleport_progress: self.teleport.as_ref().map(|t| t.effect.progress()),
            fading: self.fade.is_some(),
            readout: self.readout(),
            bindings,
            part_count: self.parts.len(),
        }
    }
}

fn apply_teleport_frame(scene: &mut SceneWorld, nodes: &TeleportNodes, frame: &TeleportFrame) {
    for (entity, visual) in nodes.particles.iter().zip(&frame.particles) {
        if let Ok(mut t) = scene.world.get::<&mut Transform>(*entity) {
            t.position = visual.offset;
            t.scale = Vec3::splat(visual.size);
            t.dirty = true;
        }
        scene.set_opacity(*entity, visual.opacity);
    }
    for (entity, ring) in nodes.rings.iter().zip(&frame.rings) {
        if let Ok(mut t) = scene.world.get::<&mut Transform>(*entity) {
            t.position = Vec3::new(0.0, ring.height, 0.0);
            t.scale = Vec3::new(ring.radius, 1.0, ring.radius);
            t.dirty = true;
        }
        scene.set_opacity(*entity, ring.opacity);
    }
    if let Ok(mut t) = scene.world.get::<&mut Transform>(nodes.beam) {
        t.scale = Vec3::new(BEAM_RADIUS, frame.beam.height, BEAM_RADIUS);
        t.dirty = true;
    }
    scene.set_opacity(nodes.beam, frame.beam.opacity);
}
