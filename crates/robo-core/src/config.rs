//! Controller parameters shared by every scene variant.
//!
//! One parameterised controller replaces the per-scene copies of the frame
//! update: each variant is a preset of [`ControllerConfig`], and any field can
//! be overridden from the `controller:` section of `viewer.yaml`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// How discrete keys and the touch joystick combine into one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMerge {
    /// Key and joystick contributions are summed.
    Additive,
    /// The joystick is only read while no movement key is held.
    Exclusive,
}

/// The three scene variants the viewer ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Simple,
    Additive,
    Teleport,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    // Locomotion
    pub base_speed: f32,
    pub turn_rate: f32,
    pub heading_smoothing: f32,
    pub speed_multiplier: f32,
    pub speed_multiplier_min: f32,
    pub speed_multiplier_max: f32,
    pub reverse_toggle: bool,
    pub input_merge: InputMerge,
    pub joystick_strafe: bool,
    pub joystick_deadzone: f32,
    /// Joystick displacement relative to a held movement key.
    pub joystick_speed_scale: f32,

    // Walk cycle
    pub walk_phase_step: f32,
    pub leg_amplitude: f32,
    pub arm_amplitude: f32,
    pub limb_decay: f32,
    pub test_walk_frames: u32,

    // Jump
    pub ground_level: f32,
    pub gravity: f32,
    pub jump_strength: f32,

    // Bow
    pub bow_speed: f32,
    pub bow_amplitude: f32,

    // Placement
    pub spawn_position: Vec3,
    pub initial_heading: f32,
    pub origin_offset: Vec3,
    pub character_size: f32,
    pub environment_scale: f32,

    // Camera
    pub camera_offset: Vec3,
    pub camera_look_ahead: f32,
    pub camera_look_height: f32,
    pub camera_smoothing: f32,
    pub camera_initial_position: Vec3,

    // Teleport-in (variant B)
    pub teleport: bool,
    pub teleport_frames: u32,
    pub teleport_particles: usize,
    pub teleport_rings: usize,
    pub teleport_seed: u64,
    pub fade_steps: u32,
    pub fade_frames_per_step: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::preset(Variant::Additive)
    }
}

impl ControllerConfig {
    pub fn preset(variant: Variant) -> Self {
        let additive = Self {
            base_speed: 3.0,
            turn_rate: 0.015,
            heading_smoothing: 0.08,
            speed_multiplier: 0.3,
            speed_multiplier_min: 0.1,
            speed_multiplier_max: 3.0,
            reverse_toggle: true,
            input_merge: InputMerge::Additive,
            joystick_strafe: true,
            joystick_deadzone: 0.1,
            joystick_speed_scale: 1.0 / 3.0,

            walk_phase_step: 0.15,
            leg_amplitude: 0.3,
            arm_amplitude: 0.2,
            limb_decay: 0.85,
            test_walk_frames: 180,

            ground_level: -100.0,
            gravity: 0.014,
            jump_strength: 2.0,

            bow_speed: 0.05,
            bow_amplitude: 0.8,

            spawn_position: Vec3::new(681.30, -100.0, -50.0),
            initial_heading: std::f32::consts::PI,
            origin_offset: Vec3::new(681.30, -100.0, -50.0),
            character_size: 40.0,
            environment_scale: 20.0,

            camera_offset: Vec3::new(0.0, 60.0, -100.0),
            camera_look_ahead: 10.0,
            camera_look_height: 0.0,
            camera_smoothing: 0.1,
            camera_initial_position: Vec3::new(0.0, 3.0, 8.0),

            teleport: false,
            teleport_frames: 150,
            teleport_particles: 120,
            teleport_rings: 5,
            teleport_seed: 0x5eed,
            fade_steps: 20,
            fade_frames_per_step: 3,
        };

        match variant {
            Variant::Additive => additive,
            Variant::Simple => Self {
                reverse_toggle: false,
                input_merge: InputMerge::Exclusive,
                joystick_strafe: false,
                heading_smoothing: 0.15,
                ..additive
            },
            Variant::Teleport => Self {
                teleport: true,
                ..additive
            },
        }
    }

    /// Check a requested speed multiplier against the configured range.
    pub fn accepts_speed(&self, value: f32) -> bool {
        value.is_finite() && value >= self.speed_multiplier_min && value <= self.speed_multiplier_max
    }

    /// Merge a YAML mapping of overrides onto this config.
    pub fn with_overrides(&self, overrides: &serde_yaml::Value) -> Result<Self, serde_yaml::Error> {
        let mut base = serde_yaml::to_value(self)?;
        if let (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(over)) = (&mut base, overrides) {
            for (k, v) in over {
                base_map.insert(k.clone(), v.clone());
            }
        }
        serde_yaml::from_value(base)
    }
}
