//! Heading, position and walk-cycle state of the character.

use std::f32::consts::PI;

use glam::{Quat, Vec3};
use serde::Serialize;

use crate::bindings::Role;
use crate::config::ControllerConfig;
use crate::intent::FrameIntent;

/// Root pose of the character model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CharacterPose {
    pub position: Vec3,
    /// Radians about +Y. Never normalised; only used through sin/cos.
    pub heading: f32,
    /// Transient pitch about +X, owned by the bow overlay.
    pub pitch: f32,
}

impl CharacterPose {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self {
            position,
            heading,
            pitch: 0.0,
        }
    }

    /// Unit vector the character faces on the ground plane.
    pub fn facing(&self) -> Vec3 {
        facing(self.heading)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_x(self.pitch) * Quat::from_rotation_y(self.heading)
    }
}

pub fn facing(heading: f32) -> Vec3 {
    Vec3::new(heading.sin(), 0.0, heading.cos())
}

/// Base, target and smoothed heading plus the reverse flag.
///
/// `current` is only ever moved by [`HeadingState::relax`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadingState {
    pub base: f32,
    pub target: f32,
    pub current: f32,
    pub reversing: bool,
}

impl HeadingState {
    pub fn new(initial: f32) -> Self {
        Self {
            base: initial,
            target: initial,
            current: initial,
            reversing: false,
        }
    }

    pub fn turn(&mut self, delta: f32) {
        self.base += delta;
        self.update_target();
    }

    pub fn toggle_reverse(&mut self) {
        self.reversing = !self.reversing;
        self.update_target();
    }

    pub fn update_target(&mut self) {
        self.target = if self.reversing { self.base + PI } else { self.base };
    }

    /// Move `current` a fixed fraction of the remaining distance to `target`.
    pub fn relax(&mut self, smoothing: f32) {
        self.current += (self.target - self.current) * smoothing;
    }
}

/// Rotation about local X for each bound limb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LimbPose {
    pub left_leg: f32,
    pub right_leg: f32,
    pub left_arm: f32,
    pub right_arm: f32,
}

impl LimbPose {
    /// Legs swing in opposition; arms swing in opposition and against the legs.
    pub fn from_phase(phase: f32, leg_amplitude: f32, arm_amplitude: f32) -> Self {
        let leg = phase.sin() * leg_amplitude;
        let arm = phase.sin() * arm_amplitude;
        Self {
            left_leg: leg,
            right_leg: -leg,
            left_arm: -arm,
            right_arm: arm,
        }
    }

    pub fn decay(&mut self, factor: f32) {
        self.left_leg *= factor;
        self.right_leg *= factor;
        self.left_arm *= factor;
        self.right_arm *= factor;
    }

    pub fn angle(&self, role: Role) -> f32 {
        match role {
            Role::LeftLeg => self.left_leg,
            Role::RightLeg => self.right_leg,
            Role::LeftArm => self.left_arm,
            Role::RightArm => self.right_arm,
        }
    }
}

/// Walk phase accumulator plus the scripted test-walk countdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WalkCycle {
    pub phase: f32,
    pub test_frames_remaining: u32,
}

impl WalkCycle {
    pub fn start_test(&mut self, frames: u32) {
        self.test_frames_remaining = frames;
    }

    pub fn is_testing(&self) -> bool {
        self.test_frames_remaining > 0
    }
}

/// What happened during one locomotion step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocomotionStep {
    pub moving: bool,
    pub reverse_toggled: bool,
}

/// Heading, position and limb state advanced once per frame from a [`FrameIntent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocomotionController {
    pub pose: CharacterPose,
    pub heading: HeadingState,
    pub walk: WalkCycle,
    pub limbs: LimbPose,
    pub speed_multiplier: f32,
}

impl LocomotionController {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            pose: CharacterPose::new(config.spawn_position, config.initial_heading),
            heading: HeadingState::new(config.initial_heading),
            walk: WalkCycle::default(),
            limbs: LimbPose::default(),
            speed_multiplier: config.speed_multiplier,
        }
    }

    pub fn step(&mut self, intent: &FrameIntent, config: &ControllerConfig) -> LocomotionStep {
        let speed = config.base_speed * self.speed_multiplier;

        // Displacement uses the heading as it stood at the start of the frame.
        let current = self.heading.current;
        if intent.forward != 0.0 {
            self.pose.position += facing(current) * speed * intent.forward;
        }
        if intent.strafe != 0.0 {
            self.pose.position += facing(current + PI / 2.0) * speed * intent.strafe;
        }

        if intent.reverse {
            self.heading.toggle_reverse();
        }
        if intent.turn != 0.0 {
            self.heading.turn(config.turn_rate * self.speed_multiplier * intent.turn);
        }
        self.heading.update_target();
        self.heading.relax(config.heading_smoothing);
        self.pose.heading = self.heading.current;

        let moving = intent.is_moving();
        // The test walk counts down from its trigger whether or not the character moves.
        let testing = self.walk.is_testing();
        if testing {
            self.walk.test_frames_remaining -= 1;
        }
        if moving {
            self.walk.phase += config.walk_phase_step * self.speed_multiplier;
            self.apply_phase(config);
        } else if testing {
            self.walk.phase += config.walk_phase_step;
            self.apply_phase(config);
        } else {
            self.walk.phase *= config.limb_decay;
            self.limbs.decay(config.limb_decay);
        }

        LocomotionStep {
            moving,
            reverse_toggled: intent.reverse,
        }
    }

    fn apply_phase(&mut self, config: &ControllerConfig) {
        self.limbs = LimbPose::from_phase(self.walk.phase, config.leg_amplitude, config.arm_amplitude);
    }

    /// Back to spawn with neutral heading and limbs. The speed multiplier is kept.
    pub fn reset(&mut self, config: &ControllerConfig) {
        let speed_multiplier = self.speed_multiplier;
        *self = Self::new(config);
        self.speed_multiplier = speed_multiplier;
    }
}
